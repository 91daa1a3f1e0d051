//! Per-kind behaviour plugged into the shared reconciliation pipeline.
//!
//! A [`ResourceHandler`] owns a kind's schema and the few places where a
//! kind departs from the generic behaviour: parsing its parameters,
//! normalizing the provider's representation and planning updates that
//! need more than one partial update.

use serde_json::{Map, Value};

use crate::error::{ApiError, ReconcileError, Result};
use crate::planner::{ChangeSet, Mutation, Step};

use super::desired::DesiredState;
use super::remote::RemoteResource;
use super::schema::{FieldMode, KindSchema};
use super::ResourceSpec;

/// Keys whose nested object is replaced by the referenced UUID.
const REFERENCE_KEYS: &[&str] = &["server", "network", "load_balancer", "pool"];

/// Keys whose list of nested objects is replaced by a list of UUIDs.
const REFERENCE_LIST_KEYS: &[&str] = &["servers", "server_groups"];

/// Behaviour of one resource kind.
pub trait ResourceHandler: Send + Sync {
    /// Returns the kind's schema.
    fn schema(&self) -> &'static KindSchema;

    /// Parses and validates the kind's parameters (without the `kind` tag).
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown keys or invalid values.
    fn parse(&self, params: Value) -> Result<ResourceSpec>;

    /// Flattens the provider's representation to what a manifest contains.
    fn normalize(&self, raw: Map<String, Value>) -> Map<String, Value> {
        normalize_references(raw)
    }

    /// Converts a raw API object into a remote resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a JSON object.
    fn remote(&self, raw: Value) -> Result<RemoteResource> {
        let Value::Object(map) = raw else {
            return Err(ApiError::InvalidResponse {
                message: format!("expected a {} object", self.schema().kind),
            }
            .into());
        };
        Ok(RemoteResource::from_attributes(self.schema(), self.normalize(map)))
    }

    /// Builds the creation request body.
    ///
    /// # Errors
    ///
    /// Returns an error if a field required for creation is missing.
    fn create_body(&self, desired: &DesiredState) -> Result<Value> {
        create_body(self.schema(), desired)
    }

    /// Removes changes that must not be applied in this invocation.
    fn adjust_changes(
        &self,
        _desired: &DesiredState,
        _remote: &RemoteResource,
        changes: ChangeSet,
    ) -> ChangeSet {
        changes
    }

    /// Plans the calls that apply a change set.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote resource has no identifier.
    fn update_steps(
        &self,
        _desired: &DesiredState,
        remote: &RemoteResource,
        changes: &ChangeSet,
    ) -> Result<Vec<Step>> {
        Ok(patch_step(self.schema(), remote, changes)?.into_iter().collect())
    }

    /// Status the resource must reach after creation, if any.
    fn settled_status(&self, _desired: &DesiredState) -> Option<&'static str> {
        None
    }

    /// Projects the state a resource would have after applying `desired`.
    fn project(&self, desired: &DesiredState, base: Option<&RemoteResource>) -> RemoteResource {
        let schema = self.schema();
        let mut projected = base.cloned().unwrap_or_else(|| {
            let mut seed = Map::new();
            if let Some(id) = &desired.id {
                seed.insert(schema.id_key.to_string(), Value::String(id.clone()));
            }
            RemoteResource::from_attributes(schema, seed)
        });

        for attribute in desired.attributes() {
            if schema.is_secret(attribute.field.name) {
                continue;
            }
            if base.is_some() && !attribute.field.is_compared() {
                continue;
            }
            projected.set(attribute.field.name, attribute.value.clone());
        }
        projected
    }
}

/// Flattens `{slug: ..}` objects to their slug and parent references to
/// their UUID.
#[must_use]
pub fn normalize_references(raw: Map<String, Value>) -> Map<String, Value> {
    raw.into_iter()
        .map(|(key, value)| {
            let value = if REFERENCE_LIST_KEYS.contains(&key.as_str()) {
                flatten_list(value)
            } else {
                flatten(&key, value)
            };
            (key, value)
        })
        .collect()
}

fn flatten(key: &str, value: Value) -> Value {
    if key == "tags" {
        return value;
    }
    let Value::Object(object) = value else {
        return value;
    };

    if let Some(slug) = object.get("slug").filter(|v| v.is_string()) {
        return slug.clone();
    }
    if REFERENCE_KEYS.contains(&key)
        && let Some(uuid) = object.get("uuid").filter(|v| v.is_string())
    {
        return uuid.clone();
    }
    Value::Object(object)
}

fn flatten_list(value: Value) -> Value {
    let Value::Array(items) = value else {
        return value;
    };

    Value::Array(
        items
            .into_iter()
            .map(|item| match item {
                Value::Object(object) => object
                    .get("uuid")
                    .cloned()
                    .unwrap_or(Value::Object(object)),
                other => other,
            })
            .collect(),
    )
}

/// Builds a creation body from every specified field.
///
/// # Errors
///
/// Returns an error if a field required for creation is missing.
pub fn create_body(schema: &KindSchema, desired: &DesiredState) -> Result<Value> {
    if let Some(missing) = schema
        .required_for_create
        .iter()
        .find(|name| desired.get(name).is_none())
    {
        return Err(ReconcileError::MissingCreateParam {
            kind: schema.kind.to_string(),
            field: (*missing).to_string(),
        }
        .into());
    }

    let body: Map<String, Value> = desired
        .attributes()
        .iter()
        .map(|a| (a.field.api_key.to_string(), a.value.clone()))
        .collect();

    Ok(Value::Object(body))
}

/// Batches the updatable changes of a change set into one `PATCH`.
///
/// # Errors
///
/// Returns an error if the remote resource has no identifier.
pub fn patch_step(
    schema: &KindSchema,
    remote: &RemoteResource,
    changes: &ChangeSet,
) -> Result<Option<Step>> {
    let body: Map<String, Value> = changes
        .iter()
        .filter_map(|change| {
            schema
                .field(change.field)
                .filter(|f| f.mode == FieldMode::Updatable)
                .map(|f| (f.api_key.to_string(), change.new.clone()))
        })
        .collect();

    if body.is_empty() {
        return Ok(None);
    }

    let id = remote.id().ok_or_else(|| ReconcileError::MissingIdentifier {
        kind: schema.kind.to_string(),
        key: schema.id_key.to_string(),
    })?;

    Ok(Some(Step::Call(Mutation::patch(
        schema.item_path(id),
        Value::Object(body),
    ))))
}
