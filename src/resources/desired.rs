//! Kind-independent view of a desired state.
//!
//! Each typed spec converts itself into a [`DesiredState`] after validation;
//! the resolver, diff engine and reconciler only ever see this form.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{CloudscaleError, Result};

use super::schema::{FieldMode, FieldSpec, Kind, KindSchema};
use super::schema_of;

/// Target lifecycle state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    /// The resource exists.
    #[default]
    Present,
    /// The resource does not exist.
    Absent,
    /// The resource exists and is running (servers).
    Running,
    /// The resource exists and is stopped (servers).
    Stopped,
}

impl Ensure {
    /// Returns true if the resource should not exist.
    #[must_use]
    pub const fn is_absent(self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns the lifecycle status this state pins, if any.
    #[must_use]
    pub const fn status(self) -> Option<&'static str> {
        match self {
            Self::Running => Some("running"),
            Self::Stopped => Some("stopped"),
            Self::Present | Self::Absent => None,
        }
    }
}

impl std::fmt::Display for Ensure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// A single desired field value.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredAttribute {
    /// Field schema.
    pub field: &'static FieldSpec,
    /// Target value.
    pub value: Value,
}

/// Caller-declared target configuration for one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredState {
    /// Resource kind.
    pub kind: Kind,
    /// Target lifecycle state.
    pub ensure: Ensure,
    /// Immutable identifier, when the caller supplied one.
    pub id: Option<String>,
    /// Specified fields, in schema order.
    attributes: Vec<DesiredAttribute>,
    /// Parameters that are not resource fields (e.g. `force`).
    options: BTreeMap<&'static str, Value>,
}

impl DesiredState {
    /// Starts building a desired state for a kind.
    #[must_use]
    pub fn builder(kind: Kind, ensure: Ensure, id: Option<&str>) -> DesiredBuilder {
        DesiredBuilder {
            schema: schema_of(kind),
            state: Self {
                kind,
                ensure,
                id: id.map(String::from),
                attributes: Vec::new(),
                options: BTreeMap::new(),
            },
        }
    }

    /// Returns the kind's schema.
    #[must_use]
    pub fn schema(&self) -> &'static KindSchema {
        schema_of(self.kind)
    }

    /// Returns the specified fields.
    #[must_use]
    pub fn attributes(&self) -> &[DesiredAttribute] {
        &self.attributes
    }

    /// Returns the value of a specified field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|a| a.field.name == name)
            .map(|a| &a.value)
    }

    /// Returns a specified string field.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Replaces the value of a specified field.
    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(attribute) = self.attributes.iter_mut().find(|a| a.field.name == name) {
            attribute.value = value;
        }
    }

    /// Returns the human-readable lookup value, if specified.
    #[must_use]
    pub fn lookup_name(&self) -> Option<&str> {
        self.schema().name_key.and_then(|key| self.get_str(key))
    }

    /// Returns the scope fields used to narrow name lookups.
    pub fn scope(&self) -> impl Iterator<Item = &DesiredAttribute> {
        self.attributes
            .iter()
            .filter(|a| a.field.mode == FieldMode::Scope)
    }

    /// Returns a non-field option.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    /// Returns a boolean option, defaulting to false.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.option(name).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Describes the resource for log lines.
    #[must_use]
    pub fn describe(&self) -> String {
        match (&self.id, self.lookup_name()) {
            (Some(id), _) => format!("{} {id}", self.kind),
            (None, Some(name)) => format!("{} '{name}'", self.kind),
            (None, None) => format!("new {}", self.kind),
        }
    }
}

/// Builder that collects specified fields in schema order.
#[derive(Debug)]
pub struct DesiredBuilder {
    schema: &'static KindSchema,
    state: DesiredState,
}

impl DesiredBuilder {
    /// Adds a field if a value was specified.
    #[must_use]
    pub fn value<V: Into<Value>>(mut self, name: &str, value: Option<V>) -> Self {
        let Some(value) = value else {
            return self;
        };

        let field = self.schema.field(name);
        debug_assert!(field.is_some(), "{} has no field '{name}'", self.schema.kind);
        if let Some(field) = field {
            self.state.attributes.push(DesiredAttribute {
                field,
                value: value.into(),
            });
        }
        self
    }

    /// Adds a string field.
    #[must_use]
    pub fn string(self, name: &str, value: Option<&str>) -> Self {
        self.value(name, value)
    }

    /// Adds a list of strings.
    #[must_use]
    pub fn strings(self, name: &str, value: Option<&[String]>) -> Self {
        self.value(name, value.map(<[String]>::to_vec))
    }

    /// Adds a tag map.
    #[must_use]
    pub fn tags(self, value: Option<&BTreeMap<String, String>>) -> Self {
        let map = value.map(|tags| {
            tags.iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect::<serde_json::Map<String, Value>>()
        });
        self.value("tags", map)
    }

    /// Adds a structured field.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn serialized<T: Serialize>(self, name: &str, value: Option<&T>) -> Result<Self> {
        let value = value
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| CloudscaleError::internal(format!("Failed to serialize {name}: {e}")))?;
        Ok(self.value(name, value))
    }

    /// Adds a non-field option.
    #[must_use]
    pub fn option<V: Into<Value>>(mut self, name: &'static str, value: V) -> Self {
        self.state.options.insert(name, value.into());
        self
    }

    /// Finishes the desired state, ordering fields as the schema does.
    #[must_use]
    pub fn build(mut self) -> DesiredState {
        let order = |a: &DesiredAttribute| {
            self.schema
                .fields
                .iter()
                .position(|f| f.name == a.field.name)
                .unwrap_or(usize::MAX)
        };
        self.state.attributes.sort_by_key(order);
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_skips_unspecified_fields() {
        let desired = DesiredState::builder(Kind::Volume, Ensure::Present, None)
            .string("name", Some("data"))
            .value("size_gb", None::<u32>)
            .build();

        assert_eq!(desired.attributes().len(), 1);
        assert_eq!(desired.get("name"), Some(&json!("data")));
        assert_eq!(desired.get("size_gb"), None);
        assert_eq!(desired.lookup_name(), Some("data"));
    }

    #[test]
    fn test_builder_orders_by_schema() {
        let tags = BTreeMap::from([(String::from("env"), String::from("prod"))]);
        let desired = DesiredState::builder(Kind::Volume, Ensure::Present, None)
            .tags(Some(&tags))
            .value("size_gb", Some(50))
            .string("name", Some("data"))
            .build();

        let names: Vec<&str> = desired.attributes().iter().map(|a| a.field.name).collect();
        assert_eq!(names, vec!["name", "size_gb", "tags"]);
        assert_eq!(desired.get("tags"), Some(&json!({"env": "prod"})));
    }

    #[test]
    fn test_describe_prefers_id() {
        let desired = DesiredState::builder(Kind::Server, Ensure::Running, Some("abc"))
            .string("name", Some("web1"))
            .build();
        assert_eq!(desired.describe(), "server abc");
        assert_eq!(desired.ensure.status(), Some("running"));

        let desired = DesiredState::builder(Kind::Server, Ensure::Present, None)
            .string("name", Some("web1"))
            .option("force", true)
            .build();
        assert_eq!(desired.describe(), "server 'web1'");
        assert!(desired.flag("force"));
    }
}
