//! Resource resolver.
//!
//! Finds the zero or one remote resource a desired state refers to. An
//! immutable identifier is fetched directly; otherwise the kind's collection
//! is listed and matched by exact name within the desired scope. More than
//! one match is an error; the resolver never guesses.

use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{ApiTransport, HttpMethod};
use crate::error::{ApiError, ResolveError, Result};
use crate::resources::{is_uuid, DesiredState, Kind, Registry, RemoteResource, ResourceHandler};

/// Looks up remote resources.
pub struct Resolver<'a, T: ApiTransport + ?Sized> {
    /// API transport.
    api: &'a T,
    /// Kind registry.
    registry: &'a Registry,
}

impl<'a, T: ApiTransport + ?Sized> Resolver<'a, T> {
    /// Creates a new resolver.
    #[must_use]
    pub const fn new(api: &'a T, registry: &'a Registry) -> Self {
        Self { api, registry }
    }

    /// Resolves the remote resource a desired state refers to.
    ///
    /// # Errors
    ///
    /// Returns an error if more than one resource matches the name, or on
    /// API failures.
    pub async fn resolve(&self, desired: &DesiredState) -> Result<Option<RemoteResource>> {
        let handler = self.registry.handler(desired.kind)?;

        if let Some(id) = &desired.id {
            debug!("Resolving {} by id", desired.describe());
            return self.fetch(handler, id).await;
        }

        let Some(name) = desired.lookup_name() else {
            debug!("{} has no lookup key, treating as new", desired.describe());
            return Ok(None);
        };

        let matches: Vec<RemoteResource> = self
            .list(handler)
            .await?
            .into_iter()
            .filter(|remote| name_matches(handler, remote, name))
            .filter(|remote| {
                desired.scope().all(|scope| {
                    remote
                        .get(scope.field.name)
                        .is_none_or(|current| current.is_null() || *current == scope.value)
                })
            })
            .collect();

        select(handler, name, matches)
    }

    /// Fetches a resource by identifier; a 404 means it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error on API failures other than 404.
    pub async fn fetch(
        &self,
        handler: &dyn ResourceHandler,
        id: &str,
    ) -> Result<Option<RemoteResource>> {
        let path = handler.schema().item_path(id);
        match self.api.request(HttpMethod::Get, &path, None).await {
            Ok(value) => handler.remote(value).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Lists every resource of a kind.
    ///
    /// # Errors
    ///
    /// Returns an error on API failures or if the response is not a list.
    pub async fn list(&self, handler: &dyn ResourceHandler) -> Result<Vec<RemoteResource>> {
        let schema = handler.schema();
        let value = self.api.request(HttpMethod::Get, schema.path, None).await?;

        let Value::Array(items) = value else {
            return Err(ApiError::InvalidResponse {
                message: format!("expected a list of {}", schema.kind),
            }
            .into());
        };

        items.into_iter().map(|item| handler.remote(item)).collect()
    }

    /// Rewrites references given by name into identifiers.
    ///
    /// With `lenient` set, a reference to a resource that does not exist yet
    /// is kept as written; this lets a dry run plan a parent and its
    /// children together.
    ///
    /// # Errors
    ///
    /// Returns an error if a reference is ambiguous, or missing when not
    /// lenient.
    pub async fn resolve_references(&self, desired: &mut DesiredState, lenient: bool) -> Result<()> {
        let references: Vec<(&'static str, Kind, Value)> = desired
            .attributes()
            .iter()
            .filter_map(|a| a.field.references.map(|kind| (a.field.name, kind, a.value.clone())))
            .collect();

        for (field, kind, value) in references {
            let resolved = match value {
                Value::String(reference) => {
                    Value::String(self.resolve_reference(kind, field, reference, lenient).await?)
                }
                Value::Array(items) => {
                    let mut resolved = Vec::with_capacity(items.len());
                    for item in items {
                        resolved.push(match item {
                            Value::String(reference) => Value::String(
                                self.resolve_reference(kind, field, reference, lenient).await?,
                            ),
                            other => other,
                        });
                    }
                    Value::Array(resolved)
                }
                other => other,
            };
            desired.set(field, resolved);
        }
        Ok(())
    }

    async fn resolve_reference(
        &self,
        kind: Kind,
        field: &str,
        reference: String,
        lenient: bool,
    ) -> Result<String> {
        let handler = self.registry.handler(kind)?;
        if handler.schema().uuid_ids && is_uuid(&reference) {
            return Ok(reference);
        }

        let matches: Vec<RemoteResource> = self
            .list(handler)
            .await?
            .into_iter()
            .filter(|remote| name_matches(handler, remote, &reference))
            .collect();

        match select(handler, &reference, matches)?.and_then(|r| r.id().map(String::from)) {
            Some(id) => {
                debug!("Resolved {field} '{reference}' to {id}");
                Ok(id)
            }
            None if lenient => {
                warn!("{kind} '{reference}' referenced by {field} does not exist yet");
                Ok(reference)
            }
            None => Err(ResolveError::MissingReference {
                kind: kind.to_string(),
                field: field.to_string(),
                reference,
            }
            .into()),
        }
    }
}

fn name_matches(handler: &dyn ResourceHandler, remote: &RemoteResource, name: &str) -> bool {
    handler
        .schema()
        .name_key
        .is_some_and(|key| remote.get_str(key) == Some(name))
}

fn select(
    handler: &dyn ResourceHandler,
    name: &str,
    mut matches: Vec<RemoteResource>,
) -> Result<Option<RemoteResource>> {
    let schema = handler.schema();
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        count => Err(ResolveError::AmbiguousMatch {
            kind: schema.kind.to_string(),
            key: schema.name_key.unwrap_or(schema.id_key).to_string(),
            value: name.to_string(),
            count,
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeCloud;
    use crate::api::MockApiTransport;
    use crate::error::CloudscaleError;
    use crate::resources::Ensure;
    use serde_json::json;

    fn server(name: &str) -> DesiredState {
        DesiredState::builder(Kind::Server, Ensure::Present, None)
            .string("name", Some(name))
            .build()
    }

    #[tokio::test]
    async fn test_resolve_by_name() {
        let cloud = FakeCloud::new();
        cloud.insert("servers", json!({"uuid": "a", "name": "web1", "zone": {"slug": "lpg1"}}));
        cloud.insert("servers", json!({"uuid": "b", "name": "web2", "zone": {"slug": "lpg1"}}));
        let registry = Registry::builtin();

        let resolver = Resolver::new(&cloud, &registry);
        let found = resolver.resolve(&server("web2")).await.expect("resolve");
        assert_eq!(found.and_then(|r| r.id().map(String::from)), Some(String::from("b")));

        let missing = resolver.resolve(&server("web3")).await.expect("resolve");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_names_are_ambiguous() {
        let cloud = FakeCloud::new();
        cloud.insert("servers", json!({"uuid": "a", "name": "web1"}));
        cloud.insert("servers", json!({"uuid": "b", "name": "web1"}));
        let registry = Registry::builtin();

        let err = Resolver::new(&cloud, &registry)
            .resolve(&server("web1"))
            .await
            .expect_err("should be ambiguous");

        assert!(matches!(
            err,
            CloudscaleError::Resolve(ResolveError::AmbiguousMatch { count: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_scope_narrows_name_lookup() {
        let cloud = FakeCloud::new();
        cloud.insert("volumes", json!({"uuid": "a", "name": "data", "zone": {"slug": "lpg1"}}));
        cloud.insert("volumes", json!({"uuid": "b", "name": "data", "zone": {"slug": "rma1"}}));
        let registry = Registry::builtin();

        let desired = DesiredState::builder(Kind::Volume, Ensure::Present, None)
            .string("name", Some("data"))
            .string("zone", Some("rma1"))
            .build();
        let found = Resolver::new(&cloud, &registry)
            .resolve(&desired)
            .await
            .expect("resolve")
            .expect("found");

        assert_eq!(found.id(), Some("b"));
    }

    #[tokio::test]
    async fn test_resolve_by_id_fetches_directly() {
        let mut api = MockApiTransport::new();
        api.expect_request()
            .withf(|method, path, _| *method == HttpMethod::Get && path == "servers/abc")
            .times(1)
            .returning(|_, _, _| Ok(json!({"uuid": "abc", "name": "web1"})));
        let registry = Registry::builtin();

        let desired = DesiredState::builder(Kind::Server, Ensure::Present, Some("abc")).build();
        let found = Resolver::new(&api, &registry)
            .resolve(&desired)
            .await
            .expect("resolve");

        assert_eq!(found.and_then(|r| r.get_str("name").map(String::from)), Some(String::from("web1")));
    }

    #[tokio::test]
    async fn test_missing_id_is_none() {
        let mut api = MockApiTransport::new();
        api.expect_request().returning(|_, path, _| {
            Err(ApiError::NotFound {
                path: path.to_string(),
            }
            .into())
        });
        let registry = Registry::builtin();

        let desired = DesiredState::builder(Kind::Volume, Ensure::Present, Some("gone")).build();
        let found = Resolver::new(&api, &registry)
            .resolve(&desired)
            .await
            .expect("resolve");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_references_by_name_are_rewritten() {
        let cloud = FakeCloud::new();
        cloud.insert("networks", json!({"uuid": "47cec963-fcd2-482f-bdb6-24461b2d47b1", "name": "private"}));
        let registry = Registry::builtin();
        let resolver = Resolver::new(&cloud, &registry);

        let mut desired = DesiredState::builder(Kind::Subnet, Ensure::Present, None)
            .string("cidr", Some("10.0.0.0/24"))
            .string("network", Some("private"))
            .build();
        resolver
            .resolve_references(&mut desired, false)
            .await
            .expect("references");
        assert_eq!(
            desired.get_str("network"),
            Some("47cec963-fcd2-482f-bdb6-24461b2d47b1")
        );

        let mut orphan = DesiredState::builder(Kind::Subnet, Ensure::Present, None)
            .string("cidr", Some("10.0.1.0/24"))
            .string("network", Some("missing"))
            .build();
        let err = resolver
            .resolve_references(&mut orphan, false)
            .await
            .expect_err("missing reference");
        assert_eq!(err.class(), "missing_reference");

        resolver
            .resolve_references(&mut orphan, true)
            .await
            .expect("lenient");
        assert_eq!(orphan.get_str("network"), Some("missing"));
    }

    #[tokio::test]
    async fn test_uuid_references_skip_lookup() {
        let api = MockApiTransport::new();
        let registry = Registry::builtin();

        let mut desired = DesiredState::builder(Kind::Volume, Ensure::Present, None)
            .string("name", Some("data"))
            .strings(
                "servers",
                Some(&[String::from("47cec963-fcd2-482f-bdb6-24461b2d47b1")]),
            )
            .build();

        Resolver::new(&api, &registry)
            .resolve_references(&mut desired, false)
            .await
            .expect("no calls needed");
    }

    #[test]
    fn test_list_rejects_non_list_response() {
        let mut api = MockApiTransport::new();
        api.expect_request()
            .returning(|_, _, _| Ok(json!({"detail": "not a list"})));
        let registry = Registry::builtin();
        let resolver = Resolver::new(&api, &registry);
        let handler = tokio_test::assert_ok!(registry.handler(Kind::Network));

        let err = tokio_test::assert_err!(tokio_test::block_on(resolver.list(handler)));
        assert!(matches!(
            err,
            CloudscaleError::Api(ApiError::InvalidResponse { .. })
        ));
    }
}
