//! Explicit registry of resource kinds.
//!
//! The registry is built once at start-up and passed to whoever needs it;
//! there is no global lookup.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ConfigError, Result};

use super::floating_ip::FloatingIpHandler;
use super::load_balancer::LoadBalancerHandler;
use super::load_balancer_listener::LoadBalancerListenerHandler;
use super::load_balancer_pool::LoadBalancerPoolHandler;
use super::network::NetworkHandler;
use super::objects_user::ObjectsUserHandler;
use super::server::ServerHandler;
use super::server_group::ServerGroupHandler;
use super::subnet::SubnetHandler;
use super::volume::VolumeHandler;
use super::{Kind, ResourceHandler, ResourceSpec};

/// Mapping from kind to its handler.
pub struct Registry {
    handlers: BTreeMap<Kind, Box<dyn ResourceHandler>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Creates a registry with every built-in kind.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ServerHandler));
        registry.register(Box::new(ServerGroupHandler));
        registry.register(Box::new(VolumeHandler));
        registry.register(Box::new(NetworkHandler));
        registry.register(Box::new(SubnetHandler));
        registry.register(Box::new(FloatingIpHandler));
        registry.register(Box::new(ObjectsUserHandler));
        registry.register(Box::new(LoadBalancerHandler));
        registry.register(Box::new(LoadBalancerPoolHandler));
        registry.register(Box::new(LoadBalancerListenerHandler));
        registry
    }

    /// Registers a handler under its schema's kind, replacing any previous one.
    pub fn register(&mut self, handler: Box<dyn ResourceHandler>) {
        self.handlers.insert(handler.schema().kind, handler);
    }

    /// Returns the handler of a kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind is not registered.
    pub fn handler(&self, kind: Kind) -> Result<&dyn ResourceHandler> {
        self.handlers
            .get(&kind)
            .map(|handler| &**handler)
            .ok_or_else(|| {
                ConfigError::UnknownKind {
                    kind: kind.to_string(),
                }
                .into()
            })
    }

    /// Returns the registered kinds in order.
    pub fn kinds(&self) -> impl Iterator<Item = Kind> + '_ {
        self.handlers.keys().copied()
    }

    /// Parses parameters for a kind given by its tag.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown kinds or invalid parameters.
    pub fn parse_kind(&self, tag: &str, params: Value) -> Result<ResourceSpec> {
        let kind = Kind::from_tag(tag).ok_or_else(|| ConfigError::UnknownKind {
            kind: tag.to_string(),
        })?;
        self.handler(kind)?.parse(params)
    }

    /// Parses a manifest entry tagged with `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is not a mapping, has no `kind`, or
    /// fails validation.
    pub fn parse(&self, entry: Value) -> Result<ResourceSpec> {
        let Value::Object(mut map) = entry else {
            return Err(ConfigError::validation_general("resource entry must be a mapping").into());
        };

        let tag = match map.remove("kind") {
            Some(Value::String(tag)) => tag,
            Some(_) => {
                return Err(ConfigError::validation("kind must be a string", "kind").into());
            }
            None => {
                return Err(ConfigError::validation("resource entry has no kind", "kind").into());
            }
        };

        self.parse_kind(&tag, Value::Object(map))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_registers_every_kind() {
        let registry = Registry::builtin();
        let kinds: Vec<Kind> = registry.kinds().collect();
        assert_eq!(kinds, Kind::ALL.to_vec());
    }

    #[test]
    fn test_parse_tagged_entry() {
        let registry = Registry::builtin();
        let spec = registry
            .parse(json!({"kind": "volume", "name": "data", "size_gb": 50}))
            .expect("valid");
        assert_eq!(spec.kind(), Kind::Volume);
    }

    #[test]
    fn test_unknown_kind_and_missing_tag() {
        let registry = Registry::builtin();

        let err = registry
            .parse(json!({"kind": "bucket", "name": "data"}))
            .expect_err("should fail");
        assert!(err.to_string().contains("bucket"));

        assert!(registry.parse(json!({"name": "data"})).is_err());
        assert!(registry.parse(json!(["volume"])).is_err());
        assert!(Registry::new().handler(Kind::Server).is_err());
    }
}
