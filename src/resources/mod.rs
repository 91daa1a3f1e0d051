//! Resource kinds and their desired-state models.
//!
//! Each kind is a closed record type validated at the boundary. Once
//! validated it is converted into a kind-independent [`DesiredState`] that
//! the shared pipeline works on.

mod desired;
mod handler;
mod registry;
mod remote;
mod schema;

pub mod floating_ip;
pub mod load_balancer;
pub mod load_balancer_listener;
pub mod load_balancer_pool;
pub mod network;
pub mod objects_user;
pub mod server;
pub mod server_group;
pub mod subnet;
pub mod volume;

pub use desired::{DesiredAttribute, DesiredBuilder, DesiredState, Ensure};
pub use handler::{create_body, normalize_references, patch_step, ResourceHandler};
pub use registry::Registry;
pub use remote::RemoteResource;
pub use schema::{Comparison, FieldMode, FieldSpec, Kind, KindSchema, READ_ONLY_FIELDS};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ConfigError, Result};

/// A validated desired state for one resource, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSpec {
    /// A server.
    Server(server::ServerSpec),
    /// A server group.
    ServerGroup(server_group::ServerGroupSpec),
    /// A volume.
    Volume(volume::VolumeSpec),
    /// A network.
    Network(network::NetworkSpec),
    /// A subnet.
    Subnet(subnet::SubnetSpec),
    /// A floating IP.
    FloatingIp(floating_ip::FloatingIpSpec),
    /// An objects user.
    ObjectsUser(objects_user::ObjectsUserSpec),
    /// A load balancer.
    LoadBalancer(load_balancer::LoadBalancerSpec),
    /// A load balancer pool.
    LoadBalancerPool(load_balancer_pool::LoadBalancerPoolSpec),
    /// A load balancer listener.
    LoadBalancerListener(load_balancer_listener::LoadBalancerListenerSpec),
}

impl ResourceSpec {
    /// Returns the kind.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match self {
            Self::Server(_) => Kind::Server,
            Self::ServerGroup(_) => Kind::ServerGroup,
            Self::Volume(_) => Kind::Volume,
            Self::Network(_) => Kind::Network,
            Self::Subnet(_) => Kind::Subnet,
            Self::FloatingIp(_) => Kind::FloatingIp,
            Self::ObjectsUser(_) => Kind::ObjectsUser,
            Self::LoadBalancer(_) => Kind::LoadBalancer,
            Self::LoadBalancerPool(_) => Kind::LoadBalancerPool,
            Self::LoadBalancerListener(_) => Kind::LoadBalancerListener,
        }
    }

    /// Validates the desired state.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Server(spec) => spec.validate(),
            Self::ServerGroup(spec) => spec.validate(),
            Self::Volume(spec) => spec.validate(),
            Self::Network(spec) => spec.validate(),
            Self::Subnet(spec) => spec.validate(),
            Self::FloatingIp(spec) => spec.validate(),
            Self::ObjectsUser(spec) => spec.validate(),
            Self::LoadBalancer(spec) => spec.validate(),
            Self::LoadBalancerPool(spec) => spec.validate(),
            Self::LoadBalancerListener(spec) => spec.validate(),
        }
    }

    /// Converts to the kind-independent form.
    ///
    /// # Errors
    ///
    /// Returns an error if a structured field cannot be serialized.
    pub fn desired_state(&self) -> Result<DesiredState> {
        match self {
            Self::Server(spec) => spec.desired_state(),
            Self::ServerGroup(spec) => Ok(spec.desired_state()),
            Self::Volume(spec) => Ok(spec.desired_state()),
            Self::Network(spec) => Ok(spec.desired_state()),
            Self::Subnet(spec) => Ok(spec.desired_state()),
            Self::FloatingIp(spec) => Ok(spec.desired_state()),
            Self::ObjectsUser(spec) => Ok(spec.desired_state()),
            Self::LoadBalancer(spec) => spec.desired_state(),
            Self::LoadBalancerPool(spec) => Ok(spec.desired_state()),
            Self::LoadBalancerListener(spec) => Ok(spec.desired_state()),
        }
    }
}

/// Returns the static schema of a kind.
#[must_use]
pub fn schema_of(kind: Kind) -> &'static KindSchema {
    match kind {
        Kind::Server => &server::SCHEMA,
        Kind::ServerGroup => &server_group::SCHEMA,
        Kind::Volume => &volume::SCHEMA,
        Kind::Network => &network::SCHEMA,
        Kind::Subnet => &subnet::SCHEMA,
        Kind::FloatingIp => &floating_ip::SCHEMA,
        Kind::ObjectsUser => &objects_user::SCHEMA,
        Kind::LoadBalancer => &load_balancer::SCHEMA,
        Kind::LoadBalancerPool => &load_balancer_pool::SCHEMA,
        Kind::LoadBalancerListener => &load_balancer_listener::SCHEMA,
    }
}

/// Returns true if the value looks like a UUID.
#[must_use]
pub fn is_uuid(value: &str) -> bool {
    uuid::Uuid::parse_str(value).is_ok()
}

/// Deserializes kind parameters, rejecting unknown keys.
pub(crate) fn parse_params<T: DeserializeOwned>(kind: Kind, params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| {
        ConfigError::ValidationError {
            message: format!("Invalid {kind} parameters: {e}"),
            field: None,
        }
        .into()
    })
}

/// Fails unless at least one identifying key is set.
pub(crate) fn require_identity(kind: Kind, present: bool, keys: &str) -> Result<()> {
    if present {
        Ok(())
    } else {
        Err(ConfigError::validation(
            format!("{kind} needs one of {keys} to be identified"),
            keys,
        )
        .into())
    }
}

/// Fails if the value is set and is not a UUID.
pub(crate) fn require_uuid(field: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if !is_uuid(v) => Err(ConfigError::validation(
            format!("'{v}' is not a valid UUID"),
            field,
        )
        .into()),
        _ => Ok(()),
    }
}

/// Fails if the value is set and not one of the allowed choices.
pub(crate) fn require_choice(field: &str, value: Option<&str>, choices: &[&str]) -> Result<()> {
    match value {
        Some(v) if !choices.contains(&v) => Err(ConfigError::validation(
            format!("value of {field} must be one of: {}, got: {v}", choices.join(", ")),
            field,
        )
        .into()),
        _ => Ok(()),
    }
}

/// Fails if a lifecycle state other than present/absent is requested.
pub(crate) fn require_plain_state(kind: Kind, ensure: Ensure) -> Result<()> {
    if ensure.status().is_some() {
        return Err(ConfigError::validation(
            format!("{kind} supports only state present or absent, got: {ensure}"),
            "state",
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_kind_has_a_schema() {
        for kind in Kind::ALL {
            let schema = schema_of(kind);
            assert_eq!(schema.kind, kind);
            for required in schema.required_for_create {
                assert!(
                    schema.field(required).is_some(),
                    "{kind}: required field {required} is not in the schema"
                );
            }
        }
    }

    #[test]
    fn test_uuid_detection() {
        assert!(is_uuid("47cec963-fcd2-482f-bdb6-24461b2d47b1"));
        assert!(!is_uuid("web1"));
        assert!(require_uuid("uuid", Some("web1")).is_err());
        assert!(require_uuid("uuid", None).is_ok());
    }

    #[test]
    fn test_choice_validation() {
        assert!(require_choice("type", Some("ssd"), &["ssd", "bulk"]).is_ok());
        let err = require_choice("type", Some("hdd"), &["ssd", "bulk"]).expect_err("should fail");
        assert!(err.to_string().contains("ssd, bulk"));
    }

    #[test]
    fn test_plain_state() {
        assert!(require_plain_state(Kind::Volume, Ensure::Absent).is_ok());
        assert!(require_plain_state(Kind::Volume, Ensure::Running).is_err());
    }

    #[test]
    fn test_spec_kind_and_desired_state() {
        let spec: volume::VolumeSpec =
            parse_params(Kind::Volume, json!({"name": "data", "size_gb": 50})).expect("parse");
        let spec = ResourceSpec::Volume(spec);
        assert_eq!(spec.kind(), Kind::Volume);
        assert!(spec.validate().is_ok());

        let desired = spec.desired_state().expect("desired");
        assert_eq!(desired.lookup_name(), Some("data"));
    }
}
