//! Load balancer listeners.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ConfigError, Result};

use super::schema::{Comparison, FieldSpec, Kind, KindSchema};
use super::{
    parse_params, require_choice, require_identity, require_plain_state, require_uuid,
    DesiredState, Ensure, ResourceHandler, ResourceSpec,
};

/// Load balancer listener schema.
pub static SCHEMA: KindSchema = KindSchema {
    kind: Kind::LoadBalancerListener,
    path: "load-balancers/listeners",
    id_key: "uuid",
    name_key: Some("name"),
    uuid_ids: true,
    fields: &[
        FieldSpec::updatable("name", Comparison::Exact),
        FieldSpec::updatable("protocol_port", Comparison::Numeric),
        FieldSpec::updatable("allowed_cidrs", Comparison::Set),
        FieldSpec::updatable("timeout_client_data_ms", Comparison::Numeric),
        FieldSpec::updatable("timeout_member_connect_ms", Comparison::Numeric),
        FieldSpec::updatable("timeout_member_data_ms", Comparison::Numeric),
        FieldSpec::updatable("tags", Comparison::Map),
        FieldSpec::scope("pool").referencing(Kind::LoadBalancerPool),
        FieldSpec::create_only("protocol", Comparison::Exact),
    ],
    required_for_create: &["name", "pool", "protocol", "protocol_port"],
    secret_fields: &[],
};

/// Desired state of a load balancer listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadBalancerListenerSpec {
    /// Target state.
    #[serde(default)]
    pub state: Ensure,
    /// Listener UUID.
    pub uuid: Option<String>,
    /// Listener name.
    pub name: Option<String>,
    /// Pool traffic is forwarded to (UUID or name).
    pub pool: Option<String>,
    /// Listener protocol.
    pub protocol: Option<String>,
    /// Listening port.
    pub protocol_port: Option<u16>,
    /// Source ranges allowed to connect; empty allows all.
    pub allowed_cidrs: Option<Vec<String>>,
    /// Client inactivity timeout.
    pub timeout_client_data_ms: Option<u32>,
    /// Member connect timeout.
    pub timeout_member_connect_ms: Option<u32>,
    /// Member inactivity timeout.
    pub timeout_member_data_ms: Option<u32>,
    /// Tags.
    pub tags: Option<BTreeMap<String, String>>,
}

impl LoadBalancerListenerSpec {
    /// Validates the desired state.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        require_plain_state(Kind::LoadBalancerListener, self.state)?;
        require_identity(
            Kind::LoadBalancerListener,
            self.uuid.is_some() || self.name.is_some(),
            "uuid, name",
        )?;
        require_uuid("uuid", self.uuid.as_deref())?;
        require_choice("protocol", self.protocol.as_deref(), &["tcp"])?;

        if self.protocol_port == Some(0) {
            return Err(
                ConfigError::validation("protocol_port must be between 1 and 65535", "protocol_port")
                    .into(),
            );
        }
        if let Some(bad) = self
            .allowed_cidrs
            .iter()
            .flatten()
            .find(|cidr| !cidr.contains('/'))
        {
            return Err(ConfigError::validation(
                format!("'{bad}' is not in CIDR notation"),
                "allowed_cidrs",
            )
            .into());
        }
        Ok(())
    }

    /// Converts to the kind-independent form.
    #[must_use]
    pub fn desired_state(&self) -> DesiredState {
        DesiredState::builder(Kind::LoadBalancerListener, self.state, self.uuid.as_deref())
            .string("name", self.name.as_deref())
            .value("protocol_port", self.protocol_port)
            .strings("allowed_cidrs", self.allowed_cidrs.as_deref())
            .value("timeout_client_data_ms", self.timeout_client_data_ms)
            .value("timeout_member_connect_ms", self.timeout_member_connect_ms)
            .value("timeout_member_data_ms", self.timeout_member_data_ms)
            .tags(self.tags.as_ref())
            .string("pool", self.pool.as_deref())
            .string("protocol", self.protocol.as_deref())
            .build()
    }
}

/// Handler for load balancer listeners.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadBalancerListenerHandler;

impl ResourceHandler for LoadBalancerListenerHandler {
    fn schema(&self) -> &'static KindSchema {
        &SCHEMA
    }

    fn parse(&self, params: Value) -> Result<ResourceSpec> {
        let spec: LoadBalancerListenerSpec = parse_params(Kind::LoadBalancerListener, params)?;
        spec.validate()?;
        Ok(ResourceSpec::LoadBalancerListener(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::DiffEngine;
    use serde_json::json;

    #[test]
    fn test_allowed_cidrs_compare_as_set() {
        let spec = LoadBalancerListenerHandler
            .parse(json!({
                "name": "https",
                "protocol_port": 443,
                "allowed_cidrs": ["10.0.0.0/8", "192.0.2.0/24"],
            }))
            .expect("valid");
        let desired = spec.desired_state().expect("desired");
        let remote = LoadBalancerListenerHandler
            .remote(json!({
                "uuid": "l1",
                "name": "https",
                "protocol_port": 443,
                "allowed_cidrs": ["192.0.2.0/24", "10.0.0.0/8"],
                "pool": {"uuid": "p1", "name": "web"},
            }))
            .expect("remote");

        assert!(DiffEngine::new().diff(&desired, &remote).is_empty());
        assert_eq!(remote.get_str("pool"), Some("p1"));
    }

    #[test]
    fn test_validation() {
        assert!(LoadBalancerListenerHandler
            .parse(json!({"name": "https", "protocol_port": 0}))
            .is_err());
        assert!(LoadBalancerListenerHandler
            .parse(json!({"name": "https", "allowed_cidrs": ["10.0.0.1"]}))
            .is_err());
        assert!(LoadBalancerListenerHandler
            .parse(json!({"name": "https", "protocol": "udp"}))
            .is_err());
    }
}
