//! Private networks.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ConfigError, Result};

use super::schema::{Comparison, FieldSpec, Kind, KindSchema};
use super::{
    parse_params, require_identity, require_plain_state, require_uuid, DesiredState, Ensure,
    ResourceHandler, ResourceSpec,
};

/// Network schema.
pub static SCHEMA: KindSchema = KindSchema {
    kind: Kind::Network,
    path: "networks",
    id_key: "uuid",
    name_key: Some("name"),
    uuid_ids: true,
    fields: &[
        FieldSpec::updatable("name", Comparison::Exact),
        FieldSpec::updatable("mtu", Comparison::Numeric),
        FieldSpec::updatable("tags", Comparison::Map),
        FieldSpec::scope("zone"),
        FieldSpec::create_only("auto_create_ipv4_subnet", Comparison::Exact),
    ],
    required_for_create: &["name"],
    secret_fields: &[],
};

/// Desired state of a network.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkSpec {
    /// Target state.
    #[serde(default)]
    pub state: Ensure,
    /// Network UUID.
    pub uuid: Option<String>,
    /// Network name.
    pub name: Option<String>,
    /// MTU of the network.
    pub mtu: Option<u32>,
    /// Zone slug.
    pub zone: Option<String>,
    /// Create a default IPv4 subnet.
    pub auto_create_ipv4_subnet: Option<bool>,
    /// Tags.
    pub tags: Option<BTreeMap<String, String>>,
}

impl NetworkSpec {
    /// Validates the desired state.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        require_plain_state(Kind::Network, self.state)?;
        require_identity(Kind::Network, self.uuid.is_some() || self.name.is_some(), "uuid, name")?;
        require_uuid("uuid", self.uuid.as_deref())?;

        if let Some(mtu) = self.mtu
            && !(1280..=9000).contains(&mtu)
        {
            return Err(ConfigError::validation(
                format!("mtu must be between 1280 and 9000, got: {mtu}"),
                "mtu",
            )
            .into());
        }
        Ok(())
    }

    /// Converts to the kind-independent form.
    #[must_use]
    pub fn desired_state(&self) -> DesiredState {
        DesiredState::builder(Kind::Network, self.state, self.uuid.as_deref())
            .string("name", self.name.as_deref())
            .value("mtu", self.mtu)
            .tags(self.tags.as_ref())
            .string("zone", self.zone.as_deref())
            .value("auto_create_ipv4_subnet", self.auto_create_ipv4_subnet)
            .build()
    }
}

/// Handler for networks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkHandler;

impl ResourceHandler for NetworkHandler {
    fn schema(&self) -> &'static KindSchema {
        &SCHEMA
    }

    fn parse(&self, params: Value) -> Result<ResourceSpec> {
        let spec: NetworkSpec = parse_params(Kind::Network, params)?;
        spec.validate()?;
        Ok(ResourceSpec::Network(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mtu_bounds() {
        assert!(NetworkHandler.parse(json!({"name": "private", "mtu": 9000})).is_ok());
        let err = NetworkHandler
            .parse(json!({"name": "private", "mtu": 100}))
            .expect_err("should fail");
        assert!(err.to_string().contains("mtu"));
    }

    #[test]
    fn test_create_body() {
        let spec = NetworkHandler
            .parse(json!({"name": "private", "zone": "lpg1", "auto_create_ipv4_subnet": false}))
            .expect("valid");
        let desired = spec.desired_state().expect("desired");
        let body = NetworkHandler.create_body(&desired).expect("body");
        assert_eq!(
            body,
            json!({"name": "private", "zone": "lpg1", "auto_create_ipv4_subnet": false})
        );
    }
}
