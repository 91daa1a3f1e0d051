//! Subnets of private networks.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::error::{ConfigError, Result};

use super::schema::{Comparison, FieldSpec, Kind, KindSchema};
use super::{
    parse_params, require_identity, require_plain_state, require_uuid, DesiredState, Ensure,
    ResourceHandler, ResourceSpec,
};

/// Subnet schema.
pub static SCHEMA: KindSchema = KindSchema {
    kind: Kind::Subnet,
    path: "subnets",
    id_key: "uuid",
    name_key: Some("cidr"),
    uuid_ids: true,
    fields: &[
        FieldSpec::create_only("cidr", Comparison::Exact),
        FieldSpec::scope("network").referencing(Kind::Network),
        FieldSpec::updatable("gateway_address", Comparison::Exact),
        FieldSpec::updatable("dns_servers", Comparison::Ordered),
        FieldSpec::updatable("tags", Comparison::Map),
    ],
    required_for_create: &["cidr", "network"],
    secret_fields: &[],
};

/// Desired state of a subnet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubnetSpec {
    /// Target state.
    #[serde(default)]
    pub state: Ensure,
    /// Subnet UUID.
    pub uuid: Option<String>,
    /// Address range in CIDR notation.
    pub cidr: Option<String>,
    /// Parent network (UUID or name).
    pub network: Option<String>,
    /// Gateway address.
    pub gateway_address: Option<String>,
    /// DNS servers, in order of preference.
    pub dns_servers: Option<Vec<String>>,
    /// Tags.
    pub tags: Option<BTreeMap<String, String>>,
}

impl SubnetSpec {
    /// Validates the desired state.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        require_plain_state(Kind::Subnet, self.state)?;
        require_identity(Kind::Subnet, self.uuid.is_some() || self.cidr.is_some(), "uuid, cidr")?;
        require_uuid("uuid", self.uuid.as_deref())?;

        if let Some(cidr) = &self.cidr
            && !is_cidr(cidr)
        {
            return Err(ConfigError::validation(format!("'{cidr}' is not a valid CIDR"), "cidr").into());
        }
        if let Some(gateway) = &self.gateway_address
            && gateway.parse::<IpAddr>().is_err()
        {
            return Err(ConfigError::validation(
                format!("'{gateway}' is not a valid IP address"),
                "gateway_address",
            )
            .into());
        }
        if let Some(bad) = self
            .dns_servers
            .iter()
            .flatten()
            .find(|s| s.parse::<IpAddr>().is_err())
        {
            return Err(ConfigError::validation(
                format!("'{bad}' is not a valid IP address"),
                "dns_servers",
            )
            .into());
        }
        Ok(())
    }

    /// Converts to the kind-independent form.
    #[must_use]
    pub fn desired_state(&self) -> DesiredState {
        DesiredState::builder(Kind::Subnet, self.state, self.uuid.as_deref())
            .string("cidr", self.cidr.as_deref())
            .string("network", self.network.as_deref())
            .string("gateway_address", self.gateway_address.as_deref())
            .strings("dns_servers", self.dns_servers.as_deref())
            .tags(self.tags.as_ref())
            .build()
    }
}

/// Returns true for `address/prefix` with a prefix valid for the family.
fn is_cidr(value: &str) -> bool {
    let Some((address, prefix)) = value.split_once('/') else {
        return false;
    };
    let Ok(prefix) = prefix.parse::<u8>() else {
        return false;
    };
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => prefix <= 32,
        Ok(IpAddr::V6(_)) => prefix <= 128,
        Err(_) => false,
    }
}

/// Handler for subnets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubnetHandler;

impl ResourceHandler for SubnetHandler {
    fn schema(&self) -> &'static KindSchema {
        &SCHEMA
    }

    fn parse(&self, params: Value) -> Result<ResourceSpec> {
        let spec: SubnetSpec = parse_params(Kind::Subnet, params)?;
        spec.validate()?;
        Ok(ResourceSpec::Subnet(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cidr_validation() {
        assert!(is_cidr("172.16.0.0/24"));
        assert!(is_cidr("2001:db8::/64"));
        assert!(!is_cidr("172.16.0.0"));
        assert!(!is_cidr("172.16.0.0/33"));
        assert!(SubnetHandler
            .parse(json!({"cidr": "10.0.0.0/8", "network": "private"}))
            .is_ok());
        assert!(SubnetHandler
            .parse(json!({"cidr": "10.0.0.0/8", "dns_servers": ["8.8.8.8", "nope"]}))
            .is_err());
    }

    #[test]
    fn test_network_is_a_scope_reference() {
        let field = SCHEMA.field("network").expect("field");
        assert_eq!(field.references, Some(Kind::Network));
        assert!(!field.is_compared());

        let remote = SubnetHandler
            .remote(json!({
                "uuid": "sn1",
                "cidr": "10.0.0.0/24",
                "network": {"uuid": "n1", "name": "private"},
                "dns_servers": ["1.1.1.1"],
            }))
            .expect("remote");
        assert_eq!(remote.get_str("network"), Some("n1"));
    }
}
