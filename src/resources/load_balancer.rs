//! Load balancers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;

use super::schema::{Comparison, FieldSpec, Kind, KindSchema};
use super::{
    parse_params, require_identity, require_plain_state, require_uuid, DesiredState, Ensure,
    ResourceHandler, ResourceSpec,
};

/// Load balancer schema.
pub static SCHEMA: KindSchema = KindSchema {
    kind: Kind::LoadBalancer,
    path: "load-balancers",
    id_key: "uuid",
    name_key: Some("name"),
    uuid_ids: true,
    fields: &[
        FieldSpec::updatable("name", Comparison::Exact),
        FieldSpec::updatable("tags", Comparison::Map),
        FieldSpec::create_only("flavor", Comparison::Exact),
        FieldSpec::scope("zone"),
        FieldSpec::create_only("vip_addresses", Comparison::Ordered),
    ],
    required_for_create: &["name", "flavor"],
    secret_fields: &[],
};

/// Desired state of a load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadBalancerSpec {
    /// Target state.
    #[serde(default)]
    pub state: Ensure,
    /// Load balancer UUID.
    pub uuid: Option<String>,
    /// Load balancer name.
    pub name: Option<String>,
    /// Flavor slug (e.g. `lb-standard`).
    pub flavor: Option<String>,
    /// Zone slug.
    pub zone: Option<String>,
    /// Virtual IP addresses; a public address is assigned when omitted.
    pub vip_addresses: Option<Vec<VipAddress>>,
    /// Tags.
    pub tags: Option<BTreeMap<String, String>>,
}

/// A requested virtual IP address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VipAddress {
    /// Subnet UUID.
    pub subnet: String,
    /// Address inside the subnet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl LoadBalancerSpec {
    /// Validates the desired state.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        require_plain_state(Kind::LoadBalancer, self.state)?;
        require_identity(
            Kind::LoadBalancer,
            self.uuid.is_some() || self.name.is_some(),
            "uuid, name",
        )?;
        require_uuid("uuid", self.uuid.as_deref())?;
        for vip in self.vip_addresses.iter().flatten() {
            require_uuid("vip_addresses.subnet", Some(vip.subnet.as_str()))?;
        }
        Ok(())
    }

    /// Converts to the kind-independent form.
    ///
    /// # Errors
    ///
    /// Returns an error if the VIP addresses cannot be serialized.
    pub fn desired_state(&self) -> Result<DesiredState> {
        Ok(DesiredState::builder(Kind::LoadBalancer, self.state, self.uuid.as_deref())
            .string("name", self.name.as_deref())
            .tags(self.tags.as_ref())
            .string("flavor", self.flavor.as_deref())
            .string("zone", self.zone.as_deref())
            .serialized("vip_addresses", self.vip_addresses.as_ref())?
            .build())
    }
}

/// Handler for load balancers.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadBalancerHandler;

impl ResourceHandler for LoadBalancerHandler {
    fn schema(&self) -> &'static KindSchema {
        &SCHEMA
    }

    fn parse(&self, params: Value) -> Result<ResourceSpec> {
        let spec: LoadBalancerSpec = parse_params(Kind::LoadBalancer, params)?;
        spec.validate()?;
        Ok(ResourceSpec::LoadBalancer(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vip_addresses_in_create_body() {
        let spec = LoadBalancerHandler
            .parse(json!({
                "name": "lb1",
                "flavor": "lb-standard",
                "vip_addresses": [{"subnet": "47cec963-fcd2-482f-bdb6-24461b2d47b1"}],
            }))
            .expect("valid");
        let desired = spec.desired_state().expect("desired");
        let body = LoadBalancerHandler.create_body(&desired).expect("body");

        assert_eq!(
            body["vip_addresses"],
            json!([{"subnet": "47cec963-fcd2-482f-bdb6-24461b2d47b1"}])
        );
    }

    #[test]
    fn test_vip_subnet_must_be_uuid() {
        assert!(LoadBalancerHandler
            .parse(json!({"name": "lb1", "vip_addresses": [{"subnet": "private"}]}))
            .is_err());
    }
}
