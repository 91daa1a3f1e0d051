//! Load balancer pools.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;

use super::schema::{Comparison, FieldSpec, Kind, KindSchema};
use super::{
    parse_params, require_choice, require_identity, require_plain_state, require_uuid,
    DesiredState, Ensure, ResourceHandler, ResourceSpec,
};

/// Load balancer pool schema.
pub static SCHEMA: KindSchema = KindSchema {
    kind: Kind::LoadBalancerPool,
    path: "load-balancers/pools",
    id_key: "uuid",
    name_key: Some("name"),
    uuid_ids: true,
    fields: &[
        FieldSpec::updatable("name", Comparison::Exact),
        FieldSpec::updatable("tags", Comparison::Map),
        FieldSpec::scope("load_balancer").referencing(Kind::LoadBalancer),
        FieldSpec::create_only("algorithm", Comparison::Exact),
        FieldSpec::create_only("protocol", Comparison::Exact),
    ],
    required_for_create: &["name", "load_balancer", "algorithm", "protocol"],
    secret_fields: &[],
};

/// Balancing algorithms.
const ALGORITHMS: &[&str] = &["round_robin", "least_connections", "source_ip"];

/// Pool protocols.
const PROTOCOLS: &[&str] = &["tcp", "proxy", "proxyv2"];

/// Desired state of a load balancer pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadBalancerPoolSpec {
    /// Target state.
    #[serde(default)]
    pub state: Ensure,
    /// Pool UUID.
    pub uuid: Option<String>,
    /// Pool name.
    pub name: Option<String>,
    /// Parent load balancer (UUID or name).
    pub load_balancer: Option<String>,
    /// Balancing algorithm.
    pub algorithm: Option<String>,
    /// Protocol towards the members.
    pub protocol: Option<String>,
    /// Tags.
    pub tags: Option<BTreeMap<String, String>>,
}

impl LoadBalancerPoolSpec {
    /// Validates the desired state.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        require_plain_state(Kind::LoadBalancerPool, self.state)?;
        require_identity(
            Kind::LoadBalancerPool,
            self.uuid.is_some() || self.name.is_some(),
            "uuid, name",
        )?;
        require_uuid("uuid", self.uuid.as_deref())?;
        require_choice("algorithm", self.algorithm.as_deref(), ALGORITHMS)?;
        require_choice("protocol", self.protocol.as_deref(), PROTOCOLS)
    }

    /// Converts to the kind-independent form.
    #[must_use]
    pub fn desired_state(&self) -> DesiredState {
        DesiredState::builder(Kind::LoadBalancerPool, self.state, self.uuid.as_deref())
            .string("name", self.name.as_deref())
            .tags(self.tags.as_ref())
            .string("load_balancer", self.load_balancer.as_deref())
            .string("algorithm", self.algorithm.as_deref())
            .string("protocol", self.protocol.as_deref())
            .build()
    }
}

/// Handler for load balancer pools.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadBalancerPoolHandler;

impl ResourceHandler for LoadBalancerPoolHandler {
    fn schema(&self) -> &'static KindSchema {
        &SCHEMA
    }

    fn parse(&self, params: Value) -> Result<ResourceSpec> {
        let spec: LoadBalancerPoolSpec = parse_params(Kind::LoadBalancerPool, params)?;
        spec.validate()?;
        Ok(ResourceSpec::LoadBalancerPool(spec))
    }
}
