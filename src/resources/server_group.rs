//! Server groups.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;

use super::schema::{Comparison, FieldSpec, Kind, KindSchema};
use super::{
    parse_params, require_choice, require_identity, require_plain_state, require_uuid,
    DesiredState, Ensure, ResourceHandler, ResourceSpec,
};

/// Server group schema.
pub static SCHEMA: KindSchema = KindSchema {
    kind: Kind::ServerGroup,
    path: "server-groups",
    id_key: "uuid",
    name_key: Some("name"),
    uuid_ids: true,
    fields: &[
        FieldSpec::updatable("name", Comparison::Exact),
        FieldSpec::updatable("tags", Comparison::Map),
        FieldSpec::create_only("type", Comparison::Exact),
        FieldSpec::scope("zone"),
    ],
    required_for_create: &["name", "type"],
    secret_fields: &[],
};

/// Desired state of a server group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerGroupSpec {
    /// Target state.
    #[serde(default)]
    pub state: Ensure,
    /// Server group UUID.
    pub uuid: Option<String>,
    /// Server group name.
    pub name: Option<String>,
    /// Group type.
    #[serde(rename = "type", default = "default_type")]
    pub group_type: String,
    /// Zone slug.
    pub zone: Option<String>,
    /// Tags.
    pub tags: Option<BTreeMap<String, String>>,
}

fn default_type() -> String {
    String::from("anti-affinity")
}

impl ServerGroupSpec {
    /// Validates the desired state.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        require_plain_state(Kind::ServerGroup, self.state)?;
        require_identity(
            Kind::ServerGroup,
            self.uuid.is_some() || self.name.is_some(),
            "uuid, name",
        )?;
        require_uuid("uuid", self.uuid.as_deref())?;
        require_choice("type", Some(self.group_type.as_str()), &["anti-affinity"])
    }

    /// Converts to the kind-independent form.
    #[must_use]
    pub fn desired_state(&self) -> DesiredState {
        DesiredState::builder(Kind::ServerGroup, self.state, self.uuid.as_deref())
            .string("name", self.name.as_deref())
            .tags(self.tags.as_ref())
            .string("type", Some(self.group_type.as_str()))
            .string("zone", self.zone.as_deref())
            .build()
    }
}

/// Handler for server groups.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerGroupHandler;

impl ResourceHandler for ServerGroupHandler {
    fn schema(&self) -> &'static KindSchema {
        &SCHEMA
    }

    fn parse(&self, params: Value) -> Result<ResourceSpec> {
        let spec: ServerGroupSpec = parse_params(Kind::ServerGroup, params)?;
        spec.validate()?;
        Ok(ResourceSpec::ServerGroup(spec))
    }
}
