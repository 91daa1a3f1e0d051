//! Volumes.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ConfigError, Result};

use super::schema::{Comparison, FieldSpec, Kind, KindSchema};
use super::{
    parse_params, require_choice, require_identity, require_plain_state, require_uuid,
    DesiredState, Ensure, ResourceHandler, ResourceSpec,
};

/// Volume schema.
pub static SCHEMA: KindSchema = KindSchema {
    kind: Kind::Volume,
    path: "volumes",
    id_key: "uuid",
    name_key: Some("name"),
    uuid_ids: true,
    fields: &[
        FieldSpec::updatable("name", Comparison::Exact),
        FieldSpec::updatable("size_gb", Comparison::Numeric),
        FieldSpec::updatable("servers", Comparison::Set)
            .sent_as("server_uuids")
            .referencing(Kind::Server),
        FieldSpec::updatable("tags", Comparison::Map),
        FieldSpec::create_only("type", Comparison::Exact),
        FieldSpec::scope("zone"),
    ],
    required_for_create: &["name", "size_gb"],
    secret_fields: &[],
};

/// Desired state of a volume.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeSpec {
    /// Target state.
    #[serde(default)]
    pub state: Ensure,
    /// Volume UUID.
    pub uuid: Option<String>,
    /// Volume name.
    pub name: Option<String>,
    /// Size in GB.
    pub size_gb: Option<u32>,
    /// Storage type.
    #[serde(rename = "type")]
    pub volume_type: Option<String>,
    /// Zone slug.
    pub zone: Option<String>,
    /// Attached servers (UUIDs or names).
    #[serde(alias = "server_uuids")]
    pub servers: Option<Vec<String>>,
    /// Tags.
    pub tags: Option<BTreeMap<String, String>>,
}

impl VolumeSpec {
    /// Validates the desired state.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        require_plain_state(Kind::Volume, self.state)?;
        require_identity(Kind::Volume, self.uuid.is_some() || self.name.is_some(), "uuid, name")?;
        require_uuid("uuid", self.uuid.as_deref())?;
        require_choice("type", self.volume_type.as_deref(), &["ssd", "bulk"])?;

        if self.size_gb == Some(0) {
            return Err(ConfigError::validation("size_gb must be greater than 0", "size_gb").into());
        }
        Ok(())
    }

    /// Converts to the kind-independent form.
    #[must_use]
    pub fn desired_state(&self) -> DesiredState {
        DesiredState::builder(Kind::Volume, self.state, self.uuid.as_deref())
            .string("name", self.name.as_deref())
            .value("size_gb", self.size_gb)
            .strings("servers", self.servers.as_deref())
            .tags(self.tags.as_ref())
            .string("type", self.volume_type.as_deref())
            .string("zone", self.zone.as_deref())
            .build()
    }
}

/// Handler for volumes.
#[derive(Debug, Default, Clone, Copy)]
pub struct VolumeHandler;

impl ResourceHandler for VolumeHandler {
    fn schema(&self) -> &'static KindSchema {
        &SCHEMA
    }

    fn parse(&self, params: Value) -> Result<ResourceSpec> {
        let spec: VolumeSpec = parse_params(Kind::Volume, params)?;
        spec.validate()?;
        Ok(ResourceSpec::Volume(spec))
    }
}
