//! Object storage users.
//!
//! The provider generates S3 keys for a new user. They are secret and are
//! only handed back on the invocation that created the user.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;

use super::schema::{Comparison, FieldSpec, Kind, KindSchema};
use super::{
    parse_params, require_identity, require_plain_state, DesiredState, Ensure, ResourceHandler,
    ResourceSpec,
};

/// Objects user schema.
pub static SCHEMA: KindSchema = KindSchema {
    kind: Kind::ObjectsUser,
    path: "objects-users",
    id_key: "id",
    name_key: Some("display_name"),
    uuid_ids: false,
    fields: &[
        FieldSpec::updatable("display_name", Comparison::Exact),
        FieldSpec::updatable("tags", Comparison::Map),
    ],
    required_for_create: &["display_name"],
    secret_fields: &["keys"],
};

/// Desired state of an objects user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectsUserSpec {
    /// Target state.
    #[serde(default)]
    pub state: Ensure,
    /// User id.
    pub id: Option<String>,
    /// Display name.
    #[serde(alias = "name")]
    pub display_name: Option<String>,
    /// Tags.
    pub tags: Option<BTreeMap<String, String>>,
}

impl ObjectsUserSpec {
    /// Validates the desired state.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        require_plain_state(Kind::ObjectsUser, self.state)?;
        require_identity(
            Kind::ObjectsUser,
            self.id.is_some() || self.display_name.is_some(),
            "id, display_name",
        )
    }

    /// Converts to the kind-independent form.
    #[must_use]
    pub fn desired_state(&self) -> DesiredState {
        DesiredState::builder(Kind::ObjectsUser, self.state, self.id.as_deref())
            .string("display_name", self.display_name.as_deref())
            .tags(self.tags.as_ref())
            .build()
    }
}

/// Handler for objects users.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectsUserHandler;

impl ResourceHandler for ObjectsUserHandler {
    fn schema(&self) -> &'static KindSchema {
        &SCHEMA
    }

    fn parse(&self, params: Value) -> Result<ResourceSpec> {
        let spec: ObjectsUserSpec = parse_params(Kind::ObjectsUser, params)?;
        spec.validate()?;
        Ok(ResourceSpec::ObjectsUser(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_name_alias_and_keys_are_secret() {
        let spec = ObjectsUserHandler
            .parse(json!({"name": "backup"}))
            .expect("valid");
        let desired = spec.desired_state().expect("desired");
        assert_eq!(desired.lookup_name(), Some("backup"));
        assert!(SCHEMA.is_secret("keys"));
        assert!(!SCHEMA.uuid_ids);
    }

    #[test]
    fn test_identity_required() {
        assert!(ObjectsUserHandler.parse(json!({"tags": {}})).is_err());
    }
}
