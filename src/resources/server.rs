//! Servers.
//!
//! Servers are the one kind whose updates need more than a partial update:
//! the flavor is changed through the scale action on a stopped server and
//! the lifecycle status through the start and stop actions.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{ConfigError, ReconcileError, Result};
use crate::planner::{ChangeSet, Mutation, Step};

use super::schema::{Comparison, FieldSpec, Kind, KindSchema};
use super::{
    create_body, parse_params, patch_step, require_identity, require_uuid, DesiredState, Ensure,
    RemoteResource, ResourceHandler, ResourceSpec,
};

/// Server schema.
pub static SCHEMA: KindSchema = KindSchema {
    kind: Kind::Server,
    path: "servers",
    id_key: "uuid",
    name_key: Some("name"),
    uuid_ids: true,
    fields: &[
        FieldSpec::updatable("name", Comparison::Exact),
        FieldSpec::action("flavor"),
        FieldSpec::action("status"),
        FieldSpec::updatable("tags", Comparison::Map),
        FieldSpec::create_only("image", Comparison::Exact),
        FieldSpec::scope("zone"),
        FieldSpec::create_only("volume_size_gb", Comparison::Numeric),
        FieldSpec::create_only("bulk_volume_size_gb", Comparison::Numeric),
        FieldSpec::create_only("ssh_keys", Comparison::Ordered),
        FieldSpec::create_only("password", Comparison::Exact),
        FieldSpec::create_only("use_public_network", Comparison::Exact),
        FieldSpec::create_only("use_private_network", Comparison::Exact),
        FieldSpec::create_only("use_ipv6", Comparison::Exact),
        FieldSpec::create_only("user_data", Comparison::Exact),
        FieldSpec::create_only("server_groups", Comparison::Set).referencing(Kind::ServerGroup),
        FieldSpec::create_only("interfaces", Comparison::Ordered),
    ],
    required_for_create: &["name", "flavor", "image"],
    secret_fields: &["password"],
};

/// Desired state of a server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSpec {
    /// Target state: present, absent, running or stopped.
    #[serde(default)]
    pub state: Ensure,
    /// Server UUID.
    pub uuid: Option<String>,
    /// Server name.
    pub name: Option<String>,
    /// Flavor slug (e.g. `flex-4-2`).
    pub flavor: Option<String>,
    /// Image slug.
    pub image: Option<String>,
    /// Zone slug.
    pub zone: Option<String>,
    /// Root volume size in GB.
    pub volume_size_gb: Option<u32>,
    /// Bulk volume size in GB.
    pub bulk_volume_size_gb: Option<u32>,
    /// Public SSH keys.
    pub ssh_keys: Option<Vec<String>>,
    /// Root password.
    pub password: Option<String>,
    /// Attach a public network interface.
    pub use_public_network: Option<bool>,
    /// Attach a private network interface.
    pub use_private_network: Option<bool>,
    /// Enable IPv6 on the public interface.
    pub use_ipv6: Option<bool>,
    /// Cloud-init user data.
    pub user_data: Option<String>,
    /// Server groups (UUIDs or names).
    pub server_groups: Option<Vec<String>>,
    /// Explicit network interfaces.
    pub interfaces: Option<Vec<ServerInterface>>,
    /// Tags.
    pub tags: Option<BTreeMap<String, String>>,
    /// Allow stopping a running server to change its flavor.
    #[serde(default)]
    pub force: bool,
}

/// A network interface requested at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerInterface {
    /// `public` or a network UUID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Fixed addresses on the interface.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<InterfaceAddress>>,
}

/// A fixed address of an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceAddress {
    /// Subnet UUID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    /// Address inside the subnet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ServerSpec {
    /// Validates the desired state.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        require_identity(Kind::Server, self.uuid.is_some() || self.name.is_some(), "uuid, name")?;
        require_uuid("uuid", self.uuid.as_deref())?;

        let legacy_network = self.use_public_network.is_some()
            || self.use_private_network.is_some()
            || self.use_ipv6.is_some();
        if self.interfaces.is_some() && legacy_network {
            return Err(ConfigError::validation(
                "interfaces is mutually exclusive with use_public_network, use_private_network and use_ipv6",
                "interfaces",
            )
            .into());
        }

        if self.name.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::validation("name must not be empty", "name").into());
        }
        Ok(())
    }

    /// Converts to the kind-independent form.
    ///
    /// # Errors
    ///
    /// Returns an error if the interfaces cannot be serialized.
    pub fn desired_state(&self) -> Result<DesiredState> {
        Ok(DesiredState::builder(Kind::Server, self.state, self.uuid.as_deref())
            .string("name", self.name.as_deref())
            .string("flavor", self.flavor.as_deref())
            .string("status", self.state.status())
            .tags(self.tags.as_ref())
            .string("image", self.image.as_deref())
            .string("zone", self.zone.as_deref())
            .value("volume_size_gb", self.volume_size_gb)
            .value("bulk_volume_size_gb", self.bulk_volume_size_gb)
            .strings("ssh_keys", self.ssh_keys.as_deref())
            .string("password", self.password.as_deref())
            .value("use_public_network", self.use_public_network)
            .value("use_private_network", self.use_private_network)
            .value("use_ipv6", self.use_ipv6)
            .string("user_data", self.user_data.as_deref())
            .strings("server_groups", self.server_groups.as_deref())
            .serialized("interfaces", self.interfaces.as_ref())?
            .option("force", self.force)
            .build())
    }
}

/// Handler for servers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerHandler;

impl ResourceHandler for ServerHandler {
    fn schema(&self) -> &'static KindSchema {
        &SCHEMA
    }

    fn parse(&self, params: Value) -> Result<ResourceSpec> {
        let spec: ServerSpec = parse_params(Kind::Server, params)?;
        spec.validate()?;
        Ok(ResourceSpec::Server(spec))
    }

    fn create_body(&self, desired: &DesiredState) -> Result<Value> {
        let mut body = create_body(&SCHEMA, desired)?;
        if let Value::Object(map) = &mut body {
            map.remove("status");
        }
        Ok(body)
    }

    fn adjust_changes(
        &self,
        desired: &DesiredState,
        remote: &RemoteResource,
        mut changes: ChangeSet,
    ) -> ChangeSet {
        let running = remote.status() == Some("running");
        let stopping = desired.ensure == Ensure::Stopped;

        if changes.contains("flavor") && running && !stopping && !desired.flag("force") {
            warn!(
                "Not changing the flavor of running {}; set force to stop it for scaling",
                desired.describe()
            );
            changes.remove("flavor");
        }
        changes
    }

    fn update_steps(
        &self,
        desired: &DesiredState,
        remote: &RemoteResource,
        changes: &ChangeSet,
    ) -> Result<Vec<Step>> {
        let mut steps: Vec<Step> = patch_step(&SCHEMA, remote, changes)?.into_iter().collect();

        let id = remote.id().ok_or_else(|| ReconcileError::MissingIdentifier {
            kind: Kind::Server.to_string(),
            key: SCHEMA.id_key.to_string(),
        })?;
        let action = |name: &str, body: Option<Value>| {
            Step::Call(Mutation::post(format!("{}/{name}", SCHEMA.item_path(id)), body))
        };

        let status = remote.status().unwrap_or_default();
        if (changes.contains("status") || changes.contains("flavor"))
            && !matches!(status, "running" | "stopped")
        {
            return Err(ReconcileError::Unsettled {
                kind: Kind::Server.to_string(),
                id: id.to_string(),
                status: status.to_string(),
            }
            .into());
        }

        let mut running = status == "running";
        let keep_running = desired
            .ensure
            .status()
            .map_or(running, |status| status == "running");

        if let Some(change) = changes.get("flavor") {
            if running {
                steps.push(action("stop", None));
                steps.push(Step::AwaitStatus("stopped"));
                running = false;
            }
            steps.push(action("scale", Some(json!({ "flavor": change.new }))));
        }

        if keep_running && !running {
            steps.push(action("start", None));
            steps.push(Step::AwaitStatus("running"));
        } else if !keep_running && running {
            steps.push(action("stop", None));
            steps.push(Step::AwaitStatus("stopped"));
        }

        Ok(steps)
    }

    fn settled_status(&self, _desired: &DesiredState) -> Option<&'static str> {
        Some("running")
    }
}
