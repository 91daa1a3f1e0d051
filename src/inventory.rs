//! Dynamic inventory export.
//!
//! Lists every server of the project and renders it in the JSON format
//! configuration-management tools read from inventory scripts:
//! `{"<group>": {"hosts": [...]}, "_meta": {"hostvars": {...}}}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::api::ApiTransport;
use crate::error::{ResolveError, Result};
use crate::resolver::Resolver;
use crate::resources::{Kind, Registry, RemoteResource};

/// Group every server belongs to.
pub const ROOT_GROUP: &str = "cloudscale";

/// Attribute used as the host name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostnameSource {
    /// Server name; duplicate names are an error.
    #[default]
    Name,
    /// Server UUID.
    Uuid,
}

/// Address exported as `ansible_host`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    /// First public IPv4 address.
    #[default]
    PublicV4,
    /// First public IPv6 address.
    PublicV6,
    /// First private IPv4 address.
    PrivateV4,
    /// No address; the host name is used to connect.
    None,
}

/// Inventory options from the manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InventoryOptions {
    /// Host name source.
    pub inventory_hostname: HostnameSource,
    /// Address source.
    pub ansible_host: AddressSource,
}

/// One exported host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Host {
    /// Inventory host name.
    pub name: String,
    /// Connection address, if any.
    pub address: Option<String>,
    /// Groups the host belongs to.
    pub groups: Vec<String>,
    /// Normalized server record.
    pub server: Value,
}

impl Host {
    fn hostvars(&self) -> Value {
        let mut vars = Map::new();
        if let Some(address) = &self.address {
            vars.insert(String::from("ansible_host"), json!(address));
        }
        vars.insert(String::from("cloudscale"), self.server.clone());
        Value::Object(vars)
    }
}

/// Inventory of every server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    hosts: BTreeMap<String, Host>,
}

impl Inventory {
    /// Builds the inventory from the servers of the project.
    ///
    /// # Errors
    ///
    /// Returns an error on API failures or if two servers share a host name.
    pub async fn load<T: ApiTransport + ?Sized>(
        api: &T,
        registry: &Registry,
        options: InventoryOptions,
    ) -> Result<Self> {
        let handler = registry.handler(Kind::Server)?;
        let servers = Resolver::new(api, registry).list(handler).await?;
        debug!("Building inventory from {} server(s)", servers.len());
        Self::from_servers(&servers, options)
    }

    /// Builds the inventory from already listed servers.
    ///
    /// # Errors
    ///
    /// Returns an error if two servers share a host name.
    pub fn from_servers(servers: &[RemoteResource], options: InventoryOptions) -> Result<Self> {
        let mut hosts = BTreeMap::new();

        for server in servers {
            let key = match options.inventory_hostname {
                HostnameSource::Name => "name",
                HostnameSource::Uuid => "uuid",
            };
            let Some(name) = server.get_str(key) else {
                continue;
            };

            let host = Host {
                name: name.to_string(),
                address: address(server, options.ansible_host),
                groups: groups(server),
                server: server.to_value(),
            };

            if hosts.insert(name.to_string(), host).is_some() {
                let count = servers
                    .iter()
                    .filter(|s| s.get_str(key) == Some(name))
                    .count();
                return Err(ResolveError::AmbiguousMatch {
                    kind: Kind::Server.to_string(),
                    key: key.to_string(),
                    value: name.to_string(),
                    count,
                }
                .into());
            }
        }

        Ok(Self { hosts })
    }

    /// Returns the number of hosts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Returns true if there are no hosts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Returns the hosts ordered by name.
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    /// Returns the variables of one host, as `--host <name>` expects.
    #[must_use]
    pub fn host(&self, name: &str) -> Option<Value> {
        self.hosts.get(name).map(Host::hostvars)
    }

    /// Renders the whole inventory.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut hostvars = Map::new();

        for host in self.hosts.values() {
            for group in &host.groups {
                groups.entry(group.as_str()).or_default().push(host.name.as_str());
            }
            hostvars.insert(host.name.clone(), host.hostvars());
        }

        let mut output = Map::new();
        for (group, hosts) in groups {
            output.insert(group.to_string(), json!({ "hosts": hosts }));
        }
        output.insert(String::from("_meta"), json!({ "hostvars": hostvars }));
        Value::Object(output)
    }
}

fn address(server: &RemoteResource, source: AddressSource) -> Option<String> {
    let (network, version) = match source {
        AddressSource::PublicV4 => ("public", 4),
        AddressSource::PublicV6 => ("public", 6),
        AddressSource::PrivateV4 => ("private", 4),
        AddressSource::None => return None,
    };

    server
        .get("interfaces")?
        .as_array()?
        .iter()
        .filter(|interface| interface.get("type").and_then(Value::as_str) == Some(network))
        .filter_map(|interface| interface.get("addresses").and_then(Value::as_array))
        .flatten()
        .find(|a| a.get("version").and_then(Value::as_u64) == Some(version))
        .and_then(|a| a.get("address").and_then(Value::as_str))
        .map(String::from)
}

fn groups(server: &RemoteResource) -> Vec<String> {
    let mut groups = vec![String::from(ROOT_GROUP)];
    if let Some(zone) = server.get_str("zone") {
        groups.push(format!("zone_{}", sanitize(zone)));
    }
    if let Some(Value::Object(tags)) = server.get("tags") {
        for (key, value) in tags {
            let value = value.as_str().unwrap_or_default();
            groups.push(format!("tag_{}_{}", sanitize(key), sanitize(value)));
        }
    }
    groups
}

/// Replaces characters not allowed in group names.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
