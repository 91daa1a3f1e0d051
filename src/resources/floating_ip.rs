//! Floating IPs.
//!
//! The provider keys floating IPs by their network address rather than a
//! UUID. Normalization derives `ip` from the routed `network` so that a
//! floating IP can always be addressed the same way after creation.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::error::{ConfigError, Result};

use super::schema::{Comparison, FieldSpec, Kind, KindSchema};
use super::{
    normalize_references, parse_params, require_choice, require_identity, require_plain_state,
    DesiredState, Ensure, ResourceHandler, ResourceSpec,
};

/// Floating IP schema.
pub static SCHEMA: KindSchema = KindSchema {
    kind: Kind::FloatingIp,
    path: "floating-ips",
    id_key: "ip",
    name_key: None,
    uuid_ids: false,
    fields: &[
        FieldSpec::updatable("server", Comparison::Exact).referencing(Kind::Server),
        FieldSpec::updatable("reverse_ptr", Comparison::Exact),
        FieldSpec::updatable("tags", Comparison::Map),
        FieldSpec::create_only("ip_version", Comparison::Numeric),
        FieldSpec::create_only("type", Comparison::Exact),
        FieldSpec::create_only("region", Comparison::Exact),
        FieldSpec::create_only("prefix_length", Comparison::Numeric),
    ],
    required_for_create: &["ip_version"],
    secret_fields: &[],
};

/// Desired state of a floating IP.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FloatingIpSpec {
    /// Target state.
    #[serde(default)]
    pub state: Ensure,
    /// Floating IP address (or network in CIDR notation).
    #[serde(alias = "network")]
    pub ip: Option<String>,
    /// IP version, 4 or 6.
    pub ip_version: Option<u8>,
    /// Server the IP is routed to (UUID or name).
    pub server: Option<String>,
    /// `regional` or `global`.
    #[serde(rename = "type", default = "default_type")]
    pub ip_type: String,
    /// Region slug; must be omitted for global IPs.
    pub region: Option<String>,
    /// IPv6 prefix length (only 56).
    pub prefix_length: Option<u8>,
    /// Reverse PTR record.
    pub reverse_ptr: Option<String>,
    /// Tags.
    pub tags: Option<BTreeMap<String, String>>,
}

fn default_type() -> String {
    String::from("regional")
}

impl FloatingIpSpec {
    /// Validates the desired state.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        require_plain_state(Kind::FloatingIp, self.state)?;
        require_identity(
            Kind::FloatingIp,
            self.ip.is_some() || self.ip_version.is_some(),
            "ip, ip_version",
        )?;
        require_choice("type", Some(self.ip_type.as_str()), &["regional", "global"])?;

        if let Some(ip) = &self.ip
            && address_of(ip).parse::<IpAddr>().is_err()
        {
            return Err(ConfigError::validation(format!("'{ip}' is not a valid IP address"), "ip").into());
        }
        if self.state.is_absent() && self.ip.is_none() {
            return Err(ConfigError::validation(
                "Missing required parameter to delete a floating IP: ip",
                "ip",
            )
            .into());
        }
        if let Some(version) = self.ip_version
            && version != 4
            && version != 6
        {
            return Err(ConfigError::validation(
                format!("ip_version must be 4 or 6, got: {version}"),
                "ip_version",
            )
            .into());
        }
        if let Some(prefix) = self.prefix_length {
            if prefix != 56 {
                return Err(ConfigError::validation(
                    format!("prefix_length must be 56, got: {prefix}"),
                    "prefix_length",
                )
                .into());
            }
            if self.ip_version != Some(6) {
                return Err(ConfigError::validation(
                    "prefix_length is only valid with ip_version 6",
                    "prefix_length",
                )
                .into());
            }
            if self.reverse_ptr.is_some() {
                return Err(ConfigError::validation(
                    "reverse_ptr cannot be set for a floating network",
                    "reverse_ptr",
                )
                .into());
            }
        }
        if self.ip_type == "global" && self.region.is_some() {
            return Err(ConfigError::validation(
                "region must be omitted for global floating IPs",
                "region",
            )
            .into());
        }
        Ok(())
    }

    /// Converts to the kind-independent form.
    #[must_use]
    pub fn desired_state(&self) -> DesiredState {
        DesiredState::builder(Kind::FloatingIp, self.state, self.ip.as_deref().map(address_of))
            .string("server", self.server.as_deref())
            .string("reverse_ptr", self.reverse_ptr.as_deref())
            .tags(self.tags.as_ref())
            .value("ip_version", self.ip_version)
            .string("type", Some(self.ip_type.as_str()))
            .string("region", self.region.as_deref())
            .value("prefix_length", self.prefix_length)
            .build()
    }
}

/// Strips a prefix length from an address.
fn address_of(value: &str) -> &str {
    value.split_once('/').map_or(value, |(address, _)| address)
}

/// Handler for floating IPs.
#[derive(Debug, Default, Clone, Copy)]
pub struct FloatingIpHandler;

impl ResourceHandler for FloatingIpHandler {
    fn schema(&self) -> &'static KindSchema {
        &SCHEMA
    }

    fn parse(&self, params: Value) -> Result<ResourceSpec> {
        let spec: FloatingIpSpec = parse_params(Kind::FloatingIp, params)?;
        spec.validate()?;
        Ok(ResourceSpec::FloatingIp(spec))
    }

    fn normalize(&self, raw: Map<String, Value>) -> Map<String, Value> {
        let mut map = normalize_references(raw);
        let ip = map
            .get("network")
            .and_then(Value::as_str)
            .map(|network| Value::String(address_of(network).to_string()));
        if let Some(ip) = ip {
            map.insert(String::from("ip"), ip);
        }
        map
    }
}
