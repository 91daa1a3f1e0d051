//! Manifest types.
//!
//! These structs map to `cloudscale.yaml`. Resource entries are kept as raw
//! mappings here; each one is parsed into its kind's record type by the
//! registry, so the manifest layer never needs to know the kinds.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::api::{DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS};
use crate::inventory::InventoryOptions;
use crate::reconciler::{
    ReconcileOptions, DEFAULT_STATUS_TIMEOUT_SECS, DEFAULT_VISIBILITY_TIMEOUT_SECS,
};

/// The root of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// API connection settings.
    #[serde(default)]
    pub api: ApiConfig,
    /// Desired states, each tagged with `kind`, reconciled in order.
    #[serde(default)]
    pub resources: Vec<Value>,
    /// Inventory export options.
    #[serde(default)]
    pub inventory: InventoryOptions,
}

/// API connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Versioned base URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// How long a created resource may take to become readable.
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,
    /// How long a server may take to start or stop.
    #[serde(default = "default_status_timeout")]
    pub status_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout_secs: default_timeout(),
            visibility_timeout_secs: default_visibility_timeout(),
            status_timeout_secs: default_status_timeout(),
        }
    }
}

impl ApiConfig {
    /// Reconciler options derived from these settings.
    #[must_use]
    pub fn reconcile_options(&self, dry_run: bool) -> ReconcileOptions {
        ReconcileOptions {
            dry_run,
            visibility_timeout: Duration::from_secs(self.visibility_timeout_secs),
            status_timeout: Duration::from_secs(self.status_timeout_secs),
            ..ReconcileOptions::default()
        }
    }
}

fn default_url() -> String {
    String::from(DEFAULT_API_URL)
}

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_visibility_timeout() -> u64 {
    DEFAULT_VISIBILITY_TIMEOUT_SECS
}

const fn default_status_timeout() -> u64 {
    DEFAULT_STATUS_TIMEOUT_SECS
}
