//! Manifest validation.
//!
//! Parses every resource entry through the registry so that all problems of
//! a manifest are reported at once, before any network call.

use crate::error::{CloudscaleError, ConfigError, Result};
use crate::resources::{Registry, ResourceSpec};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::spec::Manifest;

/// Validation result containing everything found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Parsed resources, in manifest order.
    pub resources: Vec<ResourceSpec>,
    /// Errors.
    pub errors: Vec<ValidationError>,
    /// Non-fatal findings.
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// Position of the failing entry, e.g. `resources[2]`.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validator for manifests.
#[derive(Debug)]
pub struct ConfigValidator<'a> {
    registry: &'a Registry,
}

impl<'a> ConfigValidator<'a> {
    /// Creates a validator for the kinds of a registry.
    #[must_use]
    pub const fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Collects every problem of a manifest without failing.
    #[must_use]
    pub fn check(&self, manifest: &Manifest) -> ValidationResult {
        let mut result = ValidationResult::default();

        if manifest.api.url.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("api.url"),
                message: String::from("API URL cannot be empty"),
            });
        }
        if manifest.api.timeout_secs == 0 {
            result.errors.push(ValidationError {
                field: String::from("api.timeout_secs"),
                message: String::from("Timeout must be at least one second"),
            });
        }
        if manifest.resources.is_empty() {
            result.warnings.push(String::from("No resources defined in manifest"));
        }

        let mut seen = HashSet::new();
        for (i, entry) in manifest.resources.iter().enumerate() {
            let field = format!("resources[{i}]");
            match self.registry.parse(entry.clone()) {
                Ok(spec) => {
                    if let Some(key) = identity(&spec)
                        && !seen.insert(key.clone())
                    {
                        result
                            .warnings
                            .push(format!("{field}: {key} is declared more than once"));
                    }
                    result.resources.push(spec);
                }
                Err(err) => result.errors.push(ValidationError {
                    field,
                    message: message(&err),
                }),
            }
        }

        for warning in &result.warnings {
            warn!("{}", warning);
        }
        result
    }

    /// Validates a manifest and returns its parsed resources.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails.
    pub fn validate(&self, manifest: &Manifest) -> Result<ValidationResult> {
        let result = self.check(manifest);

        match result.errors.first() {
            None => {
                debug!("Manifest validation passed");
                Ok(result)
            }
            Some(first) => Err(ConfigError::ValidationError {
                message: first.message.clone(),
                field: Some(first.field.clone()),
            }
            .into()),
        }
    }
}

/// Kind and identity of an entry, used to spot duplicates.
fn identity(spec: &ResourceSpec) -> Option<String> {
    let desired = spec.desired_state().ok()?;
    let schema = desired.schema();
    let value = desired.id.as_deref().or_else(|| desired.lookup_name())?;
    let scope: Vec<String> = desired.scope().map(|s| s.value.to_string()).collect();
    Some(format!("{} '{}' {}", schema.kind, value, scope.join(" ")).trim_end().to_string())
}

fn message(err: &CloudscaleError) -> String {
    match err {
        CloudscaleError::Config(ConfigError::ValidationError {
            message,
            field: Some(field),
        }) => format!("{field}: {message}"),
        CloudscaleError::Config(inner) => inner.to_string(),
        other => other.to_string(),
    }
}
