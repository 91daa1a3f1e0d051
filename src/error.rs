//! Error types for the cloudscale reconciliation client.
//!
//! Every failure is fatal for the invocation it happens in. Nothing here is
//! retried internally; callers decide whether to run again.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the crate.
#[derive(Debug, Error)]
pub enum CloudscaleError {
    /// Configuration or desired-state errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// cloudscale.ch API errors.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Resource lookup errors.
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration and desired-state errors.
///
/// All of these are raised before any network call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The manifest file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The manifest could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// A desired state failed validation.
    #[error("Validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// The resource kind tag is not registered.
    #[error("Unknown resource kind '{kind}'")]
    UnknownKind {
        /// The unrecognized tag.
        kind: String,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// cloudscale.ch API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network, DNS or TLS failure.
    #[error("Network error communicating with cloudscale.ch: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The token was rejected.
    #[error("cloudscale.ch authentication failed ({status}): {message}")]
    Authentication {
        /// HTTP status code (401 or 403).
        status: u16,
        /// Provider message.
        message: String,
    },

    /// The provider throttled the request.
    #[error("cloudscale.ch API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds the provider asked to wait.
        retry_after_secs: u64,
    },

    /// The provider answered with an error status.
    #[error("cloudscale.ch API request failed: {status} - {message}")]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the provider, unmodified.
        message: String,
    },

    /// The addressed resource does not exist.
    #[error("Not found: {path}")]
    NotFound {
        /// Request path that returned 404.
        path: String,
    },

    /// The response body could not be interpreted.
    #[error("Invalid response from cloudscale.ch API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// A resource did not become visible or settle in time.
    #[error("Timeout waiting for {resource} to reach {expected}")]
    Timeout {
        /// Resource description.
        resource: String,
        /// What was waited for.
        expected: String,
    },
}

/// Resource lookup errors.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// More than one remote resource matched a name lookup.
    #[error(
        "More than one {kind} resource with {key} '{value}' exists ({count} matches). \
         Use the uuid to identify the resource."
    )]
    AmbiguousMatch {
        /// Resource kind.
        kind: String,
        /// Attribute used for the lookup.
        key: String,
        /// Value looked up.
        value: String,
        /// Number of matches.
        count: usize,
    },

    /// A referenced parent resource does not exist.
    #[error("{kind} '{reference}' referenced by {field} does not exist")]
    MissingReference {
        /// Kind of the referenced resource.
        kind: String,
        /// Field holding the reference.
        field: String,
        /// The reference as given.
        reference: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A required field for creation is missing.
    #[error("Missing required parameter to create {kind}: {field}")]
    MissingCreateParam {
        /// Resource kind.
        kind: String,
        /// Missing field.
        field: String,
    },

    /// A required field for an update is missing.
    #[error("Missing required parameter to update {kind}: {field}")]
    MissingUpdateParam {
        /// Resource kind.
        kind: String,
        /// Missing field.
        field: String,
    },

    /// The resource is between lifecycle states and cannot be acted on.
    #[error("{kind} {id} is '{status}'; retry once it is running or stopped")]
    Unsettled {
        /// Resource kind.
        kind: String,
        /// Resource identifier.
        id: String,
        /// Current status.
        status: String,
    },

    /// The creation response carried no identifier.
    #[error("Creation of {kind} returned no '{key}'")]
    MissingIdentifier {
        /// Resource kind.
        kind: String,
        /// Identifier key expected.
        key: String,
    },
}

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, CloudscaleError>;

impl CloudscaleError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns a stable class name for the error, used in result envelopes.
    #[must_use]
    pub const fn class(&self) -> &'static str {
        match self {
            Self::Config(_) => "validation",
            Self::Api(ApiError::Transport { .. }) => "transport",
            Self::Api(ApiError::Authentication { .. }) => "auth",
            Self::Api(ApiError::RateLimited { .. }) => "rate_limit",
            Self::Api(ApiError::NotFound { .. }) => "not_found",
            Self::Api(ApiError::Timeout { .. }) => "timeout",
            Self::Api(_) => "api",
            Self::Resolve(ResolveError::AmbiguousMatch { .. }) => "ambiguous_match",
            Self::Resolve(ResolveError::MissingReference { .. }) => "missing_reference",
            Self::Reconcile(_) => "reconcile",
            Self::Io(_) | Self::Internal(_) => "internal",
        }
    }

    /// Returns true if the error is a 404 from the API.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api(ApiError::NotFound { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl ApiError {
    /// Creates a request error.
    #[must_use]
    pub fn request_failed(status: u16, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}
