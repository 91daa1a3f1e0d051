//! Transport abstraction for the cloudscale.ch REST API.
//!
//! Everything above the HTTP client talks to the API through [`ApiTransport`],
//! which keeps the resolver and reconciler testable without a network.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// HTTP methods used by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// Read a resource or collection.
    Get,
    /// Create a resource or trigger an action.
    Post,
    /// Partially update a resource.
    Patch,
    /// Delete a resource.
    Delete,
}

impl HttpMethod {
    /// Returns true if the method changes remote state.
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        !matches!(self, Self::Get)
    }

    /// Returns the method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Patch => Self::PATCH,
            HttpMethod::Delete => Self::DELETE,
        }
    }
}

/// A single authenticated request/response exchange with the API.
///
/// `path` is relative to the versioned base URL (`servers`, `volumes/<uuid>`).
/// Implementations return `Value::Null` for empty bodies and surface provider
/// error payloads unmodified.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Issues a request and returns the decoded JSON body.
    async fn request(&self, method: HttpMethod, path: &str, body: Option<Value>) -> Result<Value>;
}
