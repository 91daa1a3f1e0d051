//! cloudscale.ch API client implementation.
//!
//! A thin `reqwest` wrapper: bearer authentication, JSON in and out, status
//! codes mapped onto [`ApiError`]. There is deliberately no retry loop; a
//! transient failure fails the invocation.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{ApiError, CloudscaleError, Result};
use crate::report::redact_body;

use super::transport::{ApiTransport, HttpMethod};

/// Default cloudscale.ch API base URL.
pub const DEFAULT_API_URL: &str = "https://api.cloudscale.ch/v1";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 45;

/// Retry-After value used when the provider sends none.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// cloudscale.ch API client.
#[derive(Clone)]
pub struct CloudscaleClient {
    /// HTTP client.
    client: Client,
    /// Versioned base URL without trailing slash.
    base_url: String,
    /// API token.
    api_token: String,
}

impl CloudscaleClient {
    /// Creates a client for the default endpoint and timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_token: &str) -> Result<Self> {
        Self::with_options(api_token, DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom base URL and timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_options(api_token: &str, base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("cloudscale_reconcile/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        })
    }

    /// Returns the base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds the absolute URL for a relative API path.
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl std::fmt::Debug for CloudscaleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudscaleClient")
            .field("base_url", &self.base_url)
            .field("api_token", &"***")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ApiTransport for CloudscaleClient {
    async fn request(&self, method: HttpMethod, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self.url(path);
        debug!("{method} {url}");

        let mut request = self
            .client
            .request(method.into(), &url)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(&self.api_token);

        if let Some(body) = &body {
            trace!("Request body: {}", redact_body(body));
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::transport(format!("{method} {url} failed: {e}")))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::transport(format!("Failed to read response body: {e}")))?;

        trace!("Response {status}: {}", loggable(&text));
        decode_response(status, retry_after, &text, path)
    }
}

/// Renders a response body for trace logs without its secrets.
fn loggable(text: &str) -> String {
    serde_json::from_str::<Value>(text).map_or_else(
        |_| format!("<{} bytes>", text.len()),
        |body| redact_body(&body).to_string(),
    )
}

/// Maps an HTTP status and body onto the crate's result type.
fn decode_response(
    status: StatusCode,
    retry_after: Option<u64>,
    body: &str,
    path: &str,
) -> Result<Value> {
    match status.as_u16() {
        200..=299 => {
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(body).map_err(|e| {
                CloudscaleError::from(ApiError::InvalidResponse {
                    message: format!("Failed to parse response: {e}"),
                })
            })
        }
        401 | 403 => Err(ApiError::Authentication {
            status: status.as_u16(),
            message: body.trim().to_string(),
        }
        .into()),
        404 => Err(ApiError::NotFound {
            path: path.to_string(),
        }
        .into()),
        429 => Err(ApiError::RateLimited {
            retry_after_secs: retry_after
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        }
        .into()),
        code => Err(ApiError::request_failed(code, body.trim()).into()),
    }
}
