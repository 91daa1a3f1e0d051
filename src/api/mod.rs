//! cloudscale.ch API access.
//!
//! This module provides the HTTP client and the transport trait the rest
//! of the crate is written against.

mod client;
mod transport;

#[cfg(test)]
pub mod fake;

pub use client::{CloudscaleClient, DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS};
pub use transport::{ApiTransport, HttpMethod};

#[cfg(test)]
pub use transport::MockApiTransport;
