//! Error types for device discovery.

use std::sync::Arc;

/// A discovery source could not produce a device list.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Request to the API could not be completed
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Socket I/O with the local daemon failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP exchange with the local daemon failed
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The API answered with a non-success status
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The configured API URL is unusable
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),

    /// The response body was not the expected JSON
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors returned by [`PollingCache::devices`](crate::PollingCache::devices).
///
/// Serving a stale snapshot is not an error; see
/// [`Snapshot::is_stale`](crate::Snapshot::is_stale).
#[derive(Debug, Clone, thiserror::Error)]
pub enum DiscoveryError {
    /// Fetch failed and there is no earlier snapshot to fall back on
    #[error("{0}")]
    Upstream(Arc<UpstreamError>),

    /// The caller gave up before the refresh finished. Only returned as an
    /// error when there is no snapshot to serve instead.
    #[error("discovery request cancelled")]
    Cancelled,

    /// The background refresh task died
    #[error("refresh task failed: {0}")]
    TaskFailed(String),
}
