//! Discovery sources.
//!
//! A source fetches the full set of tailnet devices from somewhere:
//! - [`PublicApiSource`]: the Tailscale public API, authenticated with an API token
//! - [`LocalApiSource`]: the `tailscaled` local API on this node

mod local_api;
mod public_api;

pub use local_api::{LocalApiSource, DEFAULT_LOCALAPI_SOCKET};
pub use public_api::{PublicApiSource, DEFAULT_API_BASE};

use crate::device::Device;
use crate::error::UpstreamError;
use async_trait::async_trait;
use std::sync::Arc;

/// Something that can list the devices of a tailnet.
///
/// Implementations must be safe to call concurrently, and either return the
/// complete device list or fail; partial results are never returned.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Fetch every device currently known to the source.
    async fn devices(&self) -> Result<Vec<Device>, UpstreamError>;

    /// Short description used in logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<S: DiscoverySource + ?Sized> DiscoverySource for Arc<S> {
    async fn devices(&self) -> Result<Vec<Device>, UpstreamError> {
        (**self).devices().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
