//! tailscalesd Core Library
//!
//! This crate provides the discovery pipeline behind tailscalesd:
//! - Device sources (Tailscale public API, tailscaled local API)
//! - A polling cache that rate-limits the source and serves stale data on failure
//! - Translation of devices into Prometheus HTTP SD target groups
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tailscalesd_core::{LocalApiSource, PollingCache, Translator, DEFAULT_LOCALAPI_SOCKET};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = LocalApiSource::new(DEFAULT_LOCALAPI_SOCKET, Duration::from_secs(10));
//!     let cache = PollingCache::new(source, Duration::from_secs(300));
//!
//!     let snapshot = cache.devices(&CancellationToken::new()).await?;
//!     let targets = Translator::default().translate(snapshot.devices());
//!     println!("{}", serde_json::to_string(&targets)?);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod device;
pub mod error;
pub mod source;
pub mod translate;

// Re-export commonly used types
pub use cache::{PollingCache, Snapshot, DEFAULT_POLL_INTERVAL};
pub use device::Device;
pub use error::{DiscoveryError, UpstreamError};
pub use source::{
    DiscoverySource, LocalApiSource, PublicApiSource, DEFAULT_API_BASE, DEFAULT_LOCALAPI_SOCKET,
};
pub use translate::{translate, Filter, LabelSet, TargetDescriptor, Translator, DEFAULT_FILTERS};
