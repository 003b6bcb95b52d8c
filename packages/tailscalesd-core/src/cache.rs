//! Rate-limited, stale-tolerant cache in front of a discovery source.
//!
//! The cache guarantees:
//! - the source is called at most once per `min_interval` after a successful fetch
//! - at most one fetch is in flight at any time
//! - once a fetch has succeeded, callers always get devices back, stale if need be

use crate::device::Device;
use crate::error::{DiscoveryError, UpstreamError};
use crate::source::DiscoverySource;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default minimum time between two upstream fetches
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Devices returned by [`PollingCache::devices`].
#[derive(Debug, Clone)]
pub struct Snapshot {
    devices: Arc<[Device]>,
    stale: Option<DiscoveryError>,
}

impl Snapshot {
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// True when these are the devices from the last successful refresh
    /// because the latest one failed or did not finish in time.
    pub fn is_stale(&self) -> bool {
        self.stale.is_some()
    }

    /// Why this snapshot is served stale: the refresh failure, or
    /// [`DiscoveryError::Cancelled`] when the caller stopped waiting.
    pub fn stale(&self) -> Option<&DiscoveryError> {
        self.stale.as_ref()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    /// When the last successful fetch finished
    last_fetch: Option<Instant>,
    /// Failure of the most recent fetch, cleared by the next success
    last_error: Option<Arc<UpstreamError>>,
}

struct Inner<S> {
    source: S,
    min_interval: Duration,
    /// Last good device list, readable while a refresh holds `state`
    published: watch::Sender<Option<Arc<[Device]>>>,
    /// Number of fetches that have finished, successful or not
    completed: AtomicU64,
    // Held for the whole refresh, which is what keeps fetches single-flight.
    state: Mutex<CacheState>,
}

/// Caches the device list of a [`DiscoverySource`].
///
/// Cloning is cheap; clones share the same snapshot.
pub struct PollingCache<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for PollingCache<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: DiscoverySource + 'static> PollingCache<S> {
    pub fn new(source: S, min_interval: Duration) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                source,
                min_interval,
                published,
                completed: AtomicU64::new(0),
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Current devices, refreshing from the source when the poll interval has
    /// elapsed.
    ///
    /// The refresh runs on its own task. If `cancel` fires first the last
    /// good snapshot is returned marked stale, or [`DiscoveryError::Cancelled`]
    /// when there is none yet. Either way the refresh still completes in the
    /// background, so the next caller benefits from it.
    pub async fn devices(&self, cancel: &CancellationToken) -> Result<Snapshot, DiscoveryError> {
        if cancel.is_cancelled() {
            return self.inner.fallback(DiscoveryError::Cancelled);
        }

        if let Ok(state) = self.inner.state.try_lock() {
            if let Some(snapshot) = self.inner.fresh(&state) {
                return Ok(snapshot);
            }
        }

        let seen = self.inner.completed.load(Ordering::Acquire);
        let inner = Arc::clone(&self.inner);
        let refresh = tokio::spawn(async move { inner.refresh(seen).await });

        tokio::select! {
            result = refresh => {
                result.map_err(|e| DiscoveryError::TaskFailed(e.to_string()))?
            }
            _ = cancel.cancelled() => {
                tracing::debug!("Discovery request cancelled while waiting on {}", self.inner.source.name());
                self.inner.fallback(DiscoveryError::Cancelled)
            }
        }
    }
}

impl<S: DiscoverySource> Inner<S> {
    /// The current snapshot, if it is younger than the poll interval.
    fn fresh(&self, state: &CacheState) -> Option<Snapshot> {
        let last_fetch = state.last_fetch?;
        if last_fetch.elapsed() >= self.min_interval {
            return None;
        }
        self.published.borrow().clone().map(|devices| Snapshot {
            devices,
            stale: None,
        })
    }

    /// The last good snapshot marked stale by `reason`, or `reason` itself
    /// when nothing was ever fetched.
    fn fallback(&self, reason: DiscoveryError) -> Result<Snapshot, DiscoveryError> {
        match self.published.borrow().clone() {
            Some(devices) => Ok(Snapshot {
                devices,
                stale: Some(reason),
            }),
            None => Err(reason),
        }
    }

    /// `seen` is the value of `completed` when the caller arrived.
    async fn refresh(&self, seen: u64) -> Result<Snapshot, DiscoveryError> {
        let mut state = self.state.lock().await;

        if let Some(snapshot) = self.fresh(&state) {
            return Ok(snapshot);
        }

        // A fetch finished while this caller was queued: share its outcome.
        if self.completed.load(Ordering::Acquire) != seen {
            match &state.last_error {
                Some(e) => return self.fallback(DiscoveryError::Upstream(Arc::clone(e))),
                None => {
                    if let Some(devices) = self.published.borrow().clone() {
                        return Ok(Snapshot {
                            devices,
                            stale: None,
                        });
                    }
                }
            }
        }

        tracing::debug!("Refreshing devices from {}", self.source.name());
        let start = Instant::now();
        let result = self.source.devices().await;
        self.completed.fetch_add(1, Ordering::AcqRel);

        match result {
            Ok(devices) => {
                tracing::debug!(
                    "Fetched {} devices from {} in {:.1}s",
                    devices.len(),
                    self.source.name(),
                    start.elapsed().as_secs_f64()
                );
                let devices: Arc<[Device]> = devices.into();
                self.published.send_replace(Some(Arc::clone(&devices)));
                state.last_fetch = Some(Instant::now());
                state.last_error = None;
                Ok(Snapshot {
                    devices,
                    stale: None,
                })
            }
            Err(e) => {
                tracing::warn!("Failed to fetch devices from {}: {}", self.source.name(), e);
                let err = Arc::new(e);
                // last_fetch is left alone so the next caller retries immediately
                state.last_error = Some(Arc::clone(&err));
                self.fallback(DiscoveryError::Upstream(err))
            }
        }
    }
}
