//! HTTP endpoint answering Prometheus HTTP service discovery requests.
//!
//! - `GET /` returns the current targets as JSON
//! - stale data is still served with 200, and logged, including when the
//!   refresh outlives the request timeout
//! - 500 with a plain-text message when no devices are available at all

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tailscalesd_core::{DiscoverySource, PollingCache, Translator};
use tokio_util::sync::CancellationToken;

pub type DeviceCache = PollingCache<Arc<dyn DiscoverySource>>;

#[derive(Clone)]
pub struct AppState {
    cache: DeviceCache,
    translator: Arc<Translator>,
    request_timeout: Duration,
    /// Cancelled on shutdown; every request waits on a child of this token
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        cache: DeviceCache,
        translator: Translator,
        request_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            cache,
            translator: Arc::new(translator),
            request_timeout,
            shutdown,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/", get(discover)).with_state(state)
}

async fn discover(State(state): State<AppState>) -> Response {
    let cancel = state.shutdown.child_token();
    let deadline = {
        let cancel = cancel.clone();
        let timeout = state.request_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            cancel.cancel();
        })
    };

    let result = state.cache.devices(&cancel).await;
    deadline.abort();

    let snapshot = match result {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!("Failed to discover Tailscale devices: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to discover Tailscale devices: {}", e),
            )
                .into_response();
        }
    };

    if let Some(e) = snapshot.stale() {
        tracing::warn!("Serving potentially stale results: {}", e);
    }

    let targets = state.translator.translate(snapshot.devices());
    match serde_json::to_vec(&targets) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed encoding targets to JSON: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed encoding targets to JSON: {}", e),
            )
                .into_response()
        }
    }
}

/// Serve discovery on `address` until `shutdown` is cancelled.
pub async fn serve(address: SocketAddr, state: AppState) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to listen on {}", address))?;

    tracing::info!("Serving Prometheus discovery on http://{}/", address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Cancel `shutdown` on SIGTERM or Ctrl+C.
pub fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
                        _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl+C, shutting down"),
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to register SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("Received Ctrl+C, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl+C, shutting down");
        }

        shutdown.cancel();
    });
}
