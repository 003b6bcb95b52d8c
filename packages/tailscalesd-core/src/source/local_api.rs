//! Source backed by the `tailscaled` local API.
//!
//! The local API is plain HTTP/1.1 served on a Unix socket. It needs no
//! credentials but only knows what this node can see: no client versions,
//! device names or tailnet name.

use super::DiscoverySource;
use crate::device::Device;
use crate::error::UpstreamError;
use async_trait::async_trait;
#[cfg(unix)]
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
#[cfg(unix)]
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default location of the tailscaled socket on Linux
pub const DEFAULT_LOCALAPI_SOCKET: &str = "/var/run/tailscale/tailscaled.sock";

/// Value of the `api` field for devices from this source
const LOCAL_API_NAME: &str = "localhost";

/// Host header tailscaled expects on local API requests
const LOCAL_API_HOST: &str = "local-tailscaled.sock";

const STATUS_PATH: &str = "/localapi/v0/status";

/// Lists this node and its peers from `GET /localapi/v0/status`.
#[derive(Debug, Clone)]
pub struct LocalApiSource {
    socket: PathBuf,
    timeout: Duration,
}

impl LocalApiSource {
    pub fn new(socket: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket: socket.into(),
            timeout,
        }
    }

    #[cfg(not(unix))]
    async fn fetch_status(&self) -> Result<Bytes, UpstreamError> {
        Err(UpstreamError::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "the local API is only reachable over a Unix socket",
        )))
    }

    #[cfg(unix)]
    async fn fetch_status(&self) -> Result<Bytes, UpstreamError> {
        let stream = tokio::net::UnixStream::connect(&self.socket).await?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(protocol_error)?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("Local API connection closed with error: {}", e);
            }
        });

        let req = hyper::Request::get(STATUS_PATH)
            .header(hyper::header::HOST, LOCAL_API_HOST)
            .body(Empty::<Bytes>::new())
            .map_err(protocol_error)?;

        let resp = sender.send_request(req).await.map_err(protocol_error)?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(protocol_error)?
            .to_bytes();

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl DiscoverySource for LocalApiSource {
    async fn devices(&self) -> Result<Vec<Device>, UpstreamError> {
        tracing::debug!("Fetching status from local API at {:?}", self.socket);

        let body = tokio::time::timeout(self.timeout, self.fetch_status())
            .await
            .map_err(|_| {
                UpstreamError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "local API request timed out",
                ))
            })??;

        let status: LocalStatus = serde_json::from_slice(&body)?;
        let devices = status.into_devices();
        tracing::debug!("Local API returned {} devices", devices.len());
        Ok(devices)
    }

    fn name(&self) -> &str {
        LOCAL_API_NAME
    }
}

#[cfg(unix)]
fn protocol_error(e: impl std::fmt::Display) -> UpstreamError {
    UpstreamError::Protocol(e.to_string())
}

/// The subset of the local API status document needed for discovery.
#[derive(Debug, Default, Deserialize)]
struct LocalStatus {
    #[serde(rename = "Self")]
    self_status: Option<PeerStatus>,
    #[serde(rename = "Peer")]
    peers: Option<BTreeMap<String, PeerStatus>>,
}

#[derive(Debug, Default, Deserialize)]
struct PeerStatus {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "HostName", default)]
    host_name: String,
    #[serde(rename = "OS", default)]
    os: String,
    #[serde(rename = "TailscaleIPs")]
    tailscale_ips: Option<Vec<String>>,
    #[serde(rename = "Tags")]
    tags: Option<Vec<String>>,
}

impl LocalStatus {
    /// This node first, then peers ordered by their node key.
    fn into_devices(self) -> Vec<Device> {
        self.self_status
            .into_iter()
            .chain(self.peers.unwrap_or_default().into_values())
            .map(PeerStatus::into_device)
            .collect()
    }
}

impl PeerStatus {
    fn into_device(self) -> Device {
        Device {
            addresses: self.tailscale_ips.unwrap_or_default(),
            api: LOCAL_API_NAME.to_string(),
            authorized: true,
            hostname: self.host_name,
            id: self.id,
            os: self.os,
            tags: self.tags.unwrap_or_default(),
            ..Default::default()
        }
    }
}
