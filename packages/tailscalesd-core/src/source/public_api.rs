//! Tailscale public API source.

use super::DiscoverySource;
use crate::device::Device;
use crate::error::UpstreamError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Default base URL of the Tailscale public API
pub const DEFAULT_API_BASE: &str = "https://api.tailscale.com";

/// Lists devices through `GET /api/v2/tailnet/{tailnet}/devices`.
#[derive(Debug, Clone)]
pub struct PublicApiSource {
    client: reqwest::Client,
    api_base: String,
    api_host: String,
    tailnet: String,
    token: String,
}

impl PublicApiSource {
    pub fn new(
        api_base: &str,
        tailnet: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let api_base = api_base.trim().trim_end_matches('/').to_string();
        let url = reqwest::Url::parse(&api_base)
            .map_err(|e| UpstreamError::InvalidUrl(format!("{}: {}", api_base, e)))?;
        let api_host = url
            .host_str()
            .ok_or_else(|| UpstreamError::InvalidUrl(format!("{}: missing host", api_base)))?
            .to_string();

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_base,
            api_host,
            tailnet: tailnet.into(),
            token: token.into(),
        })
    }

    /// Host name reported in the `api` field of every device.
    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    fn devices_url(&self) -> String {
        format!("{}/api/v2/tailnet/{}/devices", self.api_base, self.tailnet)
    }

    fn to_device(&self, d: ApiDevice) -> Device {
        Device {
            addresses: d.addresses,
            api: self.api_host.clone(),
            authorized: d.authorized,
            client_version: d.client_version,
            hostname: d.hostname,
            id: d.id,
            name: d.name,
            os: d.os,
            tags: d.tags,
            tailnet: self.tailnet.clone(),
        }
    }
}

#[async_trait]
impl DiscoverySource for PublicApiSource {
    async fn devices(&self) -> Result<Vec<Device>, UpstreamError> {
        let url = self.devices_url();
        tracing::debug!("Fetching devices from {}", url);

        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.token, None::<&str>)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let body = resp.bytes().await?;
        let parsed: DevicesResponse = serde_json::from_slice(&body)?;
        tracing::debug!(
            "Public API returned {} devices for tailnet {}",
            parsed.devices.len(),
            self.tailnet
        );

        Ok(parsed.devices.into_iter().map(|d| self.to_device(d)).collect())
    }

    fn name(&self) -> &str {
        &self.api_host
    }
}

#[derive(Debug, Deserialize)]
struct DevicesResponse {
    devices: Vec<ApiDevice>,
}

/// A device as the public API reports it. Fields not needed for discovery are
/// ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ApiDevice {
    addresses: Vec<String>,
    authorized: bool,
    client_version: String,
    hostname: String,
    id: String,
    name: String,
    os: String,
    tags: Vec<String>,
}
