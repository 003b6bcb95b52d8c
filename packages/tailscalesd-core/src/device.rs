//! Normalized device records shared by every discovery source.

use serde::{Deserialize, Serialize};

/// A single tailnet member as reported by a discovery source.
///
/// Sources use the empty string or an empty list for anything they don't
/// report; the local API, for instance, never knows the client version,
/// device name or tailnet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Tailscale IPs assigned to the device, any IP version.
    pub addresses: Vec<String>,
    /// Which API produced this record ("localhost" for the local API).
    pub api: String,
    /// Whether the device is authorized on the tailnet.
    pub authorized: bool,
    pub client_version: String,
    /// Short hostname of the device.
    pub hostname: String,
    /// Integer ID from the public API, opaque stable ID from the local API.
    pub id: String,
    pub name: String,
    pub os: String,
    /// ACL tags applied to the device, in the order reported.
    pub tags: Vec<String>,
    pub tailnet: String,
}
