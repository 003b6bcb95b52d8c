//! Label names attached to discovered targets.

use crate::device::Device;

/// Host which provided the details about this device. "localhost" for the
/// local API.
pub const LABEL_META_API: &str = "__meta_tailscale_api";

/// Whether the target is currently authorized on the tailnet. Always true when
/// using the local API.
pub const LABEL_META_DEVICE_AUTHORIZED: &str = "__meta_tailscale_device_authorized";

/// Tailscale client version running on the target. Not reported by the local
/// API.
pub const LABEL_META_DEVICE_CLIENT_VERSION: &str = "__meta_tailscale_device_client_version";

/// Short hostname of the device.
pub const LABEL_META_DEVICE_HOSTNAME: &str = "__meta_tailscale_device_hostname";

/// Unique ID of the target. The public API reports a large integer, the local
/// API an opaque string.
pub const LABEL_META_DEVICE_ID: &str = "__meta_tailscale_device_id";

/// Device name as reported by the public API. Not reported by the local API.
pub const LABEL_META_DEVICE_NAME: &str = "__meta_tailscale_device_name";

/// Operating system of the target.
pub const LABEL_META_DEVICE_OS: &str = "__meta_tailscale_device_os";

/// One ACL tag applied to the target. Devices with several tags yield one
/// target group per tag.
pub const LABEL_META_DEVICE_TAG: &str = "__meta_tailscale_device_tag";

/// Tailnet the target was discovered in. Not reported by the local API.
pub const LABEL_META_TAILNET: &str = "__meta_tailscale_tailnet";

/// The label key used for each device field.
///
/// Passed to the translator explicitly so alternative naming schemes can be
/// swapped in without touching any global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    pub api: String,
    pub authorized: String,
    pub client_version: String,
    pub hostname: String,
    pub id: String,
    pub name: String,
    pub os: String,
    pub tag: String,
    pub tailnet: String,
}

impl Default for LabelSet {
    fn default() -> Self {
        Self {
            api: LABEL_META_API.to_string(),
            authorized: LABEL_META_DEVICE_AUTHORIZED.to_string(),
            client_version: LABEL_META_DEVICE_CLIENT_VERSION.to_string(),
            hostname: LABEL_META_DEVICE_HOSTNAME.to_string(),
            id: LABEL_META_DEVICE_ID.to_string(),
            name: LABEL_META_DEVICE_NAME.to_string(),
            os: LABEL_META_DEVICE_OS.to_string(),
            tag: LABEL_META_DEVICE_TAG.to_string(),
            tailnet: LABEL_META_TAILNET.to_string(),
        }
    }
}

impl LabelSet {
    /// Every scalar field of `device` paired with its label key, in a fixed
    /// order. Tags are excluded; they are fanned out separately.
    pub fn device_labels<'a>(&'a self, device: &'a Device) -> [(&'a str, String); 8] {
        [
            (self.api.as_str(), device.api.clone()),
            (self.authorized.as_str(), device.authorized.to_string()),
            (self.client_version.as_str(), device.client_version.clone()),
            (self.hostname.as_str(), device.hostname.clone()),
            (self.id.as_str(), device.id.clone()),
            (self.name.as_str(), device.name.clone()),
            (self.os.as_str(), device.os.clone()),
            (self.tailnet.as_str(), device.tailnet.clone()),
        ]
    }
}
