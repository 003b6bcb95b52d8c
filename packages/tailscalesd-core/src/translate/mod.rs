//! Translation of devices into Prometheus HTTP service discovery targets.
//!
//! See <https://prometheus.io/docs/prometheus/latest/http_sd/> for the format
//! Prometheus expects.

pub mod filter;
pub mod labels;

pub use filter::{filter_empty_labels, filter_ipv4_targets, Filter, DEFAULT_FILTERS};
pub use labels::LabelSet;

use crate::device::Device;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One target group as Prometheus expects it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Translate devices into target descriptors.
///
/// Every scalar device field becomes a label, then `filters` run in order.
/// A device with tags is fanned out into one descriptor per distinct
/// non-empty tag carrying that tag under `labels.tag`; a device without
/// such tags yields exactly one descriptor. Output follows device order, then tag order. Descriptors whose
/// targets were all filtered away are still returned.
pub fn translate(devices: &[Device], labels: &LabelSet, filters: &[Filter]) -> Vec<TargetDescriptor> {
    let mut found = Vec::with_capacity(devices.len());

    for device in devices {
        let base = TargetDescriptor {
            targets: device.addresses.clone(),
            labels: labels
                .device_labels(device)
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        };
        let target = filters.iter().fold(base, |td, filter| filter(td));

        let mut seen = BTreeSet::new();
        let tags: Vec<&String> = device
            .tags
            .iter()
            .filter(|tag| !tag.is_empty() && seen.insert(tag.as_str()))
            .collect();

        if tags.is_empty() || labels.tag.is_empty() {
            found.push(target);
            continue;
        }

        for tag in tags {
            let mut tagged = target.clone();
            tagged.labels.insert(labels.tag.clone(), tag.clone());
            found.push(tagged);
        }
    }

    found
}

/// Label scheme and filter pipeline used to answer discovery requests.
#[derive(Debug, Clone)]
pub struct Translator {
    labels: LabelSet,
    filters: Vec<Filter>,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(LabelSet::default(), DEFAULT_FILTERS.to_vec())
    }
}

impl Translator {
    pub fn new(labels: LabelSet, filters: Vec<Filter>) -> Self {
        Self { labels, filters }
    }

    pub fn translate(&self, devices: &[Device]) -> Vec<TargetDescriptor> {
        translate(devices, &self.labels, &self.filters)
    }
}

#[cfg(test)]
mod tests {
    use super::labels::*;
    use super::*;

    fn tagged_device() -> Device {
        Device {
            addresses: vec!["100.64.0.1".to_string(), "fd7a:115c:a1e0::1".to_string()],
            api: "api.tailscale.com".to_string(),
            authorized: true,
            client_version: "1.62.0".to_string(),
            hostname: "web1".to_string(),
            id: "12345".to_string(),
            name: "web1.example.ts.net".to_string(),
            os: "linux".to_string(),
            tags: vec!["tag:a".to_string(), "tag:b".to_string()],
            tailnet: "example.com".to_string(),
        }
    }

    #[test]
    fn test_translate_tag_fan_out() {
        let got = translate(&[tagged_device()], &LabelSet::default(), DEFAULT_FILTERS);

        assert_eq!(got.len(), 2);
        assert_eq!(got[0].labels[LABEL_META_DEVICE_TAG], "tag:a");
        assert_eq!(got[1].labels[LABEL_META_DEVICE_TAG], "tag:b");
        assert_eq!(got[0].targets, vec!["100.64.0.1".to_string()]);
        assert_eq!(got[0].targets, got[1].targets);

        let mut a = got[0].labels.clone();
        let mut b = got[1].labels.clone();
        a.remove(LABEL_META_DEVICE_TAG);
        b.remove(LABEL_META_DEVICE_TAG);
        assert_eq!(a, b);
    }

    #[test]
    fn test_translate_untagged_device() {
        let device = Device {
            tags: Vec::new(),
            ..tagged_device()
        };
        let got = translate(&[device], &LabelSet::default(), DEFAULT_FILTERS);

        assert_eq!(got.len(), 1);
        assert!(!got[0].labels.contains_key(LABEL_META_DEVICE_TAG));
        assert_eq!(got[0].labels[LABEL_META_API], "api.tailscale.com");
        assert_eq!(got[0].labels[LABEL_META_DEVICE_AUTHORIZED], "true");
        assert_eq!(got[0].labels[LABEL_META_DEVICE_CLIENT_VERSION], "1.62.0");
        assert_eq!(got[0].labels[LABEL_META_DEVICE_HOSTNAME], "web1");
        assert_eq!(got[0].labels[LABEL_META_DEVICE_ID], "12345");
        assert_eq!(got[0].labels[LABEL_META_DEVICE_NAME], "web1.example.ts.net");
        assert_eq!(got[0].labels[LABEL_META_DEVICE_OS], "linux");
        assert_eq!(got[0].labels[LABEL_META_TAILNET], "example.com");
    }

    #[test]
    fn test_translate_omits_empty_labels() {
        let device = Device {
            client_version: String::new(),
            name: String::new(),
            tailnet: String::new(),
            tags: Vec::new(),
            ..tagged_device()
        };
        let got = translate(&[device], &LabelSet::default(), DEFAULT_FILTERS);

        assert_eq!(got.len(), 1);
        assert!(!got[0].labels.contains_key(LABEL_META_DEVICE_CLIENT_VERSION));
        assert!(!got[0].labels.contains_key(LABEL_META_DEVICE_NAME));
        assert!(!got[0].labels.contains_key(LABEL_META_TAILNET));
        assert_eq!(got[0].labels.len(), 5);
    }

    #[test]
    fn test_translate_without_filters_keeps_everything() {
        let device = Device {
            addresses: vec!["not-an-ip".to_string()],
            tags: Vec::new(),
            ..Default::default()
        };
        let got = translate(&[device], &LabelSet::default(), &[]);

        assert_eq!(got[0].targets, vec!["not-an-ip".to_string()]);
        assert_eq!(got[0].labels.len(), 8);
        assert_eq!(got[0].labels[LABEL_META_DEVICE_NAME], "");
    }

    #[test]
    fn test_translate_keeps_device_with_no_usable_targets() {
        let device = Device {
            addresses: vec!["2001:db8::1".to_string(), "not-an-ip".to_string()],
            hostname: "v6only".to_string(),
            ..Default::default()
        };
        let got = translate(&[device], &LabelSet::default(), DEFAULT_FILTERS);

        assert_eq!(got.len(), 1);
        assert!(got[0].targets.is_empty());
        assert_eq!(got[0].labels[LABEL_META_DEVICE_HOSTNAME], "v6only");
    }

    #[test]
    fn test_translate_preserves_device_order() {
        let first = Device {
            hostname: "first".to_string(),
            tags: vec!["tag:x".to_string()],
            ..Default::default()
        };
        let second = Device {
            hostname: "second".to_string(),
            ..Default::default()
        };
        let got = translate(&[first, second], &LabelSet::default(), DEFAULT_FILTERS);

        let hostnames: Vec<&str> = got
            .iter()
            .map(|td| td.labels[LABEL_META_DEVICE_HOSTNAME].as_str())
            .collect();
        assert_eq!(hostnames, vec!["first", "second"]);
    }

    #[test]
    fn test_translate_is_pure() {
        let devices = vec![tagged_device(), Device::default()];
        let translator = Translator::default();
        assert_eq!(translator.translate(&devices), translator.translate(&devices));
    }

    #[test]
    fn test_translate_custom_label_set() {
        let labels = LabelSet {
            hostname: "host".to_string(),
            tag: "tag".to_string(),
            ..LabelSet::default()
        };
        let translator = Translator::new(labels, vec![filter_empty_labels]);
        let got = translator.translate(&[tagged_device()]);

        assert_eq!(got[0].labels["host"], "web1");
        assert_eq!(got[1].labels["tag"], "tag:b");
        assert!(!got[0].labels.contains_key(LABEL_META_DEVICE_HOSTNAME));
        // IPv6 survives without the address filter
        assert_eq!(got[0].targets.len(), 2);
    }

    #[test]
    fn test_translate_skips_empty_and_duplicate_tags() {
        let device = Device {
            tags: vec![
                "tag:a".to_string(),
                String::new(),
                "tag:b".to_string(),
                "tag:a".to_string(),
            ],
            ..tagged_device()
        };
        let got = translate(&[device], &LabelSet::default(), DEFAULT_FILTERS);

        let tags: Vec<&str> = got
            .iter()
            .map(|td| td.labels[LABEL_META_DEVICE_TAG].as_str())
            .collect();
        assert_eq!(tags, vec!["tag:a", "tag:b"]);

        let only_empty = Device {
            tags: vec![String::new()],
            ..tagged_device()
        };
        let got = translate(&[only_empty], &LabelSet::default(), DEFAULT_FILTERS);
        assert_eq!(got.len(), 1);
        assert!(!got[0].labels.contains_key(LABEL_META_DEVICE_TAG));
    }

    #[test]
    fn test_translate_without_tag_label() {
        let labels = LabelSet {
            tag: String::new(),
            ..LabelSet::default()
        };
        let got = translate(&[tagged_device()], &labels, DEFAULT_FILTERS);

        assert_eq!(got.len(), 1);
        assert!(!got[0].labels.contains_key(""));
        assert!(got[0].labels.values().all(|v| !v.is_empty()));
    }

    #[test]
    fn test_target_descriptor_json() {
        let td = TargetDescriptor {
            targets: vec!["100.64.0.1".to_string()],
            labels: BTreeMap::new(),
        };
        assert_eq!(
            serde_json::to_string(&td).unwrap(),
            r#"{"targets":["100.64.0.1"]}"#
        );

        let mut labels = BTreeMap::new();
        labels.insert(LABEL_META_DEVICE_OS.to_string(), "linux".to_string());
        let td = TargetDescriptor {
            targets: Vec::new(),
            labels,
        };
        assert_eq!(
            serde_json::to_string(&td).unwrap(),
            r#"{"targets":[],"labels":{"__meta_tailscale_device_os":"linux"}}"#
        );
    }
}
