//! Filters applied to every target descriptor before tag fan-out.

use super::TargetDescriptor;
use std::net::IpAddr;

/// A pure transformation of one target descriptor.
pub type Filter = fn(TargetDescriptor) -> TargetDescriptor;

/// The pipeline used when serving discovery requests.
pub const DEFAULT_FILTERS: &[Filter] = &[filter_empty_labels, filter_ipv4_targets];

/// Drop labels with an empty key or an empty value.
pub fn filter_empty_labels(td: TargetDescriptor) -> TargetDescriptor {
    TargetDescriptor {
        targets: td.targets,
        labels: td
            .labels
            .into_iter()
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .collect(),
    }
}

/// Keep only targets that are IPv4 addresses, in dotted-quad form.
///
/// Strings that are not IP addresses are dropped, and so is every IPv6
/// address except the IPv4-mapped form (`::ffff:a.b.c.d`), which is rewritten
/// to its IPv4 address.
pub fn filter_ipv4_targets(td: TargetDescriptor) -> TargetDescriptor {
    TargetDescriptor {
        targets: td
            .targets
            .iter()
            .filter_map(|target| canonical_ipv4(target))
            .collect(),
        labels: td.labels,
    }
}

fn canonical_ipv4(target: &str) -> Option<String> {
    match target.parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => Some(v4.to_string()),
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(|v4| v4.to_string()),
    }
}
