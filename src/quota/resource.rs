//! The closed vocabulary of tracked resource kinds
//!
//! Quota accounting only ever runs over this fixed, ordered set. Iterating
//! [`ResourceKind::ALL`] is the canonical way to visit every tracked kind;
//! resource maps keyed by anything else are ignored by the engine.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::quantity::Quantity;
use crate::Error;

/// A tracked resource kind.
///
/// The wire names match the Kubernetes resource-quota convention so that
/// `hard`/`used` maps read the same as native ResourceQuota objects.
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[non_exhaustive]
pub enum ResourceKind {
    /// CPU requested across the subtree (`requests.cpu`)
    #[serde(rename = "requests.cpu")]
    RequestsCpu,
    /// CPU limit across the subtree (`limits.cpu`)
    #[serde(rename = "limits.cpu")]
    LimitsCpu,
    /// Memory requested across the subtree (`requests.memory`)
    #[serde(rename = "requests.memory")]
    RequestsMemory,
    /// Memory limit across the subtree (`limits.memory`)
    #[serde(rename = "limits.memory")]
    LimitsMemory,
    /// Ephemeral storage requested (`requests.ephemeral-storage`)
    #[serde(rename = "requests.ephemeral-storage")]
    RequestsEphemeralStorage,
    /// Ephemeral storage limit (`limits.ephemeral-storage`)
    #[serde(rename = "limits.ephemeral-storage")]
    LimitsEphemeralStorage,
    /// Persistent storage requested (`requests.storage`)
    #[serde(rename = "requests.storage")]
    RequestsStorage,
    /// GPUs requested (`requests.nvidia.com/gpu`)
    #[serde(rename = "requests.nvidia.com/gpu")]
    RequestsGpu,
    /// Pod count (`pods`)
    #[serde(rename = "pods")]
    Pods,
}

impl ResourceKind {
    /// Every tracked resource kind, in canonical order.
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::RequestsCpu,
        ResourceKind::LimitsCpu,
        ResourceKind::RequestsMemory,
        ResourceKind::LimitsMemory,
        ResourceKind::RequestsEphemeralStorage,
        ResourceKind::LimitsEphemeralStorage,
        ResourceKind::RequestsStorage,
        ResourceKind::RequestsGpu,
        ResourceKind::Pods,
    ];

    /// The wire name of this resource kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::RequestsCpu => "requests.cpu",
            ResourceKind::LimitsCpu => "limits.cpu",
            ResourceKind::RequestsMemory => "requests.memory",
            ResourceKind::LimitsMemory => "limits.memory",
            ResourceKind::RequestsEphemeralStorage => "requests.ephemeral-storage",
            ResourceKind::LimitsEphemeralStorage => "limits.ephemeral-storage",
            ResourceKind::RequestsStorage => "requests.storage",
            ResourceKind::RequestsGpu => "requests.nvidia.com/gpu",
            ResourceKind::Pods => "pods",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| Error::decode(format!("unknown resource kind {s:?}")))
    }
}

/// A mapping of resource kind to quantity (`hard` and `used` maps).
pub type ResourceList = BTreeMap<ResourceKind, Quantity>;

/// Lookup helpers for [`ResourceList`].
pub trait ResourceListExt {
    /// Quantity for `kind`, or zero if absent.
    fn get_or_zero(&self, kind: ResourceKind) -> Quantity;

    /// Add every entry of `other` into this list.
    fn add_list(&mut self, other: &ResourceList);
}

impl ResourceListExt for ResourceList {
    fn get_or_zero(&self, kind: ResourceKind) -> Quantity {
        self.get(&kind).copied().unwrap_or(Quantity::ZERO)
    }

    fn add_list(&mut self, other: &ResourceList) {
        for (kind, quantity) in other {
            let entry = self.entry(*kind).or_insert(Quantity::ZERO);
            *entry += *quantity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_is_closed_and_ordered() {
        assert_eq!(ResourceKind::ALL.len(), 9);
        assert_eq!(ResourceKind::ALL[0], ResourceKind::RequestsCpu);
        assert_eq!(ResourceKind::ALL[8], ResourceKind::Pods);
    }

    #[test]
    fn wire_names_round_trip() {
        for kind in ResourceKind::ALL {
            let parsed: ResourceKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("requests.fpga".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn serde_uses_wire_names_as_map_keys() {
        let mut list = ResourceList::new();
        list.insert(ResourceKind::RequestsCpu, Quantity::from_units(2));
        list.insert(ResourceKind::Pods, Quantity::from_units(10));

        let json = serde_json::to_string(&list).unwrap();
        assert!(json.contains("\"requests.cpu\":\"2\""));
        assert!(json.contains("\"pods\":\"10\""));

        let back: ResourceList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, list);
    }

    #[test]
    fn get_or_zero_defaults_missing_kinds() {
        let mut list = ResourceList::new();
        list.insert(ResourceKind::RequestsCpu, Quantity::from_units(1));
        assert_eq!(
            list.get_or_zero(ResourceKind::RequestsCpu),
            Quantity::from_units(1)
        );
        assert_eq!(list.get_or_zero(ResourceKind::Pods), Quantity::ZERO);
    }

    #[test]
    fn add_list_sums_per_kind() {
        let mut a = ResourceList::new();
        a.insert(ResourceKind::RequestsCpu, Quantity::from_units(1));

        let mut b = ResourceList::new();
        b.insert(ResourceKind::RequestsCpu, Quantity::from_units(2));
        b.insert(ResourceKind::Pods, Quantity::from_units(5));

        a.add_list(&b);
        assert_eq!(
            a.get_or_zero(ResourceKind::RequestsCpu),
            Quantity::from_units(3)
        );
        assert_eq!(a.get_or_zero(ResourceKind::Pods), Quantity::from_units(5));
    }
}
