//! Parent resolution
//!
//! A node's immediate parent is always a `TreeQuota` in the pivot cluster.
//! Resolution takes the parent name from whichever snapshot exists for the
//! operation at hand (current on create/update, the pre-deletion snapshot on
//! delete); a missing name means the node is a root.

use crate::cluster::QuotaClient;
use crate::crd::TreeQuota;
use crate::{Error, Result};

/// Resolve the immediate parent of a node.
///
/// Returns `Ok(None)` when `parent` is absent or empty (root node). A named
/// parent that cannot be fetched from the pivot cluster is an error, not a
/// silent root: callers must fail closed rather than skip enforcement.
pub async fn resolve_parent(
    pivot: &dyn QuotaClient,
    parent: Option<&str>,
) -> Result<Option<TreeQuota>> {
    let Some(name) = parent.filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    match pivot.get_tree(name).await? {
        Some(quota) => Ok(Some(quota)),
        None => Err(Error::cluster(format!("parent quota {name} not found"))),
    }
}

/// Pick the parent name from the current snapshot, falling back to the old
/// one (delete operations only carry the old snapshot).
pub fn parent_name_of<'a>(current: Option<&'a str>, old: Option<&'a str>) -> Option<&'a str> {
    current.or(old)
}
