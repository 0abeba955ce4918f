//! Usage propagation
//!
//! After a child quota changes, its parent's `status.used` must be brought
//! back in line. Two variants exist and deliberately take different
//! correctness strategies:
//!
//! - [`propagate_tree_child`] (tree child → tree parent) applies a *delta*:
//!   the difference between the child's old and new hard limits is folded
//!   into the parent's recorded usage.
//! - [`propagate_leaf_child`] (leaf child → tree parent) performs a *full
//!   rescan*: the parent's usage is recomputed from scratch by resolving
//!   every registered child identifier back to a live leaf and summing its
//!   hard limits. Orphaned identifiers are dropped along the way, which
//!   makes this variant self-healing under contention.
//!
//! Both variants maintain the parent's `subQuotas` membership list and
//! persist through a read-modify-write loop: the parent is re-fetched
//! immediately before every write and the write is retried on conflict up to
//! a bounded budget. Budget exhaustion surfaces as an error to the caller.

use tracing::warn;

use crate::cluster::QuotaClient;
use crate::crd::{LeafQuota, TreeQuota, TreeQuotaStatus};
use crate::quota::child::decode_leaf_child_id;
use crate::quota::quantity::Quantity;
use crate::quota::resource::{ResourceKind, ResourceList, ResourceListExt};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::{Error, Result};

/// Update the parent of a tree quota with the delta between the child's old
/// and new hard limits.
///
/// `old_hard` is the child's prior hard map when the caller has one (the
/// admission path does, on update); when absent the recorded baseline is the
/// child's own `status.hard` if the child is already registered with the
/// parent, or zero if it is not. With `flush` set the child's contribution
/// is subtracted and its identifier removed from the parent's child list.
///
/// A missing parent is a hard error for this variant: there is no local
/// source of truth to rebuild from.
pub async fn propagate_tree_child(
    pivot: &dyn QuotaClient,
    child: &TreeQuota,
    old_hard: Option<&ResourceList>,
    flush: bool,
) -> Result<()> {
    let Some(parent_name) = child.parent_name() else {
        return Ok(());
    };
    let id_string = child.child_id();
    let id = id_string.as_str();

    let result = retry_with_backoff(
        &RetryConfig::status_update(),
        "propagate_tree_child",
        || async move {
            let latest = fetch_parent(pivot, parent_name).await?;
            let mut status = latest.status_or_default();
            let registered = status.sub_quotas.iter().any(|c| c == id);

            if flush {
                if !registered {
                    // Already flushed by a concurrent path; nothing to undo.
                    return Ok(());
                }
                let recorded = recorded_hard(child, old_hard);
                for kind in ResourceKind::ALL {
                    let Some(quantity) = recorded.get(&kind) else {
                        continue;
                    };
                    let entry = status.used.entry(kind).or_insert(Quantity::ZERO);
                    *entry -= *quantity;
                }
                status.sub_quotas.retain(|c| c != id);
            } else {
                let baseline = match old_hard {
                    Some(hard) => hard.clone(),
                    None if registered => child.status_or_default().hard,
                    None => ResourceList::new(),
                };
                for kind in ResourceKind::ALL {
                    let old = baseline.get_or_zero(kind);
                    let new = child.spec.hard.get_or_zero(kind);
                    if old == new {
                        continue;
                    }
                    let entry = status.used.entry(kind).or_insert(Quantity::ZERO);
                    *entry = *entry - old + new;

                    if let Some(hard) = status.hard.get(&kind) {
                        if *entry > *hard {
                            // Soft warning only: the admission check is the
                            // gate, propagation never rejects a write.
                            warn!(
                                parent = %parent_name,
                                resource = %kind,
                                used = %entry,
                                hard = %hard,
                                "parent used exceeds hard after delta propagation"
                            );
                        }
                    }
                }
                if !registered {
                    status.sub_quotas.push(id.to_string());
                }
            }

            persist_if_changed(pivot, &latest, status).await
        },
    )
    .await;

    map_retry_exhaustion(result, parent_name)
}

/// Recompute the parent of a leaf quota by rescanning every registered child.
///
/// With `flush` set the leaf's identifier is removed from the parent's child
/// list before the rescan, so its hard limits drop out of the sum. Without
/// it the identifier is inserted (no duplicates) and, if the leaf itself is
/// not yet readable in the member cluster, its in-flight hard limits are
/// substituted for the missing read.
pub async fn propagate_leaf_child(
    pivot: &dyn QuotaClient,
    member: &dyn QuotaClient,
    leaf: &LeafQuota,
    flush: bool,
) -> Result<()> {
    let Some(parent_name) = leaf.parent_name() else {
        return Ok(());
    };
    let id_string = leaf.child_id()?;
    let id = id_string.as_str();

    let result = retry_with_backoff(
        &RetryConfig::status_update(),
        "propagate_leaf_child",
        || async move {
            let latest = fetch_parent(pivot, parent_name).await?;
            let mut status = latest.status_or_default();

            if flush {
                status.sub_quotas.retain(|c| c != id);
            } else if !status.sub_quotas.iter().any(|c| c == id) {
                status.sub_quotas.push(id.to_string());
            }

            // Rebuild used from scratch: zero for every granted kind, then
            // the sum of every live child's hard limits.
            let mut used: ResourceList = status
                .hard
                .keys()
                .map(|kind| (*kind, Quantity::ZERO))
                .collect();
            let mut live = Vec::with_capacity(status.sub_quotas.len());

            for child_id in &status.sub_quotas {
                let (name, namespace) = match decode_leaf_child_id(child_id) {
                    Ok(parts) => parts,
                    Err(e) => {
                        warn!(
                            parent = %parent_name,
                            id = %child_id,
                            error = %e,
                            "dropping undecodable sub quota id"
                        );
                        continue;
                    }
                };
                match member.get_leaf(&namespace, &name).await? {
                    Some(child) => {
                        used.add_list(&child.spec.hard);
                        live.push(child_id.clone());
                    }
                    None if child_id == id && !flush => {
                        // The write that triggered us has not landed in the
                        // member cluster yet; count the in-flight hard.
                        used.add_list(&leaf.spec.hard);
                        live.push(child_id.clone());
                    }
                    None => {
                        warn!(
                            parent = %parent_name,
                            id = %child_id,
                            "dropping sub quota id of a leaf that no longer exists"
                        );
                    }
                }
            }

            status.sub_quotas = live;
            status.used = used;

            persist_if_changed(pivot, &latest, status).await
        },
    )
    .await;

    map_retry_exhaustion(result, parent_name)
}

/// Re-fetch the parent immediately before mutating it.
async fn fetch_parent(pivot: &dyn QuotaClient, name: &str) -> Result<TreeQuota> {
    pivot
        .get_tree(name)
        .await?
        .ok_or_else(|| Error::cluster(format!("parent quota {name} not found")))
}

/// Write the recomputed status unless it matches what is already stored.
async fn persist_if_changed(
    pivot: &dyn QuotaClient,
    latest: &TreeQuota,
    status: TreeQuotaStatus,
) -> Result<()> {
    if latest.status_or_default() == status {
        return Ok(());
    }
    let mut updated = latest.clone();
    updated.status = Some(status);
    pivot.update_tree_status(&updated).await?;
    Ok(())
}

/// The hard limits a flushed child had contributed to its parent.
fn recorded_hard(child: &TreeQuota, old_hard: Option<&ResourceList>) -> ResourceList {
    if let Some(hard) = old_hard {
        return hard.clone();
    }
    let status_hard = child.status_or_default().hard;
    if status_hard.is_empty() {
        child.spec.hard.clone()
    } else {
        status_hard
    }
}

/// Turn an exhausted conflict budget into the propagator's own error kind.
fn map_retry_exhaustion(result: Result<()>, parent_name: &str) -> Result<()> {
    result.map_err(|e| {
        if e.is_conflict() {
            Error::StatusConflict(format!(
                "gave up updating status of parent quota {parent_name}: {e}"
            ))
        } else {
            e
        }
    })
}
