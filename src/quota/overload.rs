//! Overload evaluation
//!
//! An overload is a proposed hard-limit change that would push the parent's
//! recorded usage past the parent's own hard limit. The check is
//! single-level: it compares a node against its immediate parent's *stored*
//! `used`, and relies on usage propagation to keep that value accurate.
//! Both the tree and leaf variants share one algorithm shape and differ only
//! in how detailed their denial reasons are.

use crate::cluster::QuotaClient;
use crate::crd::{LeafQuota, TreeQuota};
use crate::quota::parent::{parent_name_of, resolve_parent};
use crate::quota::quantity::Quantity;
use crate::quota::resource::{ResourceKind, ResourceList};
use crate::Result;

/// A detected overload, naming the failing resource kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Overload {
    /// The first resource kind that failed the check
    pub resource: ResourceKind,
    /// Human-readable denial reason
    pub reason: String,
}

/// How detailed the denial reason should be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReasonDetail {
    /// Tree variant: one canonical overload message
    Tree,
    /// Leaf variant: distinguishes the individual failure cases
    Leaf,
}

/// Evaluate whether a tree-quota create/update would overload its parent.
///
/// Tenant-kind nodes bypass the check entirely; root nodes trivially pass.
/// `old` is the prior version on update and `None` on create.
pub async fn evaluate_tree_child(
    pivot: &dyn QuotaClient,
    current: &TreeQuota,
    old: Option<&TreeQuota>,
) -> Result<Option<Overload>> {
    if current.spec.target.kind.bypasses_overload_check() {
        return Ok(None);
    }

    let parent_name = parent_name_of(
        current.parent_name(),
        old.and_then(TreeQuota::parent_name),
    );
    let Some(parent) = resolve_parent(pivot, parent_name).await? else {
        return Ok(None);
    };

    let empty = ResourceList::new();
    let old_hard = old.map(|o| &o.spec.hard).unwrap_or(&empty);
    Ok(check_against_parent(
        &parent,
        &current.spec.hard,
        old_hard,
        ReasonDetail::Tree,
    ))
}

/// Evaluate whether a leaf-quota create/update would overload its parent.
///
/// `old` is the prior version on update and `None` on create.
pub async fn evaluate_leaf_child(
    pivot: &dyn QuotaClient,
    current: &LeafQuota,
    old: Option<&LeafQuota>,
) -> Result<Option<Overload>> {
    let parent_name = parent_name_of(
        current.parent_name(),
        old.and_then(LeafQuota::parent_name),
    );
    let Some(parent) = resolve_parent(pivot, parent_name).await? else {
        return Ok(None);
    };

    let empty = ResourceList::new();
    let old_hard = old.map(|o| &o.spec.hard).unwrap_or(&empty);
    Ok(check_against_parent(
        &parent,
        &current.spec.hard,
        old_hard,
        ReasonDetail::Leaf,
    ))
}

/// Run the per-resource check against the parent's stored status.
///
/// Resource kinds are visited in vocabulary order; the first failing kind
/// produces the verdict.
fn check_against_parent(
    parent: &TreeQuota,
    new_hard: &ResourceList,
    old_hard: &ResourceList,
    detail: ReasonDetail,
) -> Option<Overload> {
    let parent_name = parent.metadata.name.as_deref().unwrap_or_default();
    let status = parent.status_or_default();

    for kind in ResourceKind::ALL {
        let parent_hard = status.hard.get(&kind).copied();
        let parent_used = status.used.get(&kind).copied();
        let new = new_hard.get(&kind).copied();
        let old = old_hard.get(&kind).copied();

        // Neither side tracks this kind.
        if parent_hard.is_none() && new.is_none() {
            continue;
        }

        // The child requests a kind the parent does not grant (or whose
        // usage the parent has never recorded).
        if new.is_some() {
            if parent_hard.is_none() {
                return Some(overload(
                    kind,
                    match detail {
                        ReasonDetail::Leaf => format!(
                            "resource {kind} not present in hard of parent quota {parent_name}"
                        ),
                        ReasonDetail::Tree => overload_reason(
                            kind,
                            parent_used.unwrap_or(Quantity::ZERO),
                            new.unwrap_or(Quantity::ZERO) - old.unwrap_or(Quantity::ZERO),
                            Quantity::ZERO,
                        ),
                    },
                ));
            }
            if parent_used.is_none() {
                return Some(overload(
                    kind,
                    match detail {
                        ReasonDetail::Leaf => format!(
                            "resource {kind} not present in used of parent quota {parent_name}"
                        ),
                        ReasonDetail::Tree => overload_reason(
                            kind,
                            Quantity::ZERO,
                            new.unwrap_or(Quantity::ZERO) - old.unwrap_or(Quantity::ZERO),
                            parent_hard.unwrap_or(Quantity::ZERO),
                        ),
                    },
                ));
            }
        }

        // A kind the prior version tracked cannot be dropped outright.
        if new.is_none() {
            if old.is_some() {
                return Some(overload(
                    kind,
                    match detail {
                        ReasonDetail::Leaf => format!(
                            "quota has fewer resources than parent quota {parent_name} has: {kind} was dropped"
                        ),
                        ReasonDetail::Tree => format!(
                            "request of quota overload: {kind} was dropped from hard"
                        ),
                    },
                ));
            }
            continue;
        }

        let hard = parent_hard.unwrap_or(Quantity::ZERO);
        let used = parent_used.unwrap_or(Quantity::ZERO);
        let changed = new.unwrap_or(Quantity::ZERO) - old.unwrap_or(Quantity::ZERO);
        let would_use = used + changed;
        if would_use > hard || would_use.is_negative() {
            return Some(overload(kind, overload_reason(kind, used, changed, hard)));
        }
    }

    None
}

fn overload(resource: ResourceKind, reason: String) -> Overload {
    Overload { resource, reason }
}

fn overload_reason(kind: ResourceKind, used: Quantity, changed: Quantity, hard: Quantity) -> String {
    format!(
        "request of quota overload: {kind}: parent used {used} changed by {changed} exceeds hard {hard}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockQuotaClient;
    use crate::crd::{QuotaTarget, TargetKind, TreeQuotaSpec, TreeQuotaStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn units(n: i64) -> Quantity {
        Quantity::from_units(n)
    }

    fn list(entries: &[(ResourceKind, i64)]) -> ResourceList {
        entries
            .iter()
            .map(|(kind, n)| (*kind, units(*n)))
            .collect()
    }

    fn parent(name: &str, hard: &[(ResourceKind, i64)], used: &[(ResourceKind, i64)]) -> TreeQuota {
        TreeQuota {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: TreeQuotaSpec {
                target: QuotaTarget {
                    kind: TargetKind::NodesPool,
                    name: name.to_string(),
                },
                parent: None,
                hard: list(hard),
            },
            status: Some(TreeQuotaStatus {
                hard: list(hard),
                used: list(used),
                sub_quotas: vec![],
            }),
        }
    }

    fn child(name: &str, kind: TargetKind, parent: &str, hard: &[(ResourceKind, i64)]) -> TreeQuota {
        TreeQuota {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: TreeQuotaSpec {
                target: QuotaTarget {
                    kind,
                    name: name.to_string(),
                },
                parent: Some(parent.to_string()),
                hard: list(hard),
            },
            status: None,
        }
    }

    fn leaf(name: &str, parent: &str, hard: &[(ResourceKind, i64)]) -> LeafQuota {
        LeafQuota {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                labels: Some(BTreeMap::from([(
                    crate::PARENT_LABEL.to_string(),
                    parent.to_string(),
                )])),
                ..Default::default()
            },
            spec: crate::crd::LeafQuotaSpec { hard: list(hard) },
        }
    }

    fn pivot_with(parent_quota: TreeQuota) -> MockQuotaClient {
        let mut mock = MockQuotaClient::new();
        mock.expect_get_tree()
            .returning(move |_| Ok(Some(parent_quota.clone())));
        mock
    }

    const CPU: ResourceKind = ResourceKind::RequestsCpu;

    /// Story: Tenant bypass.
    ///
    /// A Tenant-kind node asking for far more than its NodesPool parent has
    /// left must still be allowed, while a Project-kind sibling with the
    /// same request is denied.
    #[tokio::test]
    async fn tenant_kind_bypasses_the_check() {
        let pool = parent("pool-1", &[(CPU, 10)], &[(CPU, 10)]);
        let pivot = pivot_with(pool);

        let tenant = child("tenant-a", TargetKind::Tenant, "pool-1", &[(CPU, 100)]);
        assert!(evaluate_tree_child(&pivot, &tenant, None)
            .await
            .unwrap()
            .is_none());

        let project = child("proj-1", TargetKind::Project, "pool-1", &[(CPU, 100)]);
        let verdict = evaluate_tree_child(&pivot, &project, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(verdict.resource, CPU);
        assert!(verdict.reason.contains("request of quota overload"));
    }

    #[tokio::test]
    async fn root_nodes_are_never_overloaded() {
        let mock = MockQuotaClient::new();
        let mut root = child("root", TargetKind::NodesPool, "", &[(CPU, 100)]);
        root.spec.parent = None;
        assert!(evaluate_tree_child(&mock, &root, None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn create_within_headroom_is_allowed() {
        let pool = parent("pool-1", &[(CPU, 10)], &[(CPU, 4)]);
        let pivot = pivot_with(pool);

        let project = child("proj-1", TargetKind::Project, "pool-1", &[(CPU, 6)]);
        assert!(evaluate_tree_child(&pivot, &project, None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn create_past_headroom_is_overloaded() {
        let pool = parent("pool-1", &[(CPU, 10)], &[(CPU, 4)]);
        let pivot = pivot_with(pool);

        let project = child("proj-1", TargetKind::Project, "pool-1", &[(CPU, 7)]);
        let verdict = evaluate_tree_child(&pivot, &project, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(verdict.resource, CPU);
    }

    #[tokio::test]
    async fn update_is_judged_on_the_delta() {
        // Parent is full (10/10) but the child already holds 5 of it, so
        // shrinking to 3 frees headroom and growing to 11 does not fit.
        let pool = parent("pool-1", &[(CPU, 10)], &[(CPU, 10)]);
        let pivot = pivot_with(pool);

        let old = child("proj-1", TargetKind::Project, "pool-1", &[(CPU, 5)]);
        let shrink = child("proj-1", TargetKind::Project, "pool-1", &[(CPU, 3)]);
        assert!(evaluate_tree_child(&pivot, &shrink, Some(&old))
            .await
            .unwrap()
            .is_none());

        let grow = child("proj-1", TargetKind::Project, "pool-1", &[(CPU, 6)]);
        assert!(evaluate_tree_child(&pivot, &grow, Some(&old))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn requesting_a_kind_the_parent_lacks_is_overloaded() {
        let pool = parent("pool-1", &[(CPU, 10)], &[(CPU, 0)]);
        let pivot = pivot_with(pool);

        let project = child(
            "proj-1",
            TargetKind::Project,
            "pool-1",
            &[(ResourceKind::RequestsGpu, 1)],
        );
        let verdict = evaluate_tree_child(&pivot, &project, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(verdict.resource, ResourceKind::RequestsGpu);
    }

    #[tokio::test]
    async fn dropping_a_tracked_kind_is_overloaded() {
        let pool = parent("pool-1", &[(CPU, 10)], &[(CPU, 5)]);
        let pivot = pivot_with(pool);

        let old = child("proj-1", TargetKind::Project, "pool-1", &[(CPU, 5)]);
        let dropped = child("proj-1", TargetKind::Project, "pool-1", &[]);
        let verdict = evaluate_tree_child(&pivot, &dropped, Some(&old))
            .await
            .unwrap()
            .unwrap();
        assert!(verdict.reason.contains("dropped"));
    }

    #[tokio::test]
    async fn missing_parent_surfaces_as_error() {
        let mut mock = MockQuotaClient::new();
        mock.expect_get_tree().returning(|_| Ok(None));

        let project = child("proj-1", TargetKind::Project, "ghost", &[(CPU, 1)]);
        assert!(evaluate_tree_child(&mock, &project, None).await.is_err());
    }

    #[tokio::test]
    async fn leaf_reasons_name_the_failure_case() {
        // Parent grants cpu but has never recorded usage for memory.
        let mut pool = parent("proj-1", &[(CPU, 10)], &[(CPU, 0)]);
        pool.status
            .as_mut()
            .unwrap()
            .hard
            .insert(ResourceKind::RequestsMemory, units(8));
        let pivot = pivot_with(pool);

        let missing_hard = leaf("app", "proj-1", &[(ResourceKind::RequestsGpu, 1)]);
        let verdict = evaluate_leaf_child(&pivot, &missing_hard, None)
            .await
            .unwrap()
            .unwrap();
        assert!(verdict.reason.contains("not present in hard"));

        let missing_used = leaf("app", "proj-1", &[(ResourceKind::RequestsMemory, 1)]);
        let verdict = evaluate_leaf_child(&pivot, &missing_used, None)
            .await
            .unwrap()
            .unwrap();
        assert!(verdict.reason.contains("not present in used"));

        let too_big = leaf("app", "proj-1", &[(CPU, 11)]);
        let verdict = evaluate_leaf_child(&pivot, &too_big, None)
            .await
            .unwrap()
            .unwrap();
        assert!(verdict.reason.contains("request of quota overload"));
    }

    #[tokio::test]
    async fn leaf_dropping_a_kind_mentions_fewer_resources() {
        let pool = parent("proj-1", &[(CPU, 10)], &[(CPU, 5)]);
        let pivot = pivot_with(pool);

        let old = leaf("app", "proj-1", &[(CPU, 5)]);
        let dropped = leaf("app", "proj-1", &[]);
        let verdict = evaluate_leaf_child(&pivot, &dropped, Some(&old))
            .await
            .unwrap()
            .unwrap();
        assert!(verdict.reason.contains("fewer resources than parent"));
    }

    #[tokio::test]
    async fn exact_fit_is_allowed() {
        let pool = parent("pool-1", &[(CPU, 10)], &[(CPU, 4)]);
        let pivot = pivot_with(pool);

        let project = child("proj-1", TargetKind::Project, "pool-1", &[(CPU, 6)]);
        assert!(evaluate_tree_child(&pivot, &project, None)
            .await
            .unwrap()
            .is_none());
    }
}
