//! Composite queries built purely on the read-only closure surface.
//!
//! - [`check_cycle_risk`]: guard for moves
//! - [`nearest_ancestor_where`]: closest ancestor with some property
//! - [`order_bottom_up`]: descendants-first ordering for batch deletes
//! - [`deletion_preview`]: what a bulk delete may remove once locked
//!   nodes and the folders holding them are spared

use std::collections::BTreeSet;

use serde::Serialize;

use crate::closure::{require_present, ClosureIndex};
use crate::error::{ClosureError, Result};
use crate::types::{Ancestor, NodeId};

/// Fail with `CycleRisk` when `candidate_parent` lies inside the subtree
/// rooted at `subtree_root` (the root itself included).
pub fn check_cycle_risk<I: ClosureIndex + ?Sized>(
    index: &I,
    subtree_root: NodeId,
    candidate_parent: NodeId,
) -> Result<()> {
    require_present(index, subtree_root)?;
    require_present(index, candidate_parent)?;
    if index.is_ancestor(subtree_root, candidate_parent)? {
        return Err(ClosureError::CycleRisk {
            forest: index.forest(),
            subtree_root,
            candidate_parent,
        });
    }
    Ok(())
}

/// Closest ancestor of `node` (itself at depth 0 included) accepted by
/// `predicate`.
pub fn nearest_ancestor_where<I, P>(
    index: &I,
    node: NodeId,
    mut predicate: P,
) -> Result<Option<Ancestor>>
where
    I: ClosureIndex + ?Sized,
    P: FnMut(&Ancestor) -> bool,
{
    require_present(index, node)?;
    Ok(index
        .ancestors_of(node)?
        .into_iter()
        .find(|ancestor| predicate(ancestor)))
}

/// Sort `nodes` so that every node comes after all of its descendants.
///
/// A descendant always has strictly more ancestors than any of its own
/// ancestors, so sorting by ancestor count (descending) is enough. Ids
/// break ties to keep the order deterministic. Repeated ids are dropped.
pub fn order_bottom_up<I: ClosureIndex + ?Sized>(
    index: &I,
    nodes: &[NodeId],
) -> Result<Vec<NodeId>> {
    let unique: BTreeSet<NodeId> = nodes.iter().copied().collect();
    let mut keyed = Vec::with_capacity(unique.len());
    for node in unique {
        require_present(index, node)?;
        keyed.push((index.ancestor_count(node)?, node));
    }
    keyed.sort_by(|(da, a), (db, b)| db.cmp(da).then(a.cmp(b)));
    Ok(keyed.into_iter().map(|(_, node)| node).collect())
}

/// Every node of the subtrees rooted at `targets`.
pub fn expand_subtrees<I: ClosureIndex + ?Sized>(
    index: &I,
    targets: &[NodeId],
) -> Result<BTreeSet<NodeId>> {
    let mut all = BTreeSet::new();
    for &target in targets {
        require_present(index, target)?;
        all.extend(index.descendants_of(target)?);
    }
    Ok(all)
}

/// Outcome of a bulk-deletion dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionPreview {
    /// Removable nodes, descendants first; ready for a batch delete.
    pub deletable: Vec<NodeId>,
    /// Nodes that must stay: locked themselves or holding a locked node.
    pub locked: BTreeSet<NodeId>,
}

impl DeletionPreview {
    pub fn is_fully_deletable(&self) -> bool {
        self.locked.is_empty()
    }
}

/// Dry-run deleting the subtrees rooted at `targets`.
///
/// A node accepted by `is_locked` cannot be deleted, and neither can any
/// of its ancestors inside the deletion set, since they would leave it
/// without a parent. Everything else is deletable; because a deletable
/// node has no locked descendant, the deletable set is closed under
/// descendants.
pub fn deletion_preview<I, P>(
    index: &I,
    targets: &[NodeId],
    mut is_locked: P,
) -> Result<DeletionPreview>
where
    I: ClosureIndex + ?Sized,
    P: FnMut(NodeId) -> bool,
{
    let candidates = expand_subtrees(index, targets)?;

    let mut locked = BTreeSet::new();
    for &node in candidates.iter().filter(|&&n| is_locked(n)) {
        for ancestor in index.ancestors_of(node)? {
            if candidates.contains(&ancestor.id) && !locked.insert(ancestor.id) {
                // The rest of this chain was already marked by a deeper lock.
                break;
            }
        }
    }

    let free: Vec<NodeId> = candidates.difference(&locked).copied().collect();
    Ok(DeletionPreview {
        deletable: order_bottom_up(index, &free)?,
        locked,
    })
}
