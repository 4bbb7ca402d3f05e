//! Materialized transitive closure of a forest.
//!
//! For every pair of nodes connected by a tree path the index stores one
//! `(ancestor, descendant, depth)` row, so ancestor/descendant questions
//! never walk the tree. Four mutations keep the rows exact:
//!
//! - [`ClosureIndex::insert`] adds the self row of a new, unattached node.
//! - [`ClosureIndex::attach`] links an unattached subtree under a parent by
//!   adding the cross product of the parent's ancestors and the subtree's
//!   descendants.
//! - [`ClosureIndex::detach`] removes exactly the rows crossing the subtree
//!   boundary; the subtree keeps its internal rows.
//! - [`ClosureIndex::delete`] / [`ClosureIndex::delete_batch`] forget nodes.
//!
//! Attaching a subtree under one of its own nodes (itself included) fails
//! with `CycleRisk` before any row is written. Callers that change parent
//! pointers first should run
//! [`crate::library::inference::check_cycle_risk`] up front.

pub mod memory;
pub mod sqlite;
pub mod verify;

use std::collections::{BTreeSet, HashMap};

use crate::error::{ClosureError, Result};
use crate::types::{Ancestor, ClosureRow, Forest, NodeId};

pub use memory::MemoryClosure;
pub use sqlite::SqliteClosure;

// ---------------------------------------------------------------------------
// ClosureIndex
// ---------------------------------------------------------------------------

/// Storage-agnostic closure index of one forest kind.
///
/// Mutations return the number of rows they added or removed. Every
/// mutation checks its preconditions before touching any row and fails
/// with a precondition error otherwise.
pub trait ClosureIndex {
    /// The forest this index belongs to.
    fn forest(&self) -> Forest;

    // -------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------

    /// Whether `node` has a self row.
    fn contains(&self, node: NodeId) -> Result<bool>;

    /// Path length from `ancestor` down to `descendant`, if connected.
    fn depth_between(&self, ancestor: NodeId, descendant: NodeId) -> Result<Option<u32>>;

    /// True iff a row `(ancestor, descendant, _)` exists. Every indexed
    /// node is its own ancestor.
    fn is_ancestor(&self, ancestor: NodeId, descendant: NodeId) -> Result<bool> {
        Ok(self.depth_between(ancestor, descendant)?.is_some())
    }

    /// All ancestors of `node` including itself, nearest first.
    fn ancestors_of(&self, node: NodeId) -> Result<Vec<Ancestor>>;

    /// All descendants of `node` including itself.
    fn descendants_of(&self, node: NodeId) -> Result<BTreeSet<NodeId>>;

    /// Number of ancestors of `node`, itself included.
    fn ancestor_count(&self, node: NodeId) -> Result<usize> {
        Ok(self.ancestors_of(node)?.len())
    }

    /// Number of descendants of `node`, itself included.
    fn descendant_count(&self, node: NodeId) -> Result<usize> {
        Ok(self.descendants_of(node)?.len())
    }

    /// Every row, ordered by `(ancestor, descendant)`.
    fn rows(&self) -> Result<Vec<ClosureRow>>;

    /// Total number of rows.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // -------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------

    /// Add the self row of a brand-new node.
    fn insert(&mut self, node: NodeId) -> Result<usize>;

    /// Link the unattached subtree rooted at `subtree_root` under
    /// `new_parent`. Call after the parent pointer has been persisted.
    fn attach(&mut self, subtree_root: NodeId, new_parent: NodeId) -> Result<usize>;

    /// Cut every row linking the subtree rooted at `node` to the outside.
    /// Call before the parent pointer is cleared or changed.
    fn detach(&mut self, node: NodeId) -> Result<usize>;

    /// Remove the self row of a detached, childless node.
    fn delete(&mut self, node: NodeId) -> Result<usize>;

    /// Remove every row mentioning each node of `ordered`, processing
    /// descendants before ancestors. See [`check_batch_delete`] for the
    /// accepted orderings.
    fn delete_batch(&mut self, ordered: &[NodeId]) -> Result<usize>;
}

// ---------------------------------------------------------------------------
// Precondition checks shared by every backend
// ---------------------------------------------------------------------------

pub(crate) fn check_insert<I: ClosureIndex + ?Sized>(index: &I, node: NodeId) -> Result<()> {
    if index.contains(node)? {
        return Err(ClosureError::NodeAlreadyIndexed {
            forest: index.forest(),
            node,
        });
    }
    Ok(())
}

pub(crate) fn require_present<I: ClosureIndex + ?Sized>(index: &I, node: NodeId) -> Result<()> {
    if !index.contains(node)? {
        return Err(ClosureError::NodeNotFound {
            forest: index.forest(),
            node,
        });
    }
    Ok(())
}

pub(crate) fn check_attach<I: ClosureIndex + ?Sized>(
    index: &I,
    subtree_root: NodeId,
    new_parent: NodeId,
) -> Result<()> {
    require_present(index, subtree_root)?;
    require_present(index, new_parent)?;
    if index.ancestor_count(subtree_root)? > 1 {
        return Err(ClosureError::AlreadyAttached {
            forest: index.forest(),
            node: subtree_root,
        });
    }
    // Covers self-attach too: every node is its own ancestor.
    if index.is_ancestor(subtree_root, new_parent)? {
        return Err(ClosureError::CycleRisk {
            forest: index.forest(),
            subtree_root,
            candidate_parent: new_parent,
        });
    }
    Ok(())
}

pub(crate) fn check_detach<I: ClosureIndex + ?Sized>(index: &I, node: NodeId) -> Result<()> {
    require_present(index, node)?;
    if index.ancestor_count(node)? <= 1 {
        return Err(ClosureError::NotAttached {
            forest: index.forest(),
            node,
        });
    }
    Ok(())
}

pub(crate) fn check_delete<I: ClosureIndex + ?Sized>(index: &I, node: NodeId) -> Result<()> {
    require_present(index, node)?;
    if index.ancestor_count(node)? > 1 {
        return Err(ClosureError::StillAttached {
            forest: index.forest(),
            node,
        });
    }
    let descendants = index.descendant_count(node)?;
    if descendants > 1 {
        return Err(ClosureError::HasDescendants {
            forest: index.forest(),
            node,
            count: descendants - 1,
        });
    }
    Ok(())
}

/// Validate a batch delete and return it without repeated ids.
///
/// Every node must be indexed, every strict descendant of a node must be
/// part of the batch (otherwise it would lose its ancestors while still
/// alive), and must come earlier in the batch than the node itself. Nodes
/// attached to ancestors outside the batch are fine: the cascade removes
/// those rows too.
pub fn check_batch_delete<I: ClosureIndex + ?Sized>(
    index: &I,
    ordered: &[NodeId],
) -> Result<Vec<NodeId>> {
    let mut position: HashMap<NodeId, usize> = HashMap::with_capacity(ordered.len());
    let mut batch = Vec::with_capacity(ordered.len());
    for &node in ordered {
        if position.contains_key(&node) {
            continue;
        }
        require_present(index, node)?;
        position.insert(node, batch.len());
        batch.push(node);
    }

    for (i, &node) in batch.iter().enumerate() {
        for descendant in index.descendants_of(node)? {
            if descendant == node {
                continue;
            }
            match position.get(&descendant) {
                None => {
                    return Err(ClosureError::OrphanedDescendant {
                        forest: index.forest(),
                        node,
                        descendant,
                    })
                }
                Some(&j) if j > i => {
                    return Err(ClosureError::BatchOutOfOrder {
                        forest: index.forest(),
                        node,
                        descendant,
                    })
                }
                Some(_) => {}
            }
        }
    }
    Ok(batch)
}
