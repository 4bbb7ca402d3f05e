//! Reference closure computation and consistency checks.
//!
//! `compute_closure` derives the exact closure of a forest from its parent
//! pointers by walking each node up to its root. It is the slow path the
//! incremental operations must agree with, and it seeds rebuilds.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::closure::ClosureIndex;
use crate::error::{ClosureError, Result};
use crate::types::{ClosureRow, Forest, NodeId};

/// Difference between what an index holds and what it should hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub forest: Forest,
    /// Rows the closure requires but the index lacks.
    pub missing: Vec<ClosureRow>,
    /// Rows the index holds but the closure does not contain.
    pub unexpected: Vec<ClosureRow>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

/// Closure of the forest described by `parents` (node -> parent, `None`
/// for roots), sorted by `(ancestor, descendant)`.
///
/// Fails with `NodeNotFound` when a parent is not itself a key of
/// `parents`, and with `CycleRisk` when following parents never reaches a
/// root.
pub fn compute_closure(
    forest: Forest,
    parents: &BTreeMap<NodeId, Option<NodeId>>,
) -> Result<Vec<ClosureRow>> {
    let mut rows = BTreeSet::new();
    for &node in parents.keys() {
        rows.insert(ClosureRow::self_row(node));
        let mut current = node;
        let mut depth = 0u32;
        while let Some(parent) = parents.get(&current).copied().flatten() {
            if !parents.contains_key(&parent) {
                return Err(ClosureError::NodeNotFound {
                    forest,
                    node: parent,
                });
            }
            depth += 1;
            if depth as usize > parents.len() {
                return Err(ClosureError::CycleRisk {
                    forest,
                    subtree_root: node,
                    candidate_parent: parent,
                });
            }
            rows.insert(ClosureRow {
                ancestor: parent,
                descendant: node,
                depth,
            });
            current = parent;
        }
    }
    Ok(rows.into_iter().collect())
}

/// Parent pointers implied by a row set: every node mentioned by a row,
/// with the ancestor of its depth-1 row as parent. When a node has several
/// depth-1 rows the smallest ancestor id wins.
pub fn derive_parents(rows: &[ClosureRow]) -> BTreeMap<NodeId, Option<NodeId>> {
    let mut parents: BTreeMap<NodeId, Option<NodeId>> = BTreeMap::new();
    for row in rows {
        parents.entry(row.ancestor).or_insert(None);
        parents.entry(row.descendant).or_insert(None);
    }
    for row in rows.iter().filter(|r| r.depth == 1) {
        let slot = parents.entry(row.descendant).or_insert(None);
        if slot.map_or(true, |existing| row.ancestor < existing) {
            *slot = Some(row.ancestor);
        }
    }
    parents
}

/// Compare `index` with the closure of `parents`.
pub fn verify_index<I: ClosureIndex + ?Sized>(
    index: &I,
    parents: &BTreeMap<NodeId, Option<NodeId>>,
) -> Result<ConsistencyReport> {
    let expected = compute_closure(index.forest(), parents)?;
    Ok(diff(index.forest(), &expected, &index.rows()?))
}

/// Check that `index` is the closure of the tree its own depth-1 rows
/// describe. Needs no external parent pointers.
pub fn verify_structure<I: ClosureIndex + ?Sized>(index: &I) -> Result<ConsistencyReport> {
    let actual = index.rows()?;
    let expected = compute_closure(index.forest(), &derive_parents(&actual))?;
    Ok(diff(index.forest(), &expected, &actual))
}

fn diff(forest: Forest, expected: &[ClosureRow], actual: &[ClosureRow]) -> ConsistencyReport {
    let expected: BTreeSet<ClosureRow> = expected.iter().copied().collect();
    let actual: BTreeSet<ClosureRow> = actual.iter().copied().collect();
    ConsistencyReport {
        forest,
        missing: expected.difference(&actual).copied().collect(),
        unexpected: actual.difference(&expected).copied().collect(),
    }
}
