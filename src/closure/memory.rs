//! In-memory closure backend.
//!
//! Rows live in two ordered maps kept in lock step: `down` answers
//! "descendants of" and `up` answers "ancestors of", each in time
//! proportional to the answer.

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::closure::{
    check_attach, check_batch_delete, check_delete, check_detach, check_insert, verify,
    ClosureIndex,
};
use crate::error::{ClosureError, Result};
use crate::types::{Ancestor, ClosureRow, Forest, ForestKind, NodeId};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Serializable copy of one forest's closure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureSnapshot {
    pub forest: Forest,
    pub rows: Vec<ClosureRow>,
}

// ---------------------------------------------------------------------------
// MemoryClosure
// ---------------------------------------------------------------------------

/// Closure index held entirely in memory.
pub struct MemoryClosure<K: ForestKind> {
    /// ancestor -> descendant -> depth
    down: BTreeMap<NodeId, BTreeMap<NodeId, u32>>,
    /// descendant -> ancestor -> depth
    up: BTreeMap<NodeId, BTreeMap<NodeId, u32>>,
    row_count: usize,
    _kind: PhantomData<K>,
}

impl<K: ForestKind> std::fmt::Debug for MemoryClosure<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryClosure")
            .field("forest", &K::FOREST)
            .field("nodes", &self.up.len())
            .field("rows", &self.row_count)
            .finish()
    }
}

impl<K: ForestKind> Default for MemoryClosure<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ForestKind> MemoryClosure<K> {
    pub fn new() -> Self {
        Self {
            down: BTreeMap::new(),
            up: BTreeMap::new(),
            row_count: 0,
            _kind: PhantomData,
        }
    }

    /// Build the closure of the forest described by `parents`
    /// (node -> parent, `None` for roots).
    pub fn from_parents(parents: &BTreeMap<NodeId, Option<NodeId>>) -> Result<Self> {
        let rows = verify::compute_closure(K::FOREST, parents)?;
        let mut index = Self::new();
        for row in rows {
            index.put(row);
        }
        Ok(index)
    }

    /// Restore an index from a snapshot of the same forest.
    pub fn from_snapshot(snapshot: ClosureSnapshot) -> Result<Self> {
        if snapshot.forest != K::FOREST {
            return Err(ClosureError::ForestMismatch {
                expected: K::FOREST,
                found: snapshot.forest,
            });
        }
        let mut index = Self::new();
        for row in snapshot.rows {
            index.put(row);
        }
        Ok(index)
    }

    pub fn snapshot(&self) -> ClosureSnapshot {
        ClosureSnapshot {
            forest: K::FOREST,
            rows: self.collect_rows(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_snapshot(serde_json::from_str(json)?)
    }

    /// Number of indexed nodes.
    pub fn node_count(&self) -> usize {
        self.up.len()
    }

    // -------------------------------------------------------------------
    // Row primitives
    // -------------------------------------------------------------------

    fn put(&mut self, row: ClosureRow) -> bool {
        let fresh = self
            .down
            .entry(row.ancestor)
            .or_default()
            .insert(row.descendant, row.depth)
            .is_none();
        self.up
            .entry(row.descendant)
            .or_default()
            .insert(row.ancestor, row.depth);
        if fresh {
            self.row_count += 1;
        }
        fresh
    }

    fn remove(&mut self, ancestor: NodeId, descendant: NodeId) -> bool {
        let removed = remove_nested(&mut self.down, ancestor, descendant);
        remove_nested(&mut self.up, descendant, ancestor);
        if removed {
            self.row_count -= 1;
        }
        removed
    }

    /// Drop every row mentioning `node`, in either position.
    fn purge(&mut self, node: NodeId) -> usize {
        let below: Vec<NodeId> = self
            .down
            .get(&node)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();
        let above: Vec<NodeId> = self
            .up
            .get(&node)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();

        let mut removed = 0;
        for d in below {
            removed += usize::from(self.remove(node, d));
        }
        for a in above {
            removed += usize::from(self.remove(a, node));
        }
        removed
    }

    fn collect_rows(&self) -> Vec<ClosureRow> {
        self.down
            .iter()
            .flat_map(|(&ancestor, below)| {
                below.iter().map(move |(&descendant, &depth)| ClosureRow {
                    ancestor,
                    descendant,
                    depth,
                })
            })
            .collect()
    }
}

fn remove_nested(
    map: &mut BTreeMap<NodeId, BTreeMap<NodeId, u32>>,
    outer: NodeId,
    inner: NodeId,
) -> bool {
    let Some(entries) = map.get_mut(&outer) else {
        return false;
    };
    let removed = entries.remove(&inner).is_some();
    if entries.is_empty() {
        map.remove(&outer);
    }
    removed
}

// ---------------------------------------------------------------------------
// ClosureIndex
// ---------------------------------------------------------------------------

impl<K: ForestKind> ClosureIndex for MemoryClosure<K> {
    fn forest(&self) -> Forest {
        K::FOREST
    }

    fn contains(&self, node: NodeId) -> Result<bool> {
        Ok(self
            .down
            .get(&node)
            .is_some_and(|below| below.contains_key(&node)))
    }

    fn depth_between(&self, ancestor: NodeId, descendant: NodeId) -> Result<Option<u32>> {
        Ok(self
            .down
            .get(&ancestor)
            .and_then(|below| below.get(&descendant))
            .copied())
    }

    fn ancestors_of(&self, node: NodeId) -> Result<Vec<Ancestor>> {
        let mut ancestors: Vec<Ancestor> = self
            .up
            .get(&node)
            .map(|above| {
                above
                    .iter()
                    .map(|(&id, &depth)| Ancestor { id, depth })
                    .collect()
            })
            .unwrap_or_default();
        ancestors.sort_by_key(|a| (a.depth, a.id));
        Ok(ancestors)
    }

    fn descendants_of(&self, node: NodeId) -> Result<BTreeSet<NodeId>> {
        Ok(self
            .down
            .get(&node)
            .map(|below| below.keys().copied().collect())
            .unwrap_or_default())
    }

    fn ancestor_count(&self, node: NodeId) -> Result<usize> {
        Ok(self.up.get(&node).map_or(0, BTreeMap::len))
    }

    fn descendant_count(&self, node: NodeId) -> Result<usize> {
        Ok(self.down.get(&node).map_or(0, BTreeMap::len))
    }

    fn rows(&self) -> Result<Vec<ClosureRow>> {
        Ok(self.collect_rows())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.row_count)
    }

    fn insert(&mut self, node: NodeId) -> Result<usize> {
        check_insert(self, node)?;
        self.put(ClosureRow::self_row(node));
        tracing::trace!(forest = %K::FOREST, %node, "inserted node");
        Ok(1)
    }

    fn attach(&mut self, subtree_root: NodeId, new_parent: NodeId) -> Result<usize> {
        check_attach(self, subtree_root, new_parent)?;

        let above: Vec<(NodeId, u32)> = self
            .up
            .get(&new_parent)
            .map(|m| m.iter().map(|(&a, &d)| (a, d)).collect())
            .unwrap_or_default();
        let below: Vec<(NodeId, u32)> = self
            .down
            .get(&subtree_root)
            .map(|m| m.iter().map(|(&d, &depth)| (d, depth)).collect())
            .unwrap_or_default();

        let mut added = 0;
        for &(ancestor, depth_above) in &above {
            for &(descendant, depth_below) in &below {
                let row = ClosureRow {
                    ancestor,
                    descendant,
                    depth: depth_above + depth_below + 1,
                };
                added += usize::from(self.put(row));
            }
        }
        tracing::debug!(
            forest = %K::FOREST,
            root = %subtree_root,
            parent = %new_parent,
            rows = added,
            "attached subtree"
        );
        Ok(added)
    }

    fn detach(&mut self, node: NodeId) -> Result<usize> {
        check_detach(self, node)?;

        let subtree = self.descendants_of(node)?;
        let mut crossing = Vec::new();
        for &descendant in &subtree {
            if let Some(above) = self.up.get(&descendant) {
                crossing.extend(
                    above
                        .keys()
                        .filter(|a| !subtree.contains(a))
                        .map(|&a| (a, descendant)),
                );
            }
        }

        let mut removed = 0;
        for (ancestor, descendant) in crossing {
            removed += usize::from(self.remove(ancestor, descendant));
        }
        tracing::debug!(forest = %K::FOREST, %node, rows = removed, "detached subtree");
        Ok(removed)
    }

    fn delete(&mut self, node: NodeId) -> Result<usize> {
        check_delete(self, node)?;
        self.remove(node, node);
        tracing::trace!(forest = %K::FOREST, %node, "deleted node");
        Ok(1)
    }

    fn delete_batch(&mut self, ordered: &[NodeId]) -> Result<usize> {
        let batch = check_batch_delete(self, ordered)?;
        let removed: usize = batch.iter().map(|&node| self.purge(node)).sum();
        tracing::debug!(
            forest = %K::FOREST,
            nodes = batch.len(),
            rows = removed,
            "deleted node batch"
        );
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
