//! Library service: structural changes of a forest and the closure
//! notifications that go with them.
//!
//! Each structural change touches the node table and the closure index in
//! a fixed order:
//!
//! | change | closure call | when |
//! |--------|--------------|------|
//! | create | insert, then attach | after the parent pointer is stored |
//! | move   | detach / attach | detach before, attach after the pointer changes |
//! | remove | batch delete | before node rows disappear |
//!
//! The service validates everything it can before the first write, so a
//! rejected request leaves both stores untouched. With SQLite storage, run
//! the service on a [`rusqlite::Transaction`] to make each change atomic
//! as a whole.

pub mod inference;
pub mod node_table;

use std::collections::BTreeSet;

use crate::closure::verify::{verify_index, ConsistencyReport};
use crate::closure::ClosureIndex;
use crate::error::{ClosureError, Result};
use crate::types::{Ancestor, Forest, NodeId};

pub use inference::DeletionPreview;
pub use node_table::{MemoryNodeTable, NodeTable, SqliteNodeTable};

/// Structural operations over one forest.
#[derive(Debug)]
pub struct LibraryService<I, T> {
    index: I,
    nodes: T,
}

impl<I: ClosureIndex, T: NodeTable> LibraryService<I, T> {
    /// Pair an index with the node table of the same forest.
    pub fn new(index: I, nodes: T) -> Result<Self> {
        if index.forest() != nodes.forest() {
            return Err(ClosureError::ForestMismatch {
                expected: nodes.forest(),
                found: index.forest(),
            });
        }
        Ok(Self { index, nodes })
    }

    pub fn forest(&self) -> Forest {
        self.index.forest()
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn nodes(&self) -> &T {
        &self.nodes
    }

    pub fn into_parts(self) -> (I, T) {
        (self.index, self.nodes)
    }

    // -------------------------------------------------------------------
    // Structural changes
    // -------------------------------------------------------------------

    /// Create a node, as a root or under `parent`.
    pub fn create_node(&mut self, parent: Option<NodeId>) -> Result<NodeId> {
        if let Some(p) = parent {
            self.require_node(p)?;
        }
        let node = self.nodes.create(parent)?;
        self.index.insert(node)?;
        if let Some(p) = parent {
            self.index.attach(node, p)?;
        }
        tracing::debug!(forest = %self.forest(), %node, parent = ?parent, "created node");
        Ok(node)
    }

    /// Move `node` (with its subtree) under `new_parent`, or make it a
    /// root when `new_parent` is `None`.
    pub fn move_node(&mut self, node: NodeId, new_parent: Option<NodeId>) -> Result<()> {
        let current = self.nodes.parent_of(node)?;
        if let Some(p) = new_parent {
            self.require_node(p)?;
            inference::check_cycle_risk(&self.index, node, p)?;
        }
        if current == new_parent {
            return Ok(());
        }

        if current.is_some() {
            self.index.detach(node)?;
        }
        self.nodes.set_parent(node, new_parent)?;
        if let Some(p) = new_parent {
            self.index.attach(node, p)?;
        }
        tracing::debug!(
            forest = %self.forest(),
            %node,
            from = ?current,
            to = ?new_parent,
            "moved node"
        );
        Ok(())
    }

    /// Cut `node` loose from its parent; its subtree stays intact.
    pub fn unlink_node(&mut self, node: NodeId) -> Result<()> {
        if self.nodes.parent_of(node)?.is_none() {
            return Err(ClosureError::NotAttached {
                forest: self.forest(),
                node,
            });
        }
        self.move_node(node, None)
    }

    /// Remove a single childless node.
    pub fn remove_node(&mut self, node: NodeId) -> Result<()> {
        let parent = self.nodes.parent_of(node)?;
        let descendants = self.index.descendant_count(node)?;
        if descendants > 1 {
            return Err(ClosureError::HasDescendants {
                forest: self.forest(),
                node,
                count: descendants - 1,
            });
        }

        if parent.is_some() {
            self.index.detach(node)?;
        }
        self.index.delete(node)?;
        self.nodes.remove(node)?;
        tracing::debug!(forest = %self.forest(), %node, "removed node");
        Ok(())
    }

    /// Remove the subtrees rooted at `targets`. Returns the removed nodes,
    /// descendants first.
    pub fn remove_nodes(&mut self, targets: &[NodeId]) -> Result<Vec<NodeId>> {
        let all: Vec<NodeId> = inference::expand_subtrees(&self.index, targets)?
            .into_iter()
            .collect();
        let ordered = inference::order_bottom_up(&self.index, &all)?;
        self.remove_ordered(&ordered)?;
        Ok(ordered)
    }

    /// Remove what [`Self::preview_deletion`] reports as deletable and
    /// return that preview.
    pub fn remove_unlocked_nodes<P>(
        &mut self,
        targets: &[NodeId],
        is_locked: P,
    ) -> Result<DeletionPreview>
    where
        P: FnMut(NodeId) -> bool,
    {
        let preview = self.preview_deletion(targets, is_locked)?;
        self.remove_ordered(&preview.deletable)?;
        Ok(preview)
    }

    fn remove_ordered(&mut self, ordered: &[NodeId]) -> Result<()> {
        for &node in ordered {
            self.require_node(node)?;
        }
        self.index.delete_batch(ordered)?;
        for &node in ordered {
            self.nodes.remove(node)?;
        }
        tracing::debug!(forest = %self.forest(), nodes = ordered.len(), "removed nodes");
        Ok(())
    }

    // -------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------

    /// Nodes of the subtree rooted at `node`, itself included.
    pub fn subtree(&self, node: NodeId) -> Result<BTreeSet<NodeId>> {
        self.require_indexed(node)?;
        self.index.descendants_of(node)
    }

    /// Ancestors of `node` from itself up to its root.
    pub fn path_to_root(&self, node: NodeId) -> Result<Vec<NodeId>> {
        self.require_indexed(node)?;
        Ok(self
            .index
            .ancestors_of(node)?
            .into_iter()
            .map(|a| a.id)
            .collect())
    }

    pub fn nearest_ancestor_where<P>(&self, node: NodeId, predicate: P) -> Result<Option<Ancestor>>
    where
        P: FnMut(&Ancestor) -> bool,
    {
        inference::nearest_ancestor_where(&self.index, node, predicate)
    }

    pub fn preview_deletion<P>(&self, targets: &[NodeId], is_locked: P) -> Result<DeletionPreview>
    where
        P: FnMut(NodeId) -> bool,
    {
        inference::deletion_preview(&self.index, targets, is_locked)
    }

    /// Compare the closure with the parent pointers of the node table.
    pub fn verify(&self) -> Result<ConsistencyReport> {
        verify_index(&self.index, &self.nodes.parents()?)
    }

    // -------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------

    fn require_node(&self, node: NodeId) -> Result<()> {
        if !self.nodes.exists(node)? {
            return Err(ClosureError::NodeNotFound {
                forest: self.forest(),
                node,
            });
        }
        Ok(())
    }

    fn require_indexed(&self, node: NodeId) -> Result<()> {
        crate::closure::require_present(&self.index, node)
    }
}
