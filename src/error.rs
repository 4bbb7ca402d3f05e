//! Error type shared by every layer of the crate.

use thiserror::Error;

use crate::types::{Forest, NodeId};

/// Everything that can go wrong while maintaining or querying a closure.
#[derive(Debug, Error)]
pub enum ClosureError {
    // ========== Precondition violations ==========
    /// Insert on a node the index already knows.
    #[error("{forest}: node {node} is already indexed")]
    NodeAlreadyIndexed { forest: Forest, node: NodeId },

    /// Operation names a node the index (or node table) does not know.
    #[error("{forest}: node {node} not found")]
    NodeNotFound { forest: Forest, node: NodeId },

    /// Attach on a subtree root that still has external ancestors.
    #[error("{forest}: node {node} is already attached under another node")]
    AlreadyAttached { forest: Forest, node: NodeId },

    /// Detach on a node that has no external ancestor.
    #[error("{forest}: node {node} is not attached")]
    NotAttached { forest: Forest, node: NodeId },

    /// Single delete on a node that was not detached first.
    #[error("{forest}: node {node} must be detached before it is deleted")]
    StillAttached { forest: Forest, node: NodeId },

    /// Single delete on a node that still anchors a subtree.
    #[error("{forest}: node {node} still has {count} descendant(s)")]
    HasDescendants {
        forest: Forest,
        node: NodeId,
        count: usize,
    },

    /// Batch delete lists an ancestor before one of its descendants.
    #[error("{forest}: batch deletes node {node} before its descendant {descendant}")]
    BatchOutOfOrder {
        forest: Forest,
        node: NodeId,
        descendant: NodeId,
    },

    /// Batch delete would leave a live descendant without its ancestors.
    #[error("{forest}: deleting node {node} would orphan descendant {descendant}")]
    OrphanedDescendant {
        forest: Forest,
        node: NodeId,
        descendant: NodeId,
    },

    // ========== Structural guards ==========
    /// Moving a subtree under itself or one of its own descendants.
    #[error("{forest}: attaching {subtree_root} under {candidate_parent} would create a cycle")]
    CycleRisk {
        forest: Forest,
        subtree_root: NodeId,
        candidate_parent: NodeId,
    },

    /// Rows or a snapshot of one forest handed to an index of another.
    #[error("expected rows of {expected}, found {found}")]
    ForestMismatch { expected: Forest, found: Forest },

    // ========== Transaction / backend failures ==========
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ClosureError {
    /// Programming errors from the calling layer. They must fail the
    /// enclosing transaction and are never worth retrying.
    pub fn is_precondition_violation(&self) -> bool {
        matches!(
            self,
            Self::NodeAlreadyIndexed { .. }
                | Self::NodeNotFound { .. }
                | Self::AlreadyAttached { .. }
                | Self::NotAttached { .. }
                | Self::StillAttached { .. }
                | Self::HasDescendants { .. }
                | Self::BatchOutOfOrder { .. }
                | Self::OrphanedDescendant { .. }
        )
    }

    /// Failures of the storage backend or the enclosing transaction.
    pub fn is_transaction_failure(&self) -> bool {
        matches!(self, Self::Sqlite(_) | Self::Io(_))
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ClosureError>;
