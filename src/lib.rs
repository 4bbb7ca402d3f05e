//! treeclosure: materialized transitive closure index for tree-shaped
//! libraries.
//!
//! Keeps one `(ancestor, descendant, depth)` row per connected pair of
//! nodes, updated incrementally on insert, attach, detach and delete, so
//! that ancestor and descendant lookups never walk the tree. Backed by
//! memory or SQLite, with one independent index per forest kind.

pub mod closure;
pub mod config;
pub mod db;
pub mod error;
pub mod library;
pub mod observability;
pub mod types;

pub use closure::{ClosureIndex, MemoryClosure, SqliteClosure};
pub use error::{ClosureError, Result};
pub use library::{LibraryService, MemoryNodeTable, NodeTable, SqliteNodeTable};
pub use types::{
    ActionWordForest, Ancestor, CampaignForest, ClosureRow, CustomReportForest, Forest,
    ForestKind, NodeId, TestCaseForest,
};
