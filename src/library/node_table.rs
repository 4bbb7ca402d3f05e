//! Node identity and parent pointers of one forest.
//!
//! The closure index never reads these; the library service updates them
//! and notifies the index around each change.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{ClosureError, Result};
use crate::types::{Forest, ForestKind, NodeId};

/// Storage of nodes and their parent pointers.
pub trait NodeTable {
    fn forest(&self) -> Forest;

    /// Allocate a new node under `parent` (or as a root) and return its id.
    fn create(&mut self, parent: Option<NodeId>) -> Result<NodeId>;

    fn exists(&self, node: NodeId) -> Result<bool>;

    /// Parent pointer of `node`; `NodeNotFound` if the node is unknown.
    fn parent_of(&self, node: NodeId) -> Result<Option<NodeId>>;

    fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>) -> Result<()>;

    fn remove(&mut self, node: NodeId) -> Result<()>;

    /// Every node with its parent pointer.
    fn parents(&self) -> Result<BTreeMap<NodeId, Option<NodeId>>>;
}

// ---------------------------------------------------------------------------
// MemoryNodeTable
// ---------------------------------------------------------------------------

/// Node table kept in a map; ids are allocated sequentially from 1.
#[derive(Debug)]
pub struct MemoryNodeTable<K: ForestKind> {
    parents: BTreeMap<NodeId, Option<NodeId>>,
    next_id: i64,
    _kind: PhantomData<K>,
}

impl<K: ForestKind> Default for MemoryNodeTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ForestKind> MemoryNodeTable<K> {
    pub fn new() -> Self {
        Self {
            parents: BTreeMap::new(),
            next_id: 1,
            _kind: PhantomData,
        }
    }

    fn not_found(node: NodeId) -> ClosureError {
        ClosureError::NodeNotFound {
            forest: K::FOREST,
            node,
        }
    }
}

impl<K: ForestKind> NodeTable for MemoryNodeTable<K> {
    fn forest(&self) -> Forest {
        K::FOREST
    }

    fn create(&mut self, parent: Option<NodeId>) -> Result<NodeId> {
        if let Some(p) = parent {
            if !self.parents.contains_key(&p) {
                return Err(Self::not_found(p));
            }
        }
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.parents.insert(id, parent);
        Ok(id)
    }

    fn exists(&self, node: NodeId) -> Result<bool> {
        Ok(self.parents.contains_key(&node))
    }

    fn parent_of(&self, node: NodeId) -> Result<Option<NodeId>> {
        self.parents
            .get(&node)
            .copied()
            .ok_or_else(|| Self::not_found(node))
    }

    fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>) -> Result<()> {
        if let Some(p) = parent {
            if !self.parents.contains_key(&p) {
                return Err(Self::not_found(p));
            }
        }
        let slot = self
            .parents
            .get_mut(&node)
            .ok_or_else(|| Self::not_found(node))?;
        *slot = parent;
        Ok(())
    }

    fn remove(&mut self, node: NodeId) -> Result<()> {
        self.parents
            .remove(&node)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(node))
    }

    fn parents(&self) -> Result<BTreeMap<NodeId, Option<NodeId>>> {
        Ok(self.parents.clone())
    }
}

// ---------------------------------------------------------------------------
// SqliteNodeTable
// ---------------------------------------------------------------------------

/// Node table stored in the forest's SQLite node table. Parent pointers
/// are foreign keys, so a node cannot be removed while it has children.
pub struct SqliteNodeTable<'c, K: ForestKind> {
    conn: &'c Connection,
    table: &'static str,
    _kind: PhantomData<K>,
}

impl<K: ForestKind> std::fmt::Debug for SqliteNodeTable<'_, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteNodeTable")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl<'c, K: ForestKind> SqliteNodeTable<'c, K> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            table: K::FOREST.node_table(),
            _kind: PhantomData,
        }
    }

    fn not_found(node: NodeId) -> ClosureError {
        ClosureError::NodeNotFound {
            forest: K::FOREST,
            node,
        }
    }

    fn require(&self, node: NodeId) -> Result<()> {
        if self.exists(node)? {
            Ok(())
        } else {
            Err(Self::not_found(node))
        }
    }
}

impl<K: ForestKind> NodeTable for SqliteNodeTable<'_, K> {
    fn forest(&self) -> Forest {
        K::FOREST
    }

    fn create(&mut self, parent: Option<NodeId>) -> Result<NodeId> {
        if let Some(p) = parent {
            self.require(p)?;
        }
        let sql = format!("INSERT INTO {} (parent_id) VALUES (?1)", self.table);
        self.conn.prepare_cached(&sql)?.execute(params![parent])?;
        Ok(NodeId(self.conn.last_insert_rowid()))
    }

    fn exists(&self, node: NodeId) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?1", self.table);
        let found = self
            .conn
            .prepare_cached(&sql)?
            .query_row(params![node], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn parent_of(&self, node: NodeId) -> Result<Option<NodeId>> {
        let sql = format!("SELECT parent_id FROM {} WHERE id = ?1", self.table);
        self.conn
            .prepare_cached(&sql)?
            .query_row(params![node], |row| row.get::<_, Option<NodeId>>(0))
            .optional()?
            .ok_or_else(|| Self::not_found(node))
    }

    fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>) -> Result<()> {
        if let Some(p) = parent {
            self.require(p)?;
        }
        let sql = format!("UPDATE {} SET parent_id = ?2 WHERE id = ?1", self.table);
        let changed = self
            .conn
            .prepare_cached(&sql)?
            .execute(params![node, parent])?;
        if changed == 0 {
            return Err(Self::not_found(node));
        }
        Ok(())
    }

    fn remove(&mut self, node: NodeId) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", self.table);
        let changed = self.conn.prepare_cached(&sql)?.execute(params![node])?;
        if changed == 0 {
            return Err(Self::not_found(node));
        }
        Ok(())
    }

    fn parents(&self) -> Result<BTreeMap<NodeId, Option<NodeId>>> {
        let sql = format!("SELECT id, parent_id FROM {}", self.table);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, NodeId>(0)?, row.get::<_, Option<NodeId>>(1)?))
        })?;
        rows.collect::<std::result::Result<BTreeMap<_, _>, _>>()
            .map_err(Into::into)
    }
}
