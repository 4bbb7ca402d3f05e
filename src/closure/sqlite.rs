//! SQLite closure backend.
//!
//! Each forest kind owns one closure table (see [`crate::db::schema`]).
//! Every mutation is a single set-based statement, and every mutation runs
//! inside a SAVEPOINT: nested in the caller's transaction when there is
//! one, its own transaction otherwise. A failing operation therefore never
//! leaves a partial cross product behind.

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;

use rusqlite::{params, Connection};

use crate::closure::{
    check_attach, check_batch_delete, check_delete, check_detach, check_insert, verify,
    ClosureIndex,
};
use crate::db::converters::{row_to_ancestor, row_to_closure_row};
use crate::error::Result;
use crate::types::{Ancestor, ClosureRow, Forest, ForestKind, NodeId};

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

/// Statements for one closure table. Built once per index; the connection's
/// statement cache does the rest.
#[derive(Debug, Clone)]
struct ClosureSql {
    insert_row: String,
    attach: String,
    detach: String,
    delete_self: String,
    purge_node: String,
    depth_between: String,
    ancestors: String,
    descendants: String,
    ancestor_count: String,
    descendant_count: String,
    all_rows: String,
    count: String,
    clear: String,
}

impl ClosureSql {
    fn for_table(t: &str) -> Self {
        Self {
            insert_row: format!(
                "INSERT INTO {t} (ancestor_id, descendant_id, depth) VALUES (?1, ?2, ?3)"
            ),
            // Cross product: ancestors of the new parent x descendants of
            // the moved root. The extra edge parent -> root adds one.
            attach: format!(
                "\
INSERT INTO {t} (ancestor_id, descendant_id, depth)
SELECT above.ancestor_id, below.descendant_id, above.depth + below.depth + 1
FROM {t} AS above
CROSS JOIN {t} AS below
WHERE above.descendant_id = ?2
  AND below.ancestor_id = ?1"
            ),
            // Rows ending inside the subtree but starting outside it.
            detach: format!(
                "\
DELETE FROM {t}
WHERE descendant_id IN (SELECT descendant_id FROM {t} WHERE ancestor_id = ?1)
  AND ancestor_id NOT IN (SELECT descendant_id FROM {t} WHERE ancestor_id = ?1)"
            ),
            delete_self: format!(
                "DELETE FROM {t} WHERE ancestor_id = ?1 AND descendant_id = ?1"
            ),
            purge_node: format!(
                "DELETE FROM {t} WHERE ancestor_id = ?1 OR descendant_id = ?1"
            ),
            depth_between: format!(
                "SELECT depth FROM {t} WHERE ancestor_id = ?1 AND descendant_id = ?2"
            ),
            ancestors: format!(
                "SELECT ancestor_id, depth FROM {t} WHERE descendant_id = ?1 ORDER BY depth ASC"
            ),
            descendants: format!("SELECT descendant_id FROM {t} WHERE ancestor_id = ?1"),
            ancestor_count: format!("SELECT count(*) FROM {t} WHERE descendant_id = ?1"),
            descendant_count: format!("SELECT count(*) FROM {t} WHERE ancestor_id = ?1"),
            all_rows: format!(
                "SELECT ancestor_id, descendant_id, depth FROM {t} \
                 ORDER BY ancestor_id, descendant_id"
            ),
            count: format!("SELECT count(*) FROM {t}"),
            clear: format!("DELETE FROM {t}"),
        }
    }
}

const SAVEPOINT: &str = "SAVEPOINT closure_op";
const RELEASE: &str = "RELEASE closure_op";
const ROLLBACK: &str = "ROLLBACK TO closure_op; RELEASE closure_op";

/// Run `f` inside a savepoint, rolling it back if `f` fails.
fn with_savepoint<T>(conn: &Connection, f: impl FnOnce() -> Result<T>) -> Result<T> {
    conn.execute_batch(SAVEPOINT)?;
    match f() {
        Ok(value) => {
            conn.execute_batch(RELEASE)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute_batch(ROLLBACK) {
                tracing::warn!("closure savepoint rollback failed: {rollback}");
            }
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// SqliteClosure
// ---------------------------------------------------------------------------

/// Closure index stored in the forest's SQLite closure table.
///
/// Borrows the connection, so it can be built on a
/// [`rusqlite::Transaction`] and take part in the caller's structural
/// change: dropping the transaction uncommitted undoes the closure rows
/// as well.
pub struct SqliteClosure<'c, K: ForestKind> {
    conn: &'c Connection,
    sql: ClosureSql,
    _kind: PhantomData<K>,
}

impl<K: ForestKind> std::fmt::Debug for SqliteClosure<'_, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteClosure")
            .field("forest", &K::FOREST)
            .finish_non_exhaustive()
    }
}

impl<'c, K: ForestKind> SqliteClosure<'c, K> {
    /// Wrap a connection whose schema already has this forest's tables.
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            sql: ClosureSql::for_table(K::FOREST.closure_table()),
            _kind: PhantomData,
        }
    }

    /// Replace every row with the closure of the forest described by
    /// `parents`.
    pub fn rebuild(&self, parents: &BTreeMap<NodeId, Option<NodeId>>) -> Result<usize> {
        let rows = verify::compute_closure(K::FOREST, parents)?;
        with_savepoint(self.conn, || {
            self.conn.prepare_cached(&self.sql.clear)?.execute([])?;
            let mut stmt = self.conn.prepare_cached(&self.sql.insert_row)?;
            for row in &rows {
                stmt.execute(params![row.ancestor, row.descendant, row.depth])?;
            }
            Ok(rows.len())
        })
        .inspect(|count| {
            tracing::info!(forest = %K::FOREST, rows = *count, "rebuilt closure table");
        })
    }

    fn count_query(&self, sql: &str, node: NodeId) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let count: i64 = stmt.query_row(params![node], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl<K: ForestKind> ClosureIndex for SqliteClosure<'_, K> {
    fn forest(&self) -> Forest {
        K::FOREST
    }

    fn contains(&self, node: NodeId) -> Result<bool> {
        Ok(self.depth_between(node, node)?.is_some())
    }

    fn depth_between(&self, ancestor: NodeId, descendant: NodeId) -> Result<Option<u32>> {
        let mut stmt = self.conn.prepare_cached(&self.sql.depth_between)?;
        let mut rows = stmt.query_map(params![ancestor, descendant], |row| row.get::<_, u32>(0))?;
        match rows.next() {
            Some(depth) => Ok(Some(depth?)),
            None => Ok(None),
        }
    }

    fn ancestors_of(&self, node: NodeId) -> Result<Vec<Ancestor>> {
        let mut stmt = self.conn.prepare_cached(&self.sql.ancestors)?;
        let rows = stmt.query_map(params![node], row_to_ancestor)?;
        let mut ancestors = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        // Depth is unique per node; the id tie-break only matters for
        // corrupted tables.
        ancestors.sort_by_key(|a| (a.depth, a.id));
        Ok(ancestors)
    }

    fn descendants_of(&self, node: NodeId) -> Result<BTreeSet<NodeId>> {
        let mut stmt = self.conn.prepare_cached(&self.sql.descendants)?;
        let rows = stmt.query_map(params![node], |row| row.get::<_, NodeId>(0))?;
        rows.collect::<std::result::Result<BTreeSet<_>, _>>()
            .map_err(Into::into)
    }

    fn ancestor_count(&self, node: NodeId) -> Result<usize> {
        self.count_query(&self.sql.ancestor_count, node)
    }

    fn descendant_count(&self, node: NodeId) -> Result<usize> {
        self.count_query(&self.sql.descendant_count, node)
    }

    fn rows(&self) -> Result<Vec<ClosureRow>> {
        let mut stmt = self.conn.prepare_cached(&self.sql.all_rows)?;
        let rows = stmt.query_map([], row_to_closure_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    fn len(&self) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached(&self.sql.count)?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn insert(&mut self, node: NodeId) -> Result<usize> {
        with_savepoint(self.conn, || {
            check_insert(&*self, node)?;
            let mut stmt = self.conn.prepare_cached(&self.sql.insert_row)?;
            let added = stmt.execute(params![node, node, 0])?;
            tracing::trace!(forest = %K::FOREST, %node, "inserted node");
            Ok(added)
        })
    }

    fn attach(&mut self, subtree_root: NodeId, new_parent: NodeId) -> Result<usize> {
        with_savepoint(self.conn, || {
            check_attach(&*self, subtree_root, new_parent)?;
            let mut stmt = self.conn.prepare_cached(&self.sql.attach)?;
            let added = stmt.execute(params![subtree_root, new_parent])?;
            tracing::debug!(
                forest = %K::FOREST,
                root = %subtree_root,
                parent = %new_parent,
                rows = added,
                "attached subtree"
            );
            Ok(added)
        })
    }

    fn detach(&mut self, node: NodeId) -> Result<usize> {
        with_savepoint(self.conn, || {
            check_detach(&*self, node)?;
            let mut stmt = self.conn.prepare_cached(&self.sql.detach)?;
            let removed = stmt.execute(params![node])?;
            tracing::debug!(forest = %K::FOREST, %node, rows = removed, "detached subtree");
            Ok(removed)
        })
    }

    fn delete(&mut self, node: NodeId) -> Result<usize> {
        with_savepoint(self.conn, || {
            check_delete(&*self, node)?;
            let mut stmt = self.conn.prepare_cached(&self.sql.delete_self)?;
            let removed = stmt.execute(params![node])?;
            tracing::trace!(forest = %K::FOREST, %node, "deleted node");
            Ok(removed)
        })
    }

    fn delete_batch(&mut self, ordered: &[NodeId]) -> Result<usize> {
        with_savepoint(self.conn, || {
            let batch = check_batch_delete(&*self, ordered)?;
            let mut stmt = self.conn.prepare_cached(&self.sql.purge_node)?;
            let mut removed = 0;
            for node in &batch {
                removed += stmt.execute(params![node])?;
            }
            tracing::debug!(
                forest = %K::FOREST,
                nodes = batch.len(),
                rows = removed,
                "deleted node batch"
            );
            Ok(removed)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
