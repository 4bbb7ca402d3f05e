//! SQLite schema initialization.
//!
//! Every forest kind owns two tables: a node table holding parent pointers
//! and a closure table holding `(ancestor_id, descendant_id, depth)` rows.
//! Forests never share a table.

use std::path::Path;

use rusqlite::Connection;

use crate::config::schema::DatabaseConfig;
use crate::error::Result;
use crate::types::Forest;

// ---------------------------------------------------------------------------
// DDL builders
// ---------------------------------------------------------------------------

fn create_node_table(forest: Forest) -> String {
    format!(
        "\
CREATE TABLE IF NOT EXISTS {table} (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  parent_id INTEGER REFERENCES {table}(id)
)",
        table = forest.node_table()
    )
}

fn create_closure_table(forest: Forest) -> String {
    format!(
        "\
CREATE TABLE IF NOT EXISTS {table} (
  ancestor_id INTEGER NOT NULL,
  descendant_id INTEGER NOT NULL,
  depth INTEGER NOT NULL CHECK (depth >= 0),
  PRIMARY KEY (ancestor_id, descendant_id)
) WITHOUT ROWID",
        table = forest.closure_table()
    )
}

fn create_indexes(forest: Forest) -> [String; 2] {
    let closure = forest.closure_table();
    let nodes = forest.node_table();
    [
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{closure}_descendant \
             ON {closure}(descendant_id, depth)"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{nodes}_parent ON {nodes}(parent_id)"),
    ]
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Create the node and closure tables of `forests` on an open connection.
pub fn create_forest_tables(conn: &Connection, forests: &[Forest]) -> rusqlite::Result<()> {
    for &forest in forests {
        conn.execute_batch(&create_node_table(forest))?;
        conn.execute_batch(&create_closure_table(forest))?;
        for ddl in create_indexes(forest) {
            conn.execute_batch(&ddl)?;
        }
    }
    Ok(())
}

/// Open (or create) the SQLite database at `db_path` and create the tables
/// of all four forests.
///
/// The returned connection has WAL mode, foreign keys, and synchronous
/// NORMAL already configured.
///
/// # Errors
///
/// Fails if the parent directory cannot be created, the database cannot be
/// opened, or any DDL statement fails.
pub fn initialize_database(db_path: &str) -> Result<Connection> {
    let config = DatabaseConfig {
        path: db_path.to_string(),
        ..DatabaseConfig::default()
    };
    open_database(&config, &Forest::ALL)
}

/// Open the database described by `config` and create the tables of
/// `forests`. Missing parent directories of a file path are created.
pub fn open_database(config: &DatabaseConfig, forests: &[Forest]) -> Result<Connection> {
    if config.path != ":memory:" {
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    let conn = Connection::open(&config.path)?;

    // -- Pragmas ----------------------------------------------------------
    // In-memory databases silently stay in "memory" journal mode.
    conn.pragma_update(None, "journal_mode", config.journal_mode.as_str())?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", config.synchronous.as_str())?;
    conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;

    create_forest_tables(&conn, forests)?;
    tracing::info!(
        path = %config.path,
        forests = forests.len(),
        "closure schema ready"
    );

    Ok(conn)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
