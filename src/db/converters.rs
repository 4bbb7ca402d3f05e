//! Conversions between SQLite values/rows and domain types.

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;

use crate::types::{Ancestor, ClosureRow, NodeId};

impl ToSql for NodeId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for NodeId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(NodeId)
    }
}

/// Map a `(ancestor_id, descendant_id, depth)` row.
pub fn row_to_closure_row(row: &Row<'_>) -> rusqlite::Result<ClosureRow> {
    Ok(ClosureRow {
        ancestor: row.get(0)?,
        descendant: row.get(1)?,
        depth: row.get(2)?,
    })
}

/// Map an `(id, depth)` row.
pub fn row_to_ancestor(row: &Row<'_>) -> rusqlite::Result<Ancestor> {
    Ok(Ancestor {
        id: row.get(0)?,
        depth: row.get(1)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn node_id_round_trips_through_sqlite() {
        let conn = Connection::open_in_memory().unwrap();
        let id: NodeId = conn
            .query_row("SELECT ?1", [NodeId(-12)], |row| row.get(0))
            .unwrap();
        assert_eq!(id, NodeId(-12));
    }

    #[test]
    fn closure_row_mapping_reads_columns_in_order() {
        let conn = Connection::open_in_memory().unwrap();
        let row = conn
            .query_row("SELECT 4, 9, 2", [], row_to_closure_row)
            .unwrap();
        assert_eq!(row, ClosureRow::new(4, 9, 2));
    }

    #[test]
    fn negative_depth_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let res = conn.query_row("SELECT 1, -1", [], row_to_ancestor);
        assert!(res.is_err());
    }
}
