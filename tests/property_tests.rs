//! Property-based tests for the closure index using proptest.
//!
//! Random sequences of structural changes are replayed through the library
//! service on both backends; after every step the closure must equal the
//! one recomputed from the parent pointers, and both backends must agree.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use rusqlite::Connection;

use treeclosure::closure::verify::{compute_closure, verify_structure};
use treeclosure::db::schema::initialize_database;
use treeclosure::{
    ClosureError, ClosureIndex, ClosureRow, LibraryService, MemoryClosure, MemoryNodeTable,
    NodeId, NodeTable, SqliteClosure, SqliteNodeTable, TestCaseForest,
};

type MemoryService = LibraryService<MemoryClosure<TestCaseForest>, MemoryNodeTable<TestCaseForest>>;
type SqliteService<'c> =
    LibraryService<SqliteClosure<'c, TestCaseForest>, SqliteNodeTable<'c, TestCaseForest>>;

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

/// A structural change. Node choices are indexes into the list of live
/// nodes, taken modulo its length.
#[derive(Debug, Clone)]
enum Op {
    Create(Option<usize>),
    Move(usize, Option<usize>),
    Remove(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => proptest::option::weighted(0.8, 0usize..64).prop_map(Op::Create),
        3 => (0usize..64, proptest::option::weighted(0.8, 0usize..64))
            .prop_map(|(n, p)| Op::Move(n, p)),
        1 => (0usize..64).prop_map(Op::Remove),
    ]
}

fn pick(live: &[NodeId], choice: usize) -> Option<NodeId> {
    if live.is_empty() {
        None
    } else {
        Some(live[choice % live.len()])
    }
}

fn live_nodes<T: NodeTable>(nodes: &T) -> Vec<NodeId> {
    nodes.parents().unwrap().into_keys().collect()
}

/// Apply `op` and report whether it succeeded. Only cycle refusals are
/// expected to fail.
fn apply<I: ClosureIndex, T: NodeTable>(svc: &mut LibraryService<I, T>, op: &Op) -> bool {
    let live = live_nodes(svc.nodes());
    let result = match *op {
        Op::Create(parent) => {
            let parent = parent.and_then(|p| pick(&live, p));
            svc.create_node(parent).map(|_| ())
        }
        Op::Move(node, parent) => match pick(&live, node) {
            Some(node) => svc.move_node(node, parent.and_then(|p| pick(&live, p))),
            None => Ok(()),
        },
        Op::Remove(node) => match pick(&live, node) {
            Some(node) => svc.remove_nodes(&[node]).map(|_| ()),
            None => Ok(()),
        },
    };
    match result {
        Ok(()) => true,
        Err(ClosureError::CycleRisk { .. }) => false,
        Err(other) => panic!("unexpected error for {op:?}: {other}"),
    }
}

fn memory_service() -> MemoryService {
    LibraryService::new(MemoryClosure::new(), MemoryNodeTable::new()).unwrap()
}

fn sqlite_service(conn: &Connection) -> SqliteService<'_> {
    LibraryService::new(SqliteClosure::new(conn), SqliteNodeTable::new(conn)).unwrap()
}

fn row_set<I: ClosureIndex>(index: &I) -> BTreeSet<ClosureRow> {
    index.rows().unwrap().into_iter().collect()
}

// ---------------------------------------------------------------------------
// Closure equals recomputed closure after any sequence
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn memory_closure_tracks_parent_pointers(ops in prop::collection::vec(arb_op(), 1..60)) {
        let mut svc = memory_service();
        for op in &ops {
            apply(&mut svc, op);
            let report = svc.verify().unwrap();
            prop_assert!(report.is_consistent(), "after {:?}: {:?}", op, report);
        }
    }

    #[test]
    fn sqlite_agrees_with_memory(ops in prop::collection::vec(arb_op(), 1..40)) {
        let conn = initialize_database(":memory:").unwrap();
        let mut sql = sqlite_service(&conn);
        let mut mem = memory_service();
        for op in &ops {
            let a = apply(&mut mem, op);
            let b = apply(&mut sql, op);
            prop_assert_eq!(a, b, "outcome differs for {:?}", op);
            prop_assert_eq!(row_set(mem.index()), row_set(sql.index()));
        }
        prop_assert!(sql.verify().unwrap().is_consistent());
    }

    #[test]
    fn self_rows_and_transitivity_hold(ops in prop::collection::vec(arb_op(), 1..50)) {
        let mut svc = memory_service();
        for op in &ops {
            apply(&mut svc, op);
        }
        let index = svc.index();
        let rows = index.rows().unwrap();

        for node in live_nodes(svc.nodes()) {
            prop_assert_eq!(index.depth_between(node, node).unwrap(), Some(0));
        }
        for row in &rows {
            prop_assert_eq!(row.depth == 0, row.is_self_row());
        }
        for ab in &rows {
            for bd in rows.iter().filter(|r| r.ancestor == ab.descendant) {
                prop_assert_eq!(
                    index.depth_between(ab.ancestor, bd.descendant).unwrap(),
                    Some(ab.depth + bd.depth)
                );
            }
        }
        prop_assert!(verify_structure(index).unwrap().is_consistent());
    }

    #[test]
    fn detach_then_attach_is_identity(
        ops in prop::collection::vec(arb_op(), 1..40),
        choice in 0usize..64,
    ) {
        let mut svc = memory_service();
        for op in &ops {
            apply(&mut svc, op);
        }
        let attached: Vec<(NodeId, NodeId)> = svc
            .nodes()
            .parents()
            .unwrap()
            .into_iter()
            .filter_map(|(n, p)| p.map(|p| (n, p)))
            .collect();
        prop_assume!(!attached.is_empty());
        let (node, parent) = attached[choice % attached.len()];

        let (mut index, _) = svc.into_parts();
        let before = row_set(&index);
        let subtree = index.descendants_of(node).unwrap();

        index.detach(node).unwrap();
        // Boundary precision: the subtree survives, the ancestors do not.
        prop_assert_eq!(index.descendants_of(node).unwrap(), subtree);
        prop_assert_eq!(index.ancestor_count(node).unwrap(), 1);

        index.attach(node, parent).unwrap();
        prop_assert_eq!(row_set(&index), before);
    }

    #[test]
    fn rebuild_matches_incremental(ops in prop::collection::vec(arb_op(), 1..40)) {
        let mut svc = memory_service();
        for op in &ops {
            apply(&mut svc, op);
        }
        let parents: BTreeMap<NodeId, Option<NodeId>> = svc.nodes().parents().unwrap();
        let rebuilt = MemoryClosure::<TestCaseForest>::from_parents(&parents).unwrap();
        prop_assert_eq!(row_set(&rebuilt), row_set(svc.index()));
        let expected: BTreeSet<ClosureRow> =
            compute_closure(svc.forest(), &parents).unwrap().into_iter().collect();
        prop_assert_eq!(row_set(svc.index()), expected);
    }
}

// ---------------------------------------------------------------------------
// Delete cleanliness
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn removed_nodes_leave_no_rows(
        ops in prop::collection::vec(arb_op(), 1..40),
        choice in 0usize..64,
    ) {
        let mut svc = memory_service();
        for op in &ops {
            apply(&mut svc, op);
        }
        let live = live_nodes(svc.nodes());
        prop_assume!(!live.is_empty());
        let target = live[choice % live.len()];

        let removed = svc.remove_nodes(&[target]).unwrap();
        let rows = svc.index().rows().unwrap();
        for node in removed {
            prop_assert!(!svc.nodes().exists(node).unwrap());
            prop_assert!(rows.iter().all(|r| r.ancestor != node && r.descendant != node));
        }
    }
}
