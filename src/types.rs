//! Core domain types for the closure index.
//!
//! Node identity, forest kinds (both as a runtime enum and as compile-time
//! tags), and the closure row itself.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Opaque node identifier, unique within one forest kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i64);

impl NodeId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for NodeId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Forest
// ---------------------------------------------------------------------------

/// The independent tree-shaped libraries that each own a closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Forest {
    TestCaseLibrary,
    CampaignLibrary,
    CustomReportLibrary,
    ActionWordLibrary,
}

impl Forest {
    pub const ALL: [Forest; 4] = [
        Forest::TestCaseLibrary,
        Forest::CampaignLibrary,
        Forest::CustomReportLibrary,
        Forest::ActionWordLibrary,
    ];

    /// Canonical string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TestCaseLibrary => "test-case-library",
            Self::CampaignLibrary => "campaign-library",
            Self::CustomReportLibrary => "custom-report-library",
            Self::ActionWordLibrary => "action-word-library",
        }
    }

    /// Parse from a loose string (case-insensitive, underscores accepted).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "test-case-library" | "test-case" | "tcln" => Some(Self::TestCaseLibrary),
            "campaign-library" | "campaign" | "cln" => Some(Self::CampaignLibrary),
            "custom-report-library" | "custom-report" | "crln" => Some(Self::CustomReportLibrary),
            "action-word-library" | "action-word" | "awln" => Some(Self::ActionWordLibrary),
            _ => None,
        }
    }

    /// Name of the SQL table holding this forest's closure rows.
    pub fn closure_table(&self) -> &'static str {
        match self {
            Self::TestCaseLibrary => "tcln_relationship_closure",
            Self::CampaignLibrary => "cln_relationship_closure",
            Self::CustomReportLibrary => "crln_relationship_closure",
            Self::ActionWordLibrary => "awln_relationship_closure",
        }
    }

    /// Name of the SQL table holding this forest's nodes and parent pointers.
    pub fn node_table(&self) -> &'static str {
        match self {
            Self::TestCaseLibrary => "tcln_node",
            Self::CampaignLibrary => "cln_node",
            Self::CustomReportLibrary => "crln_node",
            Self::ActionWordLibrary => "awln_node",
        }
    }
}

impl std::fmt::Display for Forest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ForestKind tags
// ---------------------------------------------------------------------------

/// Compile-time forest tag. Indexes are parameterized over it so rows of
/// two forests can never be mixed through the type system.
pub trait ForestKind: Send + Sync + 'static {
    const FOREST: Forest;
}

/// Test case library tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TestCaseForest;

/// Campaign library tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CampaignForest;

/// Custom report library tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CustomReportForest;

/// Action word library tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ActionWordForest;

impl ForestKind for TestCaseForest {
    const FOREST: Forest = Forest::TestCaseLibrary;
}

impl ForestKind for CampaignForest {
    const FOREST: Forest = Forest::CampaignLibrary;
}

impl ForestKind for CustomReportForest {
    const FOREST: Forest = Forest::CustomReportLibrary;
}

impl ForestKind for ActionWordForest {
    const FOREST: Forest = Forest::ActionWordLibrary;
}

// ---------------------------------------------------------------------------
// Closure rows
// ---------------------------------------------------------------------------

/// One `(ancestor, descendant, depth)` triple of the closure.
///
/// `depth` is the number of edges between the two nodes; it is zero only
/// for the self row of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClosureRow {
    pub ancestor: NodeId,
    pub descendant: NodeId,
    pub depth: u32,
}

impl ClosureRow {
    pub fn new(ancestor: impl Into<NodeId>, descendant: impl Into<NodeId>, depth: u32) -> Self {
        Self {
            ancestor: ancestor.into(),
            descendant: descendant.into(),
            depth,
        }
    }

    /// The self row `(node, node, 0)`.
    pub fn self_row(node: NodeId) -> Self {
        Self {
            ancestor: node,
            descendant: node,
            depth: 0,
        }
    }

    pub fn is_self_row(&self) -> bool {
        self.ancestor == self.descendant
    }
}

/// An ancestor of some node together with its distance to that node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ancestor {
    pub id: NodeId,
    pub depth: u32,
}

impl Ancestor {
    pub fn new(id: impl Into<NodeId>, depth: u32) -> Self {
        Self {
            id: id.into(),
            depth,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn forest_as_str_roundtrip() {
        for forest in Forest::ALL {
            assert_eq!(Forest::from_str_loose(forest.as_str()), Some(forest));
        }
    }

    #[test]
    fn forest_from_str_loose_accepts_underscores_and_prefixes() {
        assert_eq!(
            Forest::from_str_loose("Test_Case_Library"),
            Some(Forest::TestCaseLibrary)
        );
        assert_eq!(Forest::from_str_loose("awln"), Some(Forest::ActionWordLibrary));
        assert_eq!(Forest::from_str_loose("requirement-library"), None);
    }

    #[test]
    fn forest_tables_are_distinct() {
        let closure: HashSet<_> = Forest::ALL.iter().map(|f| f.closure_table()).collect();
        let nodes: HashSet<_> = Forest::ALL.iter().map(|f| f.node_table()).collect();
        assert_eq!(closure.len(), 4);
        assert_eq!(nodes.len(), 4);
        assert!(closure.is_disjoint(&nodes));
    }

    #[test]
    fn forest_serde_uses_kebab_case() {
        let json = serde_json::to_string(&Forest::CustomReportLibrary).unwrap();
        assert_eq!(json, "\"custom-report-library\"");
    }

    #[test]
    fn forest_kind_tags_map_to_their_forest() {
        assert_eq!(TestCaseForest::FOREST, Forest::TestCaseLibrary);
        assert_eq!(CampaignForest::FOREST, Forest::CampaignLibrary);
        assert_eq!(CustomReportForest::FOREST, Forest::CustomReportLibrary);
        assert_eq!(ActionWordForest::FOREST, Forest::ActionWordLibrary);
    }

    #[test]
    fn self_row_has_depth_zero() {
        let row = ClosureRow::self_row(NodeId(7));
        assert!(row.is_self_row());
        assert_eq!(row.depth, 0);
        assert!(!ClosureRow::new(1, 2, 1).is_self_row());
    }

    #[test]
    fn node_id_serializes_transparently() {
        assert_eq!(serde_json::to_string(&NodeId(42)).unwrap(), "42");
        let back: NodeId = serde_json::from_str("42").unwrap();
        assert_eq!(back, NodeId(42));
    }
}
