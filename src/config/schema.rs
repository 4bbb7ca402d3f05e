//! Configuration data structures.
//!
//! Defines the YAML config format: where the closure database lives, how
//! SQLite is tuned, and which forests get tables.

use serde::{Deserialize, Serialize};

use crate::types::Forest;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration.
///
/// Loaded from YAML files and environment variables; see
/// [`crate::config::loader`] for the priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeClosureConfig {
    /// Config format version (currently "1.0").
    #[serde(default = "default_version")]
    pub version: String,

    /// SQLite settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Forests whose tables are created on open.
    #[serde(default = "default_forests")]
    pub forests: Vec<Forest>,
}

impl Default for TreeClosureConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            database: DatabaseConfig::default(),
            forests: default_forests(),
        }
    }
}

impl TreeClosureConfig {
    pub fn is_forest_enabled(&self, forest: Forest) -> bool {
        self.forests.contains(&forest)
    }
}

// ---------------------------------------------------------------------------
// DatabaseConfig
// ---------------------------------------------------------------------------

/// SQLite connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path, or `:memory:`.
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default)]
    pub journal_mode: JournalMode,

    #[serde(default)]
    pub synchronous: Synchronous,

    /// How long a writer waits for the database lock before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            journal_mode: JournalMode::default(),
            synchronous: Synchronous::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pragmas
// ---------------------------------------------------------------------------

/// SQLite `journal_mode` pragma values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    #[default]
    Wal,
    Delete,
    Truncate,
    Memory,
}

impl JournalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Memory => "MEMORY",
        }
    }
}

/// SQLite `synchronous` pragma values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Synchronous {
    Off,
    #[default]
    Normal,
    Full,
}

impl Synchronous {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_version() -> String {
    "1.0".to_string()
}

fn default_path() -> String {
    ".treeclosure/closure.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_forests() -> Vec<Forest> {
    Forest::ALL.to_vec()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
