//! Multi-source configuration loading.
//!
//! Priority, highest first: environment variables, the project file
//! `.treeclosure.yaml`, the user file `config.yaml` in the platform config
//! directory, built-in defaults. The first file found wins as a whole;
//! environment variables then override individual fields.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::config::schema::TreeClosureConfig;
use crate::error::{ClosureError, Result};
use crate::types::Forest;

/// Project-level config file name.
pub const PROJECT_CONFIG_FILE: &str = ".treeclosure.yaml";

/// Overrides `database.path`.
pub const ENV_DB_PATH: &str = "TREECLOSURE_DB_PATH";

/// Overrides `database.busy_timeout_ms`.
pub const ENV_BUSY_TIMEOUT_MS: &str = "TREECLOSURE_BUSY_TIMEOUT_MS";

/// Overrides `forests`; comma-separated, e.g. `campaign,tcln`.
pub const ENV_FORESTS: &str = "TREECLOSURE_FORESTS";

/// Path of the user-level config file, if the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "treeclosure").map(|dirs| dirs.config_dir().join("config.yaml"))
}

/// Parse a config file.
pub fn load_file(path: &Path) -> Result<TreeClosureConfig> {
    let text = std::fs::read_to_string(path)?;
    let config = serde_yaml::from_str(&text)?;
    Ok(config)
}

/// Resolve the effective configuration for `project_root`.
pub fn load_config(project_root: Option<&Path>) -> Result<TreeClosureConfig> {
    let candidates = project_root
        .map(|root| root.join(PROJECT_CONFIG_FILE))
        .into_iter()
        .chain(user_config_path());

    let mut config = TreeClosureConfig::default();
    for path in candidates {
        if path.is_file() {
            tracing::info!("loading config from {}", path.display());
            config = load_file(&path)?;
            break;
        }
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Apply environment overrides read through `lookup`.
///
/// Takes a lookup function so tests don't have to mutate the process
/// environment.
pub fn apply_env_overrides<F>(config: &mut TreeClosureConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(ENV_DB_PATH) {
        config.database.path = path;
    }
    if let Some(raw) = lookup(ENV_BUSY_TIMEOUT_MS) {
        config.database.busy_timeout_ms = raw.trim().parse().map_err(|_| {
            ClosureError::Config(format!("{ENV_BUSY_TIMEOUT_MS} must be an integer, got {raw:?}"))
        })?;
    }
    if let Some(raw) = lookup(ENV_FORESTS) {
        config.forests = parse_forest_list(&raw)?;
    }
    Ok(())
}

fn parse_forest_list(raw: &str) -> Result<Vec<Forest>> {
    let mut forests = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let forest = Forest::from_str_loose(name).ok_or_else(|| {
            ClosureError::Config(format!("{ENV_FORESTS}: unknown forest {name:?}"))
        })?;
        if !forests.contains(&forest) {
            forests.push(forest);
        }
    }
    Ok(forests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn project_file_is_loaded() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(PROJECT_CONFIG_FILE),
            "database:\n  path: lib.db\n",
        )
        .unwrap();
        let config = load_file(&dir.path().join(PROJECT_CONFIG_FILE)).unwrap();
        assert_eq!(config.database.path, "lib.db");
    }

    #[test]
    fn malformed_file_is_a_yaml_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PROJECT_CONFIG_FILE);
        std::fs::write(&path, "database: [not, a, map]\n").unwrap();
        let err = load_file(&path).unwrap_err();
        assert!(matches!(err, ClosureError::Yaml(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_file(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ClosureError::Io(_)));
    }

    #[test]
    fn env_overrides_path_and_timeout() {
        let mut config = TreeClosureConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[(ENV_DB_PATH, ":memory:"), (ENV_BUSY_TIMEOUT_MS, " 250 ")]),
        )
        .unwrap();
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.database.busy_timeout_ms, 250);
    }

    #[test]
    fn env_timeout_must_be_numeric() {
        let mut config = TreeClosureConfig::default();
        let err = apply_env_overrides(&mut config, env(&[(ENV_BUSY_TIMEOUT_MS, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ClosureError::Config(_)));
    }

    #[test]
    fn env_forest_list_accepts_loose_names() {
        let mut config = TreeClosureConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[(ENV_FORESTS, "Campaign_Library, awln,campaign")]),
        )
        .unwrap();
        assert_eq!(
            config.forests,
            vec![Forest::CampaignLibrary, Forest::ActionWordLibrary]
        );
    }

    #[test]
    fn env_forest_list_rejects_unknown_names() {
        let mut config = TreeClosureConfig::default();
        let err = apply_env_overrides(&mut config, env(&[(ENV_FORESTS, "tcln,requirement")]))
            .unwrap_err();
        assert!(matches!(err, ClosureError::Config(_)));
    }

    #[test]
    fn no_env_leaves_config_untouched() {
        let mut config = TreeClosureConfig::default();
        apply_env_overrides(&mut config, env(&[])).unwrap();
        assert_eq!(config, TreeClosureConfig::default());
    }
}
