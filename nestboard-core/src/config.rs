/// Workspace configuration shared by every front end.
///
/// Read from a JSON file (camelCase keys). Every field has a default, so a
/// partial file only overrides what it names.
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::history::ActionType;
use crate::schema::ColumnSchema;

pub const DEFAULT_MAX_STACK_SIZE: usize = 50;
pub const DEFAULT_MAX_MEMORY_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_GROUPING_WINDOW_MS: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    #[serde(default = "default_max_stack_size")]
    pub max_stack_size: usize,
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: usize,
    #[serde(default = "default_grouping_window_ms")]
    pub grouping_window_ms: i64,
    #[serde(default = "default_enabled_action_types")]
    pub enabled_action_types: BTreeSet<ActionType>,
}

fn default_max_stack_size() -> usize {
    DEFAULT_MAX_STACK_SIZE
}

fn default_max_memory_bytes() -> usize {
    DEFAULT_MAX_MEMORY_BYTES
}

fn default_grouping_window_ms() -> i64 {
    DEFAULT_GROUPING_WINDOW_MS
}

fn default_enabled_action_types() -> BTreeSet<ActionType> {
    ActionType::ALL.iter().copied().collect()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_stack_size: default_max_stack_size(),
            max_memory_bytes: default_max_memory_bytes(),
            grouping_window_ms: default_grouping_window_ms(),
            enabled_action_types: default_enabled_action_types(),
        }
    }
}

impl HistoryConfig {
    pub fn is_enabled(&self, action_type: ActionType) -> bool {
        self.enabled_action_types.contains(&action_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub history: HistoryConfig,
    /// Columns used by boards without their own schema.
    #[serde(default)]
    pub default_columns: ColumnSchema,
}

/// Load config from `path`. Returns defaults if the file is missing or invalid.
pub fn load_config(path: &Path) -> WorkspaceConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!(
                "[nestboard.config] Failed to parse config {}: {}",
                path.display(),
                e
            );
            WorkspaceConfig::default()
        }),
        Err(_) => {
            log::info!(
                "[nestboard.config] No config at {}, using defaults",
                path.display()
            );
            WorkspaceConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = HistoryConfig::default();
        assert_eq!(config.max_stack_size, 50);
        assert_eq!(config.max_memory_bytes, 5 * 1024 * 1024);
        assert_eq!(config.grouping_window_ms, 1000);
        assert!(config.is_enabled(ActionType::MoveCard));
        assert!(config.is_enabled(ActionType::BulkDelete));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: WorkspaceConfig =
            serde_json::from_str(r#"{"history": {"maxStackSize": 5}}"#).unwrap();
        assert_eq!(config.history.max_stack_size, 5);
        assert_eq!(config.history.grouping_window_ms, 1000);
        assert_eq!(config.default_columns, ColumnSchema::default());
    }

    #[test]
    fn test_enabled_action_types_from_json() {
        let config: HistoryConfig =
            serde_json::from_str(r#"{"enabledActionTypes": ["updateCard"]}"#).unwrap();
        assert!(config.is_enabled(ActionType::UpdateCard));
        assert!(!config.is_enabled(ActionType::CreateCard));
    }

    #[test]
    fn test_load_config_missing_file() {
        let config = load_config(Path::new("/nonexistent/nestboard/config.json"));
        assert_eq!(config, WorkspaceConfig::default());
    }

    #[test]
    fn test_load_config_invalid_file() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, "{{ not json").unwrap();
        assert_eq!(load_config(tmp.path()), WorkspaceConfig::default());
    }

    #[test]
    fn test_load_config_file() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(
            tmp,
            r#"{{"history": {{"groupingWindowMs": 250}}, "defaultColumns": {{"columns": [{{"id": "open", "title": "Open"}}]}}}}"#
        )
        .unwrap();
        let config = load_config(tmp.path());
        assert_eq!(config.history.grouping_window_ms, 250);
        assert_eq!(config.default_columns.first_status(), Some("open"));
    }
}
