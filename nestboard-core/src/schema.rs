/// Column schemas for boards and sub-boards.
///
/// A path without its own schema inherits the schema of its nearest
/// ancestor path, and finally the workspace default.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::parent_path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub id: String,
    pub title: String,
}

impl ColumnDef {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub columns: Vec<ColumnDef>,
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self {
            columns: vec![
                ColumnDef::new("todo", "To Do"),
                ColumnDef::new("in-progress", "In Progress"),
                ColumnDef::new("done", "Done"),
            ],
        }
    }
}

impl ColumnSchema {
    pub fn first_status(&self) -> Option<&str> {
        self.columns.first().map(|c| c.id.as_str())
    }

    pub fn has_status(&self, status: &str) -> bool {
        self.columns.iter().any(|c| c.id == status)
    }
}

/// Per-path schemas with ancestor fallback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaRegistry {
    #[serde(default)]
    pub default: ColumnSchema,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub boards: BTreeMap<String, ColumnSchema>,
}

impl SchemaRegistry {
    pub fn with_default(default: ColumnSchema) -> Self {
        Self {
            default,
            boards: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, path: impl Into<String>, schema: ColumnSchema) {
        self.boards.insert(path.into(), schema);
    }

    /// Schema in effect for `path`.
    pub fn resolve(&self, path: &str) -> &ColumnSchema {
        let mut current = Some(path);
        while let Some(p) = current {
            if let Some(schema) = self.boards.get(p) {
                return schema;
            }
            current = parent_path(p);
        }
        &self.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema_columns() {
        let schema = ColumnSchema::default();
        assert_eq!(schema.first_status(), Some("todo"));
        assert!(schema.has_status("done"));
        assert!(!schema.has_status("archived"));
    }

    #[test]
    fn test_resolve_falls_back_to_ancestor() {
        let mut registry = SchemaRegistry::default();
        registry.set(
            "root/a",
            ColumnSchema {
                columns: vec![ColumnDef::new("open", "Open"), ColumnDef::new("closed", "Closed")],
            },
        );

        assert_eq!(registry.resolve("root/a/b/c").first_status(), Some("open"));
        assert_eq!(registry.resolve("root/a").first_status(), Some("open"));
        assert_eq!(registry.resolve("root").first_status(), Some("todo"));
        assert_eq!(registry.resolve("root/x").first_status(), Some("todo"));
    }
}
