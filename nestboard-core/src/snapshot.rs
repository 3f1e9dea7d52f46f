/// JSON persistence of the card store.
///
/// A snapshot holds cards, ordering and schemas. Undo history is session
/// state and is never written.
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::SchemaRegistry;
use crate::store::CardStore;
use crate::types::{Card, CardId, OrderingTable};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    #[serde(default)]
    pub cards: BTreeMap<CardId, Card>,
    #[serde(default)]
    pub ordering: OrderingTable,
    #[serde(default)]
    pub schemas: SchemaRegistry,
}

impl BoardSnapshot {
    pub fn from_store(store: &CardStore) -> Self {
        Self {
            cards: store.cards().clone(),
            ordering: store.ordering().clone(),
            schemas: store.schemas().clone(),
        }
    }

    /// Rebuild a store, rejecting snapshots that break store invariants.
    pub fn into_store(self) -> Result<CardStore> {
        let store = CardStore::from_parts(self.cards, self.ordering, self.schemas);
        store.check_invariants()?;
        Ok(store)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

pub fn save_to_file(snapshot: &BoardSnapshot, path: &Path) -> Result<()> {
    let content = snapshot.to_json()?;
    atomic_write(path, &content)?;
    log::info!(
        "[nestboard.snapshot.save] Wrote {} cards to {}",
        snapshot.cards.len(),
        path.display()
    );
    Ok(())
}

pub fn load_from_file(path: &Path) -> Result<BoardSnapshot> {
    let content = fs::read_to_string(path)?;
    let snapshot = BoardSnapshot::from_json(&content)?;
    log::info!(
        "[nestboard.snapshot.load] Read {} cards from {}",
        snapshot.cards.len(),
        path.display()
    );
    Ok(snapshot)
}

/// Write to a sibling temp file, fsync, rename over `path`, fsync the directory.
fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("nestboard.tmp");
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;

    if let Some(dir) = path.parent() {
        if let Ok(d) = fs::File::open(dir) {
            let _ = d.sync_all();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoardError;
    use crate::schema::{ColumnDef, ColumnSchema};
    use crate::types::ROOT_PATH;
    use chrono::Utc;
    use tempfile::TempDir;

    fn make_card(id: &str, status: &str, path: &str, parent: Option<&str>) -> Card {
        let now = Utc::now();
        Card {
            id: id.to_string(),
            title: format!("Card {}", id),
            description: String::new(),
            status: status.to_string(),
            path: path.to_string(),
            parent_id: parent.map(|p| p.to_string()),
            children: vec![],
            metadata: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_store() -> CardStore {
        let mut store = CardStore::new();
        store.schemas_mut().set(
            "root/a",
            ColumnSchema {
                columns: vec![ColumnDef::new("open", "Open")],
            },
        );
        store.insert_card(make_card("a", "todo", ROOT_PATH, None));
        store.insert_card(make_card("b", "open", "root/a", Some("a")));
        store
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.json");
        let store = sample_store();

        save_to_file(&BoardSnapshot::from_store(&store), &path).unwrap();
        assert!(!path.with_extension("nestboard.tmp").exists());

        let loaded = load_from_file(&path).unwrap().into_store().unwrap();
        assert_eq!(loaded, store);
        assert_eq!(loaded.columns_for("root/a").first_status(), Some("open"));
    }

    #[test]
    fn test_save_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.json");
        fs::write(&path, "stale").unwrap();

        save_to_file(&BoardSnapshot::default(), &path).unwrap();
        let loaded = load_from_file(&path).unwrap();
        assert!(loaded.cards.is_empty());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_from_file(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, BoardError::Io(_)));
    }

    #[test]
    fn test_invalid_json_is_json_error() {
        assert!(matches!(
            BoardSnapshot::from_json("{ nope"),
            Err(BoardError::Json(_))
        ));
    }

    #[test]
    fn test_into_store_rejects_broken_ordering() {
        let mut snapshot = BoardSnapshot::from_store(&sample_store());
        snapshot
            .ordering
            .get_mut(ROOT_PATH)
            .unwrap()
            .get_mut("todo")
            .unwrap()
            .push("ghost".to_string());
        assert!(matches!(
            snapshot.into_store(),
            Err(BoardError::Inconsistent(_))
        ));
    }
}
