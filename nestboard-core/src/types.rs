use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Path of the top-level board. Sub-board paths extend it with ancestor ids.
pub const ROOT_PATH: &str = "root";

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '/';

/// Suffix appended to the title of a duplicated card.
pub const COPY_SUFFIX: &str = " (Copy)";

pub type CardId = String;

/// `path -> status -> ordered card ids`. The only source of truth for display order.
pub type OrderingTable = BTreeMap<String, BTreeMap<String, Vec<CardId>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: String,
    /// Board the card is displayed on (`root` or `root/<ancestor>/.../<ancestor>`).
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CardId>,
    #[serde(default)]
    pub children: Vec<CardId>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Every field of a card that can carry a recorded change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardField {
    Title,
    Description,
    Status,
    Path,
    ParentId,
    Children,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

impl CardField {
    /// Fields in declaration order. Diffs are emitted in this order.
    pub const ALL: [CardField; 9] = [
        CardField::Title,
        CardField::Description,
        CardField::Status,
        CardField::Path,
        CardField::ParentId,
        CardField::Children,
        CardField::Metadata,
        CardField::CreatedAt,
        CardField::UpdatedAt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardField::Title => "title",
            CardField::Description => "description",
            CardField::Status => "status",
            CardField::Path => "path",
            CardField::ParentId => "parentId",
            CardField::Children => "children",
            CardField::Metadata => "metadata",
            CardField::CreatedAt => "createdAt",
            CardField::UpdatedAt => "updatedAt",
        }
    }
}

impl std::fmt::Display for CardField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Card {
    /// Read a single field as a JSON value.
    pub fn field_value(&self, field: CardField) -> Value {
        match field {
            CardField::Title => Value::String(self.title.clone()),
            CardField::Description => Value::String(self.description.clone()),
            CardField::Status => Value::String(self.status.clone()),
            CardField::Path => Value::String(self.path.clone()),
            CardField::ParentId => self
                .parent_id
                .as_ref()
                .map_or(Value::Null, |p| Value::String(p.clone())),
            CardField::Children => Value::Array(
                self.children
                    .iter()
                    .map(|c| Value::String(c.clone()))
                    .collect(),
            ),
            CardField::Metadata => Value::Object(self.metadata.clone()),
            CardField::CreatedAt => serde_json::to_value(self.created_at).unwrap_or(Value::Null),
            CardField::UpdatedAt => serde_json::to_value(self.updated_at).unwrap_or(Value::Null),
        }
    }

    /// Assign a single field from a JSON value. The card is left untouched on error.
    pub fn set_field_value(&mut self, field: CardField, value: &Value) -> Result<(), serde_json::Error> {
        let value = value.clone();
        match field {
            CardField::Title => self.title = serde_json::from_value(value)?,
            CardField::Description => self.description = serde_json::from_value(value)?,
            CardField::Status => self.status = serde_json::from_value(value)?,
            CardField::Path => self.path = serde_json::from_value(value)?,
            CardField::ParentId => self.parent_id = serde_json::from_value(value)?,
            CardField::Children => self.children = serde_json::from_value(value)?,
            CardField::Metadata => {
                self.metadata = match value {
                    Value::Null => Map::new(),
                    other => serde_json::from_value(other)?,
                }
            }
            CardField::CreatedAt => self.created_at = serde_json::from_value(value)?,
            CardField::UpdatedAt => self.updated_at = serde_json::from_value(value)?,
        }
        Ok(())
    }
}

/// Input for creating a card. Missing status falls back to the board schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub parent_id: Option<CardId>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CardDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<CardId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Partial update of a card. `None` leaves a field unchanged.
///
/// Metadata is merged key by key; a `null` value removes the key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl CardPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.metadata.is_none()
    }

    /// Apply the patch to a copy of `card`. Timestamps are not touched.
    pub fn applied_to(&self, card: &Card) -> Card {
        let mut next = card.clone();
        if let Some(title) = &self.title {
            next.title = title.clone();
        }
        if let Some(description) = &self.description {
            next.description = description.clone();
        }
        if let Some(status) = &self.status {
            next.status = status.clone();
        }
        if let Some(metadata) = &self.metadata {
            for (key, value) in metadata {
                if value.is_null() {
                    next.metadata.remove(key);
                } else {
                    next.metadata.insert(key.clone(), value.clone());
                }
            }
        }
        next
    }
}

/// Path of the sub-board that shows the children of `parent`.
pub fn child_path(parent: &Card) -> String {
    format!("{}{}{}", parent.path, PATH_SEPARATOR, parent.id)
}

/// Ancestor ids encoded in a path, outermost first. `root` itself is not an ancestor.
pub fn ancestor_ids(path: &str) -> Vec<&str> {
    path.split(PATH_SEPARATOR)
        .skip(1)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parent path of a board path, or `None` for the root board.
pub fn parent_path(path: &str) -> Option<&str> {
    path.rfind(PATH_SEPARATOR).map(|idx| &path[..idx])
}
