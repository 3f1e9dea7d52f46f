/// Sparse change records between card states.
///
/// A [`Diff`] is an ordered list of [`Change`]s. Redo applies them front to
/// back, undo back to front, so a diff recorded as "what happened, in order"
/// reverses exactly.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Card, CardField, CardId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Change {
    Field {
        card_id: CardId,
        field: CardField,
        old_value: Value,
        new_value: Value,
    },
    Created {
        card: Card,
    },
    Deleted {
        card: Card,
    },
    Order(OrderChange),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderChange {
    pub path: String,
    pub status: String,
    pub update: OrderUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OrderUpdate {
    /// Whole-list replacement. `None` means the list did not exist.
    Replace {
        old: Option<Vec<CardId>>,
        new: Option<Vec<CardId>>,
    },
    /// Single-card reposition within one list.
    Reposition {
        card_id: CardId,
        old_index: usize,
        new_index: usize,
    },
}

impl Change {
    /// Card id this change is about, if any.
    pub fn card_id(&self) -> Option<&str> {
        match self {
            Change::Field { card_id, .. } => Some(card_id.as_str()),
            Change::Created { card } | Change::Deleted { card } => Some(card.id.as_str()),
            Change::Order(OrderChange {
                update: OrderUpdate::Reposition { card_id, .. },
                ..
            }) => Some(card_id.as_str()),
            Change::Order(_) => None,
        }
    }

    fn is_structural(&self) -> bool {
        matches!(self, Change::Created { .. } | Change::Deleted { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub changes: Vec<Change>,
}

impl Diff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn push_opt(&mut self, change: Option<Change>) {
        if let Some(change) = change {
            self.changes.push(change);
        }
    }

    pub fn extend(&mut self, other: Diff) {
        self.changes.extend(other.changes);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    /// Field changes recorded for one card, in order.
    pub fn field_changes(&self, card_id: &str) -> Vec<(CardField, &Value, &Value)> {
        self.changes
            .iter()
            .filter_map(|c| match c {
                Change::Field {
                    card_id: id,
                    field,
                    old_value,
                    new_value,
                } if id == card_id => Some((*field, old_value, new_value)),
                _ => None,
            })
            .collect()
    }

    pub fn created(&self) -> impl Iterator<Item = &Card> {
        self.changes.iter().filter_map(|c| match c {
            Change::Created { card } => Some(card),
            _ => None,
        })
    }

    pub fn deleted(&self) -> impl Iterator<Item = &Card> {
        self.changes.iter().filter_map(|c| match c {
            Change::Deleted { card } => Some(card),
            _ => None,
        })
    }

    pub fn order_changes(&self) -> impl Iterator<Item = &OrderChange> {
        self.changes.iter().filter_map(|c| match c {
            Change::Order(o) => Some(o),
            _ => None,
        })
    }
}

impl<'a> IntoIterator for &'a Diff {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// Drop `null` members from objects, recursively, so an absent key and a
/// key holding `null` compare equal.
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), normalize(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        other => other.clone(),
    }
}

/// Structural equality on normalized values.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    normalize(a) == normalize(b)
}

/// Field-level diff between two snapshots of the same card. Only fields
/// whose normalized value differs are emitted.
pub fn build_field_diff(before: &Card, after: &Card) -> Diff {
    let mut diff = Diff::new();
    for field in CardField::ALL {
        let old_value = before.field_value(field);
        let new_value = after.field_value(field);
        if !values_equal(&old_value, &new_value) {
            diff.push(Change::Field {
                card_id: after.id.clone(),
                field,
                old_value,
                new_value,
            });
        }
    }
    diff
}

/// Single-field change, or `None` when the values are equal.
pub fn field_change(card_id: &str, field: CardField, old_value: Value, new_value: Value) -> Option<Change> {
    if values_equal(&old_value, &new_value) {
        return None;
    }
    Some(Change::Field {
        card_id: card_id.to_string(),
        field,
        old_value,
        new_value,
    })
}

pub fn created(card: &Card) -> Change {
    Change::Created { card: card.clone() }
}

pub fn deleted(card: &Card) -> Change {
    Change::Deleted { card: card.clone() }
}

/// Whole-list order change, or `None` when the list is unchanged.
pub fn order_replace(
    path: &str,
    status: &str,
    old: Option<Vec<CardId>>,
    new: Option<Vec<CardId>>,
) -> Option<Change> {
    if old == new {
        return None;
    }
    Some(Change::Order(OrderChange {
        path: path.to_string(),
        status: status.to_string(),
        update: OrderUpdate::Replace { old, new },
    }))
}

pub fn reposition(path: &str, status: &str, card_id: &str, old_index: usize, new_index: usize) -> Change {
    Change::Order(OrderChange {
        path: path.to_string(),
        status: status.to_string(),
        update: OrderUpdate::Reposition {
            card_id: card_id.to_string(),
            old_index,
            new_index,
        },
    })
}

/// Merge `b` into `a` for action grouping.
///
/// The merged diff must reverse to the state before `a`. Field changes keyed
/// by (card, field) keep `a`'s old value and take `b`'s new value. Order
/// changes keyed by (path, status) keep `a`'s old state and take `b`'s new
/// state. Anything else from `b` is appended. Diffs that create or delete
/// cards are concatenated untouched, since their entries depend on the order
/// they were applied in.
///
/// A bulk diff may hold several entries with the same key. Undo applies the
/// first of them last and redo applies the last of them last, so `b`'s new
/// value goes into the last matching entry.
pub fn merge_diffs(a: &Diff, b: &Diff) -> Diff {
    let mut merged = a.clone();
    if a.changes.iter().chain(b.changes.iter()).any(Change::is_structural) {
        merged.changes.extend(b.changes.iter().cloned());
        return merged;
    }

    for change in b {
        if !merge_into(&mut merged.changes, change) {
            merged.changes.push(change.clone());
        }
    }
    merged
}

/// Fold `change` into the last entry of `changes` with the same key.
/// Returns false if there is none.
fn merge_into(changes: &mut [Change], change: &Change) -> bool {
    match change {
        Change::Field {
            card_id,
            field,
            new_value,
            ..
        } => {
            for existing in changes.iter_mut().rev() {
                if let Change::Field {
                    card_id: id,
                    field: f,
                    new_value: existing_new,
                    ..
                } = existing
                {
                    if id == card_id && f == field {
                        *existing_new = new_value.clone();
                        return true;
                    }
                }
            }
            false
        }
        Change::Order(incoming) => {
            for existing in changes.iter_mut().rev() {
                let Change::Order(current) = existing else {
                    continue;
                };
                if current.path != incoming.path || current.status != incoming.status {
                    continue;
                }
                match (&mut current.update, &incoming.update) {
                    (OrderUpdate::Replace { new, .. }, OrderUpdate::Replace { new: incoming_new, .. }) => {
                        *new = incoming_new.clone();
                        return true;
                    }
                    (
                        OrderUpdate::Reposition {
                            card_id,
                            new_index,
                            ..
                        },
                        OrderUpdate::Reposition {
                            card_id: incoming_id,
                            new_index: incoming_index,
                            ..
                        },
                    ) if card_id == incoming_id => {
                        *new_index = *incoming_index;
                        return true;
                    }
                    _ => {}
                }
            }
            false
        }
        Change::Created { .. } | Change::Deleted { .. } => false,
    }
}
