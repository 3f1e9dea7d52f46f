/// Canonical card collection with per-(path, status) ordering.
///
/// The store only knows raw mutations. It never records history; the
/// workspace pairs each store mutation with its diff, and the applier
/// replays diffs through the same primitives.
///
/// Invariants kept by every primitive:
/// - a card at path P with status S is listed exactly once in `ordering[P][S]`
/// - every listed id exists with that path and status
/// - `parent.children` lists the card and the card's path ends with `/parent`
use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{BoardError, Result};
use crate::schema::{ColumnSchema, SchemaRegistry};
use crate::types::*;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardStore {
    cards: BTreeMap<CardId, Card>,
    ordering: OrderingTable,
    schemas: SchemaRegistry,
}

impl CardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schemas(schemas: SchemaRegistry) -> Self {
        Self {
            schemas,
            ..Self::default()
        }
    }

    /// Build a store from persisted parts. The caller is expected to run
    /// [`CardStore::check_invariants`] on untrusted input.
    pub fn from_parts(
        cards: BTreeMap<CardId, Card>,
        ordering: OrderingTable,
        schemas: SchemaRegistry,
    ) -> Self {
        Self {
            cards,
            ordering,
            schemas,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn card(&self, id: &str) -> Option<&Card> {
        self.cards.get(id)
    }

    pub fn require_card(&self, id: &str) -> Result<&Card> {
        self.cards
            .get(id)
            .ok_or_else(|| BoardError::CardNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cards.contains_key(id)
    }

    pub fn cards(&self) -> &BTreeMap<CardId, Card> {
        &self.cards
    }

    pub fn ordering(&self) -> &OrderingTable {
        &self.ordering
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn schemas_mut(&mut self) -> &mut SchemaRegistry {
        &mut self.schemas
    }

    pub fn columns_for(&self, path: &str) -> &ColumnSchema {
        self.schemas.resolve(path)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Ordered ids for a column, or `None` if the list has never been created.
    pub fn order_of(&self, path: &str, status: &str) -> Option<&Vec<CardId>> {
        self.ordering.get(path).and_then(|by_status| by_status.get(status))
    }

    /// Cloned list for a column, `None` when absent. Used to capture diff state.
    pub fn order_snapshot(&self, path: &str, status: &str) -> Option<Vec<CardId>> {
        self.order_of(path, status).cloned()
    }

    /// Cards shown on a board, grouped by column in schema order, then any
    /// statuses outside the schema.
    pub fn cards_on(&self, path: &str) -> Vec<(&str, Vec<&Card>)> {
        let Some(by_status) = self.ordering.get(path) else {
            return Vec::new();
        };
        let schema = self.columns_for(path);
        let mut statuses: Vec<&str> = schema
            .columns
            .iter()
            .map(|c| c.id.as_str())
            .filter(|s| by_status.contains_key(*s))
            .collect();
        for status in by_status.keys() {
            if !schema.has_status(status) {
                statuses.push(status.as_str());
            }
        }

        statuses
            .into_iter()
            .map(|status| {
                let cards = by_status[status]
                    .iter()
                    .filter_map(|id| self.cards.get(id))
                    .collect();
                (status, cards)
            })
            .collect()
    }

    /// Position of a card: (path, status, index).
    pub fn position_of(&self, id: &str) -> Option<(String, String, usize)> {
        let card = self.cards.get(id)?;
        let index = self
            .order_of(&card.path, &card.status)?
            .iter()
            .position(|c| c == id)?;
        Some((card.path.clone(), card.status.clone(), index))
    }

    pub fn children_of(&self, id: &str) -> Vec<&Card> {
        self.cards
            .get(id)
            .map(|c| c.children.iter().filter_map(|cid| self.cards.get(cid)).collect())
            .unwrap_or_default()
    }

    /// All descendants of `id` in parent-first order, excluding `id` itself.
    pub fn descendants_of(&self, id: &str) -> Vec<CardId> {
        let mut out = self.subtree_ids(id);
        if !out.is_empty() {
            out.remove(0);
        }
        out
    }

    /// `id` followed by its descendants, parent-first. Empty if `id` is absent.
    fn subtree_ids(&self, id: &str) -> Vec<CardId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            let Some(card) = self.cards.get(&current) else {
                continue;
            };
            if !seen.insert(current.clone()) {
                continue;
            }
            for child in card.children.iter().rev() {
                stack.push(child.clone());
            }
            out.push(current);
        }
        out
    }

    // ── Raw mutations ────────────────────────────────────────────────────────

    /// Insert a full card snapshot. Appends the id to its ordering list and to
    /// its parent's children unless already present. Returns false if a card
    /// with this id already exists.
    pub fn insert_card(&mut self, card: Card) -> bool {
        if self.cards.contains_key(&card.id) {
            return false;
        }

        let list = self
            .ordering
            .entry(card.path.clone())
            .or_default()
            .entry(card.status.clone())
            .or_default();
        if !list.contains(&card.id) {
            list.push(card.id.clone());
        }

        if let Some(parent_id) = &card.parent_id {
            if let Some(parent) = self.cards.get_mut(parent_id) {
                if !parent.children.contains(&card.id) {
                    parent.children.push(card.id.clone());
                }
            }
        }

        self.cards.insert(card.id.clone(), card);
        true
    }

    /// Remove a card and all of its descendants.
    ///
    /// Returns the removed cards as they were before removal, parent first.
    /// Removal walks the subtree in reverse, so children always go before
    /// their parent and every children list stays valid.
    pub fn remove_card(&mut self, id: &str) -> Vec<Card> {
        let ids = self.subtree_ids(id);
        let snapshots: Vec<Card> = ids
            .iter()
            .filter_map(|cid| self.cards.get(cid).cloned())
            .collect();

        for cid in ids.iter().rev() {
            let Some(card) = self.cards.remove(cid) else {
                continue;
            };
            if let Some(list) = self
                .ordering
                .get_mut(&card.path)
                .and_then(|by_status| by_status.get_mut(&card.status))
            {
                list.retain(|x| x != cid);
            }
            if let Some(parent_id) = &card.parent_id {
                if let Some(parent) = self.cards.get_mut(parent_id) {
                    parent.children.retain(|x| x != cid);
                }
            }
        }

        snapshots
    }

    /// Assign one field. Returns false if the card is missing or the value
    /// does not fit the field.
    pub fn set_field(&mut self, id: &str, field: CardField, value: &Value) -> bool {
        let Some(card) = self.cards.get_mut(id) else {
            return false;
        };
        match card.set_field_value(field, value) {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "[nestboard.store.field] Cannot set {} on {}: {}",
                    field,
                    id,
                    e
                );
                false
            }
        }
    }

    /// Replace an ordering list wholesale. `None` removes the list, and the
    /// path entry once it holds no lists.
    pub fn set_order(&mut self, path: &str, status: &str, order: Option<Vec<CardId>>) {
        match order {
            Some(ids) => {
                self.ordering
                    .entry(path.to_string())
                    .or_default()
                    .insert(status.to_string(), ids);
            }
            None => {
                if let Some(by_status) = self.ordering.get_mut(path) {
                    by_status.remove(status);
                    if by_status.is_empty() {
                        self.ordering.remove(path);
                    }
                }
            }
        }
    }

    /// Move `id` within a list to `index` (clamped). Inserts it if absent.
    /// Returns false if the list does not exist.
    pub fn reposition(&mut self, path: &str, status: &str, id: &str, index: usize) -> bool {
        let Some(list) = self
            .ordering
            .get_mut(path)
            .and_then(|by_status| by_status.get_mut(status))
        else {
            return false;
        };
        list.retain(|x| x != id);
        let index = index.min(list.len());
        list.insert(index, id.to_string());
        true
    }

    /// Move a card to `new_status` on its current board, inserting at
    /// `index` (clamped) or appending. Same status means a pure reorder.
    /// Bumps `updated_at` only when the status changes.
    pub fn move_in_order(
        &mut self,
        id: &str,
        new_status: &str,
        index: Option<usize>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(card) = self.cards.get_mut(id) else {
            return false;
        };
        let path = card.path.clone();
        let old_status = std::mem::replace(&mut card.status, new_status.to_string());
        if old_status != new_status {
            card.updated_at = now;
        }

        let by_status = self.ordering.entry(path).or_default();
        if let Some(list) = by_status.get_mut(&old_status) {
            list.retain(|x| x != id);
        }
        let list = by_status.entry(new_status.to_string()).or_default();
        let index = index.unwrap_or(list.len()).min(list.len());
        list.insert(index, id.to_string());
        true
    }

    /// Replace a card's editable content with `next`, keeping ordering in
    /// step when the status changes (appended to the new column).
    /// Path, parent, and children are taken from the stored card.
    pub fn replace_content(&mut self, next: Card) -> bool {
        let Some(card) = self.cards.get_mut(&next.id) else {
            return false;
        };
        let old_status = card.status.clone();
        let path = card.path.clone();
        card.title = next.title;
        card.description = next.description;
        card.status = next.status;
        card.metadata = next.metadata;
        card.updated_at = next.updated_at;

        if card.status != old_status {
            let new_status = card.status.clone();
            let by_status = self.ordering.entry(path).or_default();
            if let Some(list) = by_status.get_mut(&old_status) {
                list.retain(|x| x != &next.id);
            }
            by_status.entry(new_status).or_default().push(next.id);
        }
        true
    }

    // ── Consistency ──────────────────────────────────────────────────────────

    /// Verify ordering, parent/child, and path invariants.
    pub fn check_invariants(&self) -> Result<()> {
        for (id, card) in &self.cards {
            if &card.id != id {
                return Err(inconsistent(format!("card keyed {} carries id {}", id, card.id)));
            }
            let occurrences = self
                .order_of(&card.path, &card.status)
                .map_or(0, |list| list.iter().filter(|x| *x == id).count());
            if occurrences != 1 {
                return Err(inconsistent(format!(
                    "card {} listed {} times in {}/{}",
                    id, occurrences, card.path, card.status
                )));
            }

            match &card.parent_id {
                Some(parent_id) => {
                    let parent = self.cards.get(parent_id).ok_or_else(|| {
                        inconsistent(format!("card {} has missing parent {}", id, parent_id))
                    })?;
                    if !parent.children.contains(id) {
                        return Err(inconsistent(format!(
                            "parent {} does not list child {}",
                            parent_id, id
                        )));
                    }
                    if card.path != child_path(parent) {
                        return Err(inconsistent(format!(
                            "card {} has path {} but parent {} expects {}",
                            id,
                            card.path,
                            parent_id,
                            child_path(parent)
                        )));
                    }
                }
                None => {
                    if card.path != ROOT_PATH {
                        return Err(inconsistent(format!(
                            "card {} has no parent but lives on {}",
                            id, card.path
                        )));
                    }
                }
            }

            for child_id in &card.children {
                let child = self.cards.get(child_id).ok_or_else(|| {
                    inconsistent(format!("card {} lists missing child {}", id, child_id))
                })?;
                if child.parent_id.as_deref() != Some(id.as_str()) {
                    return Err(inconsistent(format!(
                        "card {} lists child {} with another parent",
                        id, child_id
                    )));
                }
            }

            // Parent chains are bounded by the number of cards.
            let mut hops = 0;
            let mut cursor = card.parent_id.as_deref();
            while let Some(pid) = cursor {
                hops += 1;
                if pid == id.as_str() || hops > self.cards.len() {
                    return Err(inconsistent(format!("parent cycle through {}", id)));
                }
                cursor = self.cards.get(pid).and_then(|p| p.parent_id.as_deref());
            }
        }

        for (path, by_status) in &self.ordering {
            for (status, list) in by_status {
                let mut seen = HashSet::new();
                for id in list {
                    if !seen.insert(id) {
                        return Err(inconsistent(format!(
                            "{} listed twice in {}/{}",
                            id, path, status
                        )));
                    }
                    match self.cards.get(id) {
                        Some(card) if &card.path == path && &card.status == status => {}
                        Some(_) => {
                            return Err(inconsistent(format!(
                                "{} listed in {}/{} but lives elsewhere",
                                id, path, status
                            )))
                        }
                        None => {
                            return Err(inconsistent(format!(
                                "orphan order entry {} in {}/{}",
                                id, path, status
                            )))
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn inconsistent(message: String) -> BoardError {
    BoardError::Inconsistent(message)
}
