/// The application-level context: card store, undo history, selection, and
/// change notifications.
///
/// Every public mutator here pairs a raw store mutation with the diff that
/// reverses it and records exactly one action. Undo and redo replay those
/// diffs through [`crate::apply::apply_diff`], which only touches raw store
/// primitives, so a replay is never recorded again.
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::apply::apply_diff;
use crate::config::{HistoryConfig, WorkspaceConfig};
use crate::diff::{self, build_field_diff, field_change, order_replace, Diff};
use crate::error::{BoardError, Result};
use crate::events::{BoardEvent, EVENT_CHANNEL_CAPACITY};
use crate::history::{
    ActionDraft, ActionHistory, ActionType, Direction, HistoryStats, MemoryUsage, RecordOutcome,
};
use crate::identity::generate_card_id;
use crate::schema::{ColumnSchema, SchemaRegistry};
use crate::snapshot::BoardSnapshot;
use crate::store::CardStore;
use crate::types::*;

/// Status used when neither the draft nor the board schema names one.
const FALLBACK_STATUS: &str = "todo";

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct Workspace {
    store: CardStore,
    history: ActionHistory,
    selection: BTreeSet<CardId>,
    events: broadcast::Sender<BoardEvent>,
    clock: Clock,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("cards", &self.store.len())
            .field("undo_len", &self.history.undo_len())
            .field("redo_len", &self.history.redo_len())
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(WorkspaceConfig::default())
    }
}

impl Workspace {
    pub fn new(config: WorkspaceConfig) -> Self {
        let WorkspaceConfig {
            history,
            default_columns,
        } = config;
        let store = CardStore::with_schemas(SchemaRegistry::with_default(default_columns));
        Self::with_store(store, history)
    }

    /// Open a workspace on persisted cards. The snapshot is checked against
    /// store invariants first.
    pub fn from_snapshot(snapshot: BoardSnapshot, config: WorkspaceConfig) -> Result<Self> {
        let store = snapshot.into_store()?;
        Ok(Self::with_store(store, config.history))
    }

    fn with_store(store: CardStore, history: HistoryConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            history: ActionHistory::new(history),
            selection: BTreeSet::new(),
            events,
            clock: Box::new(Utc::now),
        }
    }

    /// Replace the time source used for card timestamps and grouping.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot::from_store(&self.store)
    }

    /// Swap in persisted cards. History and selection are reset since they
    /// describe the previous store.
    pub fn restore(&mut self, snapshot: BoardSnapshot) -> Result<()> {
        self.store = snapshot.into_store()?;
        self.history.clear();
        self.selection.clear();
        log::info!(
            "[nestboard.workspace.restore] Loaded {} cards",
            self.store.len()
        );
        Ok(())
    }

    pub fn store(&self) -> &CardStore {
        &self.store
    }

    pub fn card(&self, id: &str) -> Option<&Card> {
        self.store.card(id)
    }

    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    /// Set the column schema for a board. Schemas are not undoable.
    pub fn set_schema(&mut self, path: impl Into<String>, schema: ColumnSchema) {
        self.store.schemas_mut().set(path, schema);
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn emit(&self, event: BoardEvent) {
        if self.events.send(event).is_err() {
            log::trace!("[nestboard.events] No subscribers");
        }
    }

    fn record(
        &mut self,
        action_type: ActionType,
        description: String,
        diff: Diff,
        card_ids: Vec<CardId>,
        at: DateTime<Utc>,
    ) -> RecordOutcome {
        let draft = ActionDraft::new(action_type, description, diff)
            .with_cards(card_ids)
            .at(at.timestamp_millis());
        let outcome = self.history.record(draft);
        log::debug!(
            "[nestboard.workspace.record] {:?} -> {:?}",
            action_type,
            outcome
        );
        outcome
    }

    // ── Card mutations ───────────────────────────────────────────────────────

    /// Create a card and record it.
    ///
    /// With a `parent_id` (or a sub-board `path`) the card is placed on the
    /// parent's sub-board and fails with [`BoardError::ParentNotFound`] when
    /// the parent does not exist. Status falls back to the first column of
    /// the board's schema.
    pub fn create_card(&mut self, draft: CardDraft) -> Result<CardId> {
        let (path, parent_id) = self.resolve_placement(&draft)?;
        let status = match draft.status {
            Some(status) => status,
            None => self
                .store
                .columns_for(&path)
                .first_status()
                .unwrap_or(FALLBACK_STATUS)
                .to_string(),
        };

        let now = self.now();
        let card = Card {
            id: generate_card_id(),
            title: draft.title,
            description: draft.description,
            status,
            path,
            parent_id,
            children: Vec::new(),
            metadata: draft.metadata,
            created_at: now,
            updated_at: now,
        };
        let id = card.id.clone();
        let description = format!("Create card \"{}\"", card.title);

        let diff = self.insert_with_diff(card);
        self.record(ActionType::CreateCard, description, diff, vec![id.clone()], now);
        self.emit(BoardEvent::CardCreated {
            card_id: id.clone(),
        });
        Ok(id)
    }

    /// Create a card on `parent_id`'s sub-board. Status defaults to the
    /// parent's status.
    pub fn create_child_card(&mut self, parent_id: &str, mut draft: CardDraft) -> Result<CardId> {
        let parent = self
            .store
            .card(parent_id)
            .ok_or_else(|| BoardError::ParentNotFound(parent_id.to_string()))?;
        if draft.status.is_none() {
            draft.status = Some(parent.status.clone());
        }
        draft.path = Some(child_path(parent));
        draft.parent_id = Some(parent_id.to_string());
        self.create_card(draft)
    }

    fn resolve_placement(&self, draft: &CardDraft) -> Result<(String, Option<CardId>)> {
        let parent_id = match (&draft.parent_id, &draft.path) {
            (Some(parent_id), _) => parent_id.clone(),
            (None, Some(path)) => match ancestor_ids(path).last() {
                Some(last) => last.to_string(),
                None => return Ok((ROOT_PATH.to_string(), None)),
            },
            (None, None) => return Ok((ROOT_PATH.to_string(), None)),
        };
        let parent = self
            .store
            .card(&parent_id)
            .ok_or_else(|| BoardError::ParentNotFound(parent_id.clone()))?;
        Ok((child_path(parent), Some(parent_id)))
    }

    /// Apply `patch` to a card. Returns false for unknown ids and for patches
    /// that change nothing; neither is recorded.
    pub fn update_card(&mut self, id: &str, patch: &CardPatch) -> bool {
        let now = self.now();
        let Some(diff) = self.update_with_diff(id, patch, now) else {
            return false;
        };
        let fields = changed_fields(&diff, id);
        let description = self.describe("Update card", id);
        self.record(ActionType::UpdateCard, description, diff, vec![id.to_string()], now);
        self.emit(BoardEvent::CardUpdated {
            card_id: id.to_string(),
            fields,
        });
        true
    }

    /// Delete a card and its whole subtree. Returns false for unknown ids.
    pub fn delete_card(&mut self, id: &str) -> bool {
        let now = self.now();
        let description = self.describe("Delete card", id);
        let Some((diff, removed)) = self.delete_with_diff(id) else {
            return false;
        };
        self.record(ActionType::DeleteCard, description, diff, vec![id.to_string()], now);
        self.emit(BoardEvent::CardsDeleted { card_ids: removed });
        true
    }

    /// Copy a card next to the original. The copy gets a new id, the
    /// `" (Copy)"` title suffix, fresh timestamps, and no children.
    pub fn duplicate_card(&mut self, id: &str) -> Option<CardId> {
        let source = self.store.card(id)?;
        let now = self.now();
        let copy = Card {
            id: generate_card_id(),
            title: format!("{}{}", source.title, COPY_SUFFIX),
            description: source.description.clone(),
            status: source.status.clone(),
            path: source.path.clone(),
            parent_id: source.parent_id.clone(),
            children: Vec::new(),
            metadata: source.metadata.clone(),
            created_at: now,
            updated_at: now,
        };
        let copy_id = copy.id.clone();
        let description = format!("Duplicate card \"{}\"", source.title);

        let diff = self.insert_with_diff(copy);
        self.record(
            ActionType::DuplicateCard,
            description,
            diff,
            vec![copy_id.clone(), id.to_string()],
            now,
        );
        self.emit(BoardEvent::CardCreated {
            card_id: copy_id.clone(),
        });
        Some(copy_id)
    }

    /// Move a card to `new_status` on its board, at `new_index` (clamped) or
    /// at the end. Returns whether anything changed.
    pub fn move_card(&mut self, id: &str, new_status: &str, new_index: Option<usize>) -> bool {
        let now = self.now();
        let Some(from_status) = self.store.card(id).map(|c| c.status.clone()) else {
            return false;
        };
        let Some(diff) = self.move_with_diff(id, new_status, new_index, now) else {
            return false;
        };
        let description = self.describe("Move card", id);
        self.record(ActionType::MoveCard, description, diff, vec![id.to_string()], now);
        self.emit(BoardEvent::CardMoved {
            card_id: id.to_string(),
            from_status,
            to_status: new_status.to_string(),
        });
        true
    }

    // ── Bulk mutations ───────────────────────────────────────────────────────
    //
    // Each bulk call records a single action holding the concatenated diffs
    // of its per-card steps. Unknown ids are skipped.

    /// Returns the number of cards that changed.
    pub fn bulk_update(&mut self, ids: &[CardId], patch: &CardPatch) -> usize {
        let now = self.now();
        let mut diff = Diff::new();
        let mut changed = Vec::new();
        for id in ids {
            if let Some(card_diff) = self.update_with_diff(id, patch, now) {
                let fields = changed_fields(&card_diff, id);
                diff.extend(card_diff);
                changed.push((id.clone(), fields));
            }
        }
        if changed.is_empty() {
            return 0;
        }

        let card_ids: Vec<CardId> = changed.iter().map(|(id, _)| id.clone()).collect();
        let description = format!("Update {} cards", card_ids.len());
        self.record(ActionType::BulkUpdate, description, diff, card_ids, now);
        let count = changed.len();
        for (card_id, fields) in changed {
            self.emit(BoardEvent::CardUpdated { card_id, fields });
        }
        count
    }

    /// Returns the number of cards removed, descendants included.
    pub fn bulk_delete(&mut self, ids: &[CardId]) -> usize {
        let now = self.now();
        let mut diff = Diff::new();
        let mut roots = Vec::new();
        let mut removed = Vec::new();
        for id in ids {
            // Already gone as a descendant of an earlier id.
            if let Some((card_diff, card_removed)) = self.delete_with_diff(id) {
                diff.extend(card_diff);
                roots.push(id.clone());
                removed.extend(card_removed);
            }
        }
        if roots.is_empty() {
            return 0;
        }

        let description = format!("Delete {} cards", roots.len());
        self.record(ActionType::BulkDelete, description, diff, roots, now);
        let count = removed.len();
        self.emit(BoardEvent::CardsDeleted { card_ids: removed });
        count
    }

    /// Append every listed card to `new_status` on its own board. Cards
    /// already in that status are left where they are.
    pub fn bulk_move(&mut self, ids: &[CardId], new_status: &str) -> usize {
        let now = self.now();
        let mut diff = Diff::new();
        let mut moved = Vec::new();
        for id in ids {
            let Some(from_status) = self.store.card(id).map(|c| c.status.clone()) else {
                continue;
            };
            if from_status == new_status {
                continue;
            }
            if let Some(card_diff) = self.move_with_diff(id, new_status, None, now) {
                diff.extend(card_diff);
                moved.push((id.clone(), from_status));
            }
        }
        if moved.is_empty() {
            return 0;
        }

        let card_ids: Vec<CardId> = moved.iter().map(|(id, _)| id.clone()).collect();
        let description = format!("Move {} cards to {}", card_ids.len(), new_status);
        self.record(ActionType::BulkMove, description, diff, card_ids, now);
        let count = moved.len();
        for (card_id, from_status) in moved {
            self.emit(BoardEvent::CardMoved {
                card_id,
                from_status,
                to_status: new_status.to_string(),
            });
        }
        count
    }

    // ── Mutation + diff pairs ────────────────────────────────────────────────

    /// Insert a new card. Diff: created, parent children, order list.
    fn insert_with_diff(&mut self, card: Card) -> Diff {
        let old_order = self.store.order_snapshot(&card.path, &card.status);
        let old_children = self.children_value(card.parent_id.as_deref());

        let mut diff = Diff::new();
        diff.push(diff::created(&card));
        let (path, status, parent_id) = (card.path.clone(), card.status.clone(), card.parent_id.clone());
        self.store.insert_card(card);

        if let (Some(parent_id), Some(old_children)) = (parent_id.as_deref(), old_children) {
            if let Some(new_children) = self.children_value(Some(parent_id)) {
                diff.push_opt(field_change(
                    parent_id,
                    CardField::Children,
                    old_children,
                    new_children,
                ));
            }
        }
        diff.push_opt(order_replace(
            &path,
            &status,
            old_order,
            self.store.order_snapshot(&path, &status),
        ));
        diff
    }

    fn update_with_diff(&mut self, id: &str, patch: &CardPatch, now: DateTime<Utc>) -> Option<Diff> {
        let before = self.store.card(id)?.clone();
        let mut next = patch.applied_to(&before);
        if build_field_diff(&before, &next).is_empty() {
            return None;
        }
        next.updated_at = now;

        let status_changed = next.status != before.status;
        let old_src = self.store.order_snapshot(&before.path, &before.status);
        let old_dst = self.store.order_snapshot(&before.path, &next.status);
        let new_status = next.status.clone();
        self.store.replace_content(next);

        let after = self.store.card(id)?;
        let mut diff = build_field_diff(&before, after);
        if status_changed {
            diff.push_opt(order_replace(
                &before.path,
                &before.status,
                old_src,
                self.store.order_snapshot(&before.path, &before.status),
            ));
            diff.push_opt(order_replace(
                &before.path,
                &new_status,
                old_dst,
                self.store.order_snapshot(&before.path, &new_status),
            ));
        }
        Some(diff)
    }

    /// Remove a subtree. Diff: every affected order list, the parent's
    /// children, then deleted snapshots parent-first. Also returns the
    /// removed ids.
    fn delete_with_diff(&mut self, id: &str) -> Option<(Diff, Vec<CardId>)> {
        let card = self.store.card(id)?;
        let parent_id = card.parent_id.clone();

        let mut subtree = vec![id.to_string()];
        subtree.extend(self.store.descendants_of(id));
        let mut old_orders: BTreeMap<(String, String), Option<Vec<CardId>>> = BTreeMap::new();
        for cid in &subtree {
            if let Some(c) = self.store.card(cid) {
                old_orders
                    .entry((c.path.clone(), c.status.clone()))
                    .or_insert_with(|| self.store.order_snapshot(&c.path, &c.status));
            }
        }
        let old_children = self.children_value(parent_id.as_deref());

        let removed = self.store.remove_card(id);

        let mut diff = Diff::new();
        for ((path, status), old) in old_orders {
            let new = self.store.order_snapshot(&path, &status);
            diff.push_opt(order_replace(&path, &status, old, new));
        }
        if let (Some(parent_id), Some(old_children)) = (parent_id.as_deref(), old_children) {
            if let Some(new_children) = self.children_value(Some(parent_id)) {
                diff.push_opt(field_change(
                    parent_id,
                    CardField::Children,
                    old_children,
                    new_children,
                ));
            }
        }
        for snapshot in &removed {
            diff.push(diff::deleted(snapshot));
        }

        let removed_ids: Vec<CardId> = removed.into_iter().map(|c| c.id).collect();
        for rid in &removed_ids {
            self.selection.remove(rid);
        }
        Some((diff, removed_ids))
    }

    /// Move within the card's board. Diff: status and updated_at when the
    /// status changes, then full source and destination lists.
    fn move_with_diff(
        &mut self,
        id: &str,
        new_status: &str,
        new_index: Option<usize>,
        now: DateTime<Utc>,
    ) -> Option<Diff> {
        let before = self.store.card(id)?.clone();
        let old_src = self.store.order_snapshot(&before.path, &before.status);
        let old_dst = self.store.order_snapshot(&before.path, new_status);

        self.store.move_in_order(id, new_status, new_index, now);

        let after = self.store.card(id)?;
        let mut diff = build_field_diff(&before, after);
        diff.push_opt(order_replace(
            &before.path,
            &before.status,
            old_src,
            self.store.order_snapshot(&before.path, &before.status),
        ));
        if before.status != new_status {
            diff.push_opt(order_replace(
                &before.path,
                new_status,
                old_dst,
                self.store.order_snapshot(&before.path, new_status),
            ));
        }
        (!diff.is_empty()).then_some(diff)
    }

    fn children_value(&self, parent_id: Option<&str>) -> Option<serde_json::Value> {
        parent_id
            .and_then(|pid| self.store.card(pid))
            .map(|p| p.field_value(CardField::Children))
    }

    fn describe(&self, verb: &str, id: &str) -> String {
        match self.store.card(id) {
            Some(card) => format!("{} \"{}\"", verb, card.title),
            None => verb.to_string(),
        }
    }

    // ── Undo / Redo ──────────────────────────────────────────────────────────

    /// Reverse the newest action. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        self.replay(Direction::Undo)
    }

    /// Re-apply the newest undone action. Returns false when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        self.replay(Direction::Redo)
    }

    fn replay(&mut self, direction: Direction) -> bool {
        let action = match direction {
            Direction::Undo => self.history.undo(),
            Direction::Redo => self.history.redo(),
        };
        let Some(action) = action else {
            return false;
        };

        let report = apply_diff(&mut self.store, &action.diff, direction);
        self.history.finish_replay();
        self.selection.retain(|id| self.store.contains(id));

        if report.skipped > 0 {
            log::debug!(
                "[nestboard.workspace.replay] {:?} of \"{}\" skipped {} of {} changes",
                direction,
                action.description,
                report.skipped,
                report.applied + report.skipped
            );
        }
        self.emit(BoardEvent::HistoryApplied {
            direction,
            action_id: action.id,
            description: action.description,
        });
        true
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.history.undo_description()
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.history.redo_description()
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        self.history.memory_usage()
    }

    pub fn stats(&self) -> HistoryStats {
        self.history.stats()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    // ── Selection ────────────────────────────────────────────────────────────

    /// Add a card to the selection. Unknown ids are ignored.
    pub fn select(&mut self, id: &str) -> bool {
        if !self.store.contains(id) {
            return false;
        }
        self.selection.insert(id.to_string())
    }

    pub fn deselect(&mut self, id: &str) -> bool {
        self.selection.remove(id)
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selection(&self) -> &BTreeSet<CardId> {
        &self.selection
    }

    pub fn selected_ids(&self) -> Vec<CardId> {
        self.selection.iter().cloned().collect()
    }
}

fn changed_fields(diff: &Diff, id: &str) -> Vec<CardField> {
    diff.field_changes(id)
        .into_iter()
        .map(|(field, _, _)| field)
        .collect()
}
