/// Bounded undo/redo history of diff-bearing actions.
///
/// - Consecutive actions of the same type on the same primary card within
///   the grouping window merge into one entry.
/// - A new (non-grouped) action clears the redo stack. History is linear.
/// - Memory is bounded by an estimated byte budget: when an entry would not
///   fit, the oldest 30% of the undo stack is evicted, then the redo stack.
/// - While an undo or redo is being replayed, recording is suppressed.
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::HistoryConfig;
use crate::diff::{merge_diffs, Diff};
use crate::types::CardId;

/// Share of the undo stack dropped by one cleanup pass, in percent.
const CLEANUP_PERCENT: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    CreateCard,
    UpdateCard,
    DeleteCard,
    MoveCard,
    DuplicateCard,
    BulkUpdate,
    BulkDelete,
    BulkMove,
}

impl ActionType {
    pub const ALL: [ActionType; 8] = [
        ActionType::CreateCard,
        ActionType::UpdateCard,
        ActionType::DeleteCard,
        ActionType::MoveCard,
        ActionType::DuplicateCard,
        ActionType::BulkUpdate,
        ActionType::BulkDelete,
        ActionType::BulkMove,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Undo,
    Redo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    Idle,
    Replaying(Direction),
}

/// A committed history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: u64,
    pub action_type: ActionType,
    /// Milliseconds since the Unix epoch of the latest merged mutation.
    pub timestamp: i64,
    pub description: String,
    pub diff: Diff,
    pub card_ids: Vec<CardId>,
    pub estimated_size_bytes: usize,
}

impl Action {
    pub fn primary_card_id(&self) -> Option<&str> {
        self.card_ids.first().map(String::as_str)
    }
}

/// What a mutator hands to [`ActionHistory::record`].
#[derive(Debug, Clone)]
pub struct ActionDraft {
    pub action_type: ActionType,
    pub description: String,
    pub diff: Diff,
    pub card_ids: Vec<CardId>,
    pub timestamp: i64,
}

impl ActionDraft {
    pub fn new(action_type: ActionType, description: impl Into<String>, diff: Diff) -> Self {
        Self {
            action_type,
            description: description.into(),
            diff,
            card_ids: Vec::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_cards(mut self, card_ids: Vec<CardId>) -> Self {
        self.card_ids = card_ids;
        self
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn primary_card_id(&self) -> Option<&str> {
        self.card_ids.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The action type is not enabled in the config.
    Disabled,
    /// An undo or redo is being replayed.
    Suppressed,
    /// The diff carried no changes.
    Empty,
    /// Merged into the newest undo entry.
    Grouped { action_id: u64 },
    /// Pushed as a new undo entry.
    Pushed { action_id: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub current_bytes: usize,
    pub max_bytes: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub undo_depth: usize,
    pub redo_depth: usize,
    pub total_actions_recorded: u64,
    pub total_memory_saved: u64,
    pub average_action_size: usize,
}

#[derive(Debug)]
pub struct ActionHistory {
    config: HistoryConfig,
    /// Oldest at the front, newest at the back.
    undo_stack: VecDeque<Action>,
    /// Newest undone action at the back.
    redo_stack: Vec<Action>,
    undo_bytes: usize,
    redo_bytes: usize,
    mode: ReplayMode,
    /// Timestamp of the last recorded mutation. Reset by undo/redo so
    /// grouping never spans a replay.
    last_action_time: Option<i64>,
    next_id: u64,
    total_actions_recorded: u64,
    total_memory_saved: u64,
}

impl Default for ActionHistory {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl ActionHistory {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            undo_bytes: 0,
            redo_bytes: 0,
            mode: ReplayMode::Idle,
            last_action_time: None,
            next_id: 1,
            total_actions_recorded: 0,
            total_memory_saved: 0,
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    // ── Recording ────────────────────────────────────────────────────────────

    pub fn record(&mut self, draft: ActionDraft) -> RecordOutcome {
        if !self.config.is_enabled(draft.action_type) {
            return RecordOutcome::Disabled;
        }
        if self.is_replaying() {
            log::debug!(
                "[nestboard.history.record] Suppressed {:?} during replay",
                draft.action_type
            );
            return RecordOutcome::Suppressed;
        }
        if draft.diff.is_empty() {
            return RecordOutcome::Empty;
        }

        self.total_actions_recorded += 1;
        let timestamp = draft.timestamp;

        let outcome = if self.should_group(&draft) {
            self.group_into_top(draft)
        } else {
            self.push_new(draft)
        };
        self.last_action_time = Some(timestamp);
        outcome
    }

    fn should_group(&self, draft: &ActionDraft) -> bool {
        let (Some(top), Some(last)) = (self.undo_stack.back(), self.last_action_time) else {
            return false;
        };
        top.action_type == draft.action_type
            && top.primary_card_id() == draft.primary_card_id()
            && draft.timestamp - last <= self.config.grouping_window_ms
    }

    fn group_into_top(&mut self, draft: ActionDraft) -> RecordOutcome {
        let Some(mut top) = self.undo_stack.pop_back() else {
            return self.push_new(draft);
        };
        self.undo_bytes -= top.estimated_size_bytes;
        let separate_size = top.estimated_size_bytes + estimate_draft_size(&draft);

        top.diff = merge_diffs(&top.diff, &draft.diff);
        for id in draft.card_ids {
            if !top.card_ids.contains(&id) {
                top.card_ids.push(id);
            }
        }
        top.timestamp = draft.timestamp;
        top.estimated_size_bytes = estimate_size(&top);
        self.total_memory_saved +=
            separate_size.saturating_sub(top.estimated_size_bytes) as u64;

        self.make_room(top.estimated_size_bytes);
        let action_id = top.id;
        self.undo_bytes += top.estimated_size_bytes;
        self.undo_stack.push_back(top);
        RecordOutcome::Grouped { action_id }
    }

    fn push_new(&mut self, draft: ActionDraft) -> RecordOutcome {
        self.clear_redo();

        let mut action = Action {
            id: self.next_id,
            action_type: draft.action_type,
            timestamp: draft.timestamp,
            description: draft.description,
            diff: draft.diff,
            card_ids: draft.card_ids,
            estimated_size_bytes: 0,
        };
        self.next_id += 1;
        action.estimated_size_bytes = estimate_size(&action);

        self.make_room(action.estimated_size_bytes);
        let action_id = action.id;
        self.undo_bytes += action.estimated_size_bytes;
        self.undo_stack.push_back(action);

        while self.undo_stack.len() > self.config.max_stack_size {
            if let Some(oldest) = self.undo_stack.pop_front() {
                self.undo_bytes -= oldest.estimated_size_bytes;
                self.total_memory_saved += oldest.estimated_size_bytes as u64;
            }
        }
        RecordOutcome::Pushed { action_id }
    }

    /// Evict until `incoming` more bytes fit the budget, or nothing is left.
    fn make_room(&mut self, incoming: usize) {
        while self.current_bytes() + incoming > self.config.max_memory_bytes {
            if self.undo_stack.is_empty() && self.redo_stack.is_empty() {
                log::debug!(
                    "[nestboard.history.evict] Entry of {} bytes exceeds budget of {} bytes",
                    incoming,
                    self.config.max_memory_bytes
                );
                break;
            }
            if self.perform_cleanup() == 0 {
                // Only the redo stack is left and it fits; drop it outright.
                let freed = self.clear_redo();
                self.total_memory_saved += freed as u64;
                if freed == 0 {
                    break;
                }
            }
        }
    }

    fn clear_redo(&mut self) -> usize {
        let freed = self.redo_bytes;
        self.redo_stack.clear();
        self.redo_bytes = 0;
        freed
    }

    /// Evict the oldest 30% of the undo stack (at least one entry when not
    /// empty). If the budget is still exceeded, also clear the redo stack.
    /// Returns the number of bytes freed.
    pub fn perform_cleanup(&mut self) -> usize {
        let evict = (self.undo_stack.len() * CLEANUP_PERCENT).div_ceil(100);
        let mut freed = 0;
        for _ in 0..evict {
            if let Some(oldest) = self.undo_stack.pop_front() {
                self.undo_bytes -= oldest.estimated_size_bytes;
                freed += oldest.estimated_size_bytes;
            }
        }
        if self.current_bytes() > self.config.max_memory_bytes {
            freed += self.clear_redo();
        }

        if freed > 0 {
            self.total_memory_saved += freed as u64;
            log::debug!(
                "[nestboard.history.evict] Freed {} bytes ({} undo entries evicted, {} bytes in use)",
                freed,
                evict,
                self.current_bytes()
            );
        }
        freed
    }

    // ── Undo / Redo ──────────────────────────────────────────────────────────

    /// Pop the newest action for reversal and enter replay mode. The caller
    /// applies it and then calls [`ActionHistory::finish_replay`].
    pub fn undo(&mut self) -> Option<Action> {
        let action = self.undo_stack.pop_back()?;
        self.undo_bytes -= action.estimated_size_bytes;
        self.redo_bytes += action.estimated_size_bytes;
        self.redo_stack.push(action.clone());
        self.mode = ReplayMode::Replaying(Direction::Undo);
        self.last_action_time = None;
        Some(action)
    }

    /// Pop the newest undone action for forward replay and enter replay mode.
    pub fn redo(&mut self) -> Option<Action> {
        let action = self.redo_stack.pop()?;
        self.redo_bytes -= action.estimated_size_bytes;
        self.undo_bytes += action.estimated_size_bytes;
        self.undo_stack.push_back(action.clone());
        self.mode = ReplayMode::Replaying(Direction::Redo);
        self.last_action_time = None;
        Some(action)
    }

    pub fn finish_replay(&mut self) {
        self.mode = ReplayMode::Idle;
    }

    pub fn mode(&self) -> ReplayMode {
        self.mode
    }

    pub fn is_replaying(&self) -> bool {
        matches!(self.mode, ReplayMode::Replaying(_))
    }

    /// Drop all history. Cumulative statistics are kept.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.undo_bytes = 0;
        self.redo_bytes = 0;
        self.last_action_time = None;
        self.mode = ReplayMode::Idle;
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|a| a.description.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(|a| a.description.as_str())
    }

    /// Undo entries, newest first.
    pub fn undo_actions(&self) -> impl Iterator<Item = &Action> {
        self.undo_stack.iter().rev()
    }

    /// Redo entries, newest first.
    pub fn redo_actions(&self) -> impl Iterator<Item = &Action> {
        self.redo_stack.iter().rev()
    }

    pub fn current_bytes(&self) -> usize {
        self.undo_bytes + self.redo_bytes
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let current_bytes = self.current_bytes();
        let max_bytes = self.config.max_memory_bytes;
        let percentage = if max_bytes == 0 {
            100.0
        } else {
            current_bytes as f64 / max_bytes as f64 * 100.0
        };
        MemoryUsage {
            current_bytes,
            max_bytes,
            percentage,
        }
    }

    pub fn stats(&self) -> HistoryStats {
        let depth = self.undo_stack.len() + self.redo_stack.len();
        HistoryStats {
            undo_depth: self.undo_stack.len(),
            redo_depth: self.redo_stack.len(),
            total_actions_recorded: self.total_actions_recorded,
            total_memory_saved: self.total_memory_saved,
            average_action_size: if depth == 0 {
                0
            } else {
                self.current_bytes() / depth
            },
        }
    }
}

/// Serialized length times two, approximating UTF-16 storage cost.
fn estimate_size(action: &Action) -> usize {
    serde_json::to_string(action)
        .map(|s| s.len() * 2)
        .unwrap_or(0)
}

fn estimate_draft_size(draft: &ActionDraft) -> usize {
    serde_json::to_string(&draft.diff)
        .map(|s| (s.len() + draft.description.len()) * 2)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::field_change;
    use crate::types::CardField;
    use serde_json::json;

    fn title_diff(card: &str, old: &str, new: &str) -> Diff {
        let mut diff = Diff::new();
        diff.push_opt(field_change(card, CardField::Title, json!(old), json!(new)));
        diff
    }

    fn draft(action_type: ActionType, card: &str, at: i64) -> ActionDraft {
        ActionDraft::new(action_type, format!("{:?} {}", action_type, card), title_diff(card, "a", "b"))
            .with_cards(vec![card.to_string()])
            .at(at)
    }

    fn history_with(config: HistoryConfig) -> ActionHistory {
        ActionHistory::new(config)
    }

    #[test]
    fn test_record_and_undo_redo() {
        let mut history = ActionHistory::default();
        assert!(matches!(
            history.record(draft(ActionType::CreateCard, "c1", 0)),
            RecordOutcome::Pushed { .. }
        ));
        assert!(history.can_undo());
        assert!(!history.can_redo());

        let undone = history.undo().unwrap();
        assert_eq!(undone.card_ids, vec!["c1"]);
        assert!(history.is_replaying());
        history.finish_replay();
        assert_eq!(history.redo_len(), 1);

        let redone = history.redo().unwrap();
        history.finish_replay();
        assert_eq!(redone.id, undone.id);
        assert_eq!(history.undo_len(), 1);
        assert_eq!(history.redo_len(), 0);
    }

    #[test]
    fn test_empty_stacks_return_none() {
        let mut history = ActionHistory::default();
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
        assert!(!history.is_replaying());
    }

    #[test]
    fn test_groups_within_window() {
        let mut history = ActionHistory::default();
        history.record(
            ActionDraft::new(ActionType::UpdateCard, "Edit", title_diff("c1", "Start", "A"))
                .with_cards(vec!["c1".into()])
                .at(1_000),
        );
        let outcome = history.record(
            ActionDraft::new(ActionType::UpdateCard, "Edit", title_diff("c1", "A", "B"))
                .with_cards(vec!["c1".into()])
                .at(1_900),
        );
        assert!(matches!(outcome, RecordOutcome::Grouped { .. }));
        assert_eq!(history.undo_len(), 1);

        let action = history.undo_actions().next().unwrap();
        let changes = action.diff.field_changes("c1");
        assert_eq!(changes, vec![(CardField::Title, &json!("Start"), &json!("B"))]);
        assert_eq!(action.timestamp, 1_900);
    }

    #[test]
    fn test_no_grouping_outside_window_or_other_card() {
        let mut history = ActionHistory::default();
        history.record(draft(ActionType::UpdateCard, "c1", 0));
        history.record(draft(ActionType::UpdateCard, "c1", 1_001));
        history.record(draft(ActionType::UpdateCard, "c2", 1_002));
        history.record(draft(ActionType::MoveCard, "c2", 1_003));
        assert_eq!(history.undo_len(), 4);
    }

    #[test]
    fn test_grouping_does_not_cross_undo() {
        let mut history = ActionHistory::default();
        history.record(draft(ActionType::UpdateCard, "c1", 0));
        history.record(draft(ActionType::UpdateCard, "c2", 10));
        history.undo();
        history.finish_replay();

        // Same type and card as the new top, inside the window, but after an undo.
        let outcome = history.record(draft(ActionType::UpdateCard, "c1", 20));
        assert!(matches!(outcome, RecordOutcome::Pushed { .. }));
        assert_eq!(history.undo_len(), 2);
        assert_eq!(history.redo_len(), 0);
    }

    #[test]
    fn test_new_action_clears_redo() {
        let mut history = ActionHistory::default();
        history.record(draft(ActionType::CreateCard, "c1", 0));
        history.record(draft(ActionType::CreateCard, "c2", 5_000));
        history.undo();
        history.finish_replay();
        assert!(history.can_redo());
        let redo_bytes_before = history.current_bytes();
        assert!(redo_bytes_before > 0);

        history.record(draft(ActionType::CreateCard, "c3", 10_000));
        assert!(!history.can_redo());
        assert_eq!(history.undo_len(), 2);
        assert_eq!(
            history.current_bytes(),
            history.undo_actions().map(|a| a.estimated_size_bytes).sum::<usize>()
        );
    }

    #[test]
    fn test_disabled_and_suppressed() {
        let mut config = HistoryConfig::default();
        config.enabled_action_types.remove(&ActionType::MoveCard);
        let mut history = history_with(config);

        assert_eq!(
            history.record(draft(ActionType::MoveCard, "c1", 0)),
            RecordOutcome::Disabled
        );

        history.record(draft(ActionType::CreateCard, "c1", 0));
        history.undo();
        assert_eq!(
            history.record(draft(ActionType::CreateCard, "c2", 1)),
            RecordOutcome::Suppressed
        );
        history.finish_replay();
        assert_eq!(
            history.record(ActionDraft::new(ActionType::CreateCard, "noop", Diff::new())),
            RecordOutcome::Empty
        );
        assert_eq!(history.stats().total_actions_recorded, 1);
    }

    #[test]
    fn test_max_stack_size_drops_oldest() {
        let config = HistoryConfig {
            max_stack_size: 3,
            ..HistoryConfig::default()
        };
        let mut history = history_with(config);
        for (i, card) in ["c1", "c2", "c3", "c4"].iter().enumerate() {
            history.record(draft(ActionType::CreateCard, card, i as i64 * 5_000));
        }
        assert_eq!(history.undo_len(), 3);
        let oldest = history.undo_actions().last().unwrap();
        assert_eq!(oldest.card_ids, vec!["c2"]);
    }

    #[test]
    fn test_perform_cleanup_empty_is_noop() {
        let mut history = ActionHistory::default();
        assert_eq!(history.perform_cleanup(), 0);
        assert_eq!(history.stats().total_memory_saved, 0);
    }

    #[test]
    fn test_perform_cleanup_evicts_oldest_thirty_percent() {
        let mut history = ActionHistory::default();
        for i in 0..10 {
            history.record(draft(ActionType::CreateCard, &format!("c{}", i), i * 5_000));
        }
        let before = history.current_bytes();
        let freed = history.perform_cleanup();
        assert_eq!(history.undo_len(), 7);
        assert_eq!(history.current_bytes(), before - freed);
        let oldest = history.undo_actions().last().unwrap();
        assert_eq!(oldest.card_ids, vec!["c3"]);
    }

    #[test]
    fn test_perform_cleanup_clears_redo_when_still_over_budget() {
        let mut history = ActionHistory::default();
        for i in 0..4 {
            history.record(draft(ActionType::CreateCard, &format!("c{}", i), i * 5_000));
        }
        for _ in 0..2 {
            history.undo();
            history.finish_replay();
        }
        assert_eq!(history.undo_len(), 2);
        assert_eq!(history.redo_len(), 2);

        let oldest_undo = history.undo_actions().last().unwrap().estimated_size_bytes;
        let redo_bytes: usize = history.redo_actions().map(|a| a.estimated_size_bytes).sum();
        assert_eq!(
            history.redo_actions().next().unwrap().card_ids,
            vec!["c2"]
        );
        let before = history.current_bytes();

        history.config.max_memory_bytes = 1;
        let freed = history.perform_cleanup();

        assert_eq!(history.undo_len(), 1);
        assert_eq!(history.redo_len(), 0);
        assert!(!history.can_redo());
        assert_eq!(freed, oldest_undo + redo_bytes);
        assert_eq!(history.current_bytes(), before - freed);
        assert_eq!(history.stats().total_memory_saved, freed as u64);
    }

    #[test]
    fn test_memory_budget_is_enforced() {
        let sample = {
            let mut h = ActionHistory::default();
            h.record(draft(ActionType::CreateCard, "c00", 0));
            h.current_bytes()
        };
        let config = HistoryConfig {
            max_memory_bytes: sample * 4 + sample / 2,
            ..HistoryConfig::default()
        };
        let mut history = history_with(config);
        for i in 0..20 {
            history.record(draft(ActionType::CreateCard, &format!("c{:02}", i), i * 5_000));
            assert!(history.current_bytes() <= history.config().max_memory_bytes);
        }
        assert!(history.undo_len() <= 4);
        assert!(history.stats().total_memory_saved > 0);
        // The newest entry always survives eviction.
        assert_eq!(history.undo_actions().next().unwrap().card_ids, vec!["c19"]);
    }

    #[test]
    fn test_oversized_entry_is_still_recorded() {
        let config = HistoryConfig {
            max_memory_bytes: 10,
            ..HistoryConfig::default()
        };
        let mut history = history_with(config);
        history.record(draft(ActionType::CreateCard, "c1", 0));
        history.record(draft(ActionType::CreateCard, "c2", 5_000));
        assert_eq!(history.undo_len(), 1);
        assert!(history.memory_usage().percentage > 100.0);
    }

    #[test]
    fn test_undo_redo_moves_bytes_between_stacks() {
        let mut history = ActionHistory::default();
        history.record(draft(ActionType::CreateCard, "c1", 0));
        let total = history.current_bytes();
        history.undo();
        history.finish_replay();
        assert_eq!(history.current_bytes(), total);
        assert_eq!(history.stats().redo_depth, 1);
        assert_eq!(history.stats().average_action_size, total);
    }

    #[test]
    fn test_descriptions_and_clear() {
        let mut history = ActionHistory::default();
        history.record(draft(ActionType::CreateCard, "c1", 0));
        assert_eq!(history.undo_description(), Some("CreateCard c1"));
        history.undo();
        history.finish_replay();
        assert_eq!(history.redo_description(), Some("CreateCard c1"));

        history.clear();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert_eq!(history.current_bytes(), 0);
        assert_eq!(history.memory_usage().percentage, 0.0);
    }
}
