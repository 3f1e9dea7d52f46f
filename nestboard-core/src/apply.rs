/// Replays recorded diffs against the card store.
///
/// Undo walks a diff back to front applying each change's old side, redo
/// walks it front to back applying the new side. Only raw store primitives
/// are used, so nothing here is recorded as new history.
///
/// Replay is best effort: a change whose target is gone (card already
/// deleted, list already removed) is skipped and logged, and the remaining
/// changes are still applied.
use crate::diff::{Change, Diff, OrderChange, OrderUpdate};
use crate::history::Direction;
use crate::store::CardStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub skipped: usize,
}

pub fn apply_diff(store: &mut CardStore, diff: &Diff, direction: Direction) -> ApplyReport {
    let mut report = ApplyReport::default();
    let mut step = |change: &Change| {
        if apply_change(store, change, direction) {
            report.applied += 1;
        } else {
            report.skipped += 1;
            log::debug!(
                "[nestboard.apply.skip] {:?} of {:?} change on {:?} had no target",
                direction,
                kind(change),
                change.card_id()
            );
        }
    };
    match direction {
        Direction::Undo => diff.iter().rev().for_each(&mut step),
        Direction::Redo => diff.iter().for_each(&mut step),
    }
    report
}

fn kind(change: &Change) -> &'static str {
    match change {
        Change::Field { .. } => "field",
        Change::Created { .. } => "created",
        Change::Deleted { .. } => "deleted",
        Change::Order(_) => "order",
    }
}

/// Apply one change. Returns false when it was skipped.
fn apply_change(store: &mut CardStore, change: &Change, direction: Direction) -> bool {
    match (change, direction) {
        (Change::Created { card }, Direction::Redo) | (Change::Deleted { card }, Direction::Undo) => {
            store.insert_card(card.clone())
        }
        (Change::Created { card }, Direction::Undo) | (Change::Deleted { card }, Direction::Redo) => {
            !store.remove_card(&card.id).is_empty()
        }
        (
            Change::Field {
                card_id,
                field,
                old_value,
                new_value,
            },
            _,
        ) => {
            let value = match direction {
                Direction::Undo => old_value,
                Direction::Redo => new_value,
            };
            store.set_field(card_id, *field, value)
        }
        (Change::Order(order), _) => apply_order(store, order, direction),
    }
}

fn apply_order(store: &mut CardStore, order: &OrderChange, direction: Direction) -> bool {
    match &order.update {
        OrderUpdate::Replace { old, new } => {
            let target = match direction {
                Direction::Undo => old.clone(),
                Direction::Redo => new.clone(),
            };
            store.set_order(&order.path, &order.status, target);
            true
        }
        OrderUpdate::Reposition {
            card_id,
            old_index,
            new_index,
        } => {
            if !store.contains(card_id) {
                return false;
            }
            let index = match direction {
                Direction::Undo => *old_index,
                Direction::Redo => *new_index,
            };
            store.reposition(&order.path, &order.status, card_id, index)
        }
    }
}
