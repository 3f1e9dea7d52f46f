/// Change notifications emitted by a [`crate::workspace::Workspace`].
use serde::{Deserialize, Serialize};

use crate::history::Direction;
use crate::types::{CardField, CardId};

/// Buffered events per subscriber before the oldest are dropped.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum BoardEvent {
    CardCreated {
        card_id: CardId,
    },
    CardUpdated {
        card_id: CardId,
        fields: Vec<CardField>,
    },
    CardsDeleted {
        card_ids: Vec<CardId>,
    },
    CardMoved {
        card_id: CardId,
        from_status: String,
        to_status: String,
    },
    HistoryApplied {
        direction: Direction,
        action_id: u64,
        description: String,
    },
}
