use crate::types::CardId;

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("Parent card not found: {0}")]
    ParentNotFound(CardId),

    #[error("Card not found: {0}")]
    CardNotFound(CardId),

    #[error("Inconsistent board state: {0}")]
    Inconsistent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BoardError>;
