use thiserror::Error;

/// Failure reported by a card or deck backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed record in {file}: {message}")]
    Malformed { file: String, message: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn card_not_found(id: &str) -> Self {
        StoreError::NotFound {
            kind: "card",
            id: id.to_string(),
        }
    }

    pub fn deck_not_found(id: &str) -> Self {
        StoreError::NotFound {
            kind: "deck",
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid feedback value {0} (expected 0 = again, 1 = hard, 2 = good)")]
    InvalidFeedback(u8),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("deck {0} has no cards")]
    EmptyDeck(String),

    #[error("deck {0} has no cards due")]
    NothingDue(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session {0} is already completed")]
    SessionAlreadyCompleted(String),

    #[error("session {0} already has feedback being recorded")]
    FeedbackInFlight(String),

    #[error("card {0} was removed while its session was open")]
    CardRemoved(String),

    #[error("review count {0} schedules the next review past the supported date range")]
    ReviewOutOfRange(u32),

    #[error("timed out waiting for the card store")]
    TimedOut,

    #[error("{0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Store(StoreError::NotFound { .. }) => false,
            Error::Store(_) | Error::TimedOut | Error::FeedbackInFlight(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
