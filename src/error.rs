use crate::engine::TimerStatus;
use thiserror::Error;

/// Failures of the tabular store behind the persistence gateway.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    #[error("schema error: {0}")]
    Schema(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid transition: cannot {action} while {from}")]
    InvalidTransition {
        from: TimerStatus,
        action: &'static str,
    },

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("engine event loop is not running")]
    Closed,
}

impl EngineError {
    /// Persistence failures can be retried by issuing the same action again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Persistence(_))
    }
}
