use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the memory store, the vector reference index, and the
/// coordinator.
///
/// Only `Transient` is retryable. Everything else is returned synchronously
/// to the caller of the violating operation and never retried automatically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryError {
    /// Uniqueness or immutability violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed input (bad message type, empty content, invalid document).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A cross-entity invariant was violated (e.g. message/session owner mismatch).
    #[error("inconsistent: {0}")]
    Inconsistent(String),

    /// I/O timeout or backend unavailability.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The session has already been closed.
    #[error("session {0} is already closed")]
    AlreadyClosed(Uuid),

    /// Non-retryable backend fault (row decoding, unexpected SQL error).
    #[error("storage error: {0}")]
    Storage(String),
}

impl MemoryError {
    /// Whether a caller may retry the failed operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MemoryError::Transient(_))
    }

    /// Short, stable name of the error class, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            MemoryError::Conflict(_) => "conflict",
            MemoryError::NotFound(_) => "not_found",
            MemoryError::InvalidArgument(_) => "invalid_argument",
            MemoryError::Inconsistent(_) => "inconsistent",
            MemoryError::Transient(_) => "transient",
            MemoryError::AlreadyClosed(_) => "already_closed",
            MemoryError::Storage(_) => "storage",
        }
    }
}
