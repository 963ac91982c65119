use thiserror::Error;

/// Errors that can occur within the job queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No task is registered under the job's identifier.
    #[error("Unknown task: {identifier}")]
    UnknownTask { identifier: String },

    /// A status column held a value outside pending/failed/success.
    #[error("Invalid job status: {0}")]
    InvalidStatus(String),

    /// A stored timestamp could not be parsed.
    #[error("Invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },

    /// A payload could not be encoded or decoded.
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// A delay or timeout does not fit into the supported date range.
    #[error("Offset of {minutes} minutes is out of range")]
    OffsetOutOfRange { minutes: i64 },

    /// A previous holder of the connection panicked.
    #[error("Job store lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, QueueError>;
