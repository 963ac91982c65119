use tasklane_queue::QueueError;
use thiserror::Error;

/// Errors that can occur within the dispatch and scheduling layer.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The provided schedule definition is invalid.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// A job store operation failed.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
