use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Lifecycle state of a job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its schedule, or leased by a worker.
    Pending,
    /// Last execution failed. Retryable while the attempt budget lasts.
    Failed,
    /// Executed successfully. Terminal.
    Success,
}

impl JobStatus {
    pub const ALL: [JobStatus; 3] = [JobStatus::Pending, JobStatus::Failed, JobStatus::Success];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Failed => "failed",
            JobStatus::Success => "success",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "failed" => Ok(JobStatus::Failed),
            "success" => Ok(JobStatus::Success),
            other => Err(QueueError::InvalidStatus(other.to_string())),
        }
    }
}

/// A persisted job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Auto-increment primary key.
    pub id: i64,
    /// Logical task name, resolved against the task registry at dispatch.
    pub identifier: String,
    /// Opaque task arguments, usually JSON.
    pub payload: String,
    pub status: JobStatus,
    /// Number of reservations taken so far. Never decreases.
    pub failed: u32,
    /// Earliest instant the job may run.
    pub schedule: DateTime<Utc>,
    /// Lease marker; `None` means nobody holds the job.
    pub reserved_at: Option<DateTime<Utc>>,
    /// Outcome message of the last execution.
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A pending row with a lease marker is held by some worker.
    pub fn is_leased(&self) -> bool {
        self.status == JobStatus::Pending && self.reserved_at.is_some()
    }

    /// Whether `available_jobs` may return this row at `now`.
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.reserved_at.is_none() && self.schedule <= now
    }

    /// Whether another attempt fits into a budget of `max_retry` attempts.
    pub fn has_attempts_left(&self, max_retry: u32) -> bool {
        self.failed < max_retry
    }
}

/// Fixed-width RFC 3339 in UTC, so lexical order equals temporal order.
pub fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `at` moved by `minutes` (negative moves back). Out-of-range offsets are
/// an error rather than a panic.
pub fn shift_minutes(at: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>, QueueError> {
    TimeDelta::try_minutes(minutes)
        .and_then(|delta| at.checked_add_signed(delta))
        .ok_or(QueueError::OffsetOutOfRange { minutes })
}

pub fn parse_ts(value: &str) -> Result<DateTime<Utc>, QueueError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QueueError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}
