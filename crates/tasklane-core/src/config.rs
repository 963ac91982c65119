use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TasklaneError};

pub const DEFAULT_BATCH_SIZE: u32 = 10;
pub const DEFAULT_MAX_RETRY: u32 = 3;
pub const DEFAULT_DELAY_MINUTES: i64 = 5;
pub const DEFAULT_TIMEOUT_MINUTES: i64 = 5;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_RECLAIM_INTERVAL_SECS: u64 = 300;
/// Upper bound for `delay_minutes` and `timeout_minutes` (ten years).
pub const MAX_OFFSET_MINUTES: i64 = 10 * 365 * 24 * 60;

/// Top-level config (tasklane.toml + TASKLANE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TasklaneConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// How long SQLite waits on a locked database before giving up.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Options recognised by the queue dispatcher and the stuck-job sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Rows fetched per selection in one sweep.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Reservation attempts a job may take before it fails terminally.
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
    /// Backoff between a failed execution and the next eligible schedule.
    #[serde(default = "default_delay_minutes")]
    pub delay_minutes: i64,
    /// Lease age after which a pending reservation is considered stuck.
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: i64,
    /// Probe the job store before dispatching.
    #[serde(default = "bool_true")]
    pub check_state: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_retry: DEFAULT_MAX_RETRY,
            delay_minutes: DEFAULT_DELAY_MINUTES,
            timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
            check_state: true,
        }
    }
}

impl QueueConfig {
    /// Reject values that would stall the queue or make every job fail.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TasklaneError::Config(
                "queue.batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_retry == 0 {
            return Err(TasklaneError::Config(
                "queue.max_retry must be at least 1".to_string(),
            ));
        }
        for (key, value) in [
            ("delay_minutes", self.delay_minutes),
            ("timeout_minutes", self.timeout_minutes),
        ] {
            if !(0..=MAX_OFFSET_MINUTES).contains(&value) {
                return Err(TasklaneError::Config(format!(
                    "queue.{key} must be between 0 and {MAX_OFFSET_MINUTES}, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Cadence of the long-running worker loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_reclaim_interval_secs")]
    pub reclaim_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            reclaim_interval_secs: DEFAULT_RECLAIM_INTERVAL_SECS,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}
fn default_max_retry() -> u32 {
    DEFAULT_MAX_RETRY
}
fn default_delay_minutes() -> i64 {
    DEFAULT_DELAY_MINUTES
}
fn default_timeout_minutes() -> i64 {
    DEFAULT_TIMEOUT_MINUTES
}
fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_reclaim_interval_secs() -> u64 {
    DEFAULT_RECLAIM_INTERVAL_SECS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tasklane/tasklane.db", home)
}

impl TasklaneConfig {
    /// Load config from a TOML file with TASKLANE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.tasklane/tasklane.toml
    ///
    /// A missing file is not an error; defaults fill every section.
    /// Nested keys use a double underscore, e.g. `TASKLANE_QUEUE__MAX_RETRY=5`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(%path, "loading config");

        Self::extract(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("TASKLANE_").split("__")),
        )
    }

    /// Extract and validate a config from an already assembled figment.
    pub fn extract(figment: Figment) -> Result<Self> {
        let config: TasklaneConfig = figment
            .extract()
            .map_err(|e| TasklaneError::Config(e.to_string()))?;
        config.queue.validate()?;
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tasklane/tasklane.toml", home)
}
