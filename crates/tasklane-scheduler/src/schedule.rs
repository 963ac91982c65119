use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// A wall-clock time of day (UTC), written `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(SchedulerError::InvalidSchedule(format!(
                "time of day out of range: {hour:02}:{minute:02}"
            )));
        }
        Ok(Self { hour, minute })
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl std::str::FromStr for TimeOfDay {
    type Err = SchedulerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || SchedulerError::InvalidSchedule(format!("expected HH:MM, got {s:?}"));
        let (h, m) = s.split_once(':').ok_or_else(invalid)?;
        let hour = h.trim().parse().map_err(|_| invalid())?;
        let minute = m.trim().parse().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }
}

/// Cadence metadata a task attaches to itself through `Task::period`.
///
/// The dispatcher never reads it; only the recurring trigger does, to decide
/// when to enqueue a fresh job for the task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Never enqueued automatically.
    #[default]
    Manual,

    /// Repeat with a fixed interval in seconds.
    Interval { every_secs: u64 },

    /// Every day at the given hour and minute (UTC).
    Daily { hour: u8, minute: u8 },

    /// On a specific weekday (0 = Monday … 6 = Sunday) at the given time (UTC).
    Weekly { day: u8, hour: u8, minute: u8 },

    /// At each of the listed times of day (UTC).
    Times { times: Vec<TimeOfDay> },
}

impl Schedule {
    pub fn every_minutes(self, minutes: u64) -> Self {
        Schedule::Interval {
            every_secs: minutes * 60,
        }
    }

    pub fn hourly(self) -> Self {
        self.every_minutes(60)
    }

    pub fn daily_at(self, hour: u8, minute: u8) -> Self {
        Schedule::Daily { hour, minute }
    }

    pub fn weekly_on(self, day: u8, hour: u8, minute: u8) -> Self {
        Schedule::Weekly { day, hour, minute }
    }

    pub fn at(self, times: impl IntoIterator<Item = TimeOfDay>) -> Self {
        let mut times: Vec<TimeOfDay> = times.into_iter().collect();
        times.sort();
        times.dedup();
        Schedule::Times { times }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self, Schedule::Manual)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Schedule::Manual => Ok(()),
            Schedule::Interval { every_secs: 0 } => Err(SchedulerError::InvalidSchedule(
                "interval must be at least one second".to_string(),
            )),
            Schedule::Interval { .. } => Ok(()),
            Schedule::Daily { hour, minute } => TimeOfDay::new(*hour, *minute).map(|_| ()),
            Schedule::Weekly { day, hour, minute } => {
                if *day > 6 {
                    return Err(SchedulerError::InvalidSchedule(format!(
                        "weekday must be 0..=6, got {day}"
                    )));
                }
                TimeOfDay::new(*hour, *minute).map(|_| ())
            }
            Schedule::Times { times } if times.is_empty() => Err(
                SchedulerError::InvalidSchedule("time list must not be empty".to_string()),
            ),
            Schedule::Times { times } => times
                .iter()
                .try_for_each(|t| TimeOfDay::new(t.hour, t.minute).map(|_| ())),
        }
    }

    /// First instant strictly after `from` at which the task is due.
    ///
    /// Returns `None` for `Manual` and for definitions that fail
    /// [`validate`](Self::validate).
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Manual => None,

            Schedule::Interval { every_secs: 0 } => None,
            Schedule::Interval { every_secs } => {
                Some(from + Duration::seconds(i64::try_from(*every_secs).ok()?))
            }

            Schedule::Daily { hour, minute } => next_daily(*hour, *minute, from),

            Schedule::Weekly { day, hour, minute } => {
                if *day > 6 {
                    return None;
                }
                // `day` follows chrono's `num_days_from_monday`.
                let today = from.weekday().num_days_from_monday() as i64;
                let days_ahead = (*day as i64 - today).rem_euclid(7);
                let candidate = at_time(from + Duration::days(days_ahead), *hour, *minute)?;
                if candidate > from {
                    Some(candidate)
                } else {
                    Some(candidate + Duration::days(7))
                }
            }

            Schedule::Times { times } => times
                .iter()
                .filter_map(|t| next_daily(t.hour, t.minute, from))
                .min(),
        }
    }
}

fn next_daily(hour: u8, minute: u8, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let candidate = at_time(from, hour, minute)?;
    if candidate > from {
        Some(candidate)
    } else {
        Some(candidate + Duration::days(1))
    }
}

/// `day` at HH:MM:00 UTC.
fn at_time(day: DateTime<Utc>, hour: u8, minute: u8) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(
        day.year(),
        day.month(),
        day.day(),
        hour as u32,
        minute as u32,
        0,
    )
    .single()
}
