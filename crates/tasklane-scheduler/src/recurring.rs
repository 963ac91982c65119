use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tasklane_queue::JobRepository;
use tracing::{error, info, warn};

use crate::registry::TaskRegistry;

/// Payload of jobs created by the trigger; recurring tasks take no arguments.
pub const RECURRING_PAYLOAD: &str = "{}";

/// Enqueues a fresh job for every task whose cadence says it is due.
///
/// The trigger only produces rows; running them is the dispatcher's job.
/// Due instants live in memory, so a restarted worker re-arms every task
/// from its current time.
pub struct RecurringTrigger {
    repo: Arc<JobRepository>,
    registry: Arc<TaskRegistry>,
    next_due: HashMap<String, DateTime<Utc>>,
}

impl RecurringTrigger {
    pub fn new(repo: Arc<JobRepository>, registry: Arc<TaskRegistry>) -> Self {
        Self {
            repo,
            registry,
            next_due: HashMap::new(),
        }
    }

    /// Next planned enqueue for `identifier`, once armed.
    pub fn next_due(&self, identifier: &str) -> Option<DateTime<Utc>> {
        self.next_due.get(identifier).copied()
    }

    /// Arm newly seen tasks and enqueue the due ones. Returns the number of
    /// jobs queued.
    pub fn tick(&mut self) -> usize {
        let now = self.repo.clock().now();
        let mut queued = 0;

        for (identifier, schedule) in self.registry.schedules() {
            if !schedule.is_recurring() {
                continue;
            }
            if let Err(e) = schedule.validate() {
                warn!(%identifier, error = %e, "ignoring invalid task schedule");
                continue;
            }

            let Some(due) = self.next_due.get(&identifier).copied() else {
                // First sighting: arm only.
                if let Some(next) = schedule.next_after(now) {
                    self.next_due.insert(identifier, next);
                }
                continue;
            };
            if now < due {
                continue;
            }

            match self.repo.queue(&identifier, RECURRING_PAYLOAD, Some(now)) {
                Ok(job) => {
                    info!(%identifier, job_id = job.id, "recurring task queued");
                    queued += 1;
                    match schedule.next_after(now) {
                        Some(next) => {
                            self.next_due.insert(identifier, next);
                        }
                        None => {
                            self.next_due.remove(&identifier);
                        }
                    }
                }
                // Keep the due instant so the next tick tries again.
                Err(e) => error!(%identifier, error = %e, "failed to queue recurring task"),
            }
        }

        queued
    }
}
