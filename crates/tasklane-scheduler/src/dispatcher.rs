use std::sync::Arc;

use tasklane_core::QueueConfig;
use tasklane_queue::{Job, JobRepository, QueueError};
use tracing::{debug, error, info, info_span, warn};

use crate::registry::TaskRegistry;
use crate::task::{execute_guarded, Execution};

/// Counts reported by one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// The job store passed the readiness probe (always true when probing is off).
    pub ready: bool,
    /// Jobs this worker reserved and resolved to an outcome.
    pub processed: usize,
    pub succeeded: usize,
    /// Failed attempts put back into the pending set.
    pub retried: usize,
    /// Terminal failures: unknown task or exhausted attempt budget.
    pub failed: usize,
    /// Reservations lost to another worker.
    pub skipped: usize,
    /// Persistence errors; the affected row waits for the stuck-job sweep.
    pub errors: usize,
}

impl SweepSummary {
    fn not_ready() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.ready {
            return f.write_str("job store not ready; nothing dispatched");
        }
        write!(
            f,
            "processed {} job(s): {} succeeded, {} retried, {} failed, {} skipped",
            self.processed, self.succeeded, self.retried, self.failed, self.skipped
        )?;
        if self.errors > 0 {
            write!(f, ", {} storage error(s)", self.errors)?;
        }
        Ok(())
    }
}

/// Drives one sweep over the pending and/or failed-retry job sets.
///
/// Jobs are reserved one at a time, immediately before they run, and every
/// outcome is written back as a state transition. Nothing a task does can
/// abort the sweep.
pub struct Dispatcher {
    repo: Arc<JobRepository>,
    registry: Arc<TaskRegistry>,
    config: QueueConfig,
    include_pending: bool,
    include_failed: bool,
    identifier: Option<String>,
}

impl Dispatcher {
    pub fn new(repo: Arc<JobRepository>, registry: Arc<TaskRegistry>, config: QueueConfig) -> Self {
        Self {
            repo,
            registry,
            config,
            include_pending: false,
            include_failed: false,
            identifier: None,
        }
    }

    /// Include pending jobs whose schedule has arrived.
    pub fn pending(mut self) -> Self {
        self.include_pending = true;
        self
    }

    /// Include failed jobs that still have attempts left.
    pub fn failed(mut self) -> Self {
        self.include_failed = true;
        self
    }

    /// Restrict both selections to one identifier.
    pub fn only(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Run one sweep. Without any selector only pending jobs are processed.
    pub fn run(&self) -> SweepSummary {
        if self.config.check_state && !self.store_ready() {
            return SweepSummary::not_ready();
        }

        let mut summary = SweepSummary {
            ready: true,
            ..SweepSummary::default()
        };
        let identifier = self.identifier.as_deref();
        let include_pending = self.include_pending || !self.include_failed;

        if include_pending {
            match self.repo.available_jobs(identifier, self.config.batch_size) {
                Ok(jobs) => self.process_all(jobs, &mut summary),
                Err(e) => {
                    error!(error = %e, "failed to select pending jobs");
                    summary.errors += 1;
                }
            }
        }

        if self.include_failed {
            match self
                .repo
                .failed_jobs(identifier, self.config.batch_size, self.config.max_retry)
            {
                Ok(jobs) => self.process_all(jobs, &mut summary),
                Err(e) => {
                    error!(error = %e, "failed to select retryable failed jobs");
                    summary.errors += 1;
                }
            }
        }

        info!(%summary, "sweep finished");
        summary
    }

    fn store_ready(&self) -> bool {
        match self.repo.is_ready() {
            Ok(true) => true,
            Ok(false) => {
                warn!("job store is not initialised; skipping sweep");
                false
            }
            Err(e) => {
                warn!(error = %e, "job store readiness probe failed; skipping sweep");
                false
            }
        }
    }

    fn process_all(&self, jobs: Vec<Job>, summary: &mut SweepSummary) {
        for job in jobs {
            let span = info_span!("job", job.id = job.id, job.identifier = %job.identifier);
            let _enter = span.enter();
            self.process(job, summary);
        }
    }

    fn process(&self, mut job: Job, summary: &mut SweepSummary) {
        match self.repo.reserve(&mut job) {
            Ok(true) => {}
            Ok(false) => {
                debug!("job reserved by another worker; skipping");
                summary.skipped += 1;
                return;
            }
            Err(e) => {
                error!(error = %e, "failed to reserve job");
                summary.errors += 1;
                return;
            }
        }

        let task = match self.registry.resolve(&job.identifier) {
            Ok(task) => task,
            Err(e) => {
                warn!(error = %e, "cannot resolve task");
                let written = self.repo.mark_failed(&mut job, &e.to_string());
                if self.record(written, "mark_failed", summary) {
                    summary.processed += 1;
                    summary.failed += 1;
                }
                return;
            }
        };

        debug!(attempt = job.failed, "running job");
        match execute_guarded(task.as_ref(), &job) {
            Execution::Succeeded => {
                let written = self.repo.mark_success(&mut job, &task.success_message());
                if self.record(written, "mark_success", summary) {
                    summary.processed += 1;
                    summary.succeeded += 1;
                }
            }
            Execution::Failed { reason } => {
                warn!(%reason, attempt = job.failed, max_retry = self.config.max_retry, "job attempt failed");
                if job.has_attempts_left(self.config.max_retry) {
                    let written = self.repo.retry(&mut job, self.config.delay_minutes);
                    if self.record(written, "retry", summary) {
                        summary.processed += 1;
                        summary.retried += 1;
                    }
                } else {
                    let written = self.repo.mark_failed(&mut job, &task.failed_message());
                    if self.record(written, "mark_failed", summary) {
                        summary.processed += 1;
                        summary.failed += 1;
                    }
                }
            }
        }
    }

    /// Log the result of a finishing write. Returns whether the row changed.
    fn record(
        &self,
        written: Result<bool, QueueError>,
        op: &'static str,
        summary: &mut SweepSummary,
    ) -> bool {
        match written {
            Ok(true) => true,
            Ok(false) => {
                // Reclaimed and finished elsewhere while this worker was running it.
                warn!(op, "job changed underneath this worker; outcome not recorded");
                summary.skipped += 1;
                false
            }
            Err(e) => {
                error!(op, error = %e, "failed to record job outcome; lease left for reclamation");
                summary.errors += 1;
                false
            }
        }
    }
}
