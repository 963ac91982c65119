use std::panic::{catch_unwind, AssertUnwindSafe};

use tasklane_queue::Job;

use crate::schedule::Schedule;

/// A unit of executable work, resolved from a job's identifier.
///
/// Implementations are stateless with respect to the job: everything a run
/// needs comes from [`Job::payload`].
pub trait Task: Send + Sync {
    /// Attach or override cadence metadata. Only the recurring trigger reads it.
    fn period(&self, schedule: Schedule) -> Schedule {
        schedule
    }

    /// Run the job. `Ok(false)` and `Err(_)` both count as a failed attempt.
    fn execute(&self, job: &Job) -> anyhow::Result<bool>;

    /// Stored as the job's `response` on success.
    fn success_message(&self) -> String {
        "Task executed successfully".to_string()
    }

    /// Stored as the job's `response` once the attempt budget is spent.
    fn failed_message(&self) -> String {
        "Task execution failed".to_string()
    }
}

/// Outcome of one guarded execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    Succeeded,
    Failed { reason: String },
}

/// Run `task` inside a failure boundary: returned errors, a `false` signal
/// and panics all become [`Execution::Failed`].
pub fn execute_guarded(task: &dyn Task, job: &Job) -> Execution {
    match catch_unwind(AssertUnwindSafe(|| task.execute(job))) {
        Ok(Ok(true)) => Execution::Succeeded,
        Ok(Ok(false)) => Execution::Failed {
            reason: "task reported failure".to_string(),
        },
        Ok(Err(e)) => Execution::Failed {
            reason: format!("{e:#}"),
        },
        Err(panic) => Execution::Failed {
            reason: panic_message(&*panic),
        },
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("task panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("task panicked: {s}")
    } else {
        "task panicked".to_string()
    }
}

/// Closure-backed task, for small jobs that do not need their own type.
pub struct FnTask<F> {
    run: F,
    schedule: Schedule,
}

impl<F> FnTask<F>
where
    F: Fn(&Job) -> anyhow::Result<bool> + Send + Sync,
{
    pub fn new(run: F) -> Self {
        Self {
            run,
            schedule: Schedule::Manual,
        }
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }
}

impl<F> Task for FnTask<F>
where
    F: Fn(&Job) -> anyhow::Result<bool> + Send + Sync,
{
    fn period(&self, _schedule: Schedule) -> Schedule {
        self.schedule.clone()
    }

    fn execute(&self, job: &Job) -> anyhow::Result<bool> {
        (self.run)(job)
    }
}
