use std::sync::Arc;
use std::time::Duration;

use tasklane_core::config::{QueueConfig, WorkerConfig};
use tasklane_queue::JobRepository;
use tokio::sync::watch;
use tracing::{error, info};

use crate::dispatcher::{Dispatcher, SweepSummary};
use crate::recurring::RecurringTrigger;
use crate::registry::TaskRegistry;

/// Long-running worker: recurring trigger + sweeps + stuck-lease reclamation.
pub struct WorkerEngine {
    repo: Arc<JobRepository>,
    dispatcher: Dispatcher,
    trigger: RecurringTrigger,
    timeout_minutes: i64,
    poll_interval: Duration,
    reclaim_interval: Duration,
}

impl WorkerEngine {
    pub fn new(
        repo: Arc<JobRepository>,
        registry: Arc<TaskRegistry>,
        queue: QueueConfig,
        worker: &WorkerConfig,
    ) -> Self {
        let timeout_minutes = queue.timeout_minutes;
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&repo), Arc::clone(&registry), queue)
                .pending()
                .failed(),
            trigger: RecurringTrigger::new(Arc::clone(&repo), registry),
            repo,
            timeout_minutes,
            poll_interval: Duration::from_secs(worker.poll_interval_secs.max(1)),
            reclaim_interval: Duration::from_secs(worker.reclaim_interval_secs.max(1)),
        }
    }

    /// One poll cycle: enqueue due recurring tasks, then sweep.
    pub fn tick(&mut self) -> SweepSummary {
        let queued = self.trigger.tick();
        if queued > 0 {
            info!(queued, "recurring tasks queued");
        }
        self.dispatcher.run()
    }

    /// Clear stale leases so crashed workers' jobs become available again.
    pub fn reclaim(&self) -> usize {
        match self.repo.reclaim_stuck(self.timeout_minutes) {
            Ok(n) => n,
            Err(e) => {
                error!("stuck-job reclamation failed: {e}");
                0
            }
        }
    }

    /// Main event loop. Runs until `shutdown` broadcasts `true`.
    ///
    /// Sweeps and reclamation run on tokio's blocking pool; the loop itself
    /// only waits on timers and the shutdown channel.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_secs = self.poll_interval.as_secs(),
            reclaim_secs = self.reclaim_interval.as_secs(),
            "worker engine started"
        );

        let mut poll = tokio::time::interval(self.poll_interval);
        let mut reclaim = tokio::time::interval(self.reclaim_interval);
        let mut engine = self;
        loop {
            tokio::select! {
                _ = reclaim.tick() => {
                    match engine.off_runtime(|e| { e.reclaim(); }).await {
                        Some(e) => engine = e,
                        None => break,
                    }
                }
                _ = poll.tick() => {
                    match engine.off_runtime(|e| { e.tick(); }).await {
                        Some(e) => engine = e,
                        None => break,
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("worker engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Hand the engine to the blocking pool for one step and take it back.
    async fn off_runtime(mut self, step: fn(&mut Self)) -> Option<Self> {
        match tokio::task::spawn_blocking(move || {
            step(&mut self);
            self
        })
        .await
        {
            Ok(engine) => Some(engine),
            Err(e) => {
                error!(error = %e, "worker step aborted; stopping engine");
                None
            }
        }
    }
}
