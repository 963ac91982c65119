//! Re-dispatch of event listeners through the queue.
//!
//! A listener that should not run inline is queued as a job whose payload
//! names the listener and carries the event data. [`QueuedListener`] is the
//! task that turns such a job back into a listener call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tasklane_queue::{Job, JobRepository};
use tracing::{debug, warn};

use crate::error::Result;
use crate::registry::TaskRegistry;
use crate::task::Task;

/// Handler for one kind of event.
pub trait Listener: Send + Sync {
    fn handle(&self, event: &serde_json::Value) -> anyhow::Result<()>;
}

impl<F> Listener for F
where
    F: Fn(&serde_json::Value) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, event: &serde_json::Value) -> anyhow::Result<()> {
        self(event)
    }
}

/// Stored in `jobs.payload` for listener jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerPayload {
    pub listener: String,
    #[serde(default)]
    pub event: serde_json::Value,
}

/// Listeners by name.
#[derive(Default, Clone)]
pub struct ListenerRegistry {
    listeners: HashMap<String, Arc<dyn Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, listener: impl Listener + 'static) -> &mut Self {
        self.listeners.insert(name.into(), Arc::new(listener));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Listener>> {
        self.listeners.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.listeners.keys().map(String::as_str)
    }
}

/// Task wrapper that resolves the listener named in the payload and invokes
/// it with the event data.
///
/// A missing listener or an unreadable payload is logged and reported as a
/// failed attempt, so the job goes through the normal retry budget.
pub struct QueuedListener {
    listeners: Arc<ListenerRegistry>,
}

impl QueuedListener {
    pub fn new(listeners: Arc<ListenerRegistry>) -> Self {
        Self { listeners }
    }

    /// Register one shared wrapper under every listener name, so a job's
    /// identifier is the listener it targets.
    pub fn install(registry: &mut TaskRegistry, listeners: Arc<ListenerRegistry>) {
        let wrapper: Arc<dyn Task> = Arc::new(Self::new(Arc::clone(&listeners)));
        for name in listeners.names() {
            registry.register_arc(name, Arc::clone(&wrapper));
        }
    }
}

impl Task for QueuedListener {
    fn execute(&self, job: &Job) -> anyhow::Result<bool> {
        let payload: ListenerPayload = match serde_json::from_str(&job.payload) {
            Ok(p) => p,
            Err(e) => {
                warn!(job_id = job.id, error = %e, "listener payload is not valid JSON");
                return Ok(false);
            }
        };

        let Some(listener) = self.listeners.get(&payload.listener) else {
            warn!(job_id = job.id, listener = %payload.listener, "listener not found");
            return Ok(false);
        };

        listener.handle(&payload.event)?;
        debug!(job_id = job.id, listener = %payload.listener, "queued listener handled event");
        Ok(true)
    }

    fn success_message(&self) -> String {
        "Queued listener executed successfully".to_string()
    }

    fn failed_message(&self) -> String {
        "Queued listener failed to execute".to_string()
    }
}

/// Producer helper: queue `listener` to handle `event` at `schedule`
/// (default now).
pub fn queue_listener(
    repo: &JobRepository,
    listener: &str,
    event: serde_json::Value,
    schedule: Option<DateTime<Utc>>,
) -> Result<Job> {
    let payload = serde_json::to_string(&ListenerPayload {
        listener: listener.to_string(),
        event,
    })
    .map_err(tasklane_queue::QueueError::from)?;
    Ok(repo.queue(listener, &payload, schedule)?)
}
