use std::collections::HashMap;
use std::sync::Arc;

use tasklane_queue::QueueError;
use tracing::debug;

use crate::schedule::Schedule;
use crate::task::Task;

/// Lookup table from job identifier to task, built once at startup.
#[derive(Default, Clone)]
pub struct TaskRegistry {
    tasks: HashMap<String, Arc<dyn Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` under `identifier`, replacing any earlier entry.
    pub fn register(&mut self, identifier: impl Into<String>, task: impl Task + 'static) -> &mut Self {
        self.register_arc(identifier, Arc::new(task))
    }

    pub fn register_arc(&mut self, identifier: impl Into<String>, task: Arc<dyn Task>) -> &mut Self {
        let identifier = identifier.into();
        debug!(%identifier, "task registered");
        self.tasks.insert(identifier, task);
        self
    }

    pub fn resolve(&self, identifier: &str) -> Result<Arc<dyn Task>, QueueError> {
        self.tasks
            .get(identifier)
            .cloned()
            .ok_or_else(|| QueueError::UnknownTask {
                identifier: identifier.to_string(),
            })
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.tasks.contains_key(identifier)
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Cadence of every registered task, as reported by `Task::period`.
    pub fn schedules(&self) -> Vec<(String, Schedule)> {
        let mut out: Vec<(String, Schedule)> = self
            .tasks
            .iter()
            .map(|(id, task)| (id.clone(), task.period(Schedule::default())))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
