use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, error};

type Action = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Side effects collected while a unit of work runs and executed once it is
/// done (mail, notifications). In-process only; nothing here is persisted.
pub struct DeferredQueue {
    name: String,
    actions: Vec<Action>,
}

impl DeferredQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push<F>(&mut self, action: F) -> &mut Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.actions.push(Box::new(action));
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action in insertion order. Failures and panics are logged
    /// and do not stop the rest. Returns how many actions succeeded.
    pub fn run(self) -> usize {
        let total = self.actions.len();
        let mut ok = 0;
        for (index, action) in self.actions.into_iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(action)) {
                Ok(Ok(())) => ok += 1,
                Ok(Err(e)) => error!(queue = %self.name, index, error = %e, "deferred action failed"),
                Err(_) => error!(queue = %self.name, index, "deferred action panicked"),
            }
        }
        debug!(queue = %self.name, ok, total, "deferred queue drained");
        ok
    }
}

impl std::fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredQueue")
            .field("name", &self.name)
            .field("actions", &self.actions.len())
            .finish()
    }
}
