//! Listeners compiled into the stock worker binary.

use std::sync::Arc;

use tasklane_scheduler::{ListenerRegistry, QueuedListener, TaskRegistry};
use tracing::info;

/// Registry the `work` and `sweep` commands dispatch against.
pub fn build_registry() -> TaskRegistry {
    let mut listeners = ListenerRegistry::new();
    listeners.register("log", |event: &serde_json::Value| -> anyhow::Result<()> {
        info!(%event, "log listener received event");
        Ok(())
    });

    let mut registry = TaskRegistry::new();
    QueuedListener::install(&mut registry, Arc::new(listeners));
    registry
}
