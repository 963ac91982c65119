//! `tasklane-scheduler` — resolves queued jobs to tasks and runs them.
//!
//! # Overview
//!
//! A [`Dispatcher`] sweep selects eligible rows from the
//! [`JobRepository`](tasklane_queue::JobRepository), reserves each one just
//! before running it, and writes the outcome back:
//!
//! | Outcome                               | Transition                 |
//! |---------------------------------------|----------------------------|
//! | task succeeded                        | `mark_success`             |
//! | task failed, attempts left            | `retry` after the delay    |
//! | task failed, attempt budget spent     | `mark_failed` (terminal)   |
//! | identifier not registered             | `mark_failed`              |
//! | reservation lost to another worker    | skipped                    |
//!
//! The [`RecurringTrigger`] turns task cadences ([`Schedule`]) into new
//! rows, and [`WorkerEngine`] ties trigger, sweeps and stuck-lease
//! reclamation into one tokio loop.

pub mod deferred;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod listener;
pub mod recurring;
pub mod registry;
pub mod schedule;
pub mod task;

pub use deferred::DeferredQueue;
pub use dispatcher::{Dispatcher, SweepSummary};
pub use engine::WorkerEngine;
pub use error::{Result, SchedulerError};
pub use listener::{queue_listener, Listener, ListenerPayload, ListenerRegistry, QueuedListener};
pub use recurring::RecurringTrigger;
pub use registry::TaskRegistry;
pub use schedule::{Schedule, TimeOfDay};
pub use task::{execute_guarded, Execution, FnTask, Task};
