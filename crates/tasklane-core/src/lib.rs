//! `tasklane-core` — configuration, error and clock types shared by every
//! tasklane crate.

pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{QueueConfig, TasklaneConfig};
pub use error::{Result, TasklaneError};
