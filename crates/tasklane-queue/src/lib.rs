//! `tasklane-queue` — durable job records in SQLite.
//!
//! # Overview
//!
//! Every unit of deferred work is one row of the `jobs` table. Rows are only
//! ever changed through [`repository::JobRepository`], whose transition
//! writers are single conditional `UPDATE`s so that several worker processes
//! can share one database without an in-process lock.
//!
//! # Lifecycle
//!
//! | From              | Operation      | To                                   |
//! |-------------------|----------------|--------------------------------------|
//! | —                 | `queue`        | `pending`, unleased, `failed = 0`    |
//! | `pending`/`failed`| `reserve`      | `pending`, leased, `failed + 1`      |
//! | leased            | `release`      | unleased, status unchanged           |
//! | leased            | `mark_success` | `success` (terminal)                 |
//! | leased            | `mark_failed`  | `failed`                             |
//! | leased            | `retry`        | `pending`, deferred schedule         |
//! | stuck lease       | `reclaim_stuck`| `pending`, unleased                  |
//!
//! The writes marked "leased" only apply while the caller still holds the
//! lease it took in `reserve`. Once that lease is reclaimed and taken by
//! another worker they report `false` and change nothing.

pub mod db;
pub mod error;
pub mod repository;
pub mod types;

pub use error::{QueueError, Result};
pub use repository::JobRepository;
pub use types::{Job, JobStatus};
