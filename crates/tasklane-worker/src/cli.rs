use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "tasklane-worker", version, about = "SQLite-backed job queue worker")]
pub struct Cli {
    /// Config file (overrides TASKLANE_CONFIG and ~/.tasklane/tasklane.toml).
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the worker loop until Ctrl-C.
    Work,
    /// Run one sweep and print the summary.
    Sweep {
        #[arg(long)]
        pending: bool,
        #[arg(long)]
        failed: bool,
        #[arg(long)]
        identifier: Option<String>,
    },
    /// Clear leases older than the configured timeout.
    Reclaim,
    /// Queue a job.
    Enqueue {
        identifier: String,
        /// JSON payload handed to the task.
        payload: String,
        #[arg(long)]
        delay_minutes: Option<i64>,
    },
    /// Job counts per status.
    Stats {
        #[arg(long)]
        identifier: Option<String>,
    },
    /// Most recently failed jobs with their responses.
    Failed {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Delete every job in a status.
    Purge {
        /// pending, failed or success
        status: String,
        #[arg(long)]
        identifier: Option<String>,
    },
}
