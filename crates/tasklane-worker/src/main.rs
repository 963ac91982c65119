use std::sync::Arc;

use clap::Parser;
use tasklane_core::config::TasklaneConfig;
use tasklane_core::SystemClock;
use tasklane_queue::types::shift_minutes;
use tasklane_queue::{JobRepository, JobStatus};
use tasklane_scheduler::{Dispatcher, WorkerEngine};
use tracing::info;

mod cli;
mod listeners;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tasklane=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = load_config(cli.config.clone())?;

    let repo = Arc::new(open_repository(&config)?);

    match cli.command {
        Command::Work => {
            let registry = Arc::new(listeners::build_registry());
            let engine = WorkerEngine::new(repo, registry, config.queue.clone(), &config.worker);
            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            let handle = tokio::spawn(engine.run(shutdown_rx));

            tokio::signal::ctrl_c().await?;
            info!("Ctrl-C received, stopping worker");
            let _ = shutdown_tx.send(true);
            handle.await?;
        }
        Command::Sweep {
            pending,
            failed,
            identifier,
        } => {
            let registry = Arc::new(listeners::build_registry());
            let mut dispatcher = Dispatcher::new(repo, registry, config.queue.clone());
            if pending {
                dispatcher = dispatcher.pending();
            }
            if failed {
                dispatcher = dispatcher.failed();
            }
            if let Some(id) = identifier {
                dispatcher = dispatcher.only(id);
            }
            println!("{}", dispatcher.run());
        }
        Command::Reclaim => {
            let n = repo.reclaim_stuck(config.queue.timeout_minutes)?;
            println!("reclaimed {n} stuck job(s)");
        }
        Command::Enqueue {
            identifier,
            payload,
            delay_minutes,
        } => {
            serde_json::from_str::<serde_json::Value>(&payload)
                .map_err(|e| anyhow::anyhow!("payload is not valid JSON: {e}"))?;
            let schedule = delay_minutes
                .map(|m| shift_minutes(repo.clock().now(), m))
                .transpose()?;
            let job = repo.queue(&identifier, &payload, schedule)?;
            println!("queued job {} ({}) for {}", job.id, job.identifier, job.schedule);
        }
        Command::Stats { identifier } => {
            for status in JobStatus::ALL {
                let n = repo.count_by_status(Some(status), identifier.as_deref())?;
                println!("{:<8} {n}", status.as_str());
            }
        }
        Command::Failed { limit } => {
            for job in repo.recent(Some(JobStatus::Failed), None, limit)? {
                println!(
                    "#{} {} attempts={} updated={} response={}",
                    job.id,
                    job.identifier,
                    job.failed,
                    job.updated_at,
                    job.response.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Purge { status, identifier } => {
            let status: JobStatus = status.parse()?;
            let n = repo.purge_by_status(status, identifier.as_deref())?;
            println!("purged {n} {status} job(s)");
        }
    }

    Ok(())
}

/// Config lookup: `--config` > TASKLANE_CONFIG env > ~/.tasklane/tasklane.toml.
/// A missing file means defaults; an unreadable or invalid one is fatal.
fn load_config(explicit: Option<String>) -> anyhow::Result<TasklaneConfig> {
    let config_path = explicit.or_else(|| std::env::var("TASKLANE_CONFIG").ok());
    TasklaneConfig::load(config_path.as_deref())
        .map_err(|e| anyhow::anyhow!("[{}] {e}", e.code()))
}

fn open_repository(config: &TasklaneConfig) -> anyhow::Result<JobRepository> {
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let conn = rusqlite::Connection::open(db_path)?;
    tasklane_queue::db::configure(&conn, config.database.busy_timeout_ms)?;
    Ok(JobRepository::open(conn, Arc::new(SystemClock))?)
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
