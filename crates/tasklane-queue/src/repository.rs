use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{types::Type, Connection, OptionalExtension, Row};
use tasklane_core::Clock;
use tracing::{debug, error, info, instrument, warn};

use crate::db::init_db;
use crate::error::{QueueError, Result};
use crate::types::{format_ts, parse_ts, shift_minutes, Job, JobStatus};

const JOB_COLUMNS: &str = "id, identifier, payload, status, failed, schedule, reserved_at,
                           response, created_at, updated_at";

/// Typed operations over the `jobs` table.
///
/// Each worker process owns one repository (one connection). Exclusion
/// between processes comes from the conditional writes below, never from
/// the in-process `Mutex`, which only makes the repository `Sync`.
pub struct JobRepository {
    db: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl JobRepository {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection, clock: Arc<dyn Clock>) -> Self {
        Self {
            db: Mutex::new(conn),
            clock,
        }
    }

    /// Wrap `conn` after making sure the schema exists.
    pub fn open(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self::new(conn, clock))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn db(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| QueueError::LockPoisoned)
    }

    // --- producer ------------------------------------------------------------

    /// Enqueue a new job. `schedule` defaults to now.
    #[instrument(skip(self, payload), fields(payload_len = payload.len()))]
    pub fn queue(
        &self,
        identifier: &str,
        payload: &str,
        schedule: Option<DateTime<Utc>>,
    ) -> Result<Job> {
        let now = self.clock.now();
        let schedule = schedule.unwrap_or(now);
        let now_str = format_ts(now);

        let db = self.db()?;
        db.execute(
            "INSERT INTO jobs
             (identifier, payload, status, failed, schedule, reserved_at, response,
              created_at, updated_at)
             VALUES (?1, ?2, 'pending', 0, ?3, NULL, NULL, ?4, ?4)",
            rusqlite::params![identifier, payload, format_ts(schedule), now_str],
        )?;
        let id = db.last_insert_rowid();
        info!(job_id = id, %identifier, "job queued");

        Ok(Job {
            id,
            identifier: identifier.to_string(),
            payload: payload.to_string(),
            status: JobStatus::Pending,
            failed: 0,
            schedule,
            reserved_at: None,
            response: None,
            created_at: now,
            updated_at: now,
        })
    }

    // --- selections ----------------------------------------------------------

    /// Pending, unleased rows whose schedule has arrived, oldest schedule first.
    pub fn available_jobs(&self, identifier: Option<&str>, limit: u32) -> Result<Vec<Job>> {
        let now = format_ts(self.clock.now());
        let db = self.db()?;
        let mut stmt = db.prepare_cached(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE status = 'pending' AND reserved_at IS NULL AND schedule <= ?1
               AND (?2 IS NULL OR identifier = ?2)
             ORDER BY schedule ASC, id ASC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(rusqlite::params![now, identifier, limit], id_and_job)?;
        collect_readable(rows)
    }

    /// Failed, unleased rows that still have attempts left, least recently
    /// updated first.
    pub fn failed_jobs(
        &self,
        identifier: Option<&str>,
        limit: u32,
        max_retries: u32,
    ) -> Result<Vec<Job>> {
        let db = self.db()?;
        let mut stmt = db.prepare_cached(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE status = 'failed' AND reserved_at IS NULL AND failed < ?1
               AND (?2 IS NULL OR identifier = ?2)
             ORDER BY updated_at ASC, id ASC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(rusqlite::params![max_retries, identifier, limit], id_and_job)?;
        collect_readable(rows)
    }

    pub fn find(&self, id: i64) -> Result<Option<Job>> {
        let db = self.db()?;
        let job = db
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                [id],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    /// Most recently updated rows, optionally narrowed by status and identifier.
    pub fn recent(
        &self,
        status: Option<JobStatus>,
        identifier: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Job>> {
        let db = self.db()?;
        let mut stmt = db.prepare_cached(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR identifier = ?2)
             ORDER BY updated_at DESC, id DESC
             LIMIT ?3"
        ))?;
        let jobs = stmt
            .query_map(
                rusqlite::params![status.map(|s| s.as_str()), identifier, limit],
                row_to_job,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    // --- transitions ---------------------------------------------------------

    /// Claim `job` for this worker.
    ///
    /// Compare-and-set on the values read by the selection: the row must still
    /// have the same status and attempt count and no lease. `Ok(false)` means
    /// another worker won the race or the row is gone. A claimed `failed` row
    /// becomes `pending` for the duration of the lease so that a crash is
    /// recovered by [`reclaim_stuck`](Self::reclaim_stuck).
    #[instrument(skip(self, job), fields(job_id = job.id, attempt = job.failed + 1))]
    pub fn reserve(&self, job: &mut Job) -> Result<bool> {
        let now = self.clock.now();
        let now_str = format_ts(now);
        let n = self.db()?.execute(
            "UPDATE jobs
             SET status = 'pending', reserved_at = ?1, failed = failed + 1, updated_at = ?1
             WHERE id = ?2 AND status = ?3 AND status != 'success'
               AND failed = ?4 AND reserved_at IS NULL",
            rusqlite::params![now_str, job.id, job.status.as_str(), job.failed],
        )?;
        if n == 0 {
            debug!("reservation lost");
            return Ok(false);
        }
        job.status = JobStatus::Pending;
        job.reserved_at = Some(now);
        job.failed += 1;
        job.updated_at = now;
        Ok(true)
    }

    /// Give the lease back without running the job.
    #[instrument(skip(self, job), fields(job_id = job.id))]
    pub fn release(&self, job: &mut Job) -> Result<bool> {
        let Some(reserved_at) = job.reserved_at else {
            return Ok(false);
        };
        let now = self.clock.now();
        let n = self.db()?.execute(
            "UPDATE jobs SET reserved_at = NULL, updated_at = ?1
             WHERE id = ?2 AND reserved_at = ?3 AND failed = ?4 AND status != 'success'",
            rusqlite::params![format_ts(now), job.id, format_ts(reserved_at), job.failed],
        )?;
        if n == 0 {
            return Ok(false);
        }
        job.reserved_at = None;
        job.updated_at = now;
        debug!("lease released");
        Ok(true)
    }

    #[instrument(skip(self, job, response), fields(job_id = job.id))]
    pub fn mark_success(&self, job: &mut Job, response: &str) -> Result<bool> {
        let changed = self.finish(job, JobStatus::Success, response)?;
        if changed {
            info!(identifier = %job.identifier, attempts = job.failed, "job succeeded");
        }
        Ok(changed)
    }

    #[instrument(skip(self, job, response), fields(job_id = job.id))]
    pub fn mark_failed(&self, job: &mut Job, response: &str) -> Result<bool> {
        let changed = self.finish(job, JobStatus::Failed, response)?;
        if changed {
            warn!(identifier = %job.identifier, attempts = job.failed, %response, "job failed");
        }
        Ok(changed)
    }

    /// Shared writer for `mark_success` / `mark_failed`. Only the holder of
    /// the current lease can finish a row, and `success` rows are never
    /// rewritten, which makes repeated calls no-ops.
    fn finish(&self, job: &mut Job, status: JobStatus, response: &str) -> Result<bool> {
        let Some(lease) = job.reserved_at else {
            debug!("no lease held; finish skipped");
            return Ok(false);
        };
        let now = self.clock.now();
        let n = self.db()?.execute(
            "UPDATE jobs SET status = ?1, response = ?2, reserved_at = NULL, updated_at = ?3
             WHERE id = ?4 AND reserved_at = ?5 AND failed = ?6 AND status != 'success'",
            rusqlite::params![
                status.as_str(),
                response,
                format_ts(now),
                job.id,
                format_ts(lease),
                job.failed
            ],
        )?;
        if n == 0 {
            return Ok(false);
        }
        job.status = status;
        job.response = Some(response.to_string());
        job.reserved_at = None;
        job.updated_at = now;
        Ok(true)
    }

    /// Put the job back in the pending set, eligible `delay_minutes` from now.
    /// The attempt counter is kept.
    #[instrument(skip(self, job), fields(job_id = job.id))]
    pub fn retry(&self, job: &mut Job, delay_minutes: i64) -> Result<bool> {
        let Some(lease) = job.reserved_at else {
            debug!("no lease held; retry skipped");
            return Ok(false);
        };
        let now = self.clock.now();
        let schedule = shift_minutes(now, delay_minutes)?;
        let n = self.db()?.execute(
            "UPDATE jobs SET status = 'pending', schedule = ?1, reserved_at = NULL, updated_at = ?2
             WHERE id = ?3 AND reserved_at = ?4 AND failed = ?5 AND status != 'success'",
            rusqlite::params![
                format_ts(schedule),
                format_ts(now),
                job.id,
                format_ts(lease),
                job.failed
            ],
        )?;
        if n == 0 {
            return Ok(false);
        }
        job.status = JobStatus::Pending;
        job.schedule = schedule;
        job.reserved_at = None;
        job.updated_at = now;
        info!(identifier = %job.identifier, attempts = job.failed, %schedule, "job scheduled for retry");
        Ok(true)
    }

    // --- maintenance ---------------------------------------------------------

    /// Clear every pending lease older than `timeout_minutes`. Returns the
    /// number of rows made available again.
    #[instrument(skip(self))]
    pub fn reclaim_stuck(&self, timeout_minutes: i64) -> Result<usize> {
        let now = self.clock.now();
        let back = timeout_minutes
            .checked_neg()
            .ok_or(QueueError::OffsetOutOfRange {
                minutes: timeout_minutes,
            })?;
        let cutoff = shift_minutes(now, back)?;
        let n = self.db()?.execute(
            "UPDATE jobs SET status = 'pending', reserved_at = NULL, updated_at = ?1
             WHERE status = 'pending' AND reserved_at IS NOT NULL AND reserved_at <= ?2",
            rusqlite::params![format_ts(now), format_ts(cutoff)],
        )?;
        if n > 0 {
            warn!(count = n, "stuck leases reclaimed");
        }
        Ok(n)
    }

    #[instrument(skip(self))]
    pub fn purge_by_status(&self, status: JobStatus, identifier: Option<&str>) -> Result<usize> {
        let n = self.db()?.execute(
            "DELETE FROM jobs WHERE status = ?1 AND (?2 IS NULL OR identifier = ?2)",
            rusqlite::params![status.as_str(), identifier],
        )?;
        info!(count = n, "jobs purged");
        Ok(n)
    }

    pub fn count_by_status(
        &self,
        status: Option<JobStatus>,
        identifier: Option<&str>,
    ) -> Result<u64> {
        let n: i64 = self.db()?.query_row(
            "SELECT COUNT(*) FROM jobs
             WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR identifier = ?2)",
            rusqlite::params![status.map(|s| s.as_str()), identifier],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Readiness probe: the `jobs` table exists.
    pub fn is_ready(&self) -> Result<bool> {
        let n: i64 = self.db()?.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'jobs'",
            [],
            |row| row.get(0),
        )?;
        Ok(n == 1)
    }
}

/// Row id next to the conversion result; unreadable rows are logged and
/// dropped from the selection.
fn id_and_job(row: &Row<'_>) -> rusqlite::Result<(i64, rusqlite::Result<Job>)> {
    Ok((row.get(0)?, row_to_job(row)))
}

fn collect_readable<I>(rows: I) -> Result<Vec<Job>>
where
    I: Iterator<Item = rusqlite::Result<(i64, rusqlite::Result<Job>)>>,
{
    let mut jobs = Vec::new();
    for row in rows {
        let (id, job) = row?;
        match job {
            Ok(job) => jobs.push(job),
            Err(e) => error!(job_id = id, error = %e, "skipping unreadable job row"),
        }
    }
    Ok(jobs)
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    let status: String = row.get(3)?;
    Ok(Job {
        id: row.get(0)?,
        identifier: row.get(1)?,
        payload: row.get(2)?,
        status: status.parse().map_err(|e| conversion_error(3, e))?,
        failed: row.get(4)?,
        schedule: ts(row, 5)?,
        reserved_at: row
            .get::<_, Option<String>>(6)?
            .map(|s| parse_ts(&s).map_err(|e| conversion_error(6, e)))
            .transpose()?,
        response: row.get(7)?,
        created_at: ts(row, 8)?,
        updated_at: ts(row, 9)?,
    })
}

fn ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).map_err(|e| conversion_error(idx, e))
}

fn conversion_error(idx: usize, e: QueueError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}
