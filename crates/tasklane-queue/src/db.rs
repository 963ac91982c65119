use rusqlite::Connection;

use crate::error::Result;

/// Initialise the queue schema in `conn`. Safe to call on every startup
/// (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            identifier  TEXT    NOT NULL,
            payload     TEXT    NOT NULL,
            status      TEXT    NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'failed', 'success')),
            failed      INTEGER NOT NULL DEFAULT 0 CHECK (failed >= 0),
            schedule    TEXT    NOT NULL,   -- RFC 3339, microsecond precision, UTC
            reserved_at TEXT,               -- lease marker, NULL when unleased
            response    TEXT,
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_identifier
            ON jobs (identifier);
        -- available_jobs: WHERE status = 'pending' AND schedule <= ? ORDER BY schedule
        CREATE INDEX IF NOT EXISTS idx_jobs_status_schedule
            ON jobs (status, schedule);
        CREATE INDEX IF NOT EXISTS idx_jobs_created_at
            ON jobs (created_at);
        -- failed_jobs: WHERE status = 'failed' AND failed < ?
        CREATE INDEX IF NOT EXISTS idx_jobs_status_failed
            ON jobs (status, failed);
        ",
    )?;
    Ok(())
}

/// Connection settings for a database file shared by several workers.
pub fn configure(conn: &Connection, busy_timeout_ms: u64) -> Result<()> {
    conn.busy_timeout(std::time::Duration::from_millis(busy_timeout_ms))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(())
}
