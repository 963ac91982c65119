// Behaviour of the job repository against real SQLite.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::Connection;
use tasklane_core::ManualClock;
use tasklane_queue::{JobRepository, JobStatus, QueueError};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
}

fn setup() -> (Arc<ManualClock>, JobRepository) {
    let clock = Arc::new(ManualClock::new(t0()));
    let repo = JobRepository::open(Connection::open_in_memory().unwrap(), clock.clone()).unwrap();
    (clock, repo)
}

#[test]
fn queued_job_starts_pending_and_unleased() {
    let (_clock, repo) = setup();
    let job = repo.queue("send-welcome-email", r#"{"user":1}"#, None).unwrap();

    let stored = repo.find(job.id).unwrap().unwrap();
    assert_eq!(stored, job);
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.failed, 0);
    assert_eq!(stored.schedule, t0());
    assert!(stored.reserved_at.is_none());
    assert!(stored.response.is_none());
}

#[test]
fn available_jobs_are_fifo_by_schedule_and_bounded() {
    let (_clock, repo) = setup();
    let late = repo.queue("mail", "c", Some(t0() - Duration::minutes(1))).unwrap();
    let early = repo.queue("mail", "a", Some(t0() - Duration::minutes(30))).unwrap();
    let middle = repo.queue("mail", "b", Some(t0() - Duration::minutes(10))).unwrap();

    let ids: Vec<i64> = repo.available_jobs(None, 10).unwrap().iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![early.id, middle.id, late.id]);

    let bounded = repo.available_jobs(None, 2).unwrap();
    assert_eq!(bounded.len(), 2);
    assert_eq!(bounded[0].id, early.id);
}

#[test]
fn available_jobs_skip_future_leased_and_finished_rows() {
    let (_clock, repo) = setup();
    let ready = repo.queue("mail", "ready", None).unwrap();
    repo.queue("mail", "future", Some(t0() + Duration::seconds(1))).unwrap();
    let mut leased = repo.queue("mail", "leased", None).unwrap();
    assert!(repo.reserve(&mut leased).unwrap());
    let mut done = repo.queue("mail", "done", None).unwrap();
    repo.reserve(&mut done).unwrap();
    repo.mark_success(&mut done, "ok").unwrap();
    let mut broken = repo.queue("mail", "broken", None).unwrap();
    repo.reserve(&mut broken).unwrap();
    repo.mark_failed(&mut broken, "boom").unwrap();

    let available = repo.available_jobs(None, 10).unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id, ready.id);
    for job in &available {
        assert!(job.is_available_at(t0()));
    }
}

#[test]
fn available_jobs_filter_by_identifier() {
    let (_clock, repo) = setup();
    repo.queue("mail", "{}", None).unwrap();
    let push = repo.queue("push", "{}", None).unwrap();

    let only_push = repo.available_jobs(Some("push"), 10).unwrap();
    assert_eq!(only_push.len(), 1);
    assert_eq!(only_push[0].id, push.id);
    assert_eq!(repo.available_jobs(None, 10).unwrap().len(), 2);
}

#[test]
fn reserve_takes_lease_and_counts_attempt() {
    let (clock, repo) = setup();
    let mut job = repo.queue("mail", "{}", None).unwrap();
    clock.advance(Duration::seconds(3));

    assert!(repo.reserve(&mut job).unwrap());
    assert_eq!(job.failed, 1);
    assert_eq!(job.reserved_at, Some(t0() + Duration::seconds(3)));

    let stored = repo.find(job.id).unwrap().unwrap();
    assert_eq!(stored.failed, 1);
    assert!(stored.is_leased());

    // Second claim on the same row loses.
    let mut again = repo.find(job.id).unwrap().unwrap();
    assert!(!repo.reserve(&mut again).unwrap());
    assert_eq!(repo.find(job.id).unwrap().unwrap().failed, 1);
}

#[test]
fn reserve_is_exclusive_across_worker_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");
    let clock = Arc::new(ManualClock::new(t0()));
    let worker_a = JobRepository::open(Connection::open(&path).unwrap(), clock.clone()).unwrap();
    let worker_b = JobRepository::open(Connection::open(&path).unwrap(), clock.clone()).unwrap();

    worker_a.queue("mail", "{}", None).unwrap();

    // Both workers see the same unleased row before either reserves it.
    let mut seen_by_a = worker_a.available_jobs(None, 10).unwrap().remove(0);
    let mut seen_by_b = worker_b.available_jobs(None, 10).unwrap().remove(0);
    assert_eq!(seen_by_a.id, seen_by_b.id);

    let a_won = worker_a.reserve(&mut seen_by_a).unwrap();
    let b_won = worker_b.reserve(&mut seen_by_b).unwrap();
    assert!(a_won);
    assert!(!b_won);
    assert_eq!(worker_b.find(seen_by_a.id).unwrap().unwrap().failed, 1);
}

#[test]
fn stale_read_cannot_reserve_a_retried_row() {
    let (_clock, repo) = setup();
    repo.queue("mail", "{}", None).unwrap();
    let stale = repo.available_jobs(None, 1).unwrap().remove(0);

    // Another worker runs the job, fails it and defers it.
    let mut fresh = stale.clone();
    assert!(repo.reserve(&mut fresh).unwrap());
    assert!(repo.retry(&mut fresh, 0).unwrap());

    let mut stale = stale;
    assert!(!repo.reserve(&mut stale).unwrap());
}

#[test]
fn late_writer_cannot_finish_a_lease_it_lost() {
    let (clock, repo) = setup();
    repo.queue("mail", "{}", None).unwrap();

    // Worker A reserves, stalls past the timeout and loses its lease.
    let mut a = repo.available_jobs(None, 1).unwrap().remove(0);
    assert!(repo.reserve(&mut a).unwrap());
    clock.advance(Duration::minutes(6));
    assert_eq!(repo.reclaim_stuck(5).unwrap(), 1);

    // Worker B takes the row over.
    let mut b = repo.available_jobs(None, 1).unwrap().remove(0);
    assert!(repo.reserve(&mut b).unwrap());
    assert_eq!(b.failed, 2);

    // A wakes up; none of its writes land.
    let mut late = a.clone();
    assert!(!repo.retry(&mut late, 0).unwrap());
    let mut late = a.clone();
    assert!(!repo.mark_failed(&mut late, "timeout").unwrap());
    let mut late = a.clone();
    assert!(!repo.mark_success(&mut late, "sent").unwrap());
    let mut late = a.clone();
    assert!(!repo.release(&mut late).unwrap());

    let stored = repo.find(b.id).unwrap().unwrap();
    assert_eq!(stored.reserved_at, b.reserved_at);
    assert_eq!(stored.failed, 2);
    assert!(stored.response.is_none());
    assert!(repo.available_jobs(None, 10).unwrap().is_empty());

    // A third worker holding the reclaimed copy cannot claim it either.
    let mut c = a.clone();
    c.reserved_at = None;
    c.failed = 1;
    assert!(!repo.reserve(&mut c).unwrap());

    assert!(repo.mark_success(&mut b, "sent").unwrap());
    assert_eq!(repo.find(b.id).unwrap().unwrap().status, JobStatus::Success);
}

#[test]
fn finishing_writes_need_a_lease() {
    let (_clock, repo) = setup();
    let mut job = repo.queue("mail", "{}", None).unwrap();

    assert!(!repo.mark_success(&mut job.clone(), "sent").unwrap());
    assert!(!repo.mark_failed(&mut job.clone(), "boom").unwrap());
    assert!(!repo.retry(&mut job, 5).unwrap());
    assert_eq!(repo.find(job.id).unwrap().unwrap(), job);
}

#[test]
fn unreadable_rows_are_skipped_by_selections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");
    let clock = Arc::new(ManualClock::new(t0()));
    let repo = JobRepository::open(Connection::open(&path).unwrap(), clock.clone()).unwrap();

    let broken = repo.queue("mail", "a", None).unwrap();
    let second = repo.queue("mail", "b", None).unwrap();
    let third = repo.queue("mail", "c", None).unwrap();
    let raw = Connection::open(&path).unwrap();
    raw.execute(
        "UPDATE jobs SET created_at = 'garbage' WHERE id = ?1",
        [broken.id],
    )
    .unwrap();

    let ids: Vec<i64> = repo.available_jobs(None, 10).unwrap().iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![second.id, third.id]);

    raw.execute(
        "UPDATE jobs SET status = 'failed' WHERE id IN (?1, ?2)",
        [broken.id, second.id],
    )
    .unwrap();
    let ids: Vec<i64> = repo.failed_jobs(None, 10, 3).unwrap().iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![second.id]);
}

#[test]
fn out_of_range_minutes_are_errors() {
    let (_clock, repo) = setup();
    let mut job = repo.queue("mail", "{}", None).unwrap();
    repo.reserve(&mut job).unwrap();
    let leased = repo.find(job.id).unwrap().unwrap();

    assert!(matches!(
        repo.retry(&mut job, i64::MAX),
        Err(QueueError::OffsetOutOfRange { .. })
    ));
    assert_eq!(repo.find(job.id).unwrap().unwrap(), leased);

    assert!(matches!(
        repo.reclaim_stuck(i64::MAX),
        Err(QueueError::OffsetOutOfRange { .. })
    ));
    assert!(repo.reclaim_stuck(i64::MIN).is_err());
}

#[test]
fn release_clears_lease_but_keeps_status_and_attempts() {
    let (_clock, repo) = setup();
    let mut job = repo.queue("mail", "{}", None).unwrap();
    repo.reserve(&mut job).unwrap();

    assert!(repo.release(&mut job).unwrap());
    let stored = repo.find(job.id).unwrap().unwrap();
    assert!(stored.reserved_at.is_none());
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.failed, 1);

    // Nothing left to release.
    assert!(!repo.release(&mut job).unwrap());
}

#[test]
fn success_is_terminal_and_repeat_marks_change_nothing() {
    let (clock, repo) = setup();
    let mut job = repo.queue("mail", "{}", None).unwrap();
    repo.reserve(&mut job).unwrap();
    assert!(repo.mark_success(&mut job, "sent").unwrap());
    let first = repo.find(job.id).unwrap().unwrap();
    assert_eq!(first.status, JobStatus::Success);
    assert!(first.reserved_at.is_none());

    clock.advance(Duration::minutes(1));
    let mut copy = first.clone();
    assert!(!repo.mark_success(&mut copy, "sent again").unwrap());
    assert!(!repo.mark_failed(&mut copy, "nope").unwrap());
    assert!(!repo.retry(&mut copy, 5).unwrap());
    assert!(!repo.reserve(&mut copy).unwrap());

    assert_eq!(repo.find(job.id).unwrap().unwrap(), first);
}

#[test]
fn retry_defers_schedule_and_keeps_attempts() {
    let (clock, repo) = setup();
    let mut job = repo.queue("mail", "{}", None).unwrap();
    repo.reserve(&mut job).unwrap();

    assert!(repo.retry(&mut job, 5).unwrap());
    let stored = repo.find(job.id).unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.schedule, t0() + Duration::minutes(5));
    assert!(stored.reserved_at.is_none());
    assert_eq!(stored.failed, 1);

    assert!(repo.available_jobs(None, 10).unwrap().is_empty());
    clock.advance(Duration::minutes(5));
    assert_eq!(repo.available_jobs(None, 10).unwrap().len(), 1);
}

#[test]
fn failed_jobs_respect_attempt_budget_and_age() {
    let (clock, repo) = setup();
    let mut older = repo.queue("mail", "older", None).unwrap();
    repo.reserve(&mut older).unwrap();
    repo.mark_failed(&mut older, "unknown task").unwrap();

    clock.advance(Duration::minutes(1));
    let mut newer = repo.queue("mail", "newer", None).unwrap();
    repo.reserve(&mut newer).unwrap();
    repo.mark_failed(&mut newer, "unknown task").unwrap();

    clock.advance(Duration::minutes(1));
    let mut exhausted = repo.queue("mail", "exhausted", None).unwrap();
    for _ in 0..3 {
        repo.reserve(&mut exhausted).unwrap();
        repo.retry(&mut exhausted, 0).unwrap();
    }
    repo.reserve(&mut exhausted).unwrap();
    repo.mark_failed(&mut exhausted, "gave up").unwrap();
    assert_eq!(exhausted.failed, 4);

    let ids: Vec<i64> = repo.failed_jobs(None, 10, 3).unwrap().iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![older.id, newer.id]);
    assert_eq!(repo.failed_jobs(Some("push"), 10, 3).unwrap().len(), 0);
}

#[test]
fn reserving_a_failed_row_leases_it_as_pending() {
    let (clock, repo) = setup();
    let mut job = repo.queue("mail", "{}", None).unwrap();
    repo.reserve(&mut job).unwrap();
    repo.mark_failed(&mut job, "unknown task").unwrap();

    let mut retryable = repo.failed_jobs(None, 10, 3).unwrap().remove(0);
    assert!(repo.reserve(&mut retryable).unwrap());
    assert!(retryable.is_leased());
    assert_eq!(retryable.failed, 2);

    // A crash during this lease is recovered like any other.
    clock.advance(Duration::minutes(6));
    assert_eq!(repo.reclaim_stuck(5).unwrap(), 1);
}

#[test]
fn stuck_lease_is_reclaimed_exactly_once() {
    let (clock, repo) = setup();
    let mut job = repo.queue("send-welcome-email", "{}", None).unwrap();
    assert!(repo.reserve(&mut job).unwrap());

    // Worker crashes here. Fresh leases are left alone.
    clock.advance(Duration::minutes(4));
    assert_eq!(repo.reclaim_stuck(5).unwrap(), 0);
    assert!(repo.available_jobs(None, 10).unwrap().is_empty());

    clock.advance(Duration::minutes(2));
    assert_eq!(repo.reclaim_stuck(5).unwrap(), 1);
    assert_eq!(repo.reclaim_stuck(5).unwrap(), 0);

    let stored = repo.find(job.id).unwrap().unwrap();
    assert!(stored.reserved_at.is_none());
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.failed, 1);

    let available = repo.available_jobs(None, 10).unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id, job.id);
}

#[test]
fn count_and_purge_by_status() {
    let (_clock, repo) = setup();
    for identifier in ["mail", "mail", "push"] {
        let mut job = repo.queue(identifier, "{}", None).unwrap();
        repo.reserve(&mut job).unwrap();
        repo.mark_success(&mut job, "ok").unwrap();
    }
    repo.queue("mail", "{}", None).unwrap();

    assert_eq!(repo.count_by_status(None, None).unwrap(), 4);
    assert_eq!(repo.count_by_status(Some(JobStatus::Success), None).unwrap(), 3);
    assert_eq!(repo.count_by_status(Some(JobStatus::Success), Some("mail")).unwrap(), 2);

    assert_eq!(repo.purge_by_status(JobStatus::Success, Some("push")).unwrap(), 1);
    assert_eq!(repo.purge_by_status(JobStatus::Success, None).unwrap(), 2);
    assert_eq!(repo.count_by_status(None, None).unwrap(), 1);
    assert_eq!(repo.count_by_status(Some(JobStatus::Pending), None).unwrap(), 1);
}

#[test]
fn recent_lists_newest_first_with_response() {
    let (clock, repo) = setup();
    let mut a = repo.queue("mail", "{}", None).unwrap();
    repo.reserve(&mut a).unwrap();
    repo.mark_failed(&mut a, "first").unwrap();
    clock.advance(Duration::minutes(1));
    let mut b = repo.queue("mail", "{}", None).unwrap();
    repo.reserve(&mut b).unwrap();
    repo.mark_failed(&mut b, "second").unwrap();

    let listed = repo.recent(Some(JobStatus::Failed), None, 10).unwrap();
    let responses: Vec<_> = listed.iter().map(|j| j.response.as_deref()).collect();
    assert_eq!(responses, vec![Some("second"), Some("first")]);
}

#[test]
fn readiness_requires_schema() {
    let clock = Arc::new(ManualClock::new(t0()));
    let bare = JobRepository::new(Connection::open_in_memory().unwrap(), clock.clone());
    assert!(!bare.is_ready().unwrap());

    let (_clock, repo) = setup();
    assert!(repo.is_ready().unwrap());
}
