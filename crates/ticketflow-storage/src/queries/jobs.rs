// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable job queue operations: crash-safe dequeue with lock timeouts,
//! retry with backoff, stalled-lock recovery and repeating definitions.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use ticketflow_core::TicketflowError;
use ticketflow_core::types::{Backoff, Job, JobOptions, JobStatus, RepeatableJob};

use crate::database::{
    Database, conversion_err, fmt_ts, map_tr_err, parse_json, parse_opt_ts, parse_ts, to_json,
};

const JOB_COLUMNS: &str = "id, queue_name, name, payload, status, attempts, max_attempts, \
     backoff, remove_on_complete, run_at, locked_until, last_error, created_at";

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let status: String = row.get(4)?;
    let backoff: String = row.get(7)?;
    let run_at: String = row.get(9)?;
    let created_at: String = row.get(12)?;
    Ok(Job {
        id: row.get(0)?,
        queue_name: row.get(1)?,
        name: row.get(2)?,
        payload: row.get(3)?,
        status: JobStatus::from_str(&status).map_err(|e| conversion_err(4, e))?,
        attempts: row.get(5)?,
        max_attempts: row.get(6)?,
        backoff: parse_json(7, &backoff)?,
        remove_on_complete: row.get(8)?,
        run_at: parse_ts(9, &run_at)?,
        locked_until: parse_opt_ts(10, row.get(10)?)?,
        last_error: row.get(11)?,
        created_at: parse_ts(12, &created_at)?,
    })
}

fn after(now: DateTime<Utc>, ms: u64) -> DateTime<Utc> {
    now + Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX / 2))
}

fn insert_job(
    conn: &rusqlite::Connection,
    queue: &str,
    name: &str,
    payload: &str,
    options: &JobOptions,
    backoff: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO jobs (queue_name, name, payload, max_attempts, backoff,
           remove_on_complete, run_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            queue,
            name,
            payload,
            options.attempts.max(1),
            backoff,
            options.remove_on_complete,
            fmt_ts(after(now, options.delay_ms)),
            fmt_ts(now),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Adds a job. Returns the new job id.
pub async fn enqueue_job(
    db: &Database,
    queue: &str,
    name: &str,
    payload: &str,
    options: JobOptions,
    now: DateTime<Utc>,
) -> Result<i64, TicketflowError> {
    let backoff = to_json(&options.backoff)?;
    let (queue, name, payload) = (queue.to_string(), name.to_string(), payload.to_string());
    db.connection()
        .call(move |conn| insert_job(conn, &queue, &name, &payload, &options, &backoff, now))
        .await
        .map_err(map_tr_err)
}

/// Atomically selects the oldest runnable job with one of `names` and marks
/// it processing until `lock_until`. Returns `None` if nothing is runnable.
pub async fn dequeue_job(
    db: &Database,
    queue: &str,
    names: &[String],
    now: DateTime<Utc>,
    lock_until: DateTime<Utc>,
) -> Result<Option<Job>, TicketflowError> {
    if names.is_empty() {
        return Ok(None);
    }
    let placeholders = (0..names.len())
        .map(|i| format!("?{}", i + 3))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {JOB_COLUMNS} FROM jobs
         WHERE queue_name = ?1 AND status = 'pending' AND run_at <= ?2 AND name IN ({placeholders})
         ORDER BY run_at ASC, id ASC
         LIMIT 1"
    );
    let mut values = vec![queue.to_string(), fmt_ts(now)];
    values.extend(names.iter().cloned());
    let now_s = fmt_ts(now);
    let lock_s = fmt_ts(lock_until);

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let job = tx
                .query_row(&sql, params_from_iter(values.iter()), job_from_row)
                .optional()?;
            let Some(job) = job else {
                tx.commit()?;
                return Ok(None);
            };
            tx.execute(
                "UPDATE jobs SET status = 'processing', locked_until = ?2, updated_at = ?3
                 WHERE id = ?1",
                params![job.id, lock_s, now_s],
            )?;
            tx.commit()?;
            Ok(Some(Job {
                status: JobStatus::Processing,
                locked_until: Some(lock_until),
                ..job
            }))
        })
        .await
        .map_err(map_tr_err)
}

/// Marks a job completed, or deletes it when it was added with `remove_on_complete`.
pub async fn complete_job(
    db: &Database,
    id: i64,
    now: DateTime<Utc>,
) -> Result<(), TicketflowError> {
    let now = fmt_ts(now);
    db.connection()
        .call(move |conn| {
            let removed = conn.execute(
                "DELETE FROM jobs WHERE id = ?1 AND remove_on_complete = 1",
                params![id],
            )?;
            if removed == 0 {
                conn.execute(
                    "UPDATE jobs SET status = 'completed', locked_until = NULL, updated_at = ?2
                     WHERE id = ?1",
                    params![id, now],
                )?;
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Records a failed attempt.
///
/// Increments attempts. Once attempts reach `max_attempts` the job is marked
/// failed and kept for inspection; otherwise it returns to pending with its
/// `run_at` pushed out by the job's backoff.
pub async fn fail_job(
    db: &Database,
    id: i64,
    error: &str,
    now: DateTime<Utc>,
) -> Result<JobStatus, TicketflowError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            let (attempts, max_attempts, backoff): (u32, u32, String) = conn.query_row(
                "SELECT attempts, max_attempts, backoff FROM jobs WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            let backoff: Backoff = parse_json(2, &backoff)?;

            let attempts = attempts + 1;
            if attempts >= max_attempts {
                conn.execute(
                    "UPDATE jobs SET status = 'failed', attempts = ?2, last_error = ?3,
                     locked_until = NULL, updated_at = ?4
                     WHERE id = ?1",
                    params![id, attempts, error, fmt_ts(now)],
                )?;
                Ok(JobStatus::Failed)
            } else {
                let run_at = after(now, backoff.delay_ms(attempts));
                conn.execute(
                    "UPDATE jobs SET status = 'pending', attempts = ?2, last_error = ?3,
                     locked_until = NULL, run_at = ?4, updated_at = ?5
                     WHERE id = ?1",
                    params![id, attempts, error, fmt_ts(run_at), fmt_ts(now)],
                )?;
                Ok(JobStatus::Pending)
            }
        })
        .await
        .map_err(map_tr_err)
}

const LOCK_EXPIRED: &str = "lock expired";

/// Handles processing jobs whose lock expired before `now`.
///
/// An expired lock counts as a failed attempt: jobs with attempts left go
/// back to pending, the rest are marked failed. Returns how many jobs were
/// returned to pending and how many were failed.
pub async fn recover_stalled_jobs(
    db: &Database,
    now: DateTime<Utc>,
) -> Result<(u64, u64), TicketflowError> {
    let now = fmt_ts(now);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let failed = tx.execute(
                "UPDATE jobs SET status = 'failed', attempts = attempts + 1, last_error = ?2,
                 locked_until = NULL, updated_at = ?1
                 WHERE status = 'processing' AND locked_until < ?1
                   AND attempts + 1 >= max_attempts",
                params![now, LOCK_EXPIRED],
            )?;
            let requeued = tx.execute(
                "UPDATE jobs SET status = 'pending', attempts = attempts + 1, last_error = ?2,
                 locked_until = NULL, updated_at = ?1
                 WHERE status = 'processing' AND locked_until < ?1",
                params![now, LOCK_EXPIRED],
            )?;
            tx.commit()?;
            Ok((requeued as u64, failed as u64))
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_jobs(
    db: &Database,
    queue: &str,
    status: Option<JobStatus>,
) -> Result<Vec<Job>, TicketflowError> {
    let queue = queue.to_string();
    let status = status.map(|s| s.to_string());
    let sql = format!(
        "SELECT {JOB_COLUMNS} FROM jobs
         WHERE queue_name = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY id ASC"
    );
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![queue, status], job_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)
}

// --- Repeating definitions ---

fn repeatable_from_row(row: &Row<'_>) -> rusqlite::Result<RepeatableJob> {
    let options: String = row.get(3)?;
    let next_run_at: String = row.get(4)?;
    Ok(RepeatableJob {
        queue_name: row.get(0)?,
        name: row.get(1)?,
        every_ms: row.get(2)?,
        options: parse_json(3, &options)?,
        next_run_at: parse_ts(4, &next_run_at)?,
    })
}

/// Replaces any existing definition with the same queue and name, along with
/// the pending instances the old definition already produced.
pub async fn upsert_repeatable(db: &Database, job: &RepeatableJob) -> Result<(), TicketflowError> {
    let options = to_json(&job.options)?;
    let job = job.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM repeatable_jobs WHERE queue_name = ?1 AND name = ?2",
                params![job.queue_name, job.name],
            )?;
            tx.execute(
                "DELETE FROM jobs WHERE queue_name = ?1 AND name = ?2 AND status = 'pending'",
                params![job.queue_name, job.name],
            )?;
            tx.execute(
                "INSERT INTO repeatable_jobs (queue_name, name, every_ms, options, next_run_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    job.queue_name,
                    job.name,
                    job.every_ms,
                    options,
                    fmt_ts(job.next_run_at)
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn remove_repeatable(
    db: &Database,
    queue: &str,
    name: &str,
) -> Result<bool, TicketflowError> {
    let (queue, name) = (queue.to_string(), name.to_string());
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "DELETE FROM repeatable_jobs WHERE queue_name = ?1 AND name = ?2",
                params![queue, name],
            )?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_repeatables(
    db: &Database,
    queue: &str,
) -> Result<Vec<RepeatableJob>, TicketflowError> {
    let queue = queue.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT queue_name, name, every_ms, options, next_run_at
                 FROM repeatable_jobs WHERE queue_name = ?1 ORDER BY name ASC",
            )?;
            let rows = stmt.query_map(params![queue], repeatable_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Enqueues one instance of every definition due at `now` and advances it.
///
/// A definition whose previous instance is still pending is advanced without
/// adding another, so a stopped worker does not come back to a backlog of
/// identical sweeps.
pub async fn promote_repeatables(
    db: &Database,
    queue: &str,
    now: DateTime<Utc>,
) -> Result<usize, TicketflowError> {
    let queue = queue.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let due = {
                let mut stmt = tx.prepare(
                    "SELECT queue_name, name, every_ms, options, next_run_at
                     FROM repeatable_jobs WHERE queue_name = ?1 AND next_run_at <= ?2",
                )?;
                let rows = stmt.query_map(params![queue, fmt_ts(now)], repeatable_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let mut promoted = 0;
            for def in due {
                let waiting: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM jobs
                     WHERE queue_name = ?1 AND name = ?2 AND status = 'pending'",
                    params![def.queue_name, def.name],
                    |row| row.get(0),
                )?;
                if waiting == 0 {
                    let backoff = serde_json::to_string(&def.options.backoff)
                        .map_err(|e| conversion_err(3, e))?;
                    insert_job(&tx, &def.queue_name, &def.name, "{}", &def.options, &backoff, now)?;
                    promoted += 1;
                }

                let mut next = after(def.next_run_at, def.every_ms);
                if next <= now {
                    next = after(now, def.every_ms);
                }
                tx.execute(
                    "UPDATE repeatable_jobs SET next_run_at = ?3 WHERE queue_name = ?1 AND name = ?2",
                    params![def.queue_name, def.name, fmt_ts(next)],
                )?;
            }
            tx.commit()?;
            Ok(promoted)
        })
        .await
        .map_err(map_tr_err)
}
