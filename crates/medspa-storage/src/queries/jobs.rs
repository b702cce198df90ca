// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job status records with a time-to-live.

use chrono::{DateTime, Duration, Utc};
use medspa_core::{JobRecord, MedspaError};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err, opt_ts, parse_enum, req_ts, ts};

const SELECT_JOB: &str = "SELECT job_id, org_id, conversation_id, channel, kind, status, attempt,
        result, error, created_at, updated_at, completed_at
     FROM jobs";

fn row_to_job(row: &rusqlite::Row<'_>) -> Result<JobRecord, rusqlite::Error> {
    let channel: String = row.get(3)?;
    let status: String = row.get(5)?;
    Ok(JobRecord {
        job_id: row.get(0)?,
        org_id: row.get(1)?,
        conversation_id: row.get(2)?,
        channel: parse_enum(3, &channel)?,
        kind: row.get(4)?,
        status: parse_enum(5, &status)?,
        attempt: row.get(6)?,
        result: row.get(7)?,
        error: row.get(8)?,
        created_at: req_ts(row, 9)?,
        updated_at: req_ts(row, 10)?,
        completed_at: opt_ts(row, 11)?,
    })
}

/// Inserts a new job that expires `ttl` after creation.
pub async fn create(db: &Database, job: &JobRecord, ttl: Duration) -> Result<(), MedspaError> {
    let job = job.clone();
    let expires_at = ts(job.created_at + ttl);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO jobs (job_id, org_id, conversation_id, channel, kind, status,
                    attempt, result, error, created_at, updated_at, completed_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    job.job_id,
                    job.org_id,
                    job.conversation_id,
                    job.channel.to_string(),
                    job.kind,
                    job.status.to_string(),
                    job.attempt,
                    job.result,
                    job.error,
                    ts(job.created_at),
                    ts(job.updated_at),
                    job.completed_at.map(ts),
                    expires_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetches a live (unexpired) job.
pub async fn get(
    db: &Database,
    job_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<JobRecord>, MedspaError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("{SELECT_JOB} WHERE job_id = ?1 AND expires_at > ?2"),
                params![job_id, ts(now)],
                row_to_job,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// A requested status change.
#[derive(Debug, Clone)]
pub enum Transition {
    Processing { attempt: u32 },
    Completed { result: Option<String> },
    Failed { reason: String },
}

enum Outcome {
    Applied,
    Missing,
    Terminal(String),
}

/// Applies `transition` if the job is live and not yet terminal.
pub async fn transition(
    db: &Database,
    job_id: &str,
    transition: Transition,
    now: DateTime<Utc>,
) -> Result<(), MedspaError> {
    let id = job_id.to_string();
    let outcome = db
        .connection()
        .call(move |conn| {
            let now = ts(now);
            let changed = match &transition {
                Transition::Processing { attempt } => conn.execute(
                    "UPDATE jobs SET status = 'processing', attempt = ?2, updated_at = ?3
                     WHERE job_id = ?1 AND status IN ('pending', 'processing') AND expires_at > ?3",
                    params![id, attempt, now],
                )?,
                Transition::Completed { result } => conn.execute(
                    "UPDATE jobs SET status = 'completed', result = ?2, error = NULL,
                        updated_at = ?3, completed_at = ?3
                     WHERE job_id = ?1 AND status IN ('pending', 'processing') AND expires_at > ?3",
                    params![id, result, now],
                )?,
                Transition::Failed { reason } => conn.execute(
                    "UPDATE jobs SET status = 'failed', error = ?2,
                        updated_at = ?3, completed_at = ?3
                     WHERE job_id = ?1 AND status IN ('pending', 'processing') AND expires_at > ?3",
                    params![id, reason, now],
                )?,
            };
            if changed > 0 {
                return Ok(Outcome::Applied);
            }
            let status: Option<String> = conn
                .query_row(
                    "SELECT status FROM jobs WHERE job_id = ?1 AND expires_at > ?2",
                    params![id, now],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(match status {
                Some(s) => Outcome::Terminal(s),
                None => Outcome::Missing,
            })
        })
        .await
        .map_err(map_tr_err)?;

    match outcome {
        Outcome::Applied => Ok(()),
        Outcome::Missing => Err(MedspaError::JobNotFound {
            job_id: job_id.to_string(),
        }),
        Outcome::Terminal(status) => Err(MedspaError::InvalidTransition {
            job_id: job_id.to_string(),
            status,
        }),
    }
}

/// Deletes expired job rows. Returns how many were removed.
pub async fn purge_expired(db: &Database, now: DateTime<Utc>) -> Result<usize, MedspaError> {
    db.connection()
        .call(move |conn| conn.execute("DELETE FROM jobs WHERE expires_at <= ?1", params![ts(now)]))
        .await
        .map_err(map_tr_err)
}
