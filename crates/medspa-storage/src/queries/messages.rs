// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound SMS delivery state.

use chrono::{DateTime, Utc};
use medspa_core::MedspaError;
use medspa_core::types::OutboundMessage;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err, opt_ts, ts};

const SELECT_MESSAGE: &str = "SELECT id, org_id, conversation_id, from_number, to_number, body,
        status, send_attempts, provider_message_id, last_error, next_retry_at
     FROM outbound_messages";

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<OutboundMessage, rusqlite::Error> {
    Ok(OutboundMessage {
        id: row.get(0)?,
        org_id: row.get(1)?,
        conversation_id: row.get(2)?,
        from: row.get(3)?,
        to: row.get(4)?,
        body: row.get(5)?,
        status: row.get(6)?,
        send_attempts: row.get(7)?,
        provider_message_id: row.get(8)?,
        last_error: row.get(9)?,
        next_retry_at: opt_ts(row, 10)?,
    })
}

pub async fn insert(db: &Database, msg: &OutboundMessage, now: DateTime<Utc>) -> Result<(), MedspaError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO outbound_messages (id, org_id, conversation_id, from_number,
                    to_number, body, status, send_attempts, provider_message_id, last_error,
                    next_retry_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
                params![
                    msg.id,
                    msg.org_id,
                    msg.conversation_id,
                    msg.from,
                    msg.to,
                    msg.body,
                    msg.status,
                    msg.send_attempts,
                    msg.provider_message_id,
                    msg.last_error,
                    msg.next_retry_at.map(ts),
                    ts(now),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<OutboundMessage>, MedspaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("{SELECT_MESSAGE} WHERE id = ?1"),
                params![id],
                row_to_message,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Due retries: failed or retry-pending, under the attempt ceiling, oldest due first.
pub async fn list_retry_candidates(
    db: &Database,
    limit: usize,
    max_attempts: u32,
    now: DateTime<Utc>,
) -> Result<Vec<OutboundMessage>, MedspaError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_MESSAGE}
                 WHERE status IN ('failed', 'retry_pending')
                   AND send_attempts < ?1
                   AND (next_retry_at IS NULL OR next_retry_at <= ?2)
                 ORDER BY COALESCE(next_retry_at, created_at) ASC
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(
                params![max_attempts, ts(now), limit as i64],
                row_to_message,
            )?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn record_sent(
    db: &Database,
    id: &str,
    provider_message_id: &str,
    status: &str,
    now: DateTime<Utc>,
) -> Result<(), MedspaError> {
    let (id, provider_message_id, status) =
        (id.to_string(), provider_message_id.to_string(), status.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE outbound_messages
                 SET status = ?2, provider_message_id = ?3, send_attempts = send_attempts + 1,
                     next_retry_at = NULL, last_error = NULL, updated_at = ?4
                 WHERE id = ?1",
                params![id, status, provider_message_id, ts(now)],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Marks a send as failed with one more attempt used, due for retry immediately.
pub async fn record_send_failure(
    db: &Database,
    id: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<(), MedspaError> {
    let (id, reason) = (id.to_string(), reason.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE outbound_messages
                 SET status = 'failed', send_attempts = send_attempts + 1, last_error = ?2,
                     updated_at = ?3
                 WHERE id = ?1",
                params![id, reason, ts(now)],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn schedule_retry(
    db: &Database,
    id: &str,
    next_retry_at: DateTime<Utc>,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<(), MedspaError> {
    let (id, reason) = (id.to_string(), reason.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE outbound_messages
                 SET status = 'retry_pending', send_attempts = send_attempts + 1,
                     next_retry_at = ?2, last_error = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![id, ts(next_retry_at), reason, ts(now)],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn mark_permanently_failed(
    db: &Database,
    id: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<(), MedspaError> {
    let (id, reason) = (id.to_string(), reason.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE outbound_messages
                 SET status = 'failed_permanent', send_attempts = send_attempts + 1,
                     next_retry_at = NULL, last_error = ?2, updated_at = ?3
                 WHERE id = ?1",
                params![id, reason, ts(now)],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
