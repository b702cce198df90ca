// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compliance audit log.

use chrono::{DateTime, Utc};
use medspa_core::MedspaError;
use medspa_core::types::AuditEntry;
use rusqlite::params;

use crate::database::{Database, map_tr_err, ts};

pub async fn insert(db: &Database, entry: &AuditEntry, now: DateTime<Utc>) -> Result<(), MedspaError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO audit_log (actor, event, org_id, conversation_id, detail, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.actor,
                    entry.event,
                    entry.org_id,
                    entry.conversation_id,
                    entry.detail.to_string(),
                    ts(now)
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Audit rows for one conversation, oldest first.
pub async fn list_for_conversation(
    db: &Database,
    org_id: &str,
    conversation_id: &str,
) -> Result<Vec<AuditEntry>, MedspaError> {
    let org_id = org_id.to_string();
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT actor, event, org_id, conversation_id, detail FROM audit_log
                 WHERE org_id = ?1 AND conversation_id = ?2 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![org_id, conversation_id], |row| {
                let detail: String = row.get(4)?;
                Ok(AuditEntry {
                    actor: row.get(0)?,
                    event: row.get(1)?,
                    org_id: row.get(2)?,
                    conversation_id: row.get(3)?,
                    detail: serde_json::from_str(&detail).unwrap_or(serde_json::Value::String(detail)),
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
