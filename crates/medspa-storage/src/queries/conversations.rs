// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation status and transcript history.

use chrono::{DateTime, Utc};
use medspa_core::types::{TranscriptEntry, TranscriptRole};
use medspa_core::{ConversationStatus, MedspaError};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err, parse_enum, ts};

pub async fn status(
    db: &Database,
    org_id: &str,
    conversation_id: &str,
) -> Result<Option<ConversationStatus>, MedspaError> {
    let org_id = org_id.to_string();
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT status FROM conversations WHERE org_id = ?1 AND conversation_id = ?2",
                    params![org_id, conversation_id],
                    |row| row.get(0),
                )
                .optional()?;
            raw.map(|s| parse_enum(0, &s)).transpose()
        })
        .await
        .map_err(map_tr_err)
}

/// Upserts the conversation status.
pub async fn set_status(
    db: &Database,
    org_id: &str,
    conversation_id: &str,
    status: ConversationStatus,
    now: DateTime<Utc>,
) -> Result<(), MedspaError> {
    let org_id = org_id.to_string();
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversations (org_id, conversation_id, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (org_id, conversation_id)
                 DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
                params![org_id, conversation_id, status.to_string(), ts(now)],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn append_message(
    db: &Database,
    entry: &TranscriptEntry,
    now: DateTime<Utc>,
) -> Result<(), MedspaError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversation_messages (org_id, conversation_id, role, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.org_id,
                    entry.conversation_id,
                    entry.role.to_string(),
                    entry.body,
                    ts(now)
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Full history in insertion order.
pub async fn transcript(
    db: &Database,
    org_id: &str,
    conversation_id: &str,
) -> Result<Vec<TranscriptEntry>, MedspaError> {
    let org_id = org_id.to_string();
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT org_id, conversation_id, role, body FROM conversation_messages
                 WHERE org_id = ?1 AND conversation_id = ?2 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![org_id, conversation_id], |row| {
                let role: String = row.get(2)?;
                Ok(TranscriptEntry {
                    org_id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    role: parse_enum::<TranscriptRole>(2, &role)?,
                    body: row.get(3)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Deletes everything stored for one conversation. Returns the number of
/// rows removed across tables.
pub async fn purge(
    db: &Database,
    org_id: &str,
    conversation_id: &str,
) -> Result<usize, MedspaError> {
    let org_id = org_id.to_string();
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            for table in [
                "conversation_messages",
                "conversations",
                "outbound_messages",
                "jobs",
            ] {
                removed += tx.execute(
                    &format!("DELETE FROM {table} WHERE org_id = ?1 AND conversation_id = ?2"),
                    params![org_id, conversation_id],
                )?;
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn status_upserts_and_transcript_keeps_order() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();

        assert!(status(&db, "org", "c1").await.unwrap().is_none());
        set_status(&db, "org", "c1", ConversationStatus::AwaitingQualification, Utc::now())
            .await
            .unwrap();
        set_status(&db, "org", "c1", ConversationStatus::AwaitingPayment, Utc::now())
            .await
            .unwrap();
        assert_eq!(
            status(&db, "org", "c1").await.unwrap(),
            Some(ConversationStatus::AwaitingPayment)
        );

        for (role, body) in [
            (TranscriptRole::Patient, "hi"),
            (TranscriptRole::Assistant, "hello!"),
        ] {
            let entry = TranscriptEntry {
                org_id: "org".into(),
                conversation_id: "c1".into(),
                role,
                body: body.into(),
            };
            append_message(&db, &entry, Utc::now()).await.unwrap();
        }
        let history = transcript(&db, "org", "c1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, TranscriptRole::Patient);
        assert_eq!(history[1].body, "hello!");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn purge_removes_only_the_target_conversation() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        for conversation in ["c1", "c2"] {
            set_status(&db, "org", conversation, ConversationStatus::Completed, Utc::now())
                .await
                .unwrap();
            let entry = TranscriptEntry {
                org_id: "org".into(),
                conversation_id: conversation.into(),
                role: TranscriptRole::Patient,
                body: "hi".into(),
            };
            append_message(&db, &entry, Utc::now()).await.unwrap();
        }

        assert_eq!(purge(&db, "org", "c1").await.unwrap(), 2);
        assert!(status(&db, "org", "c1").await.unwrap().is_none());
        assert!(transcript(&db, "org", "c1").await.unwrap().is_empty());
        assert_eq!(transcript(&db, "org", "c2").await.unwrap().len(), 1);
        assert_eq!(purge(&db, "org", "c1").await.unwrap(), 0);
        db.close().await.unwrap();
    }
}
