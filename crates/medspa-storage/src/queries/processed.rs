// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idempotency ledger for provider events.

use chrono::{DateTime, Utc};
use medspa_core::{MedspaError, ProcessedMark};
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use crate::database::{Database, map_tr_err, ts};

/// Namespace for deterministic ledger keys.
const LEDGER_NAMESPACE: Uuid = Uuid::from_u128(0x1c4b4ef0_0f1f_4f8b_8a9c_7c0fba51cdbd);

/// Deterministic key for `(provider, event_id)`.
pub fn ledger_key(provider: &str, event_id: &str) -> Result<String, MedspaError> {
    if event_id.trim().is_empty() {
        return Err(MedspaError::Validation(format!(
            "empty event id for provider {provider}"
        )));
    }
    Ok(Uuid::new_v5(&LEDGER_NAMESPACE, format!("{provider}:{event_id}").as_bytes()).to_string())
}

/// Records the key inside the caller's transaction. False when it already existed.
pub fn mark_in_tx(
    tx: &rusqlite::Transaction<'_>,
    key: &str,
    provider: &str,
    event_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, rusqlite::Error> {
    let inserted = tx.execute(
        "INSERT INTO processed_events (provider_event_id, provider, event_id, processed_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (provider_event_id) DO NOTHING",
        params![key, provider, event_id, ts(now)],
    )?;
    Ok(inserted > 0)
}

pub async fn mark_processed(
    db: &Database,
    provider: &str,
    event_id: &str,
    now: DateTime<Utc>,
) -> Result<ProcessedMark, MedspaError> {
    let key = ledger_key(provider, event_id)?;
    let provider = provider.to_string();
    let event_id = event_id.to_string();
    let inserted = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let inserted = mark_in_tx(&tx, &key, &provider, &event_id, now)?;
            tx.commit()?;
            Ok(inserted)
        })
        .await
        .map_err(map_tr_err)?;
    Ok(if inserted {
        ProcessedMark::Recorded
    } else {
        ProcessedMark::AlreadyProcessed
    })
}

pub async fn already_processed(
    db: &Database,
    provider: &str,
    event_id: &str,
) -> Result<bool, MedspaError> {
    let key = ledger_key(provider, event_id)?;
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT 1 FROM processed_events WHERE provider_event_id = ?1",
                params![key],
                |_| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
        })
        .await
        .map_err(map_tr_err)
}

/// Deletes the mark for `(provider, event_id)`. Missing marks are fine.
pub async fn clear(db: &Database, provider: &str, event_id: &str) -> Result<(), MedspaError> {
    let key = ledger_key(provider, event_id)?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM processed_events WHERE provider_event_id = ?1",
                params![key],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
