// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transactional outbox.
//!
//! Events are inserted with [`insert`] inside the transaction that writes the
//! business fact. Deliverers lease batches with [`claim_undispatched`]; a lease
//! that is never resolved simply expires, so a crashed deliverer cannot strand
//! an event.

use chrono::{DateTime, Duration, Utc};
use medspa_core::{MedspaError, OutboxEvent};
use rusqlite::{TransactionBehavior, params};

use crate::database::{Database, map_tr_err, opt_ts, req_ts, ts};

/// Writes `event` as part of the caller's transaction.
pub fn insert(tx: &rusqlite::Transaction<'_>, event: &OutboxEvent) -> Result<(), rusqlite::Error> {
    tx.execute(
        "INSERT INTO outbox_events (id, event_type, payload, dispatched, created_at)
         VALUES (?1, ?2, ?3, 0, ?4)",
        params![
            event.id,
            event.event_type,
            event.payload.to_string(),
            ts(event.created_at)
        ],
    )?;
    Ok(())
}

/// Writes a standalone event in its own transaction.
pub async fn append(db: &Database, event: &OutboxEvent) -> Result<(), MedspaError> {
    let event = event.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            insert(&tx, &event)?;
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

fn row_to_event(row: &rusqlite::Row<'_>) -> Result<OutboxEvent, rusqlite::Error> {
    let payload: String = row.get(2)?;
    let payload = serde_json::from_str(&payload).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(OutboxEvent {
        id: row.get(0)?,
        event_type: row.get(1)?,
        payload,
        dispatched: row.get(3)?,
        created_at: req_ts(row, 4)?,
        dispatched_at: opt_ts(row, 5)?,
    })
}

/// Leases up to `limit` undispatched, unleased events (oldest first) until `now + lease`.
pub async fn claim_undispatched(
    db: &Database,
    limit: usize,
    lease: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<OutboxEvent>, MedspaError> {
    db.connection()
        .call(move |conn| {
            // IMMEDIATE takes the write lock up front so concurrent deliverers in
            // other processes cannot select the same rows.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let events = {
                let mut stmt = tx.prepare(
                    "SELECT id, event_type, payload, dispatched, created_at, dispatched_at
                     FROM outbox_events
                     WHERE dispatched = 0 AND (claimed_until IS NULL OR claimed_until <= ?1)
                     ORDER BY created_at ASC, id ASC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![ts(now), limit as i64], row_to_event)?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            let until = ts(now + lease);
            for event in &events {
                tx.execute(
                    "UPDATE outbox_events SET claimed_until = ?2 WHERE id = ?1",
                    params![event.id, until],
                )?;
            }
            tx.commit()?;
            Ok(events)
        })
        .await
        .map_err(map_tr_err)
}

/// Marks an event dispatched. False if it already was.
pub async fn mark_dispatched(
    db: &Database,
    event_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, MedspaError> {
    let event_id = event_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE outbox_events SET dispatched = 1, dispatched_at = ?2, claimed_until = NULL
                 WHERE id = ?1 AND dispatched = 0",
                params![event_id, ts(now)],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Clears the lease on an undispatched event.
pub async fn release_claim(db: &Database, event_id: &str) -> Result<(), MedspaError> {
    let event_id = event_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE outbox_events SET claimed_until = NULL WHERE id = ?1 AND dispatched = 0",
                params![event_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetches one event by id.
pub async fn get(db: &Database, event_id: &str) -> Result<Option<OutboxEvent>, MedspaError> {
    use rusqlite::OptionalExtension;

    let event_id = event_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, event_type, payload, dispatched, created_at, dispatched_at
                 FROM outbox_events WHERE id = ?1",
                params![event_id],
                row_to_event,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Events of one type, oldest first.
pub async fn list_by_type(db: &Database, event_type: &str) -> Result<Vec<OutboxEvent>, MedspaError> {
    let event_type = event_type.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, event_type, payload, dispatched, created_at, dispatched_at
                 FROM outbox_events WHERE event_type = ?1 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![event_type], row_to_event)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn event(n: i64) -> OutboxEvent {
        let mut ev = OutboxEvent::new("payment_succeeded.v1", &json!({ "n": n })).unwrap();
        ev.created_at = Utc::now() + Duration::milliseconds(n);
        ev
    }

    #[tokio::test]
    async fn claim_leases_events_exclusively() {
        let (db, _dir) = setup_db().await;
        for n in 0..3 {
            append(&db, &event(n)).await.unwrap();
        }

        let now = Utc::now();
        let first = claim_undispatched(&db, 2, Duration::seconds(60), now)
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].payload["n"], 0);

        // Only the unleased event is visible to a second claimer.
        let second = claim_undispatched(&db, 10, Duration::seconds(60), now)
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].payload["n"], 2);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn dispatched_flips_exactly_once() {
        let (db, _dir) = setup_db().await;
        let ev = event(0);
        append(&db, &ev).await.unwrap();

        assert!(mark_dispatched(&db, &ev.id, Utc::now()).await.unwrap());
        assert!(!mark_dispatched(&db, &ev.id, Utc::now()).await.unwrap());

        let stored = get(&db, &ev.id).await.unwrap().unwrap();
        assert!(stored.dispatched);
        assert!(stored.dispatched_at.is_some());

        let later = Utc::now() + Duration::hours(1);
        let claimed = claim_undispatched(&db, 10, Duration::seconds(60), later)
            .await
            .unwrap();
        assert!(claimed.is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimable_after_crash() {
        let (db, _dir) = setup_db().await;
        let ev = event(0);
        append(&db, &ev).await.unwrap();

        let now = Utc::now();
        let claimed = claim_undispatched(&db, 10, Duration::seconds(30), now)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);

        // Deliverer died without marking; within the lease nothing is visible.
        let during = now + Duration::seconds(10);
        assert!(
            claim_undispatched(&db, 10, Duration::seconds(30), during)
                .await
                .unwrap()
                .is_empty()
        );

        let after = now + Duration::seconds(31);
        let reclaimed = claim_undispatched(&db, 10, Duration::seconds(30), after)
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, ev.id);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn released_claim_is_visible_immediately() {
        let (db, _dir) = setup_db().await;
        let ev = event(0);
        append(&db, &ev).await.unwrap();

        let now = Utc::now();
        claim_undispatched(&db, 10, Duration::seconds(60), now)
            .await
            .unwrap();
        release_claim(&db, &ev.id).await.unwrap();

        let again = claim_undispatched(&db, 10, Duration::seconds(60), now)
            .await
            .unwrap();
        assert_eq!(again.len(), 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn insert_rolls_back_with_business_write() {
        let (db, _dir) = setup_db().await;
        let ev = event(0);
        let id = ev.id.clone();

        db.connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                insert(&tx, &ev)?;
                // Dropping without commit rolls back.
                drop(tx);
                Ok(())
            })
            .await
            .unwrap();

        assert!(get(&db, &id).await.unwrap().is_none());
        db.close().await.unwrap();
    }
}
