// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deposit records and their transactional outbox writes.

use chrono::{DateTime, Utc};
use medspa_core::types::{DepositRecord, PaymentIntent};
use medspa_core::{MedspaError, OutboxEvent, ProcessedMark};
use rusqlite::{Connection, TransactionBehavior, params};

use crate::database::{Database, map_tr_err, parse_enum, req_ts, ts};
use crate::queries::{outbox, processed};

/// Statuses that block issuing another checkout link.
const OPEN_STATUSES: &str = "'deposit_pending', 'succeeded'";

fn row_to_intent(row: &rusqlite::Row<'_>) -> Result<PaymentIntent, rusqlite::Error> {
    let provider: String = row.get(3)?;
    Ok(PaymentIntent {
        id: row.get(0)?,
        org_id: row.get(1)?,
        lead_id: row.get(2)?,
        provider: parse_enum(3, &provider)?,
        provider_ref: row.get(4)?,
        booking_intent_id: row.get(5)?,
        amount_cents: row.get(6)?,
        status: row.get(7)?,
        created_at: req_ts(row, 8)?,
    })
}

fn open_deposit_exists(
    conn: &Connection,
    org_id: &str,
    lead_id: &str,
) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM payment_intents
             WHERE org_id = ?1 AND lead_id = ?2 AND status IN ({OPEN_STATUSES})"
        ),
        params![org_id, lead_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub async fn has_open_deposit(
    db: &Database,
    org_id: &str,
    lead_id: &str,
) -> Result<bool, MedspaError> {
    let org_id = org_id.to_string();
    let lead_id = lead_id.to_string();
    db.connection()
        .call(move |conn| open_deposit_exists(conn, &org_id, &lead_id))
        .await
        .map_err(map_tr_err)
}

/// Inserts the deposit and its outbox events atomically, unless the lead
/// already has an open deposit.
pub async fn record_deposit_request(
    db: &Database,
    intent: &PaymentIntent,
    events: &[OutboxEvent],
) -> Result<DepositRecord, MedspaError> {
    let intent = intent.clone();
    let events = events.to_vec();
    db.connection()
        .call(move |conn| {
            // IMMEDIATE holds the write lock across the check and the insert.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if open_deposit_exists(&tx, &intent.org_id, &intent.lead_id)? {
                return Ok(DepositRecord::AlreadyOpen);
            }
            let created = ts(intent.created_at);
            tx.execute(
                "INSERT INTO payment_intents (id, org_id, lead_id, provider, provider_ref,
                    booking_intent_id, amount_cents, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    intent.id,
                    intent.org_id,
                    intent.lead_id,
                    intent.provider.to_string(),
                    intent.provider_ref,
                    intent.booking_intent_id,
                    intent.amount_cents,
                    intent.status,
                    created,
                ],
            )?;
            for event in &events {
                outbox::insert(&tx, event)?;
            }
            tx.commit()?;
            Ok(DepositRecord::Recorded)
        })
        .await
        .map_err(map_tr_err)
}

/// Applies a payment webhook once: ledger row, deposit status, outbox event.
pub async fn apply_payment_outcome(
    db: &Database,
    provider: &str,
    event_key: &str,
    booking_intent_id: Option<&str>,
    status: &str,
    event: &OutboxEvent,
    now: DateTime<Utc>,
) -> Result<ProcessedMark, MedspaError> {
    let key = processed::ledger_key(provider, event_key)?;
    let provider = provider.to_string();
    let event_key = event_key.to_string();
    let booking_intent_id = booking_intent_id.map(str::to_string);
    let status = status.to_string();
    let event = event.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            if !processed::mark_in_tx(&tx, &key, &provider, &event_key, now)? {
                // Duplicate delivery; dropping the transaction discards nothing.
                return Ok(ProcessedMark::AlreadyProcessed);
            }
            if let Some(bi) = &booking_intent_id {
                tx.execute(
                    "UPDATE payment_intents SET status = ?2, updated_at = ?3
                     WHERE booking_intent_id = ?1",
                    params![bi, status, ts(now)],
                )?;
            }
            outbox::insert(&tx, &event)?;
            tx.commit()?;
            Ok(ProcessedMark::Recorded)
        })
        .await
        .map_err(map_tr_err)
}

/// Deposits for one lead, oldest first.
pub async fn list_for_lead(
    db: &Database,
    org_id: &str,
    lead_id: &str,
) -> Result<Vec<PaymentIntent>, MedspaError> {
    let org_id = org_id.to_string();
    let lead_id = lead_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, org_id, lead_id, provider, provider_ref, booking_intent_id,
                        amount_cents, status, created_at
                 FROM payment_intents WHERE org_id = ?1 AND lead_id = ?2
                 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![org_id, lead_id], row_to_intent)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use medspa_core::types::CheckoutProviderKind;
    use serde_json::json;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        (db, dir)
    }

    fn intent() -> PaymentIntent {
        PaymentIntent {
            id: "pi-1".into(),
            org_id: "org".into(),
            lead_id: "lead".into(),
            provider: CheckoutProviderKind::Stripe,
            provider_ref: None,
            booking_intent_id: "bi-1".into(),
            amount_cents: 5000,
            status: "deposit_pending".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn deposit_and_events_commit_together() {
        let (db, _dir) = setup_db().await;
        assert!(!has_open_deposit(&db, "org", "lead").await.unwrap());

        let events = vec![
            OutboxEvent::new("conversation.reply.requested.v1", &json!({"body": "pay"})).unwrap(),
            OutboxEvent::new("payments.deposit.requested.v1", &json!({"amount": 5000})).unwrap(),
        ];
        assert_eq!(
            record_deposit_request(&db, &intent(), &events).await.unwrap(),
            DepositRecord::Recorded
        );

        assert!(has_open_deposit(&db, "org", "lead").await.unwrap());
        let deposits = list_for_lead(&db, "org", "lead").await.unwrap();
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits[0].provider, CheckoutProviderKind::Stripe);
        for ev in &events {
            assert!(outbox::get(&db, &ev.id).await.unwrap().is_some());
        }
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_deposit_write_leaves_no_events() {
        let (db, _dir) = setup_db().await;
        record_deposit_request(&db, &intent(), &[]).await.unwrap();

        // Same booking intent violates the unique constraint; the event must roll back.
        let mut dup = intent();
        dup.id = "pi-2".into();
        dup.lead_id = "other-lead".into();
        let ev = OutboxEvent::new("payments.deposit.requested.v1", &json!({})).unwrap();
        assert!(record_deposit_request(&db, &dup, std::slice::from_ref(&ev)).await.is_err());
        assert!(outbox::get(&db, &ev.id).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn second_open_deposit_for_lead_writes_nothing() {
        let (db, _dir) = setup_db().await;
        record_deposit_request(&db, &intent(), &[]).await.unwrap();

        let mut second = intent();
        second.id = "pi-2".into();
        second.booking_intent_id = "bi-2".into();
        let ev = OutboxEvent::new("conversation.reply.requested.v1", &json!({})).unwrap();
        let record = record_deposit_request(&db, &second, std::slice::from_ref(&ev))
            .await
            .unwrap();

        assert_eq!(record, DepositRecord::AlreadyOpen);
        assert!(outbox::get(&db, &ev.id).await.unwrap().is_none());
        assert_eq!(list_for_lead(&db, "org", "lead").await.unwrap().len(), 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_deposit_allows_a_new_one() {
        let (db, _dir) = setup_db().await;
        let mut failed = intent();
        failed.status = "failed".into();
        record_deposit_request(&db, &failed, &[]).await.unwrap();

        let mut retry = intent();
        retry.id = "pi-2".into();
        retry.booking_intent_id = "bi-2".into();
        assert_eq!(
            record_deposit_request(&db, &retry, &[]).await.unwrap(),
            DepositRecord::Recorded
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_webhook_applies_once() {
        let (db, _dir) = setup_db().await;
        record_deposit_request(&db, &intent(), &[]).await.unwrap();

        let first_ev = OutboxEvent::new("payment_succeeded.v1", &json!({"n": 1})).unwrap();
        let second_ev = OutboxEvent::new("payment_succeeded.v1", &json!({"n": 2})).unwrap();

        let first = apply_payment_outcome(
            &db, "conversation.payment_succeeded.v1", "pi_ref", Some("bi-1"), "succeeded",
            &first_ev, Utc::now(),
        )
        .await
        .unwrap();
        let second = apply_payment_outcome(
            &db, "conversation.payment_succeeded.v1", "pi_ref", Some("bi-1"), "succeeded",
            &second_ev, Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(first, ProcessedMark::Recorded);
        assert_eq!(second, ProcessedMark::AlreadyProcessed);
        assert_eq!(
            outbox::list_by_type(&db, "payment_succeeded.v1").await.unwrap().len(),
            1
        );
        let deposits = list_for_lead(&db, "org", "lead").await.unwrap();
        assert_eq!(deposits[0].status, "succeeded");
        db.close().await.unwrap();
    }
}
