// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hosted-number provisioning orders.

use medspa_core::MedspaError;
use medspa_core::types::HostedOrder;
use rusqlite::params;

use crate::database::{Database, map_tr_err, req_ts, ts};

/// Orders not yet activated or failed, least recently updated first.
pub async fn list_pending(db: &Database, limit: usize) -> Result<Vec<HostedOrder>, MedspaError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, clinic_id, e164_number, provider_order_id, status, last_error, updated_at
                 FROM hosted_number_orders
                 WHERE status NOT IN ('activated', 'failed')
                 ORDER BY updated_at ASC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| {
                Ok(HostedOrder {
                    id: row.get(0)?,
                    clinic_id: row.get(1)?,
                    e164_number: row.get(2)?,
                    provider_order_id: row.get(3)?,
                    status: row.get(4)?,
                    last_error: row.get(5)?,
                    updated_at: req_ts(row, 6)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Inserts or updates by (clinic_id, e164_number).
pub async fn upsert(db: &Database, order: &HostedOrder) -> Result<(), MedspaError> {
    let order = order.clone();
    db.connection()
        .call(move |conn| {
            let updated = ts(order.updated_at);
            conn.execute(
                "INSERT INTO hosted_number_orders (id, clinic_id, e164_number, provider_order_id,
                    status, last_error, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT (clinic_id, e164_number) DO UPDATE SET
                    provider_order_id = excluded.provider_order_id,
                    status = excluded.status,
                    last_error = excluded.last_error,
                    updated_at = excluded.updated_at",
                params![
                    order.id,
                    order.clinic_id,
                    order.e164_number,
                    order.provider_order_id,
                    order.status,
                    order.last_error,
                    updated,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn order(number: &str, status: &str, age_mins: i64) -> HostedOrder {
        HostedOrder {
            id: format!("ord-{number}"),
            clinic_id: "clinic-1".into(),
            e164_number: number.into(),
            provider_order_id: format!("tx-{number}"),
            status: status.into(),
            last_error: None,
            updated_at: Utc::now() - Duration::minutes(age_mins),
        }
    }

    #[tokio::test]
    async fn pending_orders_exclude_terminal_and_upsert_updates() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();

        upsert(&db, &order("+15550000001", "pending", 5)).await.unwrap();
        upsert(&db, &order("+15550000002", "carrier_rejected", 30)).await.unwrap();
        upsert(&db, &order("+15550000003", "activated", 60)).await.unwrap();

        let pending = list_pending(&db, 10).await.unwrap();
        let numbers: Vec<_> = pending.iter().map(|o| o.e164_number.as_str()).collect();
        assert_eq!(numbers, vec!["+15550000002", "+15550000001"]);

        let mut done = order("+15550000001", "activated", 0);
        done.id = "ignored-on-conflict".into();
        upsert(&db, &done).await.unwrap();
        let pending = list_pending(&db, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        db.close().await.unwrap();
    }
}
