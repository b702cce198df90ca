// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-clinic settings.

use medspa_core::MedspaError;
use medspa_core::types::ClinicConfig;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err, parse_enum};

pub async fn get(db: &Database, org_id: &str) -> Result<Option<ClinicConfig>, MedspaError> {
    let org_id = org_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT org_id, clinic_name, timezone, payment_provider, deposit_amount_cents,
                        callback_window
                 FROM clinics WHERE org_id = ?1",
                params![org_id],
                |row| {
                    let provider: String = row.get(3)?;
                    Ok(ClinicConfig {
                        org_id: row.get(0)?,
                        clinic_name: row.get(1)?,
                        timezone: row.get(2)?,
                        payment_provider: parse_enum(3, &provider)?,
                        deposit_amount_cents: row.get(4)?,
                        callback_window: row.get(5)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert(db: &Database, clinic: &ClinicConfig) -> Result<(), MedspaError> {
    let clinic = clinic.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO clinics (org_id, clinic_name, timezone, payment_provider,
                    deposit_amount_cents, callback_window)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (org_id) DO UPDATE SET
                    clinic_name = excluded.clinic_name,
                    timezone = excluded.timezone,
                    payment_provider = excluded.payment_provider,
                    deposit_amount_cents = excluded.deposit_amount_cents,
                    callback_window = excluded.callback_window",
                params![
                    clinic.org_id,
                    clinic.clinic_name,
                    clinic.timezone,
                    clinic.payment_provider.to_string(),
                    clinic.deposit_amount_cents,
                    clinic.callback_window,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
