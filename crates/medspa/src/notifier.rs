// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator notifications written to the structured log.

use async_trait::async_trait;
use tracing::info;

use medspa_core::types::Notification;
use medspa_core::{MedspaError, Notifier};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), MedspaError> {
        match notification {
            Notification::LeadQualified {
                org_id,
                lead_id,
                conversation_id,
                service,
            } => info!(
                target: "medspa::operator",
                org_id,
                lead_id,
                conversation_id,
                service = service.as_deref().unwrap_or("unspecified"),
                "lead qualified"
            ),
            Notification::PaymentReceived {
                org_id,
                lead_id,
                amount_cents,
                scheduled_for,
            } => info!(
                target: "medspa::operator",
                org_id,
                lead_id,
                amount_cents,
                scheduled_for = ?scheduled_for,
                "deposit received"
            ),
            Notification::PaymentFailed {
                org_id,
                lead_id,
                reason,
            } => info!(
                target: "medspa::operator",
                org_id,
                lead_id,
                reason = reason.as_deref().unwrap_or("unknown"),
                "deposit failed"
            ),
        }
        Ok(())
    }
}
