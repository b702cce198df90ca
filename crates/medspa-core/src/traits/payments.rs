// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deposit, booking, and operator-notification collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MedspaError;
use crate::events::OutboxEvent;
use crate::types::{
    CheckoutLink, CheckoutProviderKind, CheckoutRequest, DepositRecord, Notification,
    PaymentIntent, ProcessedMark,
};

/// Answers whether a lead already has a pending or paid deposit.
#[async_trait]
pub trait PaymentStatusChecker: Send + Sync {
    async fn has_open_deposit(
        &self,
        org_id: &uuid::Uuid,
        lead_id: &uuid::Uuid,
    ) -> Result<bool, MedspaError>;
}

/// Transactional payment writes. Each call is one atomic transaction.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Persists a new deposit together with the outbox events announcing it.
    ///
    /// The open-deposit check is repeated under the write lock, so of two
    /// concurrent requests for the same lead only one is recorded; the other
    /// returns [`DepositRecord::AlreadyOpen`] and writes nothing.
    async fn record_deposit_request(
        &self,
        intent: &PaymentIntent,
        events: &[OutboxEvent],
    ) -> Result<DepositRecord, MedspaError>;

    /// Applies a provider payment webhook: marks `(provider, event_key)` processed,
    /// moves the matching deposit to `status`, and writes `event` to the outbox.
    /// A duplicate key changes nothing and returns [`ProcessedMark::AlreadyProcessed`].
    async fn apply_payment_outcome(
        &self,
        provider: &str,
        event_key: &str,
        booking_intent_id: Option<&str>,
        status: &str,
        event: &OutboxEvent,
    ) -> Result<ProcessedMark, MedspaError>;
}

/// A payment provider able to mint hosted checkout links.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    fn kind(&self) -> CheckoutProviderKind;

    async fn create_checkout(&self, request: &CheckoutRequest)
    -> Result<CheckoutLink, MedspaError>;
}

/// Wraps long checkout URLs.
#[async_trait]
pub trait UrlShortener: Send + Sync {
    async fn shorten(&self, url: &str) -> Result<String, MedspaError>;
}

/// Clinic booking system.
#[async_trait]
pub trait BookingAdapter: Send + Sync {
    async fn confirm_booking(
        &self,
        org_id: &str,
        lead_id: &str,
        scheduled_for: DateTime<Utc>,
    ) -> Result<(), MedspaError>;
}

/// Operator email/SMS alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), MedspaError>;
}

/// Sandbox-only cleanup of demo conversations.
#[async_trait]
pub trait SandboxPurger: Send + Sync {
    async fn schedule_purge(
        &self,
        org_id: &str,
        conversation_id: &str,
        phone: &str,
    ) -> Result<(), MedspaError>;
}
