// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging provider and delivery-state traits used by the background workers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MedspaError;
use crate::types::{
    HostedOrder, HostedOrderStatus, OutboundMessage, SmsRequest, SmsSendResult,
};

/// Sends one SMS through a provider.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, request: &SmsRequest) -> Result<SmsSendResult, MedspaError>;
}

/// Reads hosted-number order status from a provider.
#[async_trait]
pub trait HostedOrderClient: Send + Sync {
    async fn get_hosted_order(
        &self,
        provider_order_id: &str,
    ) -> Result<HostedOrderStatus, MedspaError>;
}

/// Persisted outbound SMS state.
#[async_trait]
pub trait OutboundMessageStore: Send + Sync {
    /// Persists a message in `pending` state before the first send.
    async fn insert_outbound(&self, message: &OutboundMessage) -> Result<(), MedspaError>;

    /// Failed or retry-pending messages that are due and below `max_attempts`.
    async fn list_retry_candidates(
        &self,
        limit: usize,
        max_attempts: u32,
    ) -> Result<Vec<OutboundMessage>, MedspaError>;

    /// Records an accepted send and clears any scheduled retry.
    async fn record_sent(
        &self,
        id: &str,
        provider_message_id: &str,
        status: &str,
    ) -> Result<(), MedspaError>;

    /// Records a failed first send (one attempt used).
    async fn record_send_failure(&self, id: &str, reason: &str) -> Result<(), MedspaError>;

    /// Counts an attempt and schedules the next one.
    async fn schedule_retry(
        &self,
        id: &str,
        next_retry_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), MedspaError>;

    /// Counts the final attempt and stops retrying.
    async fn mark_permanently_failed(&self, id: &str, reason: &str) -> Result<(), MedspaError>;
}

/// Persisted hosted-number orders.
#[async_trait]
pub trait HostedOrderStore: Send + Sync {
    /// Non-terminal orders, least recently updated first.
    async fn list_pending_hosted_orders(
        &self,
        limit: usize,
    ) -> Result<Vec<HostedOrder>, MedspaError>;

    /// Inserts or updates by (clinic_id, e164_number).
    async fn upsert_hosted_order(&self, order: &HostedOrder) -> Result<(), MedspaError>;
}
