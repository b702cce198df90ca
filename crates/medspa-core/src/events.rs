// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbox event payloads and the queue envelope.
//!
//! Payment and messaging facts are persisted as versioned JSON events in the
//! outbox, then republished as conversation jobs. The queue itself only ever
//! carries a [`QueueEnvelope`]: job identity plus payload, never job state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MedspaError;
use crate::types::{Channel, CheckoutProviderKind, ConversationRequest};

pub const PAYMENT_SUCCEEDED_V1: &str = "payment_succeeded.v1";
pub const PAYMENT_FAILED_V1: &str = "payment_failed.v1";
pub const REPLY_REQUESTED_V1: &str = "conversation.reply.requested.v1";
pub const MESSAGE_RECEIVED_V1: &str = "messaging.message.received.v1";
pub const DEPOSIT_REQUESTED_V1: &str = "payments.deposit.requested.v1";

/// A deposit was paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSucceededV1 {
    pub event_id: String,
    pub org_id: String,
    pub lead_id: String,
    #[serde(default)]
    pub booking_intent_id: Option<String>,
    pub provider: CheckoutProviderKind,
    #[serde(default)]
    pub provider_ref: Option<String>,
    pub amount_cents: i64,
    pub lead_phone: String,
    pub from_number: String,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// A deposit attempt failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailedV1 {
    pub event_id: String,
    pub org_id: String,
    pub lead_id: String,
    #[serde(default)]
    pub booking_intent_id: Option<String>,
    pub provider: CheckoutProviderKind,
    #[serde(default)]
    pub provider_ref: Option<String>,
    pub lead_phone: String,
    pub from_number: String,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Dedupe key shared by payment events: provider ref, then booking intent, then event id.
fn payment_idempotency_key<'a>(
    provider_ref: &'a Option<String>,
    booking_intent_id: &'a Option<String>,
    event_id: &'a str,
) -> &'a str {
    [provider_ref.as_deref(), booking_intent_id.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or(event_id)
}

impl PaymentSucceededV1 {
    pub fn idempotency_key(&self) -> &str {
        payment_idempotency_key(&self.provider_ref, &self.booking_intent_id, &self.event_id)
    }
}

impl PaymentFailedV1 {
    pub fn idempotency_key(&self) -> &str {
        payment_idempotency_key(&self.provider_ref, &self.booking_intent_id, &self.event_id)
    }
}

/// A prepared reply that must be delivered verbatim (deposit links).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRequestedV1 {
    pub event_id: String,
    pub org_id: String,
    #[serde(default)]
    pub lead_id: Option<String>,
    pub conversation_id: String,
    pub channel: Channel,
    pub to: String,
    pub from: String,
    pub body: String,
    pub requested_at: DateTime<Utc>,
}

/// A checkout link was issued for a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRequestedV1 {
    pub event_id: String,
    pub org_id: String,
    pub lead_id: String,
    pub booking_intent_id: String,
    pub provider: CheckoutProviderKind,
    pub amount_cents: i64,
    pub checkout_url: String,
    pub requested_at: DateTime<Utc>,
}

/// An inbound message was accepted from the messaging provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReceivedV1 {
    pub event_id: String,
    pub org_id: String,
    pub conversation_id: String,
    pub from: String,
    pub to: String,
    pub body: String,
    pub provider_message_id: String,
    pub received_at: DateTime<Utc>,
}

/// Persisted outbox row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub dispatched: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// Builds an undispatched event with a fresh id.
    pub fn new(event_type: &str, payload: &impl Serialize) -> Result<Self, MedspaError> {
        let payload = serde_json::to_value(payload).map_err(MedspaError::storage)?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            payload,
            dispatched: false,
            created_at: Utc::now(),
            dispatched_at: None,
        })
    }

    /// Decodes the payload into a typed event.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, MedspaError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            MedspaError::Validation(format!(
                "outbox event {} ({}) has malformed payload: {e}",
                self.id, self.event_type
            ))
        })
    }
}

/// Work carried by a conversation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum JobPayload {
    #[serde(rename = "start")]
    Start(ConversationRequest),
    #[serde(rename = "message")]
    Message(ConversationRequest),
    #[serde(rename = "payment_succeeded.v1")]
    PaymentSucceeded(PaymentSucceededV1),
    #[serde(rename = "payment_failed.v1")]
    PaymentFailed(PaymentFailedV1),
    #[serde(rename = "reply")]
    Reply(ReplyRequestedV1),
}

impl JobPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            JobPayload::Start(_) => "start",
            JobPayload::Message(_) => "message",
            JobPayload::PaymentSucceeded(_) => PAYMENT_SUCCEEDED_V1,
            JobPayload::PaymentFailed(_) => PAYMENT_FAILED_V1,
            JobPayload::Reply(_) => "reply",
        }
    }
}

/// The body placed on the queue for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEnvelope {
    pub job_id: String,
    pub org_id: String,
    pub conversation_id: String,
    pub channel: Channel,
    pub payload: JobPayload,
    pub enqueued_at: DateTime<Utc>,
    /// False when the publisher skipped the job store write.
    #[serde(default = "default_track_status")]
    pub track_status: bool,
}

fn default_track_status() -> bool {
    true
}

impl QueueEnvelope {
    pub fn encode(&self) -> Result<String, MedspaError> {
        serde_json::to_string(self).map_err(|e| MedspaError::queue(format!("encode envelope: {e}"), None))
    }

    pub fn decode(body: &str) -> Result<Self, MedspaError> {
        serde_json::from_str(body)
            .map_err(|e| MedspaError::Validation(format!("malformed queue envelope: {e}")))
    }
}
