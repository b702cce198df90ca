// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the pipeline, its stores, and its collaborators.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Inbound/outbound conversation channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Channel {
    Sms,
    Voice,
    Webchat,
    Instagram,
}

/// Lifecycle of a tracked job. `Completed` and `Failed` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Persisted job metadata, owned by the job store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub org_id: String,
    pub conversation_id: String,
    pub channel: Channel,
    /// Payload kind the job was created for (`start`, `message`, ...).
    pub kind: String,
    pub status: JobStatus,
    pub attempt: u32,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// A freshly published job, not yet picked up by any worker.
    pub fn pending(
        job_id: impl Into<String>,
        org_id: impl Into<String>,
        conversation_id: impl Into<String>,
        channel: Channel,
        kind: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            org_id: org_id.into(),
            conversation_id: conversation_id.into(),
            channel,
            kind: kind.into(),
            status: JobStatus::Pending,
            attempt: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Conversation progress as seen by the clinic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    AwaitingQualification,
    AwaitingTimeSelection,
    AwaitingPayment,
    Completed,
    OptedOut,
}

/// Lead qualification collected across turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationState {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub patient_type: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub schedule_preference: Option<String>,
}

impl QualificationState {
    /// True once every field required before booking or payment is present.
    pub fn is_complete(&self) -> bool {
        [
            &self.name,
            &self.service,
            &self.patient_type,
            &self.contact,
            &self.schedule_preference,
        ]
        .iter()
        .all(|f| f.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }
}

/// An inbound conversation turn (or conversation start) handed to the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationRequest {
    pub org_id: String,
    pub lead_id: String,
    pub conversation_id: String,
    /// Patient address (phone number, handle, session id).
    pub from: String,
    /// Clinic address the patient wrote to.
    pub to: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub provider_message_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Deposit the service asks for once qualification completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositIntent {
    pub amount_cents: i64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Reply drafted by the conversation service for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceReply {
    pub message: String,
    #[serde(default)]
    pub qualification: QualificationState,
    #[serde(default)]
    pub deposit_intent: Option<DepositIntent>,
    /// The reply offers concrete appointment times.
    #[serde(default)]
    pub time_selection_offered: bool,
    /// The patient picked a slot that can be confirmed without a deposit.
    #[serde(default)]
    pub confirmed_slot: Option<DateTime<Utc>>,
    /// The patient asked to stop receiving messages.
    #[serde(default)]
    pub opted_out: bool,
}

/// A reply ready for delivery through a channel messenger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundReply {
    pub org_id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub lead_id: Option<String>,
    pub channel: Channel,
    pub to: String,
    pub from: String,
    pub body: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Payment provider a clinic takes deposits through.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckoutProviderKind {
    Square,
    Stripe,
    #[default]
    Fake,
}

/// Provider-agnostic checkout link request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub org_id: uuid::Uuid,
    pub lead_id: uuid::Uuid,
    pub booking_intent_id: uuid::Uuid,
    pub amount_cents: i64,
    pub description: String,
}

/// Checkout link returned by a payment provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLink {
    pub url: String,
    pub provider_ref: Option<String>,
}

/// Per-clinic settings the pipeline reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicConfig {
    pub org_id: String,
    pub clinic_name: String,
    /// IANA timezone name used when showing appointment times.
    pub timezone: String,
    pub payment_provider: CheckoutProviderKind,
    pub deposit_amount_cents: i64,
    #[serde(default)]
    pub callback_window: Option<String>,
}

/// Lead context for a deposit dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositLead {
    pub org_id: String,
    pub lead_id: String,
    pub conversation_id: String,
    pub channel: Channel,
    /// Patient phone the link is sent to.
    pub to: String,
    /// Clinic number the link is sent from.
    pub from: String,
    pub service: Option<String>,
}

/// Deposit/checkout record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub org_id: String,
    pub lead_id: String,
    pub provider: CheckoutProviderKind,
    #[serde(default)]
    pub provider_ref: Option<String>,
    pub booking_intent_id: String,
    pub amount_cents: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Operator alert raised by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    LeadQualified {
        org_id: String,
        lead_id: String,
        conversation_id: String,
        service: Option<String>,
    },
    PaymentReceived {
        org_id: String,
        lead_id: String,
        amount_cents: i64,
        scheduled_for: Option<DateTime<Utc>>,
    },
    PaymentFailed {
        org_id: String,
        lead_id: String,
        reason: Option<String>,
    },
}

/// Who authored a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TranscriptRole {
    Patient,
    Assistant,
    System,
}

/// One line of conversation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub org_id: String,
    pub conversation_id: String,
    pub role: TranscriptRole,
    pub body: String,
}

/// One audit-log row.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub actor: String,
    pub event: String,
    pub org_id: String,
    pub conversation_id: String,
    pub detail: serde_json::Value,
}

/// Verdict returned by a reply reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SupervisorAction {
    Allow,
    Edit,
    Block,
}

/// Parsed reviewer response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorDecision {
    pub action: SupervisorAction,
    pub edited_text: Option<String>,
    pub reason: Option<String>,
}

impl SupervisorDecision {
    pub fn allow() -> Self {
        Self {
            action: SupervisorAction::Allow,
            edited_text: None,
            reason: None,
        }
    }
}

/// Draft reply plus the context a reviewer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    pub org_id: String,
    pub conversation_id: String,
    pub lead_id: String,
    pub user_message: String,
    pub draft: String,
}

/// Single-prompt completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
}

/// A message delivered by the queue to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Backend message id.
    pub id: String,
    /// Handle passed back to `ack`.
    pub receipt: String,
    /// Delivery count, starting at 1.
    pub attempt: u32,
    pub body: String,
}

/// Outcome of recording a provider event in the idempotency ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessedMark {
    Recorded,
    AlreadyProcessed,
}

/// Outcome of persisting a deposit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositRecord {
    Recorded,
    /// Another pending or paid deposit for the lead was committed first;
    /// nothing was written.
    AlreadyOpen,
}

/// A persisted outbound SMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub id: String,
    pub org_id: String,
    pub conversation_id: String,
    pub from: String,
    pub to: String,
    pub body: String,
    pub status: String,
    pub send_attempts: u32,
    pub provider_message_id: Option<String>,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Request handed to an SMS provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsRequest {
    pub from: String,
    pub to: String,
    pub body: String,
}

/// Provider acknowledgement of an accepted SMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsSendResult {
    pub provider_message_id: String,
    pub status: Option<String>,
}

/// A hosted-number provisioning order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedOrder {
    pub id: String,
    pub clinic_id: String,
    pub e164_number: String,
    pub provider_order_id: String,
    pub status: String,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl HostedOrder {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "activated" | "failed")
    }
}

/// Provider view of a hosted-number order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedOrderStatus {
    pub status: String,
    pub last_error: Option<String>,
}

/// Conversation id used for phone-based channels: `sms:{org}:{digits}`.
pub fn sms_conversation_id(org_id: &str, phone: &str) -> String {
    format!("sms:{org_id}:{}", digits_only(phone))
}

/// Strips everything but ASCII digits from a phone number.
pub fn digits_only(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}
