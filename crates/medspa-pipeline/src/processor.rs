// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-job state machine.
//!
//! received -> context loaded -> service invoked -> supervisor review ->
//! side effects -> reply sent -> finalized. Everything a job does happens
//! inside [`JobProcessor::handle`]; errors and panics stop at that boundary.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{Instrument, debug, error, info, info_span, warn};

use medspa_core::events::{JobPayload, PaymentFailedV1, PaymentSucceededV1, ReplyRequestedV1};
use medspa_core::types::{
    ClinicConfig, ConversationRequest, DepositLead, Notification, OutboundReply, QueueMessage,
    ReviewRequest, ServiceReply, TranscriptEntry, TranscriptRole,
};
use medspa_core::{
    Channel, ConversationService, ConversationStatus, ConversationStore, JobStore, MedspaError,
    ProcessedStore, QueueEnvelope,
};

use crate::capabilities::Capabilities;
use crate::deposit::DepositOutcome;
use crate::guard::{OutputScan, scan_output};
use crate::messengers::MessengerRegistry;
use crate::payment::{PAYMENT_FAILED_TEXT, payment_confirmation_text};
use crate::supervisor::{GateResult, SUPERVISOR_FALLBACK_REPLY};
use crate::{
    JOB_LEDGER_PROVIDER, PAYMENT_FAILED_LEDGER_PROVIDER, PAYMENT_SUCCEEDED_LEDGER_PROVIDER,
    REPLY_LEDGER_PROVIDER, metrics,
};

/// Reply sent when a message job fails.
pub const FALLBACK_REPLY: &str =
    "Sorry - I'm having trouble responding right now. Please reply again in a moment.";

/// How a job ended. Every outcome except [`JobOutcome::Deferred`] is acked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Already handled by an earlier delivery.
    Duplicate,
    Failed(String),
    /// The body was not a valid envelope.
    Dropped,
    /// Infrastructure was unavailable before any side effect ran; leave the
    /// message for redelivery.
    Deferred(String),
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Duplicate => "duplicate",
            JobOutcome::Failed(_) => "failed",
            JobOutcome::Dropped => "dropped",
            JobOutcome::Deferred(_) => "deferred",
        }
    }

    pub fn should_ack(&self) -> bool {
        !matches!(self, JobOutcome::Deferred(_))
    }
}

enum Turn {
    Start,
    Message,
}

/// Executes queued conversation jobs.
///
/// One processor is shared by every worker in a pool. For each message it
/// decodes the envelope, skips jobs that already reached a terminal state,
/// then dispatches on the payload:
///
/// - start and message turns call the conversation service, pass the draft
///   through the supervisor gate and the output guard, run side effects
///   (notify, deposit, booking, purge) and send the reply;
/// - payment outcomes send the confirmation or failure text, and a
///   confirmed payment completes the conversation;
/// - prepared replies from the outbox are sent as is.
///
/// Tracked jobs have their status recorded in the [`JobStore`]. Untracked
/// jobs are deduplicated through the [`ProcessedStore`] ledger instead.
#[derive(Clone)]
pub struct JobProcessor {
    jobs: Arc<dyn JobStore>,
    processed: Arc<dyn ProcessedStore>,
    conversations: Arc<dyn ConversationStore>,
    service: Arc<dyn ConversationService>,
    messengers: MessengerRegistry,
    caps: Capabilities,
}

impl JobProcessor {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        processed: Arc<dyn ProcessedStore>,
        conversations: Arc<dyn ConversationStore>,
        service: Arc<dyn ConversationService>,
        messengers: MessengerRegistry,
        caps: Capabilities,
    ) -> Self {
        Self {
            jobs,
            processed,
            conversations,
            service,
            messengers,
            caps,
        }
    }

    /// Optional collaborators this processor was built with.
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Runs one delivered message to completion. Never panics and never
    /// returns an error; the outcome tells the caller whether to ack.
    pub async fn handle(&self, message: &QueueMessage) -> JobOutcome {
        let started = Instant::now();
        let envelope = match QueueEnvelope::decode(&message.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "dropping malformed queue message");
                metrics::record_job("dropped", started.elapsed().as_secs_f64());
                return JobOutcome::Dropped;
            }
        };

        let span = info_span!(
            "job",
            job_id = %envelope.job_id,
            kind = envelope.payload.kind(),
            conversation_id = %envelope.conversation_id,
            attempt = message.attempt,
        );
        let outcome = self.handle_envelope(&envelope, message.attempt).instrument(span).await;
        metrics::record_job(outcome.label(), started.elapsed().as_secs_f64());
        outcome
    }

    async fn handle_envelope(&self, envelope: &QueueEnvelope, attempt: u32) -> JobOutcome {
        match self.already_handled(envelope).await {
            Ok(true) => {
                debug!("job already handled, skipping redelivery");
                return JobOutcome::Duplicate;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "duplicate check unavailable, deferring job");
                return JobOutcome::Deferred(e.to_string());
            }
        }

        if envelope.track_status {
            match self.jobs.mark_processing(&envelope.job_id, attempt).await {
                Ok(()) => {}
                Err(MedspaError::InvalidTransition { .. }) => return JobOutcome::Duplicate,
                Err(e) => warn!(error = %e, "could not mark job processing"),
            }
        }

        let result = AssertUnwindSafe(self.run(envelope))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(MedspaError::Internal(format!(
                    "job panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        match result {
            Ok(summary) => {
                if let Err(e) = self
                    .processed
                    .mark_processed(JOB_LEDGER_PROVIDER, &envelope.job_id)
                    .await
                {
                    warn!(error = %e, "failed to record job in ledger");
                }
                if envelope.track_status
                    && let Err(e) = self
                        .jobs
                        .mark_completed(&envelope.job_id, summary.as_deref())
                        .await
                {
                    warn!(error = %e, "failed to mark job completed");
                }
                info!("job completed");
                JobOutcome::Completed
            }
            Err(e) => {
                let reason = e.to_string();
                error!(error = %reason, "job failed");
                if let JobPayload::Message(request) = &envelope.payload {
                    self.send_fallback(envelope, request).await;
                }
                if envelope.track_status
                    && let Err(mark_err) = self.jobs.mark_failed(&envelope.job_id, &reason).await
                {
                    warn!(error = %mark_err, "failed to mark job failed");
                }
                JobOutcome::Failed(reason)
            }
        }
    }

    /// A tracked job in a terminal state, or a job id in the ledger, was
    /// already handled.
    async fn already_handled(&self, envelope: &QueueEnvelope) -> Result<bool, MedspaError> {
        if envelope.track_status
            && let Some(job) = self.jobs.get(&envelope.job_id).await?
            && job.status.is_terminal()
        {
            return Ok(true);
        }
        self.processed
            .already_processed(JOB_LEDGER_PROVIDER, &envelope.job_id)
            .await
    }

    async fn run(&self, envelope: &QueueEnvelope) -> Result<Option<String>, MedspaError> {
        match &envelope.payload {
            JobPayload::Start(request) => self.converse(envelope, request, Turn::Start).await,
            JobPayload::Message(request) => self.converse(envelope, request, Turn::Message).await,
            JobPayload::PaymentSucceeded(event) => self.payment_succeeded(envelope, event).await,
            JobPayload::PaymentFailed(event) => self.payment_failed(envelope, event).await,
            JobPayload::Reply(reply) => self.prepared_reply(envelope, reply).await,
        }
    }

    async fn converse(
        &self,
        envelope: &QueueEnvelope,
        request: &ConversationRequest,
        turn: Turn,
    ) -> Result<Option<String>, MedspaError> {
        let org_id = &request.org_id;
        let conversation_id = &request.conversation_id;

        let prior = self.conversations.status(org_id, conversation_id).await?;
        if !request.message.trim().is_empty() {
            self.transcript(org_id, conversation_id, TranscriptRole::Patient, &request.message)
                .await;
        }
        if prior == Some(ConversationStatus::OptedOut) {
            info!("conversation opted out, reply suppressed");
            return Ok(None);
        }

        let reply = match turn {
            Turn::Start => self.service.start(request).await?,
            Turn::Message => self.service.process(request).await?,
        };

        if reply.opted_out {
            // The service's opt-out acknowledgement is the last message sent.
            if !reply.message.trim().is_empty() {
                self.send(reply_to(envelope, request, &reply.message)).await?;
                self.transcript(org_id, conversation_id, TranscriptRole::Assistant, &reply.message)
                    .await;
            }
            self.conversations
                .set_status(org_id, conversation_id, ConversationStatus::OptedOut)
                .await?;
            info!("patient opted out");
            return Ok(None);
        }

        let gated = match &self.caps.supervisor {
            Some(gate) => {
                gate.review(&ReviewRequest {
                    org_id: org_id.clone(),
                    conversation_id: conversation_id.clone(),
                    lead_id: request.lead_id.clone(),
                    user_message: request.message.clone(),
                    draft: reply.message.clone(),
                })
                .await
            }
            None => GateResult {
                text: reply.message.clone(),
                blocked: false,
                outcome: "unreviewed",
            },
        };
        let (text, withheld) = guard_output(conversation_id, gated.text);
        let blocked = gated.blocked || withheld;

        let deposit_pending = self
            .side_effects(envelope, request, &reply, prior, blocked)
            .await?;

        if !text.trim().is_empty() {
            self.send(reply_to(envelope, request, &text)).await?;
            self.transcript(org_id, conversation_id, TranscriptRole::Assistant, &text)
                .await;
        }

        let next = next_status(&reply, deposit_pending);
        self.conversations
            .set_status(org_id, conversation_id, next)
            .await?;
        debug!(status = %next, "conversation status updated");
        Ok(Some(text))
    }

    /// Runs notify, deposit, booking and purge in that order. Returns whether
    /// a deposit is now pending for the lead.
    ///
    /// When the draft was `blocked` (by the supervisor or the output guard)
    /// the patient never sees it, so the deposit link and booking it implied
    /// are skipped as well.
    async fn side_effects(
        &self,
        envelope: &QueueEnvelope,
        request: &ConversationRequest,
        reply: &ServiceReply,
        prior: Option<ConversationStatus>,
        blocked: bool,
    ) -> Result<bool, MedspaError> {
        let qualified = reply.qualification.is_complete();
        let already_qualified = matches!(
            prior,
            Some(
                ConversationStatus::AwaitingTimeSelection
                    | ConversationStatus::AwaitingPayment
                    | ConversationStatus::Completed
            )
        );

        if qualified
            && !already_qualified
            && let Some(notifier) = &self.caps.notifier
        {
            let notification = Notification::LeadQualified {
                org_id: request.org_id.clone(),
                lead_id: request.lead_id.clone(),
                conversation_id: request.conversation_id.clone(),
                service: reply.qualification.service.clone(),
            };
            if let Err(e) = notifier.notify(&notification).await {
                warn!(error = %e, "lead qualified notification failed");
            }
        }

        let mut deposit_pending = false;
        if blocked && (reply.deposit_intent.is_some() || reply.confirmed_slot.is_some()) {
            info!("reply withheld, deposit and booking skipped");
        } else if let Some(intent) = &reply.deposit_intent {
            match (&self.caps.deposits, qualified) {
                (Some(deposits), true) => {
                    let lead = DepositLead {
                        org_id: request.org_id.clone(),
                        lead_id: request.lead_id.clone(),
                        conversation_id: request.conversation_id.clone(),
                        channel: envelope.channel,
                        to: request.from.clone(),
                        from: request.to.clone(),
                        service: reply.qualification.service.clone(),
                    };
                    let outcome = deposits.dispatch(&lead, Some(intent.amount_cents)).await?;
                    deposit_pending = matches!(
                        outcome,
                        DepositOutcome::Requested { .. } | DepositOutcome::AlreadyOpen
                    );
                }
                (Some(_), false) => debug!("deposit intent before qualification completed, skipped"),
                (None, _) => debug!("deposit intent without a dispatcher, skipped"),
            }
        }

        if !blocked && let (Some(at), Some(booking)) = (reply.confirmed_slot, &self.caps.booking) {
            booking
                .confirm_booking(&request.org_id, &request.lead_id, at)
                .await?;
            info!(scheduled_for = %at, "booking confirmed");
        }

        if let Some(purger) = &self.caps.purger
            && let Err(e) = purger
                .schedule_purge(&request.org_id, &request.conversation_id, &request.from)
                .await
        {
            warn!(error = %e, "sandbox purge scheduling failed");
        }

        Ok(deposit_pending)
    }

    async fn payment_succeeded(
        &self,
        envelope: &QueueEnvelope,
        event: &PaymentSucceededV1,
    ) -> Result<Option<String>, MedspaError> {
        let key = event.idempotency_key();
        if self.ledger_seen(PAYMENT_SUCCEEDED_LEDGER_PROVIDER, key).await {
            info!(key, "skipping duplicate payment succeeded event");
            return Ok(None);
        }

        if let (Some(at), Some(booking)) = (event.scheduled_for, &self.caps.booking) {
            booking
                .confirm_booking(&event.org_id, &event.lead_id, at)
                .await?;
        }

        if let Some(notifier) = &self.caps.notifier {
            let notification = Notification::PaymentReceived {
                org_id: event.org_id.clone(),
                lead_id: event.lead_id.clone(),
                amount_cents: event.amount_cents,
                scheduled_for: event.scheduled_for,
            };
            if let Err(e) = notifier.notify(&notification).await {
                warn!(error = %e, "payment notification failed");
            }
        }

        let clinic = self.clinic(&event.org_id).await;
        let body = payment_confirmation_text(event, clinic.as_ref());
        let sent = self
            .payment_reply(
                envelope,
                &event.event_id,
                &event.lead_id,
                &event.lead_phone,
                &event.from_number,
                &body,
            )
            .await;

        if let Err(e) = self
            .conversations
            .set_status(&event.org_id, &envelope.conversation_id, ConversationStatus::Completed)
            .await
        {
            warn!(error = %e, "failed to mark conversation completed");
        }
        self.ledger_mark(PAYMENT_SUCCEEDED_LEDGER_PROVIDER, key).await;

        if let Some(purger) = &self.caps.purger
            && let Err(e) = purger
                .schedule_purge(&event.org_id, &envelope.conversation_id, &event.lead_phone)
                .await
        {
            warn!(error = %e, "sandbox purge scheduling failed");
        }
        Ok(sent.then_some(body))
    }

    async fn payment_failed(
        &self,
        envelope: &QueueEnvelope,
        event: &PaymentFailedV1,
    ) -> Result<Option<String>, MedspaError> {
        let key = event.idempotency_key();
        if self.ledger_seen(PAYMENT_FAILED_LEDGER_PROVIDER, key).await {
            info!(key, "skipping duplicate payment failed event");
            return Ok(None);
        }

        if let Some(notifier) = &self.caps.notifier {
            let notification = Notification::PaymentFailed {
                org_id: event.org_id.clone(),
                lead_id: event.lead_id.clone(),
                reason: event.failure_reason.clone(),
            };
            if let Err(e) = notifier.notify(&notification).await {
                warn!(error = %e, "payment failure notification failed");
            }
        }

        let sent = self
            .payment_reply(
                envelope,
                &event.event_id,
                &event.lead_id,
                &event.lead_phone,
                &event.from_number,
                PAYMENT_FAILED_TEXT,
            )
            .await;
        self.ledger_mark(PAYMENT_FAILED_LEDGER_PROVIDER, key).await;
        Ok(sent.then(|| PAYMENT_FAILED_TEXT.to_string()))
    }

    /// Sends a payment follow-up unless the patient opted out. Send failures
    /// are logged; the payment fact itself is already persisted.
    async fn payment_reply(
        &self,
        envelope: &QueueEnvelope,
        event_id: &str,
        lead_id: &str,
        to: &str,
        from: &str,
        body: &str,
    ) -> bool {
        if to.trim().is_empty() || from.trim().is_empty() {
            warn!("payment event has no phone numbers, no follow-up sent");
            return false;
        }
        if self.opted_out(envelope).await {
            info!("conversation opted out, payment follow-up suppressed");
            return false;
        }
        let reply = OutboundReply {
            org_id: envelope.org_id.clone(),
            conversation_id: envelope.conversation_id.clone(),
            lead_id: Some(lead_id.to_string()),
            channel: Channel::Sms,
            to: to.to_string(),
            from: from.to_string(),
            body: body.to_string(),
            metadata: BTreeMap::from([("event_id".to_string(), event_id.to_string())]),
        };
        let sent = match self.send(reply).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, event_id, "payment follow-up send failed");
                false
            }
        };
        self.transcript(
            &envelope.org_id,
            &envelope.conversation_id,
            TranscriptRole::Assistant,
            body,
        )
        .await;
        sent
    }

    /// Delivers a reply prepared elsewhere (deposit links) verbatim.
    async fn prepared_reply(
        &self,
        envelope: &QueueEnvelope,
        reply: &ReplyRequestedV1,
    ) -> Result<Option<String>, MedspaError> {
        if self.ledger_seen(REPLY_LEDGER_PROVIDER, &reply.event_id).await {
            info!(event_id = %reply.event_id, "reply already delivered");
            return Ok(None);
        }
        if self.opted_out(envelope).await {
            info!("conversation opted out, prepared reply suppressed");
            return Ok(None);
        }
        let outbound = OutboundReply {
            org_id: reply.org_id.clone(),
            conversation_id: reply.conversation_id.clone(),
            lead_id: reply.lead_id.clone(),
            channel: reply.channel,
            to: reply.to.clone(),
            from: reply.from.clone(),
            body: reply.body.clone(),
            metadata: BTreeMap::from([("event_id".to_string(), reply.event_id.clone())]),
        };
        self.send(outbound).await?;
        self.ledger_mark(REPLY_LEDGER_PROVIDER, &reply.event_id).await;
        Ok(Some(reply.body.clone()))
    }

    async fn send_fallback(&self, envelope: &QueueEnvelope, request: &ConversationRequest) {
        if self.opted_out(envelope).await {
            return;
        }
        let reply = reply_to(envelope, request, FALLBACK_REPLY);
        if let Err(e) = self.send(reply).await {
            warn!(error = %e, "fallback reply failed");
        }
    }

    /// Routes a reply to the channel's messenger. Voice replies are only
    /// written to the transcript by the caller.
    async fn send(&self, reply: OutboundReply) -> Result<(), MedspaError> {
        let channel = reply.channel;
        if channel != Channel::Voice {
            match self.messengers.get(channel) {
                Some(messenger) => messenger.send_reply(&reply).await?,
                None => info!(%channel, "no messenger for channel, reply not sent"),
            }
        }
        Ok(())
    }

    async fn opted_out(&self, envelope: &QueueEnvelope) -> bool {
        match self
            .conversations
            .status(&envelope.org_id, &envelope.conversation_id)
            .await
        {
            Ok(status) => status == Some(ConversationStatus::OptedOut),
            Err(e) => {
                warn!(error = %e, "conversation status unavailable, assuming not opted out");
                false
            }
        }
    }

    async fn transcript(&self, org_id: &str, conversation_id: &str, role: TranscriptRole, body: &str) {
        let Some(recorder) = &self.caps.transcript else {
            return;
        };
        let entry = TranscriptEntry {
            org_id: org_id.to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            body: body.to_string(),
        };
        if let Err(e) = recorder.record(&entry).await {
            warn!(error = %e, "transcript write failed");
        }
    }

    async fn clinic(&self, org_id: &str) -> Option<ClinicConfig> {
        let clinics = self.caps.clinics.as_ref()?;
        clinics.clinic(org_id).await.unwrap_or_else(|e| {
            warn!(org_id, error = %e, "clinic config lookup failed");
            None
        })
    }

    /// Ledger lookups fail open: a store error is logged and the job proceeds.
    async fn ledger_seen(&self, provider: &str, key: &str) -> bool {
        self.processed
            .already_processed(provider, key)
            .await
            .unwrap_or_else(|e| {
                warn!(provider, key, error = %e, "idempotency check failed");
                false
            })
    }

    async fn ledger_mark(&self, provider: &str, key: &str) {
        if let Err(e) = self.processed.mark_processed(provider, key).await {
            warn!(provider, key, error = %e, "failed to mark event processed");
        }
    }
}

/// Applies the output guard. Returns the text to send and whether the
/// original reply was withheld.
fn guard_output(conversation_id: &str, text: String) -> (String, bool) {
    let scan = scan_output(&text);
    for reason in scan.reasons() {
        metrics::record_output_guard(reason);
    }
    match scan {
        OutputScan::Clean => (text, false),
        OutputScan::Sanitized { text, reasons } => {
            warn!(conversation_id, ?reasons, "output guard sanitized reply");
            (text, false)
        }
        OutputScan::Withheld { reasons } => {
            warn!(conversation_id, ?reasons, "output guard withheld reply");
            (SUPERVISOR_FALLBACK_REPLY.to_string(), true)
        }
    }
}

fn reply_to(envelope: &QueueEnvelope, request: &ConversationRequest, body: &str) -> OutboundReply {
    OutboundReply {
        org_id: request.org_id.clone(),
        conversation_id: request.conversation_id.clone(),
        lead_id: Some(request.lead_id.clone()).filter(|id| !id.is_empty()),
        channel: envelope.channel,
        to: request.from.clone(),
        from: request.to.clone(),
        body: body.to_string(),
        metadata: BTreeMap::from([("job_id".to_string(), envelope.job_id.clone())]),
    }
}

/// Status after a processed turn.
fn next_status(reply: &ServiceReply, deposit_pending: bool) -> ConversationStatus {
    if deposit_pending {
        ConversationStatus::AwaitingPayment
    } else if reply.qualification.is_complete() || reply.time_selection_offered {
        ConversationStatus::AwaitingTimeSelection
    } else {
        ConversationStatus::AwaitingQualification
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medspa_core::types::{DepositIntent, QualificationState};

    fn qualified() -> QualificationState {
        QualificationState {
            name: Some("Ana".into()),
            service: Some("Botox".into()),
            patient_type: Some("new".into()),
            contact: Some("+15550001111".into()),
            schedule_preference: Some("weekday mornings".into()),
        }
    }

    #[test]
    fn status_follows_reply() {
        let mut reply = ServiceReply::default();
        assert_eq!(next_status(&reply, false), ConversationStatus::AwaitingQualification);

        reply.time_selection_offered = true;
        assert_eq!(next_status(&reply, false), ConversationStatus::AwaitingTimeSelection);

        reply.time_selection_offered = false;
        reply.qualification = qualified();
        assert_eq!(next_status(&reply, false), ConversationStatus::AwaitingTimeSelection);

        reply.deposit_intent = Some(DepositIntent {
            amount_cents: 5000,
            description: None,
        });
        assert_eq!(next_status(&reply, true), ConversationStatus::AwaitingPayment);
    }

    #[test]
    fn outcomes_other_than_deferred_are_acked() {
        assert!(JobOutcome::Completed.should_ack());
        assert!(JobOutcome::Duplicate.should_ack());
        assert!(JobOutcome::Failed("x".into()).should_ack());
        assert!(JobOutcome::Dropped.should_ack());
        assert!(!JobOutcome::Deferred("db down".into()).should_ack());
    }

    #[test]
    fn panic_payloads_are_readable() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(boxed.as_ref()), "owned boom");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn replies_go_back_to_the_sender() {
        let envelope = QueueEnvelope {
            job_id: "job-1".into(),
            org_id: "org".into(),
            conversation_id: "sms:org:15550001111".into(),
            channel: Channel::Sms,
            payload: JobPayload::Message(ConversationRequest::default()),
            enqueued_at: chrono::Utc::now(),
            track_status: true,
        };
        let request = ConversationRequest {
            org_id: "org".into(),
            lead_id: String::new(),
            conversation_id: "sms:org:15550001111".into(),
            from: "+15550001111".into(),
            to: "+15559990000".into(),
            ..Default::default()
        };
        let reply = reply_to(&envelope, &request, "hi");
        assert_eq!(reply.to, "+15550001111");
        assert_eq!(reply.from, "+15559990000");
        assert_eq!(reply.lead_id, None);
        assert_eq!(reply.metadata.get("job_id").map(String::as_str), Some("job-1"));
    }
}
