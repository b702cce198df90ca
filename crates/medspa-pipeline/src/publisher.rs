// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The only entry point that creates conversation jobs.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use medspa_core::events::{JobPayload, PaymentFailedV1, PaymentSucceededV1, ReplyRequestedV1};
use medspa_core::types::{ConversationRequest, sms_conversation_id};
use medspa_core::{Channel, JobRecord, JobStore, MedspaError, Queue, QueueEnvelope};

use crate::metrics;

/// Per-call publishing options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Skip the job store write. For channels with no polling client, and
    /// for jobs re-injected from the outbox.
    pub without_job_tracking: bool,
}

impl PublishOptions {
    pub fn untracked() -> Self {
        Self {
            without_job_tracking: true,
        }
    }
}

/// Writes job envelopes to the queue, recording a `pending` job first for
/// tracked jobs so a polling client sees the job before any worker does.
#[derive(Clone)]
pub struct Publisher {
    queue: Arc<dyn Queue>,
    jobs: Arc<dyn JobStore>,
}

impl Publisher {
    pub fn new(queue: Arc<dyn Queue>, jobs: Arc<dyn JobStore>) -> Self {
        Self { queue, jobs }
    }

    /// A fresh random job id.
    pub fn new_job_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// A job id derived from an external id, stable across redeliveries.
    pub fn derived_job_id(scope: &str, external_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{scope}:{external_id}").as_bytes()).to_string()
    }

    /// Queues an inbound patient message.
    pub async fn enqueue_message(
        &self,
        job_id: &str,
        channel: Channel,
        request: ConversationRequest,
        opts: PublishOptions,
    ) -> Result<(), MedspaError> {
        let (org_id, conversation_id) = (request.org_id.clone(), request.conversation_id.clone());
        let envelope = envelope(
            job_id,
            &org_id,
            &conversation_id,
            channel,
            JobPayload::Message(request),
            opts,
        );
        self.publish(envelope).await
    }

    /// Queues a conversation start (missed call, web form).
    pub async fn enqueue_start(
        &self,
        job_id: &str,
        channel: Channel,
        request: ConversationRequest,
        opts: PublishOptions,
    ) -> Result<(), MedspaError> {
        let (org_id, conversation_id) = (request.org_id.clone(), request.conversation_id.clone());
        let envelope = envelope(
            job_id,
            &org_id,
            &conversation_id,
            channel,
            JobPayload::Start(request),
            opts,
        );
        self.publish(envelope).await
    }

    /// Queues the confirmation for a paid deposit. The job is keyed to the
    /// patient's SMS conversation, whatever channel the lead arrived on.
    pub async fn enqueue_payment_succeeded(
        &self,
        job_id: &str,
        event: PaymentSucceededV1,
        opts: PublishOptions,
    ) -> Result<(), MedspaError> {
        let conversation_id = sms_conversation_id(&event.org_id, &event.lead_phone);
        let org_id = event.org_id.clone();
        let envelope = envelope(
            job_id,
            &org_id,
            &conversation_id,
            Channel::Sms,
            JobPayload::PaymentSucceeded(event),
            opts,
        );
        self.publish(envelope).await
    }

    /// Queues the failure notice for a declined deposit.
    pub async fn enqueue_payment_failed(
        &self,
        job_id: &str,
        event: PaymentFailedV1,
        opts: PublishOptions,
    ) -> Result<(), MedspaError> {
        let conversation_id = sms_conversation_id(&event.org_id, &event.lead_phone);
        let org_id = event.org_id.clone();
        let envelope = envelope(
            job_id,
            &org_id,
            &conversation_id,
            Channel::Sms,
            JobPayload::PaymentFailed(event),
            opts,
        );
        self.publish(envelope).await
    }

    /// Queues delivery of a prepared reply.
    pub async fn enqueue_reply(
        &self,
        job_id: &str,
        reply: ReplyRequestedV1,
        opts: PublishOptions,
    ) -> Result<(), MedspaError> {
        let (org_id, conversation_id, channel) =
            (reply.org_id.clone(), reply.conversation_id.clone(), reply.channel);
        let envelope = envelope(
            job_id,
            &org_id,
            &conversation_id,
            channel,
            JobPayload::Reply(reply),
            opts,
        );
        self.publish(envelope).await
    }

    /// Records the job (unless untracked), then enqueues it.
    ///
    /// An enqueue failure marks the recorded job failed and is returned to
    /// the caller; the job is never left pending without a surfaced error.
    async fn publish(&self, envelope: QueueEnvelope) -> Result<(), MedspaError> {
        let kind = envelope.payload.kind();
        if envelope.track_status {
            let record = JobRecord::pending(
                envelope.job_id.clone(),
                envelope.org_id.clone(),
                envelope.conversation_id.clone(),
                envelope.channel,
                kind,
            );
            self.jobs.create(&record).await?;
        }

        let body = envelope.encode()?;
        if let Err(err) = self.queue.enqueue(body).await {
            metrics::record_queue_rejection(self.queue.name());
            error!(
                job_id = %envelope.job_id,
                queue = self.queue.name(),
                error = %err,
                "enqueue failed"
            );
            if envelope.track_status
                && let Err(mark_err) = self
                    .jobs
                    .mark_failed(&envelope.job_id, &format!("enqueue failed: {err}"))
                    .await
            {
                warn!(job_id = %envelope.job_id, error = %mark_err, "could not mark unqueued job failed");
            }
            return Err(err);
        }

        metrics::record_enqueued(kind);
        debug!(
            job_id = %envelope.job_id,
            kind,
            conversation_id = %envelope.conversation_id,
            tracked = envelope.track_status,
            "job enqueued"
        );
        Ok(())
    }
}

fn envelope(
    job_id: &str,
    org_id: &str,
    conversation_id: &str,
    channel: Channel,
    payload: JobPayload,
    opts: PublishOptions,
) -> QueueEnvelope {
    QueueEnvelope {
        job_id: job_id.to_string(),
        org_id: org_id.to_string(),
        conversation_id: conversation_id.to_string(),
        channel,
        payload,
        enqueued_at: Utc::now(),
        track_status: !opts.without_job_tracking,
    }
}
