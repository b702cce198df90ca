// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook intake helpers.
//!
//! HTTP routing and signature checks live outside this crate. These helpers
//! are what a webhook handler calls once a request is authenticated: they
//! consult the idempotency ledger first and only then write or publish.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use medspa_core::events::{
    PAYMENT_FAILED_V1, PAYMENT_SUCCEEDED_V1, PaymentFailedV1, PaymentSucceededV1,
};
use medspa_core::types::ConversationRequest;
use medspa_core::{Channel, MedspaError, OutboxEvent, PaymentLedger, ProcessedMark, ProcessedStore};

use crate::publisher::{PublishOptions, Publisher};

/// What an intake call did with one provider delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// A conversation job was published.
    Queued { job_id: String },
    /// The fact was persisted and will be delivered through the outbox.
    Recorded,
    /// The provider already delivered this event; nothing was done.
    Duplicate,
}

/// Records payment webhooks as outbox facts.
#[derive(Clone)]
pub struct PaymentIntake {
    ledger: Arc<dyn PaymentLedger>,
}

impl PaymentIntake {
    pub fn new(ledger: Arc<dyn PaymentLedger>) -> Self {
        Self { ledger }
    }

    /// Marks the webhook processed, moves the deposit to `succeeded`, and
    /// commits the outbox fact in one transaction. A redelivered webhook is
    /// reported as [`IntakeOutcome::Duplicate`].
    pub async fn record_payment_succeeded(
        &self,
        event: &PaymentSucceededV1,
    ) -> Result<IntakeOutcome, MedspaError> {
        let outbox = OutboxEvent::new(PAYMENT_SUCCEEDED_V1, event)?;
        let mark = self
            .ledger
            .apply_payment_outcome(
                &event.provider.to_string(),
                &event.event_id,
                event.booking_intent_id.as_deref(),
                "succeeded",
                &outbox,
            )
            .await?;
        Ok(outcome(mark, &event.event_id, PAYMENT_SUCCEEDED_V1))
    }

    /// As [`record_payment_succeeded`](Self::record_payment_succeeded), for
    /// a failed payment.
    pub async fn record_payment_failed(
        &self,
        event: &PaymentFailedV1,
    ) -> Result<IntakeOutcome, MedspaError> {
        let outbox = OutboxEvent::new(PAYMENT_FAILED_V1, event)?;
        let mark = self
            .ledger
            .apply_payment_outcome(
                &event.provider.to_string(),
                &event.event_id,
                event.booking_intent_id.as_deref(),
                "failed",
                &outbox,
            )
            .await?;
        Ok(outcome(mark, &event.event_id, PAYMENT_FAILED_V1))
    }
}

fn outcome(mark: ProcessedMark, event_id: &str, event_type: &str) -> IntakeOutcome {
    match mark {
        ProcessedMark::Recorded => {
            info!(event_id, event_type, "payment webhook recorded");
            IntakeOutcome::Recorded
        }
        ProcessedMark::AlreadyProcessed => {
            debug!(event_id, event_type, "duplicate payment webhook ignored");
            IntakeOutcome::Duplicate
        }
    }
}

/// Turns inbound provider messages into conversation jobs, at most once per
/// provider message id.
///
/// The provider message id is claimed in the idempotency ledger before the
/// job is published, so concurrent deliveries of one message cannot both
/// publish. When publishing fails the claim is cleared again and the error
/// returned: the webhook answers with a failure, the provider retries, and
/// the retry is accepted as a new delivery rather than a duplicate.
///
/// Every accepted delivery gets a fresh job id. A failed attempt leaves its
/// job record `failed`, and the retry must not collide with it.
#[derive(Clone)]
pub struct MessageIntake {
    processed: Arc<dyn ProcessedStore>,
    publisher: Publisher,
}

/// A ledger claim on one provider message id.
struct Claim {
    scope: String,
    provider_id: String,
}

impl MessageIntake {
    pub fn new(processed: Arc<dyn ProcessedStore>, publisher: Publisher) -> Self {
        Self {
            processed,
            publisher,
        }
    }

    /// Publishes a message job unless the provider already delivered it.
    pub async fn accept_message(
        &self,
        channel: Channel,
        request: ConversationRequest,
        opts: PublishOptions,
    ) -> Result<IntakeOutcome, MedspaError> {
        let Some(claim) = self.claim(channel, &request).await? else {
            return Ok(IntakeOutcome::Duplicate);
        };
        let job_id = Publisher::new_job_id();
        let published = self
            .publisher
            .enqueue_message(&job_id, channel, request, opts)
            .await;
        self.settle(claim, published, job_id).await
    }

    /// Publishes a conversation start unless the provider already delivered it.
    pub async fn accept_start(
        &self,
        channel: Channel,
        request: ConversationRequest,
        opts: PublishOptions,
    ) -> Result<IntakeOutcome, MedspaError> {
        let Some(claim) = self.claim(channel, &request).await? else {
            return Ok(IntakeOutcome::Duplicate);
        };
        let job_id = Publisher::new_job_id();
        let published = self
            .publisher
            .enqueue_start(&job_id, channel, request, opts)
            .await;
        self.settle(claim, published, job_id).await
    }

    /// Marks the provider message id processed. `Ok(None)` is a duplicate;
    /// `Ok(Some(None))` means the request carries no provider id and is
    /// never deduplicated.
    async fn claim(
        &self,
        channel: Channel,
        request: &ConversationRequest,
    ) -> Result<Option<Option<Claim>>, MedspaError> {
        let provider_id = request
            .provider_message_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        let Some(provider_id) = provider_id else {
            return Ok(Some(None));
        };

        let scope = format!("messaging.{channel}");
        match self.processed.mark_processed(&scope, provider_id).await? {
            ProcessedMark::Recorded => Ok(Some(Some(Claim {
                scope,
                provider_id: provider_id.to_string(),
            }))),
            ProcessedMark::AlreadyProcessed => {
                debug!(provider_message_id = provider_id, %channel, "duplicate inbound message ignored");
                Ok(None)
            }
        }
    }

    /// Keeps the claim on success; clears it when the job never made it
    /// onto the queue.
    async fn settle(
        &self,
        claim: Option<Claim>,
        published: Result<(), MedspaError>,
        job_id: String,
    ) -> Result<IntakeOutcome, MedspaError> {
        let Err(err) = published else {
            return Ok(IntakeOutcome::Queued { job_id });
        };
        if let Some(claim) = claim {
            match self
                .processed
                .clear_processed(&claim.scope, &claim.provider_id)
                .await
            {
                Ok(()) => warn!(
                    provider_message_id = %claim.provider_id,
                    job_id,
                    error = %err,
                    "publish failed, inbound message released for provider retry"
                ),
                Err(clear_err) => error!(
                    provider_message_id = %claim.provider_id,
                    job_id,
                    error = %err,
                    clear_error = %clear_err,
                    "publish failed and the dedupe mark could not be cleared"
                ),
            }
        }
        Err(err)
    }
}
