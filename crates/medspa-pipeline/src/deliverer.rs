// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background delivery of outbox events into the conversation queue.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use medspa_core::events::{
    DEPOSIT_REQUESTED_V1, MESSAGE_RECEIVED_V1, PAYMENT_FAILED_V1, PAYMENT_SUCCEEDED_V1,
    PaymentFailedV1, PaymentSucceededV1, REPLY_REQUESTED_V1, ReplyRequestedV1,
};
use medspa_config::model::OutboxConfig;
use medspa_core::{MedspaError, OutboxEvent, OutboxStore};

use crate::metrics;
use crate::publisher::{PublishOptions, Publisher};

/// What routing did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Republished as a conversation job.
    Published,
    /// Informational event with no conversation work attached.
    Ignored,
}

/// Maps outbox event types onto publisher calls.
///
/// Job ids are derived from the event id, so a redelivered event produces
/// the same job id and the worker's duplicate guard absorbs it.
#[derive(Clone)]
pub struct OutboxRouter {
    publisher: Publisher,
}

impl OutboxRouter {
    pub fn new(publisher: Publisher) -> Self {
        Self { publisher }
    }

    pub async fn route(&self, event: &OutboxEvent) -> Result<RouteOutcome, MedspaError> {
        let job_id = Publisher::derived_job_id("outbox", &event.id);
        let opts = PublishOptions::untracked();
        match event.event_type.as_str() {
            PAYMENT_SUCCEEDED_V1 => {
                let payload: PaymentSucceededV1 = event.decode()?;
                self.publisher
                    .enqueue_payment_succeeded(&job_id, payload, opts)
                    .await?;
            }
            PAYMENT_FAILED_V1 => {
                let payload: PaymentFailedV1 = event.decode()?;
                self.publisher
                    .enqueue_payment_failed(&job_id, payload, opts)
                    .await?;
            }
            REPLY_REQUESTED_V1 => {
                let payload: ReplyRequestedV1 = event.decode()?;
                self.publisher.enqueue_reply(&job_id, payload, opts).await?;
            }
            MESSAGE_RECEIVED_V1 | DEPOSIT_REQUESTED_V1 => return Ok(RouteOutcome::Ignored),
            other => {
                return Err(MedspaError::Validation(format!(
                    "no route for outbox event type `{other}`"
                )));
            }
        }
        Ok(RouteOutcome::Published)
    }
}

/// Poll cadence for an [`OutboxDeliverer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboxDelivererConfig {
    /// Time between polls.
    pub interval: Duration,
    /// Events claimed per poll.
    pub batch_size: usize,
}

impl Default for OutboxDelivererConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            batch_size: 25,
        }
    }
}

impl From<&OutboxConfig> for OutboxDelivererConfig {
    fn from(config: &OutboxConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            batch_size: config.batch_size.max(1),
        }
    }
}

/// Background loop that moves committed outbox events onto the job queue.
///
/// Events are claimed under a lease, routed through the [`OutboxRouter`],
/// and marked dispatched one by one. Delivery is at least once; the job ids
/// the router derives make the worker side idempotent.
pub struct OutboxDeliverer {
    store: Arc<dyn OutboxStore>,
    router: OutboxRouter,
    config: OutboxDelivererConfig,
}

impl OutboxDeliverer {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        router: OutboxRouter,
        config: OutboxDelivererConfig,
    ) -> Self {
        Self {
            store,
            router,
            config,
        }
    }

    /// Claims one batch and routes it. Returns how many events were marked
    /// dispatched.
    ///
    /// An event is marked dispatched only after routing succeeds. A routing
    /// failure releases the claim so the next poll retries it.
    pub async fn poll_once(&self) -> Result<usize, MedspaError> {
        let events = self.store.claim_undispatched(self.config.batch_size).await?;
        if events.is_empty() {
            return Ok(0);
        }
        debug!(count = events.len(), "claimed outbox events");

        let mut dispatched = 0;
        for event in &events {
            match self.router.route(event).await {
                Ok(outcome) => {
                    if self.store.mark_dispatched(&event.id).await? {
                        dispatched += 1;
                        metrics::record_outbox_dispatched(&event.event_type);
                        debug!(event_id = %event.id, event_type = %event.event_type, ?outcome, "outbox event dispatched");
                    } else {
                        debug!(event_id = %event.id, "outbox event was already dispatched");
                    }
                }
                Err(e) => {
                    metrics::record_outbox_failure(&event.event_type);
                    warn!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        error = %e,
                        "outbox routing failed, will retry"
                    );
                    if let Err(release_err) = self.store.release_claim(&event.id).await {
                        // The lease expires on its own.
                        warn!(event_id = %event.id, error = %release_err, "failed to release outbox claim");
                    }
                }
            }
        }
        Ok(dispatched)
    }

    /// Polls until `cancel` fires. Store errors are logged and retried on the
    /// next tick.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "outbox deliverer started"
        );
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, "outbox poll failed");
                    }
                }
            }
        }
        info!("outbox deliverer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_polls_every_two_seconds() {
        let config = OutboxDelivererConfig::default();
        assert_eq!(config.interval, Duration::from_secs(2));
        assert_eq!(config.batch_size, 25);
    }
}
