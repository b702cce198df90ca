// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resends failed outbound SMS with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use medspa_config::model::RetrySenderConfig;
use medspa_core::types::SmsRequest;
use medspa_core::{MedspaError, OutboundMessageStore, SmsSender};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics;

/// Upper bound on the delay between two attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Status recorded when the provider accepts a send without reporting one.
pub const DEFAULT_SENT_STATUS: &str = "queued";

#[derive(Debug, Clone, Copy)]
pub struct RetrySenderSettings {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub interval: Duration,
    pub batch_size: usize,
}

impl Default for RetrySenderSettings {
    fn default() -> Self {
        Self::from(&RetrySenderConfig::default())
    }
}

impl From<&RetrySenderConfig> for RetrySenderSettings {
    fn from(config: &RetrySenderConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_secs(config.base_delay_secs),
            interval: Duration::from_secs(config.interval_secs),
            batch_size: config.batch_size.max(1),
        }
    }
}

/// Counts from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPass {
    pub sent: usize,
    pub rescheduled: usize,
    pub exhausted: usize,
}

/// `base * 2^attempts`, capped at [`MAX_RETRY_DELAY`].
pub fn backoff_delay(base: Duration, attempts: u32) -> Duration {
    2u32.checked_pow(attempts)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
}

pub struct RetrySender {
    store: Arc<dyn OutboundMessageStore>,
    sender: Arc<dyn SmsSender>,
    settings: RetrySenderSettings,
}

impl RetrySender {
    pub fn new(
        store: Arc<dyn OutboundMessageStore>,
        sender: Arc<dyn SmsSender>,
        settings: RetrySenderSettings,
    ) -> Self {
        Self {
            store,
            sender,
            settings,
        }
    }

    pub fn next_delay(&self, attempts: u32) -> Duration {
        backoff_delay(self.settings.base_delay, attempts)
    }

    /// Resends every due candidate once.
    pub async fn drain_once(&self) -> Result<RetryPass, MedspaError> {
        let candidates = self
            .store
            .list_retry_candidates(self.settings.batch_size, self.settings.max_attempts)
            .await?;
        let mut pass = RetryPass::default();
        if candidates.is_empty() {
            return Ok(pass);
        }
        debug!(count = candidates.len(), "retrying outbound messages");

        for message in candidates {
            let request = SmsRequest {
                from: message.from.clone(),
                to: message.to.clone(),
                body: message.body.clone(),
            };
            match self.sender.send_sms(&request).await {
                Ok(result) => {
                    let status = result.status.as_deref().unwrap_or(DEFAULT_SENT_STATUS);
                    if let Err(e) = self
                        .store
                        .record_sent(&message.id, &result.provider_message_id, status)
                        .await
                    {
                        error!(message_id = %message.id, provider_message_id = %result.provider_message_id, error = %e, "failed to record resent message");
                    }
                    info!(message_id = %message.id, attempt = message.send_attempts + 1, "outbound message resent");
                    metrics::record_retry("sent");
                    pass.sent += 1;
                }
                Err(send_err) => {
                    let reason = send_err.to_string();
                    let used = message.send_attempts + 1;
                    let recorded = if used >= self.settings.max_attempts {
                        warn!(message_id = %message.id, attempts = used, error = %reason, "outbound message permanently failed");
                        metrics::record_retry("exhausted");
                        pass.exhausted += 1;
                        self.store.mark_permanently_failed(&message.id, &reason).await
                    } else {
                        let delay = self.next_delay(message.send_attempts);
                        let next = Utc::now()
                            + chrono::Duration::from_std(delay)
                                .unwrap_or_else(|_| chrono::Duration::hours(24));
                        debug!(message_id = %message.id, attempts = used, retry_in_secs = delay.as_secs(), error = %reason, "resend failed, rescheduled");
                        metrics::record_retry("rescheduled");
                        pass.rescheduled += 1;
                        self.store.schedule_retry(&message.id, next, &reason).await
                    };
                    if let Err(e) = recorded {
                        error!(message_id = %message.id, error = %e, "failed to record resend failure");
                    }
                }
            }
        }
        Ok(pass)
    }

    /// Drains immediately, then every `interval`, until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            max_attempts = self.settings.max_attempts,
            "retry sender started"
        );
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.drain_once().await {
                        error!(error = %e, "retry candidate fetch failed");
                    }
                }
            }
        }
        info!("retry sender stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_attempt() {
        let base = Duration::from_secs(300);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(300));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(600));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(2400));
    }

    #[test]
    fn delay_is_capped_at_a_day() {
        let base = Duration::from_secs(300);
        assert_eq!(backoff_delay(base, 9), MAX_RETRY_DELAY);
        assert_eq!(backoff_delay(base, 40), MAX_RETRY_DELAY);
    }

    #[test]
    fn settings_follow_config() {
        let settings = RetrySenderSettings::from(&RetrySenderConfig {
            max_attempts: 3,
            base_delay_secs: 10,
            interval_secs: 30,
            batch_size: 0,
        });
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.base_delay, Duration::from_secs(10));
        assert_eq!(settings.batch_size, 1);
    }
}
