// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Refreshes hosted-number provisioning orders until they settle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use medspa_config::model::HostedPollerConfig;
use medspa_core::types::HostedOrder;
use medspa_core::{HostedOrderClient, HostedOrderStore, MedspaError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics;

#[derive(Debug, Clone, Copy)]
pub struct HostedPollerSettings {
    pub interval: Duration,
    pub batch_size: usize,
}

impl Default for HostedPollerSettings {
    fn default() -> Self {
        Self::from(&HostedPollerConfig::default())
    }
}

impl From<&HostedPollerConfig> for HostedPollerSettings {
    fn from(config: &HostedPollerConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            batch_size: config.batch_size.max(1),
        }
    }
}

pub struct HostedPoller {
    store: Arc<dyn HostedOrderStore>,
    client: Arc<dyn HostedOrderClient>,
    settings: HostedPollerSettings,
}

impl HostedPoller {
    pub fn new(
        store: Arc<dyn HostedOrderStore>,
        client: Arc<dyn HostedOrderClient>,
        settings: HostedPollerSettings,
    ) -> Self {
        Self {
            store,
            client,
            settings,
        }
    }

    /// Polls each pending order once. Returns how many were updated; a
    /// provider error skips that order until the next pass.
    pub async fn poll_once(&self) -> Result<usize, MedspaError> {
        let orders = self
            .store
            .list_pending_hosted_orders(self.settings.batch_size)
            .await?;
        let mut updated = 0;
        for order in orders {
            let status = match self.client.get_hosted_order(&order.provider_order_id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(order_id = %order.provider_order_id, error = %e, "hosted order poll failed");
                    continue;
                }
            };
            let refreshed = HostedOrder {
                status: status.status,
                last_error: status.last_error,
                updated_at: Utc::now(),
                ..order
            };
            if let Err(e) = self.store.upsert_hosted_order(&refreshed).await {
                error!(order_id = %refreshed.provider_order_id, error = %e, "hosted order update failed");
                continue;
            }
            metrics::record_hosted_update(&refreshed.status);
            if refreshed.is_terminal() {
                info!(
                    clinic_id = %refreshed.clinic_id,
                    number = %refreshed.e164_number,
                    status = %refreshed.status,
                    "hosted order settled"
                );
            } else {
                debug!(order_id = %refreshed.provider_order_id, status = %refreshed.status, "hosted order still pending");
            }
            updated += 1;
        }
        Ok(updated)
    }

    /// Polls immediately, then every `interval`, until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_secs = self.settings.interval.as_secs(), "hosted order poller started");
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, "hosted poll fetch failed");
                    }
                }
            }
        }
        info!("hosted order poller stopped");
    }
}
