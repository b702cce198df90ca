// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sandbox auto-purge of demo conversations after a completed payment.
//!
//! Only numbers on the configured allow-list are purged, so a sandbox that
//! shares a database with real traffic cannot lose patient history.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use medspa_config::model::WorkerConfig;
use medspa_core::types::digits_only;
use medspa_core::{MedspaError, SandboxPurger};
use medspa_storage::SqliteStore;

/// US numbers compare without the leading country code.
fn normalize(phone: &str) -> String {
    let digits = digits_only(phone);
    match digits.strip_prefix('1') {
        Some(rest) if digits.len() == 11 => rest.to_string(),
        _ => digits,
    }
}

fn last4(digits: &str) -> &str {
    &digits[digits.len().saturating_sub(4)..]
}

pub struct SandboxAutoPurger {
    store: Arc<SqliteStore>,
    allowed: HashSet<String>,
    delay: Duration,
    cancel: CancellationToken,
}

impl SandboxAutoPurger {
    pub fn new(
        store: Arc<SqliteStore>,
        phones: &[String],
        delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let allowed = phones
            .iter()
            .map(|p| normalize(p))
            .filter(|d| !d.is_empty())
            .collect();
        Self {
            store,
            allowed,
            delay,
            cancel,
        }
    }

    /// `None` unless sandbox mode is on and at least one number is allowed.
    pub fn from_config(
        store: Arc<SqliteStore>,
        config: &WorkerConfig,
        cancel: CancellationToken,
    ) -> Option<Self> {
        if !config.sandbox {
            return None;
        }
        let purger = Self::new(
            store,
            &config.sandbox_purge_phones,
            Duration::from_secs(config.sandbox_purge_delay_secs),
            cancel,
        );
        if purger.allowed.is_empty() {
            warn!("sandbox mode without worker.sandbox_purge_phones, auto-purge disabled");
            return None;
        }
        info!(
            numbers = purger.allowed.len(),
            delay_secs = purger.delay.as_secs(),
            "sandbox auto-purge enabled"
        );
        Some(purger)
    }
}

async fn purge(store: &SqliteStore, org_id: &str, conversation_id: &str, digits: &str) {
    match store.purge_conversation(org_id, conversation_id).await {
        Ok(rows) => info!(org_id, phone_last4 = last4(digits), rows, "sandbox auto purge completed"),
        Err(e) => warn!(org_id, phone_last4 = last4(digits), error = %e, "sandbox auto purge failed"),
    }
}

#[async_trait]
impl SandboxPurger for SandboxAutoPurger {
    async fn schedule_purge(
        &self,
        org_id: &str,
        conversation_id: &str,
        phone: &str,
    ) -> Result<(), MedspaError> {
        let digits = normalize(phone);
        if !self.allowed.contains(&digits) {
            debug!(phone_last4 = last4(&digits), "number not on the sandbox purge list");
            return Ok(());
        }

        if self.delay.is_zero() {
            purge(&self.store, org_id, conversation_id, &digits).await;
            return Ok(());
        }

        let (store, cancel, delay) = (self.store.clone(), self.cancel.clone(), self.delay);
        let (org_id, conversation_id) = (org_id.to_string(), conversation_id.to_string());
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(org_id, "shutdown before scheduled sandbox purge");
                }
                _ = tokio::time::sleep(delay) => {
                    purge(&store, &org_id, &conversation_id, &digits).await;
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medspa_core::types::sms_conversation_id;
    use medspa_core::{ConversationStatus, ConversationStore};
    use medspa_storage::SqliteStoreOptions;

    const ORG: &str = "org-1";

    async fn store() -> (tempfile::TempDir, Arc<SqliteStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(
            dir.path().join("purge.db").to_string_lossy(),
            SqliteStoreOptions::default(),
        )
        .await
        .unwrap();
        (dir, Arc::new(store))
    }

    async fn seed(store: &SqliteStore, phone: &str) -> String {
        let conversation_id = sms_conversation_id(ORG, phone);
        store
            .set_status(ORG, &conversation_id, ConversationStatus::Completed)
            .await
            .unwrap();
        conversation_id
    }

    #[test]
    fn us_numbers_match_with_or_without_country_code() {
        assert_eq!(normalize("+1 (555) 000-1111"), "5550001111");
        assert_eq!(normalize("555-000-1111"), "5550001111");
        assert_eq!(normalize("+44 20 7946 0000"), "442079460000");
        assert_eq!(last4("5550001111"), "1111");
        assert_eq!(last4("12"), "12");
    }

    #[tokio::test]
    async fn allowed_number_is_purged_immediately() {
        let (_dir, store) = store().await;
        let purged = seed(&store, "+15550001111").await;
        let kept = seed(&store, "+15550002222").await;
        let purger = SandboxAutoPurger::new(
            store.clone(),
            &["5550001111".to_string()],
            Duration::ZERO,
            CancellationToken::new(),
        );

        purger.schedule_purge(ORG, &purged, "+15550001111").await.unwrap();
        purger.schedule_purge(ORG, &kept, "+15550002222").await.unwrap();

        assert!(store.status(ORG, &purged).await.unwrap().is_none());
        assert_eq!(
            store.status(ORG, &kept).await.unwrap(),
            Some(ConversationStatus::Completed)
        );
    }

    #[tokio::test]
    async fn delayed_purge_is_dropped_on_shutdown() {
        let (_dir, store) = store().await;
        let conversation = seed(&store, "+15550001111").await;
        let cancel = CancellationToken::new();
        let purger = SandboxAutoPurger::new(
            store.clone(),
            &["+15550001111".to_string()],
            Duration::from_millis(200),
            cancel.clone(),
        );

        purger
            .schedule_purge(ORG, &conversation, "+15550001111")
            .await
            .unwrap();
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(store.status(ORG, &conversation).await.unwrap().is_some());
    }

    #[test]
    fn disabled_outside_sandbox_or_without_numbers() {
        let store = Arc::new(SqliteStore::new("unused.db", SqliteStoreOptions::default()));
        let mut config = WorkerConfig::default();
        config.sandbox_purge_phones = vec!["5550001111".into()];
        assert!(SandboxAutoPurger::from_config(store.clone(), &config, CancellationToken::new()).is_none());

        config.sandbox = true;
        assert!(SandboxAutoPurger::from_config(store.clone(), &config, CancellationToken::new()).is_some());

        config.sandbox_purge_phones.clear();
        assert!(SandboxAutoPurger::from_config(store, &config, CancellationToken::new()).is_none());
    }
}
