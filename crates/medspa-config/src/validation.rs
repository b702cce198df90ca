// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks cross-section consistency (backend selection versus available
//! connections) and numeric bounds that serde cannot express.

use crate::diagnostic::ConfigError;
use crate::model::{JobsBackend, MedspaConfig, QueueBackend};

const MAX_RECEIVE_WAIT_SECS: u64 = 20;
const MAX_BATCH_SIZE: usize = 10;

/// Validate a deserialized configuration.
///
/// Collects every problem rather than stopping at the first.
pub fn validate_config(config: &MedspaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        invalid("storage.database_path must not be empty".to_string());
    }

    let has_redis = config
        .storage
        .redis_url
        .as_deref()
        .is_some_and(|u| !u.trim().is_empty());
    if config.queue.backend == QueueBackend::Redis && !has_redis {
        invalid("queue.backend = \"redis\" requires storage.redis_url".to_string());
    }
    if config.jobs.backend == JobsBackend::Redis && !has_redis {
        invalid("jobs.backend = \"redis\" requires storage.redis_url".to_string());
    }

    if config.queue.backend == QueueBackend::Memory && config.queue.capacity == 0 {
        invalid("queue.capacity must be at least 1".to_string());
    }
    if config.jobs.ttl_secs == 0 {
        invalid("jobs.ttl_secs must be positive".to_string());
    }

    if config.worker.count == 0 {
        invalid("worker.count must be at least 1".to_string());
    }
    if config.worker.receive_wait_secs > MAX_RECEIVE_WAIT_SECS {
        invalid(format!(
            "worker.receive_wait_secs must be at most {MAX_RECEIVE_WAIT_SECS}, got {}",
            config.worker.receive_wait_secs
        ));
    }
    if config.worker.batch_size == 0 || config.worker.batch_size > MAX_BATCH_SIZE {
        invalid(format!(
            "worker.batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
            config.worker.batch_size
        ));
    }

    if config.supervisor.enabled
        && config.anthropic.api_key.is_none()
        && std::env::var("ANTHROPIC_API_KEY").is_err()
    {
        invalid(
            "supervisor.enabled requires anthropic.api_key or ANTHROPIC_API_KEY".to_string(),
        );
    }

    if config.deposit.default_amount_cents <= 0 {
        invalid(format!(
            "deposit.default_amount_cents must be positive, got {}",
            config.deposit.default_amount_cents
        ));
    }

    for (key, value) in [
        ("outbox.interval_ms", config.outbox.interval_ms),
        ("outbox.claim_lease_secs", config.outbox.claim_lease_secs),
        ("retry_sender.interval_secs", config.retry_sender.interval_secs),
        ("retry_sender.base_delay_secs", config.retry_sender.base_delay_secs),
        ("hosted_poller.interval_secs", config.hosted_poller.interval_secs),
    ] {
        if value == 0 {
            invalid(format!("{key} must be positive"));
        }
    }
    if config.retry_sender.max_attempts == 0 {
        invalid("retry_sender.max_attempts must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &MedspaConfig) -> Vec<String> {
        match validate_config(config) {
            Ok(()) => Vec::new(),
            Err(errs) => errs.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&MedspaConfig::default()).is_ok());
    }

    #[test]
    fn redis_backends_require_url() {
        let mut config = MedspaConfig::default();
        config.queue.backend = QueueBackend::Redis;
        config.jobs.backend = JobsBackend::Redis;

        let msgs = messages(&config);
        assert_eq!(msgs.len(), 2, "{msgs:?}");
        assert!(msgs[0].contains("queue.backend"));
        assert!(msgs[1].contains("jobs.backend"));

        config.storage.redis_url = Some("redis://127.0.0.1/".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn worker_bounds_collected_together() {
        let mut config = MedspaConfig::default();
        config.worker.count = 0;
        config.worker.receive_wait_secs = 30;
        config.worker.batch_size = 11;

        let msgs = messages(&config);
        assert_eq!(msgs.len(), 3, "{msgs:?}");
    }

    #[test]
    fn zero_intervals_rejected() {
        let mut config = MedspaConfig::default();
        config.outbox.interval_ms = 0;
        config.retry_sender.max_attempts = 0;

        let msgs = messages(&config);
        assert!(msgs.iter().any(|m| m.contains("outbox.interval_ms")));
        assert!(msgs.iter().any(|m| m.contains("retry_sender.max_attempts")));
    }
}
