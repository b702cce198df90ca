// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the medspa pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use medspa_core::types::CheckoutProviderKind;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Every section is optional and defaults to single-binary mode: in-process
/// queue, SQLite job store, warn-mode supervisor disabled.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MedspaConfig {
    /// SQLite and Redis connection settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Queue backend selection.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Job status store selection.
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Worker pool sizing and timeouts.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Reply review gate.
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Anthropic API settings used by the supervisor.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Deposit defaults for clinics without explicit settings.
    #[serde(default)]
    pub deposit: DepositConfig,

    /// Outbox deliverer loop.
    #[serde(default)]
    pub outbox: OutboxConfig,

    /// Failed-SMS retry loop.
    #[serde(default)]
    pub retry_sender: RetrySenderConfig,

    /// Hosted-number order poller.
    #[serde(default)]
    pub hosted_poller: HostedPollerConfig,

    /// Telnyx messaging provider.
    #[serde(default)]
    pub telnyx: TelnyxConfig,

    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Redis URL. Required when either the queue or the job store uses Redis.
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            redis_url: None,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("medspa").join("medspa.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("medspa.db"))
        .to_string_lossy()
        .into_owned()
}

/// Queue backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// Bounded in-process channel (single binary).
    #[default]
    Memory,
    /// Redis Streams consumer group (multi-process).
    Redis,
}

/// Queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,

    /// Buffer size of the in-process queue.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    /// Redis stream key.
    #[serde(default = "default_stream")]
    pub stream: String,

    /// Redis consumer group.
    #[serde(default = "default_group")]
    pub group: String,

    /// Consumer name; defaults to `<hostname>-<pid>` when unset.
    #[serde(default)]
    pub consumer: Option<String>,

    /// Seconds an unacked delivery stays invisible before it is reclaimed.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            capacity: default_queue_capacity(),
            stream: default_stream(),
            group: default_group(),
            consumer: None,
            visibility_timeout_secs: default_visibility_timeout_secs(),
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

fn default_stream() -> String {
    "medspa:conversation-jobs".to_string()
}

fn default_group() -> String {
    "conversation-workers".to_string()
}

fn default_visibility_timeout_secs() -> u64 {
    60
}

/// Job store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobsBackend {
    #[default]
    Sqlite,
    Redis,
}

/// Job store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct JobsConfig {
    #[serde(default)]
    pub backend: JobsBackend,

    /// Seconds a job record is kept for polling clients.
    #[serde(default = "default_job_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            backend: JobsBackend::default(),
            ttl_secs: default_job_ttl_secs(),
        }
    }
}

fn default_job_ttl_secs() -> u64 {
    86_400
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Number of concurrent receive loops.
    #[serde(default = "default_worker_count")]
    pub count: usize,

    /// Long-poll wait per receive, at most 20 seconds.
    #[serde(default = "default_receive_wait_secs")]
    pub receive_wait_secs: u64,

    /// Messages per receive, at most 10.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Bound on a single ack call.
    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,

    /// How long shutdown waits for in-flight jobs.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Non-production deployment; enables sandbox auto-purge.
    #[serde(default)]
    pub sandbox: bool,

    /// Test phone numbers whose conversations are purged after payment.
    /// Purging stays off while this is empty.
    #[serde(default)]
    pub sandbox_purge_phones: Vec<String>,

    /// Delay before a scheduled purge runs.
    #[serde(default)]
    pub sandbox_purge_delay_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            receive_wait_secs: default_receive_wait_secs(),
            batch_size: default_batch_size(),
            ack_timeout_secs: default_ack_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            sandbox: false,
            sandbox_purge_phones: Vec::new(),
            sandbox_purge_delay_secs: 0,
        }
    }
}

fn default_worker_count() -> usize {
    2
}

fn default_receive_wait_secs() -> u64 {
    2
}

fn default_batch_size() -> usize {
    5
}

fn default_ack_timeout_secs() -> u64 {
    5
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

/// How the supervisor verdict is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorMode {
    /// Audit only; the original draft is always sent.
    #[default]
    Warn,
    /// Blocked or unreviewable drafts are replaced by a safe fallback.
    Block,
    /// Edits are applied, blocks fall back, review failures send the draft.
    Edit,
}

/// Supervisor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub mode: SupervisorMode,

    /// Upper bound on one review call.
    #[serde(default = "default_supervisor_latency_ms")]
    pub max_latency_ms: u64,

    /// Model used for review.
    #[serde(default = "default_supervisor_model")]
    pub model: String,

    /// Overrides the built-in compliance prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: SupervisorMode::default(),
            max_latency_ms: default_supervisor_latency_ms(),
            model: default_supervisor_model(),
            system_prompt: None,
        }
    }
}

fn default_supervisor_latency_ms() -> u64 {
    1500
}

fn default_supervisor_model() -> String {
    "claude-haiku-4-5".to_string()
}

/// Anthropic API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// API key. Falls back to `ANTHROPIC_API_KEY` when unset.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    /// Maximum tokens per supervisor response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_anthropic_base_url(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_max_tokens() -> u32 {
    256
}

/// Deposit defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DepositConfig {
    /// Amount used when neither the service nor the clinic names one.
    #[serde(default = "default_deposit_cents")]
    pub default_amount_cents: i64,

    /// Provider used when the clinic has none configured.
    #[serde(default)]
    pub default_provider: CheckoutProviderKind,
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            default_amount_cents: default_deposit_cents(),
            default_provider: CheckoutProviderKind::default(),
        }
    }
}

fn default_deposit_cents() -> i64 {
    5000
}

/// Outbox deliverer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutboxConfig {
    #[serde(default = "default_outbox_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_outbox_batch")]
    pub batch_size: usize,

    /// How long a claim hides an event from other deliverers.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_outbox_interval_ms(),
            batch_size: default_outbox_batch(),
            claim_lease_secs: default_claim_lease_secs(),
        }
    }
}

fn default_outbox_interval_ms() -> u64 {
    2000
}

fn default_outbox_batch() -> usize {
    25
}

fn default_claim_lease_secs() -> u64 {
    60
}

/// Retry sender configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySenderConfig {
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay; doubles per attempt, capped at 24 hours.
    #[serde(default = "default_retry_base_delay_secs")]
    pub base_delay_secs: u64,

    #[serde(default = "default_retry_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_retry_batch")]
    pub batch_size: usize,
}

impl Default for RetrySenderConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            base_delay_secs: default_retry_base_delay_secs(),
            interval_secs: default_retry_interval_secs(),
            batch_size: default_retry_batch(),
        }
    }
}

fn default_retry_max_attempts() -> u32 {
    5
}

fn default_retry_base_delay_secs() -> u64 {
    300
}

fn default_retry_interval_secs() -> u64 {
    60
}

fn default_retry_batch() -> usize {
    25
}

/// Hosted-number poller configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HostedPollerConfig {
    #[serde(default = "default_hosted_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_hosted_batch")]
    pub batch_size: usize,
}

impl Default for HostedPollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_hosted_interval_secs(),
            batch_size: default_hosted_batch(),
        }
    }
}

fn default_hosted_interval_secs() -> u64 {
    600
}

fn default_hosted_batch() -> usize {
    20
}

/// Telnyx configuration. `api_key = None` disables the messaging workers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelnyxConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_telnyx_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub messaging_profile_id: Option<String>,
}

impl Default for TelnyxConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_telnyx_base_url(),
            messaging_profile_id: None,
        }
    }
}

fn default_telnyx_base_url() -> String {
    "https://api.telnyx.com/v2".to_string()
}

/// Logging and metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus scrape listener, e.g. `0.0.0.0:9090`. Unset disables metrics export.
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_addr: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
