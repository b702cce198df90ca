// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-lifetime wiring.
//!
//! [`AppContext`] is built once at startup from the validated configuration.
//! Backend selection (queue, job store) happens here and nowhere else; every
//! component below receives trait objects.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use medspa_anthropic::AnthropicLlm;
use medspa_config::model::{JobsBackend, MedspaConfig, QueueBackend};
use medspa_core::{
    Channel, ConversationService, HostedOrderClient, JobStore, MedspaError, Queue, SmsSender,
};
use medspa_messaging::{
    HostedPoller, HostedPollerSettings, RetrySender, RetrySenderSettings, SmsReplyMessenger,
    TelnyxClient,
};
use medspa_pipeline::{
    Capabilities, DepositDispatcher, FakeCheckoutProvider, JobProcessor, LlmSupervisor,
    MessageIntake, MessengerRegistry, OutboxDeliverer, OutboxDelivererConfig, OutboxRouter,
    PaymentIntake, Publisher, SupervisorGate, WorkerPool, WorkerPoolConfig,
};
use medspa_queue::MemoryQueue;
use medspa_storage::{SqliteStore, SqliteStoreOptions};

use crate::notifier::LogNotifier;
use crate::purge::SandboxAutoPurger;

pub struct AppContext {
    pub config: MedspaConfig,
    pub store: Arc<SqliteStore>,
    pub queue: Arc<dyn Queue>,
    pub jobs: Arc<dyn JobStore>,
    pub publisher: Publisher,
    sms: Option<Arc<dyn SmsSender>>,
    hosted_orders: Option<Arc<dyn HostedOrderClient>>,
    cancel: CancellationToken,
}

impl AppContext {
    /// Opens storage and connects the configured backends. `cancel` is the
    /// process shutdown token handed to every background loop.
    pub async fn init(config: MedspaConfig, cancel: CancellationToken) -> Result<Self, MedspaError> {
        let options = SqliteStoreOptions {
            job_ttl: seconds(config.jobs.ttl_secs),
            claim_lease: seconds(config.outbox.claim_lease_secs),
        };
        let store = Arc::new(SqliteStore::open(config.storage.database_path.clone(), options).await?);
        info!(path = %config.storage.database_path, "sqlite store ready");

        let queue = build_queue(&config)?;
        let jobs: Arc<dyn JobStore> = match config.jobs.backend {
            JobsBackend::Sqlite => store.clone(),
            JobsBackend::Redis => build_redis_jobs(&config)?,
        };
        info!(
            queue = queue.name(),
            jobs = ?config.jobs.backend,
            "pipeline backends selected"
        );
        let publisher = Publisher::new(queue.clone(), jobs.clone());

        let (sms, hosted_orders) = match TelnyxClient::from_config(&config.telnyx)? {
            Some(client) => {
                let client = Arc::new(client);
                info!("telnyx messaging enabled");
                (
                    Some(client.clone() as Arc<dyn SmsSender>),
                    Some(client as Arc<dyn HostedOrderClient>),
                )
            }
            None => {
                warn!("telnyx.api_key not set, SMS replies and hosted-number polling are disabled");
                (None, None)
            }
        };

        Ok(Self {
            config,
            store,
            queue,
            jobs,
            publisher,
            sms,
            hosted_orders,
            cancel,
        })
    }

    /// Replaces the SMS provider.
    pub fn with_sms_sender(mut self, sender: Arc<dyn SmsSender>) -> Self {
        self.sms = Some(sender);
        self
    }

    /// Replaces the hosted-number order provider.
    pub fn with_hosted_order_client(mut self, client: Arc<dyn HostedOrderClient>) -> Self {
        self.hosted_orders = Some(client);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn message_intake(&self) -> MessageIntake {
        MessageIntake::new(self.store.clone(), self.publisher.clone())
    }

    pub fn payment_intake(&self) -> PaymentIntake {
        PaymentIntake::new(self.store.clone())
    }

    /// Reply messengers by channel. Voice never needs one.
    pub fn messengers(&self) -> MessengerRegistry {
        let mut registry = MessengerRegistry::new();
        if let Some(sms) = &self.sms {
            registry.register(
                Channel::Sms,
                Arc::new(SmsReplyMessenger::new(self.store.clone(), sms.clone())),
            );
        }
        registry
    }

    /// Optional worker collaborators per configuration.
    pub fn capabilities(&self) -> Result<Capabilities, MedspaError> {
        let mut caps = Capabilities::new()
            .with_notifier(Arc::new(LogNotifier))
            .with_transcript(self.store.clone())
            .with_clinics(self.store.clone())
            .with_deposits(
                DepositDispatcher::new(self.store.clone(), self.store.clone())
                    .with_provider(Arc::new(FakeCheckoutProvider::default()))
                    .with_clinics(self.store.clone())
                    .with_transcript(self.store.clone())
                    .with_defaults(
                        self.config.deposit.default_provider,
                        self.config.deposit.default_amount_cents,
                    ),
            );

        if self.config.supervisor.enabled {
            caps = caps.with_supervisor(self.supervisor_gate()?);
        }
        if let Some(purger) = SandboxAutoPurger::from_config(
            self.store.clone(),
            &self.config.worker,
            self.cancel.clone(),
        ) {
            caps = caps.with_purger(Arc::new(purger));
        }
        Ok(caps)
    }

    fn supervisor_gate(&self) -> Result<SupervisorGate, MedspaError> {
        let supervisor_config = &self.config.supervisor;
        let llm = AnthropicLlm::from_config(&self.config.anthropic)?;
        let mut supervisor = LlmSupervisor::new(Arc::new(llm), supervisor_config.model.clone())
            .with_max_tokens(self.config.anthropic.max_tokens);
        if let Some(prompt) = &supervisor_config.system_prompt {
            supervisor = supervisor.with_system_prompt(prompt.clone());
        }
        info!(
            mode = ?supervisor_config.mode,
            model = %supervisor_config.model,
            max_latency_ms = supervisor_config.max_latency_ms,
            "supervisor enabled"
        );
        Ok(SupervisorGate::new(
            Arc::new(supervisor),
            supervisor_config.mode,
            Duration::from_millis(supervisor_config.max_latency_ms),
        )
        .with_audit(self.store.clone()))
    }

    pub fn processor(
        &self,
        service: Arc<dyn ConversationService>,
    ) -> Result<JobProcessor, MedspaError> {
        Ok(JobProcessor::new(
            self.jobs.clone(),
            self.store.clone(),
            self.store.clone(),
            service,
            self.messengers(),
            self.capabilities()?,
        ))
    }

    pub fn worker_pool(&self, processor: JobProcessor) -> WorkerPool {
        WorkerPool::new(
            self.queue.clone(),
            processor,
            WorkerPoolConfig::from(&self.config.worker),
        )
    }

    pub fn deliverer(&self) -> OutboxDeliverer {
        OutboxDeliverer::new(
            self.store.clone(),
            OutboxRouter::new(self.publisher.clone()),
            OutboxDelivererConfig::from(&self.config.outbox),
        )
    }

    /// `None` without an SMS provider.
    pub fn retry_sender(&self) -> Option<RetrySender> {
        let sms = self.sms.clone()?;
        Some(RetrySender::new(
            self.store.clone(),
            sms,
            RetrySenderSettings::from(&self.config.retry_sender),
        ))
    }

    /// `None` without a hosted-number provider.
    pub fn hosted_poller(&self) -> Option<HostedPoller> {
        let client = self.hosted_orders.clone()?;
        Some(HostedPoller::new(
            self.store.clone(),
            client,
            HostedPollerSettings::from(&self.config.hosted_poller),
        ))
    }

    /// Flushes storage on the way out.
    pub async fn close(&self) {
        if let Err(e) = self.store.close().await {
            warn!(error = %e, "failed to checkpoint sqlite on shutdown");
        }
    }
}

/// Upper bound for retention settings, so timestamp arithmetic cannot overflow.
const MAX_RETENTION_SECS: u64 = 10 * 365 * 86_400;

fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_RETENTION_SECS) as i64)
}

fn redis_url(config: &MedspaConfig) -> Result<&str, MedspaError> {
    config
        .storage
        .redis_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| MedspaError::Config("storage.redis_url is required for redis backends".into()))
}

fn build_queue(config: &MedspaConfig) -> Result<Arc<dyn Queue>, MedspaError> {
    match config.queue.backend {
        QueueBackend::Memory => Ok(Arc::new(MemoryQueue::new(config.queue.capacity))),
        QueueBackend::Redis => build_redis_queue(config),
    }
}

#[cfg(feature = "redis")]
fn build_redis_queue(config: &MedspaConfig) -> Result<Arc<dyn Queue>, MedspaError> {
    use medspa_queue::{RedisStreamQueue, RedisStreamQueueOptions};

    let opts = RedisStreamQueueOptions {
        stream: config.queue.stream.clone(),
        group: config.queue.group.clone(),
        consumer: config
            .queue
            .consumer
            .clone()
            .unwrap_or_else(|| format!("worker-{}", std::process::id())),
        visibility_timeout: Duration::from_secs(config.queue.visibility_timeout_secs),
    };
    info!(stream = %opts.stream, group = %opts.group, consumer = %opts.consumer, "redis stream queue");
    Ok(Arc::new(RedisStreamQueue::new(redis_url(config)?, opts)?))
}

#[cfg(feature = "redis")]
fn build_redis_jobs(config: &MedspaConfig) -> Result<Arc<dyn JobStore>, MedspaError> {
    let store = medspa_storage::RedisJobStore::new(redis_url(config)?, config.jobs.ttl_secs)?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
fn build_redis_queue(config: &MedspaConfig) -> Result<Arc<dyn Queue>, MedspaError> {
    redis_url(config)?;
    Err(MedspaError::Config(
        "queue.backend = \"redis\" needs a build with the redis feature".into(),
    ))
}

#[cfg(not(feature = "redis"))]
fn build_redis_jobs(config: &MedspaConfig) -> Result<Arc<dyn JobStore>, MedspaError> {
    redis_url(config)?;
    Err(MedspaError::Config(
        "jobs.backend = \"redis\" needs a build with the redis feature".into(),
    ))
}
