// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for pipeline integration tests.
//!
//! `TestHarness` wires a temp SQLite store, an in-process queue, the
//! publisher, intake helpers and a job processor whose collaborators are all
//! recording mocks. `run_queued()` drains the queue through the processor on
//! the test task, so tests stay deterministic without spawning workers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use medspa_config::model::SupervisorMode;
use medspa_core::types::{
    CheckoutProviderKind, ClinicConfig, ConversationRequest, ServiceReply, sms_conversation_id,
};
use medspa_core::{Channel, MedspaError, Queue};
use medspa_pipeline::{
    Capabilities, DepositDispatcher, JobOutcome, JobProcessor, MessageIntake, MessengerRegistry,
    OutboxDeliverer, OutboxDelivererConfig, OutboxRouter, PaymentIntake, Publisher,
    SupervisorGate, WorkerPool, WorkerPoolConfig,
};
use medspa_queue::MemoryQueue;
use medspa_storage::{SqliteStore, SqliteStoreOptions};

use crate::mock_messenger::MockMessenger;
use crate::mock_service::MockService;
use crate::mocks::{
    MockBooking, MockCheckout, MockNotifier, MockPurger, MockSupervisor, SupervisorBehavior,
};

/// Org id every harness clinic is seeded under.
pub const TEST_ORG_ID: &str = "6f1c1d7e-3a41-4c8e-9d55-0a7b1c2d3e4f";
/// Lead id used by [`TestHarness::sms_request`].
pub const TEST_LEAD_ID: &str = "0b8e6c52-7f0d-4a4e-8f3a-5d2c9e1b7a60";
pub const TEST_PATIENT_PHONE: &str = "+15550001111";
pub const TEST_CLINIC_PHONE: &str = "+15559990000";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    replies: Vec<ServiceReply>,
    queue_capacity: usize,
    supervisor: Option<(SupervisorBehavior, SupervisorMode, Duration)>,
    sandbox: bool,
    deposits: bool,
    seed_clinic: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            replies: Vec::new(),
            queue_capacity: 64,
            supervisor: None,
            sandbox: false,
            deposits: true,
            seed_clinic: true,
        }
    }

    /// Scripted conversation service replies, in call order.
    pub fn with_replies(mut self, replies: Vec<ServiceReply>) -> Self {
        self.replies = replies;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Gate replies through a mock supervisor.
    pub fn with_supervisor(
        mut self,
        behavior: SupervisorBehavior,
        mode: SupervisorMode,
        max_latency: Duration,
    ) -> Self {
        self.supervisor = Some((behavior, mode, max_latency));
        self
    }

    /// Enable sandbox auto-purge.
    pub fn sandbox(mut self) -> Self {
        self.sandbox = true;
        self
    }

    /// Build without a deposit dispatcher.
    pub fn without_deposits(mut self) -> Self {
        self.deposits = false;
        self
    }

    /// Build without seeding the test clinic's configuration.
    pub fn without_clinic(mut self) -> Self {
        self.seed_clinic = false;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, MedspaError> {
        let temp_dir = tempfile::TempDir::new().map_err(MedspaError::storage)?;
        let db_path = temp_dir.path().join("test.db");
        let store = Arc::new(
            SqliteStore::open(db_path.to_string_lossy(), SqliteStoreOptions::default()).await?,
        );
        if self.seed_clinic {
            store.upsert_clinic(&TestHarness::clinic()).await?;
        }

        let queue = Arc::new(MemoryQueue::new(self.queue_capacity));
        let publisher = Publisher::new(queue.clone(), store.clone());

        let service = MockService::with_replies(self.replies);
        let messenger = MockMessenger::new();
        let notifier = MockNotifier::new();
        let booking = MockBooking::new();
        let purger = MockPurger::new();
        let checkout = MockCheckout::new(CheckoutProviderKind::Fake);

        let messengers = [Channel::Sms, Channel::Webchat, Channel::Instagram]
            .into_iter()
            .fold(MessengerRegistry::new(), |registry, channel| {
                registry.with(channel, Arc::new(messenger.clone()))
            });

        let mut caps = Capabilities::new()
            .with_notifier(Arc::new(notifier.clone()))
            .with_booking(Arc::new(booking.clone()))
            .with_transcript(store.clone())
            .with_clinics(store.clone());
        if self.deposits {
            caps = caps.with_deposits(
                DepositDispatcher::new(store.clone(), store.clone())
                    .with_provider(Arc::new(checkout.clone()))
                    .with_clinics(store.clone())
                    .with_transcript(store.clone()),
            );
        }
        if self.sandbox {
            caps = caps.with_purger(Arc::new(purger.clone()));
        }
        let supervisor = match self.supervisor {
            Some((behavior, mode, max_latency)) => {
                let mock = MockSupervisor::new(behavior);
                caps = caps.with_supervisor(
                    SupervisorGate::new(Arc::new(mock.clone()), mode, max_latency)
                        .with_audit(store.clone()),
                );
                Some(mock)
            }
            None => None,
        };

        let processor = JobProcessor::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(service.clone()),
            messengers,
            caps,
        );

        Ok(TestHarness {
            message_intake: MessageIntake::new(store.clone(), publisher.clone()),
            payment_intake: PaymentIntake::new(store.clone()),
            store,
            queue,
            publisher,
            processor,
            service,
            messenger,
            notifier,
            booking,
            purger,
            checkout,
            supervisor,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete pipeline over temp storage with mock collaborators.
pub struct TestHarness {
    /// SQLite store (temp DB, cleaned up on drop).
    pub store: Arc<SqliteStore>,
    pub queue: Arc<MemoryQueue>,
    pub publisher: Publisher,
    pub processor: JobProcessor,
    pub message_intake: MessageIntake,
    pub payment_intake: PaymentIntake,
    pub service: MockService,
    /// Registered for SMS, webchat and Instagram.
    pub messenger: MockMessenger,
    pub notifier: MockNotifier,
    pub booking: MockBooking,
    /// Only wired when built with [`TestHarnessBuilder::sandbox`].
    pub purger: MockPurger,
    pub checkout: MockCheckout,
    pub supervisor: Option<MockSupervisor>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// The clinic seeded under [`TEST_ORG_ID`].
    pub fn clinic() -> ClinicConfig {
        ClinicConfig {
            org_id: TEST_ORG_ID.to_string(),
            clinic_name: "Glow Med Spa".to_string(),
            timezone: "America/Los_Angeles".to_string(),
            payment_provider: CheckoutProviderKind::Fake,
            deposit_amount_cents: 5000,
            callback_window: None,
        }
    }

    /// An inbound SMS from the test patient to the test clinic.
    pub fn sms_request(text: &str, provider_message_id: Option<&str>) -> ConversationRequest {
        ConversationRequest {
            org_id: TEST_ORG_ID.to_string(),
            lead_id: TEST_LEAD_ID.to_string(),
            conversation_id: sms_conversation_id(TEST_ORG_ID, TEST_PATIENT_PHONE),
            from: TEST_PATIENT_PHONE.to_string(),
            to: TEST_CLINIC_PHONE.to_string(),
            message: text.to_string(),
            provider_message_id: provider_message_id.map(str::to_string),
            metadata: BTreeMap::new(),
        }
    }

    pub fn conversation_id() -> String {
        sms_conversation_id(TEST_ORG_ID, TEST_PATIENT_PHONE)
    }

    /// Receives everything currently queued and runs it through the
    /// processor, acking the way a worker would.
    pub async fn run_queued(&self) -> Result<Vec<JobOutcome>, MedspaError> {
        let mut outcomes = Vec::new();
        while !self.queue.is_empty() {
            let batch = self.queue.receive(10, Duration::from_millis(20)).await?;
            for message in batch {
                let outcome = self.processor.handle(&message).await;
                if outcome.should_ack() {
                    self.queue.ack(&message).await?;
                }
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    /// Runs one outbox poll. Returns how many events were dispatched.
    pub async fn deliver_outbox(&self) -> Result<usize, MedspaError> {
        self.deliverer(OutboxDelivererConfig::default())
            .poll_once()
            .await
    }

    pub fn deliverer(&self, config: OutboxDelivererConfig) -> OutboxDeliverer {
        OutboxDeliverer::new(
            self.store.clone(),
            OutboxRouter::new(self.publisher.clone()),
            config,
        )
    }

    /// A pool over the harness queue and processor, not yet spawned.
    pub fn worker_pool(&self, config: WorkerPoolConfig) -> WorkerPool {
        WorkerPool::new(self.queue.clone(), self.processor.clone(), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medspa_pipeline::PublishOptions;

    #[tokio::test]
    async fn harness_runs_a_message_end_to_end() {
        let harness = TestHarness::builder().build().await.unwrap();
        harness
            .publisher
            .enqueue_message(
                &Publisher::new_job_id(),
                Channel::Sms,
                TestHarness::sms_request("hello", None),
                PublishOptions::default(),
            )
            .await
            .unwrap();

        let outcomes = harness.run_queued().await.unwrap();
        assert_eq!(outcomes, vec![JobOutcome::Completed]);
        assert_eq!(harness.messenger.bodies().await, vec!["mock reply"]);
    }
}
