// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the pipeline's relational store traits.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use medspa_core::events::OutboxEvent;
use medspa_core::types::{
    AuditEntry, ClinicConfig, ConversationStatus, DepositRecord, HostedOrder, JobRecord,
    OutboundMessage, PaymentIntent, ProcessedMark, TranscriptEntry,
};
use medspa_core::{
    AuditLog, ClinicConfigStore, ConversationStore, HostedOrderStore, JobRecorder, JobStore,
    JobUpdater, MedspaError, OutboundMessageStore, OutboxStore, PaymentLedger,
    PaymentStatusChecker, ProcessedStore, TranscriptRecorder,
};

use crate::database::Database;
use crate::queries;
use crate::queries::jobs::Transition;

/// Tunables for [`SqliteStore`].
#[derive(Debug, Clone, Copy)]
pub struct SqliteStoreOptions {
    /// How long job records stay readable after creation.
    pub job_ttl: Duration,
    /// How long a claimed outbox event stays invisible to other claimers.
    pub claim_lease: Duration,
}

impl Default for SqliteStoreOptions {
    fn default() -> Self {
        Self {
            job_ttl: Duration::hours(24),
            claim_lease: Duration::seconds(60),
        }
    }
}

/// SQLite-backed store for jobs, outbox, ledger, conversations, payments, and messaging.
///
/// The database is opened by [`SqliteStore::initialize`]; every trait call
/// before that returns a storage error.
pub struct SqliteStore {
    path: String,
    options: SqliteStoreOptions,
    db: OnceCell<Database>,
}

impl SqliteStore {
    pub fn new(path: impl Into<String>, options: SqliteStoreOptions) -> Self {
        Self {
            path: path.into(),
            options,
            db: OnceCell::new(),
        }
    }

    /// Creates and initializes a store in one step.
    pub async fn open(
        path: impl Into<String>,
        options: SqliteStoreOptions,
    ) -> Result<Self, MedspaError> {
        let store = Self::new(path, options);
        store.initialize().await?;
        Ok(store)
    }

    pub async fn initialize(&self) -> Result<(), MedspaError> {
        let db = Database::open(&self.path).await?;
        self.db.set(db).map_err(|_| MedspaError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.path, "sqlite store initialized");
        Ok(())
    }

    /// Checkpoints the WAL. The connection itself closes on drop.
    pub async fn close(&self) -> Result<(), MedspaError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    fn db(&self) -> Result<&Database, MedspaError> {
        self.db.get().ok_or_else(|| MedspaError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    // --- Operator and test helpers ---

    pub async fn upsert_clinic(&self, clinic: &ClinicConfig) -> Result<(), MedspaError> {
        queries::clinics::upsert(self.db()?, clinic).await
    }

    pub async fn transcript(
        &self,
        org_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<TranscriptEntry>, MedspaError> {
        queries::conversations::transcript(self.db()?, org_id, conversation_id).await
    }

    pub async fn audit_entries(
        &self,
        org_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<AuditEntry>, MedspaError> {
        queries::audit::list_for_conversation(self.db()?, org_id, conversation_id).await
    }

    pub async fn append_outbox(&self, event: &OutboxEvent) -> Result<(), MedspaError> {
        queries::outbox::append(self.db()?, event).await
    }

    pub async fn outbox_event(&self, event_id: &str) -> Result<Option<OutboxEvent>, MedspaError> {
        queries::outbox::get(self.db()?, event_id).await
    }

    pub async fn outbox_events_of_type(
        &self,
        event_type: &str,
    ) -> Result<Vec<OutboxEvent>, MedspaError> {
        queries::outbox::list_by_type(self.db()?, event_type).await
    }

    pub async fn payment_intents(
        &self,
        org_id: &str,
        lead_id: &str,
    ) -> Result<Vec<PaymentIntent>, MedspaError> {
        queries::payments::list_for_lead(self.db()?, org_id, lead_id).await
    }

    pub async fn outbound_message(&self, id: &str) -> Result<Option<OutboundMessage>, MedspaError> {
        queries::messages::get(self.db()?, id).await
    }

    /// Deletes job records past their retention window.
    pub async fn purge_expired_jobs(&self, now: DateTime<Utc>) -> Result<usize, MedspaError> {
        queries::jobs::purge_expired(self.db()?, now).await
    }

    /// Removes a conversation's status, transcript, outbound messages and jobs.
    pub async fn purge_conversation(
        &self,
        org_id: &str,
        conversation_id: &str,
    ) -> Result<usize, MedspaError> {
        queries::conversations::purge(self.db()?, org_id, conversation_id).await
    }
}

// --- Jobs ---

#[async_trait]
impl JobRecorder for SqliteStore {
    async fn create(&self, job: &JobRecord) -> Result<(), MedspaError> {
        queries::jobs::create(self.db()?, job, self.options.job_ttl).await
    }
}

#[async_trait]
impl JobUpdater for SqliteStore {
    async fn mark_processing(&self, job_id: &str, attempt: u32) -> Result<(), MedspaError> {
        queries::jobs::transition(
            self.db()?,
            job_id,
            Transition::Processing { attempt },
            Utc::now(),
        )
        .await
    }

    async fn mark_completed(
        &self,
        job_id: &str,
        result: Option<&str>,
    ) -> Result<(), MedspaError> {
        queries::jobs::transition(
            self.db()?,
            job_id,
            Transition::Completed {
                result: result.map(str::to_string),
            },
            Utc::now(),
        )
        .await
    }

    async fn mark_failed(&self, job_id: &str, reason: &str) -> Result<(), MedspaError> {
        queries::jobs::transition(
            self.db()?,
            job_id,
            Transition::Failed {
                reason: reason.to_string(),
            },
            Utc::now(),
        )
        .await
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, MedspaError> {
        queries::jobs::get(self.db()?, job_id, Utc::now()).await
    }
}

// --- Outbox and processed-event ledger ---

#[async_trait]
impl OutboxStore for SqliteStore {
    async fn claim_undispatched(&self, limit: usize) -> Result<Vec<OutboxEvent>, MedspaError> {
        queries::outbox::claim_undispatched(self.db()?, limit, self.options.claim_lease, Utc::now())
            .await
    }

    async fn mark_dispatched(&self, event_id: &str) -> Result<bool, MedspaError> {
        queries::outbox::mark_dispatched(self.db()?, event_id, Utc::now()).await
    }

    async fn release_claim(&self, event_id: &str) -> Result<(), MedspaError> {
        queries::outbox::release_claim(self.db()?, event_id).await
    }
}

#[async_trait]
impl ProcessedStore for SqliteStore {
    async fn already_processed(
        &self,
        provider: &str,
        event_id: &str,
    ) -> Result<bool, MedspaError> {
        queries::processed::already_processed(self.db()?, provider, event_id).await
    }

    async fn mark_processed(
        &self,
        provider: &str,
        event_id: &str,
    ) -> Result<ProcessedMark, MedspaError> {
        queries::processed::mark_processed(self.db()?, provider, event_id, Utc::now()).await
    }

    async fn clear_processed(&self, provider: &str, event_id: &str) -> Result<(), MedspaError> {
        queries::processed::clear(self.db()?, provider, event_id).await
    }
}

// --- Conversations ---

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn status(
        &self,
        org_id: &str,
        conversation_id: &str,
    ) -> Result<Option<ConversationStatus>, MedspaError> {
        queries::conversations::status(self.db()?, org_id, conversation_id).await
    }

    async fn set_status(
        &self,
        org_id: &str,
        conversation_id: &str,
        status: ConversationStatus,
    ) -> Result<(), MedspaError> {
        queries::conversations::set_status(self.db()?, org_id, conversation_id, status, Utc::now())
            .await
    }
}

#[async_trait]
impl TranscriptRecorder for SqliteStore {
    async fn record(&self, entry: &TranscriptEntry) -> Result<(), MedspaError> {
        queries::conversations::append_message(self.db()?, entry, Utc::now()).await
    }
}

#[async_trait]
impl ClinicConfigStore for SqliteStore {
    async fn clinic(&self, org_id: &str) -> Result<Option<ClinicConfig>, MedspaError> {
        queries::clinics::get(self.db()?, org_id).await
    }
}

#[async_trait]
impl AuditLog for SqliteStore {
    async fn record(&self, entry: &AuditEntry) -> Result<(), MedspaError> {
        queries::audit::insert(self.db()?, entry, Utc::now()).await
    }
}

// --- Payments ---

#[async_trait]
impl PaymentStatusChecker for SqliteStore {
    async fn has_open_deposit(
        &self,
        org_id: &uuid::Uuid,
        lead_id: &uuid::Uuid,
    ) -> Result<bool, MedspaError> {
        queries::payments::has_open_deposit(self.db()?, &org_id.to_string(), &lead_id.to_string())
            .await
    }
}

#[async_trait]
impl PaymentLedger for SqliteStore {
    async fn record_deposit_request(
        &self,
        intent: &PaymentIntent,
        events: &[OutboxEvent],
    ) -> Result<DepositRecord, MedspaError> {
        queries::payments::record_deposit_request(self.db()?, intent, events).await
    }

    async fn apply_payment_outcome(
        &self,
        provider: &str,
        event_key: &str,
        booking_intent_id: Option<&str>,
        status: &str,
        event: &OutboxEvent,
    ) -> Result<ProcessedMark, MedspaError> {
        queries::payments::apply_payment_outcome(
            self.db()?,
            provider,
            event_key,
            booking_intent_id,
            status,
            event,
            Utc::now(),
        )
        .await
    }
}

// --- Messaging ---

#[async_trait]
impl OutboundMessageStore for SqliteStore {
    async fn insert_outbound(&self, message: &OutboundMessage) -> Result<(), MedspaError> {
        queries::messages::insert(self.db()?, message, Utc::now()).await
    }

    async fn list_retry_candidates(
        &self,
        limit: usize,
        max_attempts: u32,
    ) -> Result<Vec<OutboundMessage>, MedspaError> {
        queries::messages::list_retry_candidates(self.db()?, limit, max_attempts, Utc::now()).await
    }

    async fn record_sent(
        &self,
        id: &str,
        provider_message_id: &str,
        status: &str,
    ) -> Result<(), MedspaError> {
        queries::messages::record_sent(self.db()?, id, provider_message_id, status, Utc::now())
            .await
    }

    async fn record_send_failure(&self, id: &str, reason: &str) -> Result<(), MedspaError> {
        queries::messages::record_send_failure(self.db()?, id, reason, Utc::now()).await
    }

    async fn schedule_retry(
        &self,
        id: &str,
        next_retry_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), MedspaError> {
        queries::messages::schedule_retry(self.db()?, id, next_retry_at, reason, Utc::now()).await
    }

    async fn mark_permanently_failed(&self, id: &str, reason: &str) -> Result<(), MedspaError> {
        queries::messages::mark_permanently_failed(self.db()?, id, reason, Utc::now()).await
    }
}

#[async_trait]
impl HostedOrderStore for SqliteStore {
    async fn list_pending_hosted_orders(
        &self,
        limit: usize,
    ) -> Result<Vec<HostedOrder>, MedspaError> {
        queries::hosted_orders::list_pending(self.db()?, limit).await
    }

    async fn upsert_hosted_order(&self, order: &HostedOrder) -> Result<(), MedspaError> {
        queries::hosted_orders::upsert(self.db()?, order).await
    }
}
