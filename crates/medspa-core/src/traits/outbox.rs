// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transactional outbox and idempotency ledger traits.
//!
//! Outbox inserts are not part of [`OutboxStore`]: they must run inside the
//! transaction of the business write they describe, so each backend exposes
//! them next to that write instead.

use async_trait::async_trait;

use crate::error::MedspaError;
use crate::events::OutboxEvent;
use crate::types::ProcessedMark;

/// Delivery-side view of the outbox.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Leases up to `limit` undispatched events to the caller. A leased event
    /// is invisible to other claimers until the lease expires or is released.
    async fn claim_undispatched(&self, limit: usize) -> Result<Vec<OutboxEvent>, MedspaError>;

    /// Flips `dispatched` to true. Returns false if it was already dispatched.
    async fn mark_dispatched(&self, event_id: &str) -> Result<bool, MedspaError>;

    /// Drops the lease so the next poll can claim the event again.
    async fn release_claim(&self, event_id: &str) -> Result<(), MedspaError>;
}

/// At-most-once gate keyed by (provider, provider event id).
#[async_trait]
pub trait ProcessedStore: Send + Sync {
    async fn already_processed(&self, provider: &str, event_id: &str)
    -> Result<bool, MedspaError>;

    /// Records the event. A second call for the same key returns
    /// [`ProcessedMark::AlreadyProcessed`] and the caller must skip side effects.
    async fn mark_processed(
        &self,
        provider: &str,
        event_id: &str,
    ) -> Result<ProcessedMark, MedspaError>;

    /// Removes a mark whose side effect never happened, so the provider's
    /// retry is accepted again.
    async fn clear_processed(&self, provider: &str, event_id: &str) -> Result<(), MedspaError>;
}
