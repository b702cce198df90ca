// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Work-distribution queue trait.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::MedspaError;
use crate::types::QueueMessage;

/// FIFO queue handing each message to one receiver at a time.
///
/// Delivery is at-least-once: a message that is received but never acked is
/// delivered again later, so consumers must be idempotent.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Backend name for logs and metrics.
    fn name(&self) -> &str;

    /// Appends a message. Unavailability or a full buffer is an error the
    /// producer must surface; nothing is dropped silently.
    async fn enqueue(&self, body: String) -> Result<(), MedspaError>;

    /// Waits up to `wait` for at least one message and returns at most `max`.
    /// An empty vec means the wait elapsed.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<QueueMessage>, MedspaError>;

    /// Removes a processed message so it is not redelivered.
    async fn ack(&self, message: &QueueMessage) -> Result<(), MedspaError>;
}
