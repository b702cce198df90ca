// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-size pool of receive-process-ack loops.
//!
//! Each worker long-polls the [`Queue`] for a batch, hands every message to
//! the shared [`JobProcessor`] and acks it unless the outcome was deferred.
//! Receive errors back off exponentially from one to five seconds. Acks run
//! under their own timeout so a stalled broker cannot wedge a worker.
//!
//! Shutdown is cooperative: cancelling the token stops new receives, and
//! [`WorkerPoolHandle::shutdown`] waits for in-flight jobs up to a bound.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, warn};

use medspa_config::model::WorkerConfig;
use medspa_core::Queue;
use medspa_core::types::QueueMessage;

use crate::processor::JobProcessor;
use crate::shutdown;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Sizing and timeouts for a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers. Zero is treated as one.
    pub count: usize,
    /// Messages requested per receive.
    pub batch_size: usize,
    /// Long-poll wait per receive.
    pub receive_wait: Duration,
    /// Upper bound on a single ack call.
    pub ack_timeout: Duration,
    /// How long [`WorkerPoolHandle::shutdown`] waits for in-flight jobs.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            count: 2,
            batch_size: 5,
            receive_wait: Duration::from_secs(2),
            ack_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&WorkerConfig> for WorkerPoolConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            count: config.count,
            batch_size: config.batch_size,
            receive_wait: Duration::from_secs(config.receive_wait_secs),
            ack_timeout: Duration::from_secs(config.ack_timeout_secs),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        }
    }
}

/// A not-yet-started set of workers sharing one queue and one processor.
///
/// ```ignore
/// let handle = WorkerPool::new(queue, processor, WorkerPoolConfig::default())
///     .spawn(cancel.clone());
/// // ...
/// let drained = handle.shutdown().await;
/// ```
pub struct WorkerPool {
    queue: Arc<dyn Queue>,
    processor: Arc<JobProcessor>,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn Queue>, processor: JobProcessor, config: WorkerPoolConfig) -> Self {
        Self {
            queue,
            processor: Arc::new(processor),
            config,
        }
    }

    /// Starts `count` workers. They stop receiving once `cancel` fires and
    /// finish the job they hold.
    pub fn spawn(self, cancel: CancellationToken) -> WorkerPoolHandle {
        self.processor.capabilities().log_absent();
        let tracker = TaskTracker::new();
        for id in 0..self.config.count.max(1) {
            let worker = Worker {
                id,
                queue: self.queue.clone(),
                processor: self.processor.clone(),
                config: self.config,
            };
            let span = info_span!("worker", worker_id = id);
            tracker.spawn(worker.run(cancel.clone()).instrument(span));
        }
        tracker.close();
        info!(
            workers = self.config.count.max(1),
            queue = self.queue.name(),
            "worker pool started"
        );
        WorkerPoolHandle {
            tracker,
            cancel,
            shutdown_timeout: self.config.shutdown_timeout,
        }
    }
}

/// Handle to a running pool, returned by [`WorkerPool::spawn`].
pub struct WorkerPoolHandle {
    tracker: TaskTracker,
    cancel: CancellationToken,
    shutdown_timeout: Duration,
}

impl WorkerPoolHandle {
    /// Cancels the pool and waits, bounded by the shutdown timeout, for
    /// in-flight jobs. Returns false if work was abandoned.
    pub async fn shutdown(self) -> bool {
        self.cancel.cancel();
        shutdown::drain(&self.tracker, self.shutdown_timeout).await
    }

    /// Waits for every worker to exit.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// True once every worker task has exited.
    pub fn is_finished(&self) -> bool {
        self.tracker.is_empty()
    }
}

struct Worker {
    id: usize,
    queue: Arc<dyn Queue>,
    processor: Arc<JobProcessor>,
    config: WorkerPoolConfig,
}

impl Worker {
    async fn run(self, cancel: CancellationToken) {
        debug!("worker started");
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.queue.receive(self.config.batch_size, self.config.receive_wait) => received,
            };

            let messages = match received {
                Ok(messages) => {
                    backoff = INITIAL_BACKOFF;
                    messages
                }
                Err(e) => {
                    error!(error = %e, retry_in_ms = backoff.as_millis() as u64, "queue receive failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            };

            for message in messages {
                // Jobs already received run to completion even during shutdown.
                let outcome = self.processor.handle(&message).await;
                if outcome.should_ack() {
                    self.ack(&message).await;
                } else {
                    debug!(message_id = %message.id, ?outcome, "leaving message for redelivery");
                }
            }
        }
        debug!(worker_id = self.id, "worker stopped");
    }

    async fn ack(&self, message: &QueueMessage) {
        match tokio::time::timeout(self.config.ack_timeout, self.queue.ack(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(message_id = %message.id, error = %e, "ack failed, message may be redelivered"),
            Err(_) => warn!(
                message_id = %message.id,
                timeout_ms = self.config.ack_timeout.as_millis() as u64,
                "ack timed out, message may be redelivered"
            ),
        }
    }
}
