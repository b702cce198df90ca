// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded in-memory queue.
//!
//! Producers never block: a full buffer is reported as
//! [`MedspaError::QueueFull`]. Messages are gone once received, so `ack` is a
//! no-op and every delivery is attempt 1. Nothing survives a restart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use medspa_core::types::QueueMessage;
use medspa_core::{MedspaError, Queue};

pub struct MemoryQueue {
    tx: mpsc::Sender<String>,
    rx: Mutex<mpsc::Receiver<String>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl MemoryQueue {
    /// Creates a queue holding at most `capacity` messages (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages currently buffered.
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn wrap(&self, body: String) -> QueueMessage {
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        QueueMessage {
            receipt: id.clone(),
            id,
            attempt: 1,
            body,
        }
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    fn name(&self) -> &str {
        "memory"
    }

    async fn enqueue(&self, body: String) -> Result<(), MedspaError> {
        self.tx.try_send(body).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => MedspaError::QueueFull {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => MedspaError::queue("queue closed", None),
        })
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<QueueMessage>, MedspaError> {
        let max = max.max(1);
        // Waiting for the lock counts against `wait` so concurrent receivers stay bounded.
        let received = tokio::time::timeout(wait, async {
            let mut rx = self.rx.lock().await;
            let first = rx.recv().await?;
            let mut bodies = vec![first];
            while bodies.len() < max {
                match rx.try_recv() {
                    Ok(body) => bodies.push(body),
                    Err(_) => break,
                }
            }
            Some(bodies)
        })
        .await;

        match received {
            Ok(Some(bodies)) => {
                debug!(count = bodies.len(), "memory queue delivered");
                Ok(bodies.into_iter().map(|b| self.wrap(b)).collect())
            }
            Ok(None) => Err(MedspaError::queue("queue closed", None)),
            Err(_elapsed) => Ok(Vec::new()),
        }
    }

    async fn ack(&self, _message: &QueueMessage) -> Result<(), MedspaError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn delivers_in_order_up_to_max() {
        let q = MemoryQueue::new(8);
        for i in 0..3 {
            q.enqueue(format!("m{i}")).await.unwrap();
        }
        assert_eq!(q.len(), 3);

        let batch = q.receive(2, Duration::from_millis(50)).await.unwrap();
        let bodies: Vec<_> = batch.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["m0", "m1"]);
        assert!(batch.iter().all(|m| m.attempt == 1));
        assert_ne!(batch[0].id, batch[1].id);

        let rest = q.receive(5, Duration::from_millis(50)).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn full_buffer_rejects_without_blocking() {
        let q = MemoryQueue::new(2);
        q.enqueue("a".into()).await.unwrap();
        q.enqueue("b".into()).await.unwrap();
        let err = q.enqueue("c".into()).await.unwrap_err();
        assert!(matches!(err, MedspaError::QueueFull { capacity: 2 }));
        assert!(err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_receive_returns_after_wait() {
        let q = MemoryQueue::new(1);
        let batch = q.receive(5, Duration::from_secs(2)).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn receiver_wakes_on_enqueue() {
        let q = Arc::new(MemoryQueue::new(4));
        let consumer = {
            let q = q.clone();
            tokio::spawn(async move { q.receive(1, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.enqueue("late".into()).await.unwrap();
        let batch = consumer.await.unwrap().unwrap();
        assert_eq!(batch[0].body, "late");
    }

    #[tokio::test]
    async fn each_message_delivered_once_across_receivers() {
        let q = Arc::new(MemoryQueue::new(64));
        for i in 0..40 {
            q.enqueue(i.to_string()).await.unwrap();
        }
        let mut handles = Vec::new();
        for _ in 0..4 {
            let q = q.clone();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                loop {
                    let batch = q.receive(3, Duration::from_millis(30)).await.unwrap();
                    if batch.is_empty() {
                        return got;
                    }
                    got.extend(batch.into_iter().map(|m| m.body));
                }
            }));
        }
        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all.sort_by_key(|b| b.parse::<u32>().unwrap());
        let expected: Vec<String> = (0..40).map(|i| i.to_string()).collect();
        assert_eq!(all, expected);
    }
}
