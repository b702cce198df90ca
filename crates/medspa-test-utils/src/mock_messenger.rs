// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock reply messenger that captures outbound replies for assertions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use medspa_core::types::OutboundReply;
use medspa_core::{MedspaError, ReplyMessenger};

#[derive(Clone, Default)]
pub struct MockMessenger {
    sent: Arc<Mutex<Vec<OutboundReply>>>,
    failing: Arc<AtomicBool>,
}

impl MockMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every send fails with a messaging error and nothing is captured.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<OutboundReply> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn bodies(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|r| r.body.clone()).collect()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl ReplyMessenger for MockMessenger {
    async fn send_reply(&self, reply: &OutboundReply) -> Result<(), MedspaError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MedspaError::messaging("mock messenger failure"));
        }
        self.sent.lock().await.push(reply.clone());
        Ok(())
    }
}
