// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock conversation service for deterministic testing.
//!
//! `MockService` implements `ConversationService` with a FIFO script of
//! replies, failures and panics, and records every request it receives.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use medspa_core::types::{ConversationRequest, ServiceReply};
use medspa_core::{ConversationService, MedspaError};

/// One scripted service call.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(ServiceReply),
    Fail(String),
    Panic(String),
}

/// A conversation service that plays back a script.
///
/// When the script is empty, a plain reply with body `"mock reply"` is returned.
#[derive(Clone, Default)]
pub struct MockService {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<ConversationRequest>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a service pre-loaded with replies.
    pub fn with_replies(replies: Vec<ServiceReply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(
                replies.into_iter().map(Scripted::Reply).collect(),
            )),
            requests: Arc::default(),
        }
    }

    pub async fn push_reply(&self, reply: ServiceReply) {
        self.script.lock().await.push_back(Scripted::Reply(reply));
    }

    /// The next call returns a provider error with `message`.
    pub async fn push_failure(&self, message: &str) {
        self.script
            .lock()
            .await
            .push_back(Scripted::Fail(message.to_string()));
    }

    /// The next call panics with `message`.
    pub async fn push_panic(&self, message: &str) {
        self.script
            .lock()
            .await
            .push_back(Scripted::Panic(message.to_string()));
    }

    /// Every request seen so far, in call order.
    pub async fn requests(&self) -> Vec<ConversationRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    async fn next(&self, request: &ConversationRequest) -> Result<ServiceReply, MedspaError> {
        self.requests.lock().await.push(request.clone());
        let step = self.script.lock().await.pop_front();
        match step {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Fail(message)) => Err(MedspaError::provider(message)),
            Some(Scripted::Panic(message)) => panic!("{message}"),
            None => Ok(ServiceReply {
                message: "mock reply".to_string(),
                ..ServiceReply::default()
            }),
        }
    }
}

#[async_trait]
impl ConversationService for MockService {
    async fn start(&self, request: &ConversationRequest) -> Result<ServiceReply, MedspaError> {
        self.next(request).await
    }

    async fn process(&self, request: &ConversationRequest) -> Result<ServiceReply, MedspaError> {
        self.next(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plays_script_then_default() {
        let service = MockService::with_replies(vec![ServiceReply {
            message: "first".into(),
            ..ServiceReply::default()
        }]);
        service.push_failure("llm down").await;

        let request = ConversationRequest::default();
        assert_eq!(service.process(&request).await.unwrap().message, "first");
        assert!(service.process(&request).await.is_err());
        assert_eq!(service.start(&request).await.unwrap().message, "mock reply");
        assert_eq!(service.call_count().await, 3);
    }
}
