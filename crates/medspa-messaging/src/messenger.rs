// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SMS reply delivery that leaves a persisted trail for the retry sender.

use std::sync::Arc;

use async_trait::async_trait;
use medspa_core::types::{OutboundMessage, OutboundReply, SmsRequest};
use medspa_core::{MedspaError, OutboundMessageStore, ReplyMessenger, SmsSender};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics;
use crate::retry::DEFAULT_SENT_STATUS;

/// Persists each reply as `pending`, then sends it.
///
/// A provider failure is recorded against the row and not returned: the
/// reply is owned by the [`RetrySender`](crate::RetrySender) from then on.
/// Only a failure to persist is an error.
pub struct SmsReplyMessenger {
    store: Arc<dyn OutboundMessageStore>,
    sender: Arc<dyn SmsSender>,
}

impl SmsReplyMessenger {
    pub fn new(store: Arc<dyn OutboundMessageStore>, sender: Arc<dyn SmsSender>) -> Self {
        Self { store, sender }
    }
}

#[async_trait]
impl ReplyMessenger for SmsReplyMessenger {
    async fn send_reply(&self, reply: &OutboundReply) -> Result<(), MedspaError> {
        let message = OutboundMessage {
            id: Uuid::new_v4().to_string(),
            org_id: reply.org_id.clone(),
            conversation_id: reply.conversation_id.clone(),
            from: reply.from.clone(),
            to: reply.to.clone(),
            body: reply.body.clone(),
            status: "pending".into(),
            send_attempts: 0,
            provider_message_id: None,
            last_error: None,
            next_retry_at: None,
        };
        self.store.insert_outbound(&message).await?;

        let request = SmsRequest {
            from: message.from.clone(),
            to: message.to.clone(),
            body: message.body.clone(),
        };
        match self.sender.send_sms(&request).await {
            Ok(result) => {
                let status = result.status.as_deref().unwrap_or(DEFAULT_SENT_STATUS);
                self.store
                    .record_sent(&message.id, &result.provider_message_id, status)
                    .await?;
                metrics::record_send("sent");
                debug!(message_id = %message.id, provider_message_id = %result.provider_message_id, "sms reply sent");
            }
            Err(e) => {
                metrics::record_send("failed");
                warn!(message_id = %message.id, conversation_id = %message.conversation_id, error = %e, "sms reply failed, queued for retry");
                self.store
                    .record_send_failure(&message.id, &e.to_string())
                    .await?;
            }
        }
        Ok(())
    }
}
