// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation engine, state, and reply delivery traits.

use async_trait::async_trait;

use crate::error::MedspaError;
use crate::types::{
    ClinicConfig, ConversationRequest, ConversationStatus, OutboundReply, ServiceReply,
    TranscriptEntry,
};

/// The LLM conversation engine, opaque to the pipeline.
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Opens a conversation (missed call, web form) and drafts the first message.
    async fn start(&self, request: &ConversationRequest) -> Result<ServiceReply, MedspaError>;

    /// Handles one inbound patient message.
    async fn process(&self, request: &ConversationRequest) -> Result<ServiceReply, MedspaError>;
}

/// Conversation status, re-read on every job.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn status(
        &self,
        org_id: &str,
        conversation_id: &str,
    ) -> Result<Option<ConversationStatus>, MedspaError>;

    async fn set_status(
        &self,
        org_id: &str,
        conversation_id: &str,
        status: ConversationStatus,
    ) -> Result<(), MedspaError>;
}

/// Channel-specific outbound delivery.
#[async_trait]
pub trait ReplyMessenger: Send + Sync {
    async fn send_reply(&self, reply: &OutboundReply) -> Result<(), MedspaError>;
}

/// Appends conversation history.
#[async_trait]
pub trait TranscriptRecorder: Send + Sync {
    async fn record(&self, entry: &TranscriptEntry) -> Result<(), MedspaError>;
}

/// Read-mostly per-clinic settings.
#[async_trait]
pub trait ClinicConfigStore: Send + Sync {
    async fn clinic(&self, org_id: &str) -> Result<Option<ClinicConfig>, MedspaError>;
}
