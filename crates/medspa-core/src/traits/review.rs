// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reply review, audit, and LLM completion traits.

use async_trait::async_trait;

use crate::error::MedspaError;
use crate::types::{AuditEntry, LlmRequest, ReviewRequest, SupervisorDecision};

/// Independent reviewer for drafted replies.
#[async_trait]
pub trait Supervisor: Send + Sync {
    async fn review(&self, request: &ReviewRequest) -> Result<SupervisorDecision, MedspaError>;
}

/// Append-only compliance audit trail.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<(), MedspaError>;
}

/// Single-turn text completion.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<String, MedspaError>;
}
