// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the medspa conversation pipeline.
//!
//! This crate provides the shared error type, domain types, outbox event
//! payloads, and every collaborator trait the pipeline is wired through.
//! Backends (SQLite, Redis, HTTP providers) implement traits defined here.

pub mod error;
pub mod events;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::MedspaError;
pub use events::{JobPayload, OutboxEvent, QueueEnvelope};
pub use types::{Channel, ConversationStatus, JobRecord, JobStatus, ProcessedMark};

pub use traits::{
    AuditLog, BookingAdapter, CheckoutProvider, ClinicConfigStore, ConversationService,
    ConversationStore, HostedOrderClient, HostedOrderStore, JobRecorder, JobStore, JobUpdater,
    LlmClient, Notifier, OutboundMessageStore, OutboxStore, PaymentLedger, PaymentStatusChecker,
    ProcessedStore, Queue, ReplyMessenger, SandboxPurger, SmsSender, Supervisor,
    TranscriptRecorder, UrlShortener,
};
