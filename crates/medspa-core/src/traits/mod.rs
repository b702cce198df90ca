// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions for the conversation pipeline.
//!
//! Every seam the pipeline talks through is a trait here, object-safe and
//! `#[async_trait]`, so backends are swapped at construction time and the
//! worker never branches on which implementation it holds.

pub mod conversation;
pub mod jobs;
pub mod messaging;
pub mod outbox;
pub mod payments;
pub mod queue;
pub mod review;

pub use conversation::{
    ClinicConfigStore, ConversationService, ConversationStore, ReplyMessenger, TranscriptRecorder,
};
pub use jobs::{JobRecorder, JobStore, JobUpdater};
pub use messaging::{HostedOrderClient, HostedOrderStore, OutboundMessageStore, SmsSender};
pub use outbox::{OutboxStore, ProcessedStore};
pub use payments::{
    BookingAdapter, CheckoutProvider, Notifier, PaymentLedger, PaymentStatusChecker,
    SandboxPurger, UrlShortener,
};
pub use queue::Queue;
pub use review::{AuditLog, LlmClient, Supervisor};
