// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Asynchronous conversation event pipeline.
//!
//! Inbound webhooks become durably queued jobs through the [`Publisher`];
//! a [`WorkerPool`] drains the queue and runs each job through the
//! conversation service, the optional [`SupervisorGate`], and the side-effect
//! chain (notify, deposit, booking, sandbox purge, reply). Payment facts and
//! deposit replies travel through the transactional outbox and are
//! re-injected by the [`OutboxDeliverer`].

pub mod capabilities;
pub mod deliverer;
pub mod deposit;
pub mod guard;
pub mod intake;
pub mod messengers;
pub mod metrics;
pub mod payment;
pub mod processor;
pub mod publisher;
pub mod shutdown;
pub mod supervisor;
pub mod worker;

pub use capabilities::Capabilities;
pub use deliverer::{OutboxDeliverer, OutboxDelivererConfig, OutboxRouter, RouteOutcome};
pub use deposit::{DepositDispatcher, DepositOutcome, FakeCheckoutProvider};
pub use guard::{OutputScan, scan_output};
pub use intake::{IntakeOutcome, MessageIntake, PaymentIntake};
pub use messengers::MessengerRegistry;
pub use processor::{FALLBACK_REPLY, JobOutcome, JobProcessor};
pub use publisher::{PublishOptions, Publisher};
pub use supervisor::{GateResult, LlmSupervisor, SupervisorGate};
pub use worker::{WorkerPool, WorkerPoolConfig, WorkerPoolHandle};

/// Ledger provider for completed conversation jobs.
pub const JOB_LEDGER_PROVIDER: &str = "conversation.job";
/// Ledger provider for delivered outbox replies.
pub const REPLY_LEDGER_PROVIDER: &str = "conversation.reply";
/// Ledger provider for payment-succeeded side effects.
pub const PAYMENT_SUCCEEDED_LEDGER_PROVIDER: &str = "conversation.payment_succeeded.v1";
/// Ledger provider for payment-failed side effects.
pub const PAYMENT_FAILED_LEDGER_PROVIDER: &str = "conversation.payment_failed.v1";
