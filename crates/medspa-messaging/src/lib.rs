// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound messaging delivery.
//!
//! Two background loops that work purely against persisted state and can run
//! in their own process: the [`RetrySender`] resends failed SMS and the
//! [`HostedPoller`] tracks hosted-number orders. [`TelnyxClient`] is the
//! provider behind both, and [`SmsReplyMessenger`] is the SMS channel's
//! reply path for conversation workers.

pub mod hosted;
pub mod messenger;
pub mod metrics;
pub mod retry;
pub mod telnyx;

pub use hosted::{HostedPoller, HostedPollerSettings};
pub use messenger::SmsReplyMessenger;
pub use retry::{RetryPass, RetrySender, RetrySenderSettings, backoff_delay};
pub use telnyx::TelnyxClient;
