// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules. Each takes `&Database` and runs through the shared connection;
//! `*_in_tx` helpers run inside a caller-owned transaction.

pub mod audit;
pub mod clinics;
pub mod conversations;
pub mod hosted_orders;
pub mod jobs;
pub mod messages;
pub mod outbox;
pub mod payments;
pub mod processed;
