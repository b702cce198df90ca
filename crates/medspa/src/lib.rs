// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process wiring for the `medspa` binary.

pub mod context;
pub mod notifier;
pub mod purge;
pub mod serve;
pub mod service;
pub mod telemetry;

pub use context::AppContext;
