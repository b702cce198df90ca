// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for medspa pipeline tests.
//!
//! Provides recording mocks for every pipeline collaborator and a harness
//! that wires a temp SQLite store, the in-process queue, the publisher and
//! the job processor, so tests run without Redis or provider APIs.
//!
//! # Components
//!
//! - [`MockService`] - Conversation service with scripted replies
//! - [`MockMessenger`] - Reply messenger that captures outbound replies
//! - [`mocks`] - Notifier, booking, purger, supervisor, checkout, LLM, SMS and queue doubles
//! - [`TestHarness`] - A wired pipeline over temp storage

pub mod harness;
pub mod mock_messenger;
pub mod mock_service;
pub mod mocks;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_messenger::MockMessenger;
pub use mock_service::MockService;
