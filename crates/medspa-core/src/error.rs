// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the medspa conversation pipeline.

use thiserror::Error;

/// The primary error type shared by every pipeline component and collaborator trait.
#[derive(Debug, Error)]
pub enum MedspaError {
    /// Configuration errors (invalid TOML, inconsistent backend selection).
    #[error("configuration error: {0}")]
    Config(String),

    /// Relational or key-value store errors (connection, query, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Queue backend errors on enqueue, receive or ack.
    #[error("queue error: {message}")]
    Queue {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The in-process queue buffer is full; the producer must surface this.
    #[error("queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// LLM or payment provider errors (API failure, rejected checkout).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Outbound messaging errors (SMS provider rejection, transport failure).
    #[error("messaging error: {message}")]
    Messaging {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The job does not exist (or its record has expired).
    #[error("job not found: {job_id}")]
    JobNotFound { job_id: String },

    /// The job is already terminal and cannot change status again.
    #[error("job {job_id} is already {status}")]
    InvalidTransition { job_id: String, status: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Input failed validation (malformed identifiers, missing fields).
    #[error("validation error: {0}")]
    Validation(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MedspaError {
    /// Wraps any error as a storage failure.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        MedspaError::Storage {
            source: Box::new(err),
        }
    }

    /// Builds a queue error with an optional underlying cause.
    pub fn queue(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        MedspaError::Queue {
            message: message.into(),
            source,
        }
    }

    /// Builds a provider error without an underlying cause.
    pub fn provider(message: impl Into<String>) -> Self {
        MedspaError::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a messaging error without an underlying cause.
    pub fn messaging(message: impl Into<String>) -> Self {
        MedspaError::Messaging {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true for failures a later retry may resolve (queue, store, timeouts).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MedspaError::Storage { .. }
                | MedspaError::Queue { .. }
                | MedspaError::QueueFull { .. }
                | MedspaError::Timeout { .. }
        )
    }
}
