// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job status store roles.

use async_trait::async_trait;

use crate::error::MedspaError;
use crate::types::JobRecord;

/// Creates job records. Only the publisher holds this role.
#[async_trait]
pub trait JobRecorder: Send + Sync {
    async fn create(&self, job: &JobRecord) -> Result<(), MedspaError>;
}

/// Moves jobs through their lifecycle.
///
/// Every transition fails with [`MedspaError::JobNotFound`] for an unknown or
/// expired job and [`MedspaError::InvalidTransition`] once the job is terminal.
#[async_trait]
pub trait JobUpdater: Send + Sync {
    async fn mark_processing(&self, job_id: &str, attempt: u32) -> Result<(), MedspaError>;

    async fn mark_completed(&self, job_id: &str, result: Option<&str>)
    -> Result<(), MedspaError>;

    async fn mark_failed(&self, job_id: &str, reason: &str) -> Result<(), MedspaError>;
}

/// A full job store backend: both roles plus polling reads.
#[async_trait]
pub trait JobStore: JobRecorder + JobUpdater {
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, MedspaError>;
}
