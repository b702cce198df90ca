// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redis-backed job status store for multi-process deployments.
//!
//! Each record is a JSON value under `{prefix}:{job_id}` with a TTL set at
//! creation. Updates use `SET XX KEEPTTL` so they never resurrect an expired
//! record or extend its lifetime. A job is only ever updated by the worker
//! holding its queue message, so the read-modify-write is not contended.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use tokio::sync::OnceCell;
use tracing::debug;

use medspa_core::types::{JobRecord, JobStatus};
use medspa_core::{JobRecorder, JobStore, JobUpdater, MedspaError};

const DEFAULT_PREFIX: &str = "medspa:job";

pub struct RedisJobStore {
    client: redis::Client,
    conn: OnceCell<MultiplexedConnection>,
    prefix: String,
    ttl_secs: u64,
}

impl RedisJobStore {
    /// Parses the URL; the connection opens on first use.
    pub fn new(redis_url: &str, ttl_secs: u64) -> Result<Self, MedspaError> {
        let client = redis::Client::open(redis_url).map_err(MedspaError::storage)?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            prefix: DEFAULT_PREFIX.to_string(),
            ttl_secs,
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, job_id: &str) -> String {
        format!("{}:{job_id}", self.prefix)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, MedspaError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(MedspaError::storage)
            })
            .await?;
        Ok(conn.clone())
    }

    async fn load(&self, job_id: &str) -> Result<Option<JobRecord>, MedspaError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.key(job_id))
            .query_async(&mut conn)
            .await
            .map_err(MedspaError::storage)?;
        raw.map(|json| serde_json::from_str(&json).map_err(MedspaError::storage))
            .transpose()
    }

    /// Rewrites a live record in place. Returns false if the key expired meanwhile.
    async fn store(&self, job: &JobRecord) -> Result<bool, MedspaError> {
        let mut conn = self.connection().await?;
        let json = serde_json::to_string(job).map_err(MedspaError::storage)?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(&job.job_id))
            .arg(json)
            .arg("XX")
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await
            .map_err(MedspaError::storage)?;
        Ok(reply.is_some())
    }

    async fn update<F>(&self, job_id: &str, apply: F) -> Result<(), MedspaError>
    where
        F: FnOnce(&mut JobRecord) + Send,
    {
        let missing = || MedspaError::JobNotFound {
            job_id: job_id.to_string(),
        };
        let mut job = self.load(job_id).await?.ok_or_else(missing)?;
        if job.status.is_terminal() {
            return Err(MedspaError::InvalidTransition {
                job_id: job_id.to_string(),
                status: job.status.to_string(),
            });
        }
        apply(&mut job);
        job.updated_at = Utc::now();
        if !self.store(&job).await? {
            return Err(missing());
        }
        debug!(job_id, status = %job.status, "job updated");
        Ok(())
    }
}

#[async_trait]
impl JobRecorder for RedisJobStore {
    async fn create(&self, job: &JobRecord) -> Result<(), MedspaError> {
        let mut conn = self.connection().await?;
        let json = serde_json::to_string(job).map_err(MedspaError::storage)?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(&job.job_id))
            .arg(json)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(MedspaError::storage)?;
        if reply.is_none() {
            return Err(MedspaError::Validation(format!(
                "job {} already exists",
                job.job_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl JobUpdater for RedisJobStore {
    async fn mark_processing(&self, job_id: &str, attempt: u32) -> Result<(), MedspaError> {
        self.update(job_id, |job| {
            job.status = JobStatus::Processing;
            job.attempt = attempt;
        })
        .await
    }

    async fn mark_completed(
        &self,
        job_id: &str,
        result: Option<&str>,
    ) -> Result<(), MedspaError> {
        let result = result.map(str::to_string);
        self.update(job_id, move |job| {
            job.status = JobStatus::Completed;
            job.result = result;
            job.error = None;
            job.completed_at = Some(Utc::now());
        })
        .await
    }

    async fn mark_failed(&self, job_id: &str, reason: &str) -> Result<(), MedspaError> {
        let reason = reason.to_string();
        self.update(job_id, move |job| {
            job.status = JobStatus::Failed;
            job.error = Some(reason);
            job.completed_at = Some(Utc::now());
        })
        .await
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, MedspaError> {
        self.load(job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_prefixed() {
        let store = RedisJobStore::new("redis://127.0.0.1:6379/", 60)
            .unwrap()
            .with_prefix("test:jobs");
        assert_eq!(store.key("abc"), "test:jobs:abc");
    }

    #[test]
    fn invalid_url_rejected() {
        assert!(RedisJobStore::new("not a url", 60).is_err());
    }

    /// Needs a live server: `MEDSPA_TEST_REDIS_URL=redis://127.0.0.1/ cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn lifecycle_against_live_redis() {
        let url = std::env::var("MEDSPA_TEST_REDIS_URL").unwrap();
        let store = RedisJobStore::new(&url, 30)
            .unwrap()
            .with_prefix(format!("medspa-test:{}", uuid::Uuid::new_v4()));
        let job = JobRecord::pending("j1", "org", "conv", medspa_core::Channel::Sms, "message");
        store.create(&job).await.unwrap();
        assert!(store.create(&job).await.is_err());
        store.mark_processing("j1", 1).await.unwrap();
        store.mark_completed("j1", None).await.unwrap();
        let got = store.get("j1").await.unwrap().unwrap();
        assert_eq!(got.status, JobStatus::Completed);
        assert!(store.mark_failed("j1", "late").await.is_err());
    }
}
