// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redis Streams queue with consumer-group delivery.
//!
//! - `enqueue` is `XADD {stream} * body {json}`.
//! - `receive` first reclaims entries another consumer left pending longer
//!   than the visibility timeout (`XPENDING ... IDLE` + `XCLAIM`), then reads
//!   new entries with `XREADGROUP ... BLOCK`.
//! - `ack` is `XACK` followed by `XDEL`, so acknowledged entries do not
//!   accumulate in the stream.
//!
//! An entry that is never acknowledged is redelivered, with `attempt`
//! reflecting Redis's delivery counter.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use medspa_core::types::QueueMessage;
use medspa_core::{MedspaError, Queue};

const BODY_FIELD: &str = "body";

#[derive(Debug, Clone)]
pub struct RedisStreamQueueOptions {
    pub stream: String,
    pub group: String,
    /// Unique per worker process.
    pub consumer: String,
    /// How long a delivered entry may stay unacknowledged before another
    /// consumer may reclaim it.
    pub visibility_timeout: Duration,
}

impl Default for RedisStreamQueueOptions {
    fn default() -> Self {
        Self {
            stream: "medspa:conversation-jobs".into(),
            group: "conversation-workers".into(),
            consumer: "worker-1".into(),
            visibility_timeout: Duration::from_secs(60),
        }
    }
}

pub struct RedisStreamQueue {
    client: redis::Client,
    conn: OnceCell<MultiplexedConnection>,
    /// Carries only XREADGROUP BLOCK, which would stall anything queued behind it.
    blocking_conn: OnceCell<MultiplexedConnection>,
    group_ready: OnceCell<()>,
    opts: RedisStreamQueueOptions,
}

fn redis_err(context: &str, err: redis::RedisError) -> MedspaError {
    MedspaError::queue(format!("{context}: {err}"), Some(Box::new(err)))
}

impl RedisStreamQueue {
    /// Parses the URL; connections open lazily.
    pub fn new(redis_url: &str, opts: RedisStreamQueueOptions) -> Result<Self, MedspaError> {
        let client = redis::Client::open(redis_url).map_err(|e| redis_err("invalid redis url", e))?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            blocking_conn: OnceCell::new(),
            group_ready: OnceCell::new(),
            opts,
        })
    }

    pub fn options(&self) -> &RedisStreamQueueOptions {
        &self.opts
    }

    /// Shared connection for non-blocking commands.
    async fn connection(&self) -> Result<MultiplexedConnection, MedspaError> {
        self.cached(&self.conn).await
    }

    /// Dedicated connection for blocking reads, opened once and reused.
    async fn blocking_connection(&self) -> Result<MultiplexedConnection, MedspaError> {
        self.cached(&self.blocking_conn).await
    }

    async fn cached(
        &self,
        cell: &OnceCell<MultiplexedConnection>,
    ) -> Result<MultiplexedConnection, MedspaError> {
        let conn = cell
            .get_or_try_init(|| async {
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|e| redis_err("redis connect failed", e))
            })
            .await?;
        Ok(conn.clone())
    }

    /// Creates the consumer group (and stream) once per process.
    async fn ensure_group(&self) -> Result<(), MedspaError> {
        self.group_ready
            .get_or_try_init(|| async {
                let mut conn = self.connection().await?;
                let created: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                    .arg("CREATE")
                    .arg(&self.opts.stream)
                    .arg(&self.opts.group)
                    .arg("0")
                    .arg("MKSTREAM")
                    .query_async(&mut conn)
                    .await;
                match created {
                    Ok(()) => {
                        info!(stream = %self.opts.stream, group = %self.opts.group, "created consumer group");
                        Ok(())
                    }
                    Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
                    Err(e) => Err(redis_err("XGROUP CREATE failed", e)),
                }
            })
            .await?;
        Ok(())
    }

    /// Claims entries idle past the visibility timeout.
    async fn reclaim(&self, max: usize) -> Result<Vec<QueueMessage>, MedspaError> {
        let mut conn = self.connection().await?;
        let idle_ms = self.opts.visibility_timeout.as_millis() as u64;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.opts.stream)
            .arg(&self.opts.group)
            .arg("IDLE")
            .arg(idle_ms)
            .arg("-")
            .arg("+")
            .arg(max)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err("XPENDING failed", e))?;
        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = pending.ids.iter().map(|p| p.id.as_str()).collect();
        let claimed: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.opts.stream)
            .arg(&self.opts.group)
            .arg(&self.opts.consumer)
            .arg(idle_ms)
            .arg(&ids)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err("XCLAIM failed", e))?;

        let messages: Vec<QueueMessage> = claimed
            .ids
            .into_iter()
            .map(|entry| {
                let delivered = pending
                    .ids
                    .iter()
                    .find(|p| p.id == entry.id)
                    .map(|p| p.times_delivered)
                    .unwrap_or(1);
                to_message(entry, delivered as u32 + 1)
            })
            .collect();
        if !messages.is_empty() {
            warn!(
                count = messages.len(),
                consumer = %self.opts.consumer,
                "reclaimed unacknowledged queue entries"
            );
        }
        Ok(messages)
    }

    async fn read_new(&self, max: usize, wait: Duration) -> Result<Vec<QueueMessage>, MedspaError> {
        let mut conn = self.blocking_connection().await?;

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.opts.group)
            .arg(&self.opts.consumer)
            .arg("COUNT")
            .arg(max);
        // BLOCK 0 means forever; a zero wait is a plain poll.
        let block_ms = wait.as_millis() as u64;
        if block_ms > 0 {
            cmd.arg("BLOCK").arg(block_ms);
        }
        cmd.arg("STREAMS").arg(&self.opts.stream).arg(">");

        let reply: Option<StreamReadReply> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err("XREADGROUP failed", e))?;

        Ok(reply
            .map(|r| {
                r.keys
                    .into_iter()
                    .flat_map(|k| k.ids)
                    .map(|entry| to_message(entry, 1))
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn to_message(entry: StreamId, attempt: u32) -> QueueMessage {
    // A missing body decodes as a malformed envelope and is dropped by the worker.
    let body: String = entry.get(BODY_FIELD).unwrap_or_default();
    QueueMessage {
        receipt: entry.id.clone(),
        id: entry.id,
        attempt,
        body,
    }
}

#[async_trait]
impl Queue for RedisStreamQueue {
    fn name(&self) -> &str {
        "redis-streams"
    }

    async fn enqueue(&self, body: String) -> Result<(), MedspaError> {
        self.ensure_group().await?;
        let mut conn = self.connection().await?;
        let id: String = redis::cmd("XADD")
            .arg(&self.opts.stream)
            .arg("*")
            .arg(BODY_FIELD)
            .arg(body)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err("XADD failed", e))?;
        debug!(stream = %self.opts.stream, id = %id, "enqueued");
        Ok(())
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<QueueMessage>, MedspaError> {
        let max = max.max(1);
        self.ensure_group().await?;
        let reclaimed = self.reclaim(max).await?;
        if !reclaimed.is_empty() {
            return Ok(reclaimed);
        }
        self.read_new(max, wait).await
    }

    async fn ack(&self, message: &QueueMessage) -> Result<(), MedspaError> {
        let mut conn = self.connection().await?;
        redis::pipe()
            .cmd("XACK")
            .arg(&self.opts.stream)
            .arg(&self.opts.group)
            .arg(&message.receipt)
            .ignore()
            .cmd("XDEL")
            .arg(&self.opts.stream)
            .arg(&message.receipt)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| redis_err("XACK failed", e))
    }
}
