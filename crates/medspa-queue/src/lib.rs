// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job queue backends.
//!
//! [`MemoryQueue`] is a bounded in-process channel for single-binary
//! deployments. [`RedisStreamQueue`] is a durable, at-least-once queue built
//! on a Redis Streams consumer group, for running API and workers as
//! separate processes.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_stream;

pub use memory::MemoryQueue;
#[cfg(feature = "redis")]
pub use redis_stream::{RedisStreamQueue, RedisStreamQueueOptions};
