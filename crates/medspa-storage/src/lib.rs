// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence layer for the medspa conversation pipeline.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and a
//! single-connection concurrency model via `tokio-rusqlite`, plus an optional
//! Redis job status store for deployments where workers run as separate
//! processes.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;
#[cfg(feature = "redis")]
pub mod redis_jobs;

pub use adapter::{SqliteStore, SqliteStoreOptions};
pub use database::Database;
#[cfg(feature = "redis")]
pub use redis_jobs::RedisJobStore;
