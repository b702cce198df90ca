// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `medspa serve`, `medspa worker` and `medspa messaging`.
//!
//! All three share one shutdown token. Workers get the configured shutdown
//! window to finish in-flight jobs; background loops stop at their next
//! cancellation check.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use medspa_config::model::{JobsBackend, MedspaConfig, QueueBackend};
use medspa_core::{ConversationService, MedspaError};
use medspa_pipeline::shutdown;
use medspa_storage::SqliteStore;

use crate::context::AppContext;
use crate::service::AcknowledgementService;

const JOB_JANITOR_INTERVAL: Duration = Duration::from_secs(3600);

/// Which loops a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roles {
    pub workers: bool,
    pub deliverer: bool,
    pub messaging: bool,
}

impl Roles {
    pub const SERVE: Roles = Roles {
        workers: true,
        deliverer: true,
        messaging: true,
    };
    pub const WORKER: Roles = Roles {
        workers: true,
        deliverer: true,
        messaging: false,
    };
    pub const MESSAGING: Roles = Roles {
        workers: false,
        deliverer: false,
        messaging: true,
    };
}

/// Single-binary mode: every loop in one process.
pub async fn run_serve(config: MedspaConfig) -> Result<(), MedspaError> {
    info!("starting medspa serve");
    run(config, Roles::SERVE).await
}

/// Multi-process worker: needs a queue other processes can publish to.
pub async fn run_worker(config: MedspaConfig) -> Result<(), MedspaError> {
    if config.queue.backend != QueueBackend::Redis {
        return Err(MedspaError::Config(
            "medspa worker needs queue.backend = \"redis\"; use `medspa serve` for the in-process queue"
                .into(),
        ));
    }
    info!("starting medspa worker");
    run(config, Roles::WORKER).await
}

pub async fn run_messaging(config: MedspaConfig) -> Result<(), MedspaError> {
    info!("starting medspa messaging");
    run(config, Roles::MESSAGING).await
}

async fn run(config: MedspaConfig, roles: Roles) -> Result<(), MedspaError> {
    let cancel = shutdown::install_signal_handler();
    let ctx = AppContext::init(config, cancel.clone()).await?;
    let running = start(&ctx, roles, Arc::new(AcknowledgementService))?;
    cancel.cancelled().await;
    running.stop(&ctx).await;
    ctx.close().await;
    info!("medspa shutdown complete");
    Ok(())
}

/// Loops started by [`start`].
pub struct Running {
    pool: Option<medspa_pipeline::WorkerPoolHandle>,
    background: TaskTracker,
    cancel: CancellationToken,
}

impl Running {
    /// Cancels everything and waits, bounded by `worker.shutdown_timeout_secs`.
    /// Returns false if work was abandoned.
    pub async fn stop(self, ctx: &AppContext) -> bool {
        self.cancel.cancel();
        let mut clean = true;
        if let Some(pool) = self.pool {
            clean &= pool.shutdown().await;
        }
        let timeout = Duration::from_secs(ctx.config.worker.shutdown_timeout_secs);
        clean &= shutdown::drain(&self.background, timeout).await;
        clean
    }
}

/// Spawns the loops for `roles` on the context's shutdown token.
pub fn start(
    ctx: &AppContext,
    roles: Roles,
    service: Arc<dyn ConversationService>,
) -> Result<Running, MedspaError> {
    let cancel = ctx.cancel_token();
    let background = TaskTracker::new();

    let pool = if roles.workers {
        let processor = ctx.processor(service)?;
        Some(ctx.worker_pool(processor).spawn(cancel.clone()))
    } else {
        None
    };

    if roles.deliverer {
        background.spawn(ctx.deliverer().run(cancel.clone()));
        if ctx.config.jobs.backend == JobsBackend::Sqlite {
            background.spawn(job_janitor(ctx.store.clone(), cancel.clone()));
        }
    }

    if roles.messaging {
        let retry = ctx.retry_sender();
        let poller = ctx.hosted_poller();
        if retry.is_none() && poller.is_none() && !roles.workers {
            return Err(MedspaError::Config(
                "medspa messaging has nothing to run: set telnyx.api_key".into(),
            ));
        }
        if let Some(retry) = retry {
            background.spawn(retry.run(cancel.clone()));
        }
        if let Some(poller) = poller {
            background.spawn(poller.run(cancel.clone()));
        }
    }

    info!(
        workers = roles.workers,
        deliverer = roles.deliverer,
        messaging = roles.messaging,
        "medspa running"
    );
    Ok(Running {
        pool,
        background,
        cancel,
    })
}

/// Removes expired SQLite job records once an hour.
async fn job_janitor(store: Arc<SqliteStore>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(JOB_JANITOR_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                match store.purge_expired_jobs(Utc::now()).await {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed, "expired job records purged"),
                    Err(e) => warn!(error = %e, "job record purge failed"),
                }
            }
        }
    }
}
