//! Scheduler Loop (spec §4.4): the single long-running control loop —
//! acquire the lease, then alternate dispatch/reconcile passes on a fixed
//! `poll_interval`, heartbeating the lease between iterations.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::kernel::SchedulerContext;

use super::dispatch::dispatch_pass;
use super::reconcile::reconcile_pass;
use super::success::{LegacyResultPredicate, SuccessPredicate};

/// Process exit code when a second scheduler instance cannot acquire the
/// lease (spec §4.4 "exit with code BUSY").
pub const EXIT_CODE_BUSY: i32 = 75;

/// Marker error so `main` can distinguish "another instance holds the
/// lease" from any other unhandled failure and map it to `EXIT_CODE_BUSY`
/// (spec §7 "Lease loss...is fatal; the process exits with a distinguished
/// code") without string-matching the error message.
#[derive(Debug, thiserror::Error)]
#[error("lease '{0}' held by another scheduler instance")]
pub struct LeaseBusyError(pub String);

pub struct SchedulerLoop {
    ctx: SchedulerContext,
    success_predicate: Box<dyn SuccessPredicate>,
    shutdown: CancellationToken,
}

impl SchedulerLoop {
    pub fn new(ctx: SchedulerContext) -> Self {
        Self {
            ctx,
            success_predicate: Box::new(LegacyResultPredicate),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_success_predicate(mut self, predicate: Box<dyn SuccessPredicate>) -> Self {
        self.success_predicate = predicate;
        self
    }

    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs the tick loop until cancelled or an unrecoverable lease loss.
    /// Returns `Ok(())` on graceful shutdown, or `Err` carrying
    /// `EXIT_CODE_BUSY` if another instance already holds the lease.
    pub async fn run(self) -> anyhow::Result<()> {
        let holder = self.ctx.config.worker_id.clone();
        let ttl = self.ctx.config.lease_ttl_secs;
        let poll_interval = Duration::from_secs(self.ctx.config.poll_interval_secs);

        if !self.ctx.lease.acquire(&holder, ttl).await? {
            warn!(%holder, "another scheduler instance holds the lease, exiting");
            return Err(LeaseBusyError(holder).into());
        }
        info!(%holder, poll_interval_secs = poll_interval.as_secs(), "scheduler loop started");

        let result = self.run_ticks(poll_interval).await;

        // On exit (including unhandled error) the lease must be released so
        // another instance can take over within <= ttl (spec §4.3).
        if let Err(e) = self.ctx.lease.release(&holder).await {
            error!(%holder, error = %e, "failed to release lease on shutdown");
        } else {
            info!(%holder, "lease released");
        }

        result
    }

    async fn run_ticks(&self, poll_interval: Duration) -> anyhow::Result<()> {
        let holder = &self.ctx.config.worker_id;
        let ttl = self.ctx.config.lease_ttl_secs;

        while !self.shutdown.is_cancelled() {
            let t0 = Instant::now();

            dispatch_pass(&self.ctx).await;
            reconcile_pass(&self.ctx, self.success_predicate.as_ref()).await;

            if !self.ctx.lease.renew(holder, ttl).await? {
                anyhow::bail!("lease lost mid-tick, another instance has taken over");
            }

            let elapsed = t0.elapsed();
            let sleep_for = poll_interval.saturating_sub(elapsed);
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }

        info!("scheduler loop shutting down gracefully");
        Ok(())
    }
}
