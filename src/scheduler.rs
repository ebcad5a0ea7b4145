//! Periodic reconciliation.
//!
//! One run fires immediately, then one per cron tick. A tick that arrives
//! while the previous run is still going is skipped.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tasksync_core::{RunOutcome, SyncContext, SyncError, reconcile};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

/// What happened on one tick.
#[derive(Debug)]
pub enum Tick {
    Completed(RunOutcome),
    /// A previous run still held the lock.
    Skipped,
    Failed(SyncError),
}

pub struct Scheduler {
    ctx: Arc<SyncContext>,
    schedule: String,
    running: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new(ctx: Arc<SyncContext>, schedule: impl Into<String>) -> Self {
        Scheduler {
            ctx,
            schedule: schedule.into(),
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Run once now, then on every tick until Ctrl-C.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let job = self.job()?;

        Self::tick(&self.ctx, &self.running).await;

        let mut scheduler = JobScheduler::new()
            .await
            .context("Could not create scheduler")?;
        let job_id = job.guid();
        scheduler.add(job).await.context("Could not register sync job")?;
        scheduler.start().await.context("Could not start scheduler")?;
        info!(schedule = %self.schedule, job_id = %job_id, "scheduler started");

        tokio::signal::ctrl_c()
            .await
            .context("Could not listen for Ctrl-C")?;

        info!("shutting down");
        scheduler.shutdown().await.context("Could not stop scheduler")?;
        Ok(())
    }

    fn job(&self) -> Result<Job> {
        let ctx = self.ctx.clone();
        let running = self.running.clone();

        Job::new_async(self.schedule.as_str(), move |_id, _lock| {
            let ctx = ctx.clone();
            let running = running.clone();
            Box::pin(async move {
                Self::tick(&ctx, &running).await;
            })
        })
        .with_context(|| format!("Invalid schedule '{}'", self.schedule))
    }

    /// Run one reconciliation unless another is in progress.
    pub async fn tick(ctx: &SyncContext, running: &Mutex<()>) -> Tick {
        let Ok(_guard) = running.try_lock() else {
            warn!("previous run still in progress; skipping this tick");
            return Tick::Skipped;
        };

        let started = Instant::now();

        match reconcile::run(ctx).await {
            Ok(outcome) => {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "sync run finished");
                Tick::Completed(outcome)
            }
            Err(e) => {
                error!(error = %e, "sync run failed; waiting for the next tick");
                Tick::Failed(e)
            }
        }
    }
}
