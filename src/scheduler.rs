//! Periodic background sync.
//!
//! The scheduler runs [`SyncOrchestrator::sync_all`] once right away and
//! then on every tick of a fixed interval. A batch that runs long delays the
//! next tick instead of stacking runs up behind it.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::sync::SyncOrchestrator;

/// Stops the scheduler when told to, or when dropped.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop ticking and wait for an in-progress batch to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "scheduler task ended abnormally");
        }
    }
}

pub fn spawn_scheduler(orchestrator: SyncOrchestrator, period: Duration) -> SchedulerHandle {
    let (stop, mut stopped) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), "scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => run_batch(&orchestrator).await,
                // Err means the handle was dropped.
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        break;
                    }
                }
            }
        }

        info!("scheduler stopped");
    });

    SchedulerHandle { stop, task }
}

async fn run_batch(orchestrator: &SyncOrchestrator) {
    match orchestrator.sync_all().await {
        Ok(report) if report.is_empty() => {}
        Ok(report) => info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "scheduled sync finished"
        ),
        Err(e) => error!(error = %e, "scheduled sync could not start"),
    }
}
