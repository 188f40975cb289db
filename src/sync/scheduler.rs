//! Timer-driven sync scheduling
//!
//! The scheduler is a thin loop over the same [`SyncService::sync_once`]
//! entry point manual triggers use, so both paths share the single-writer
//! guarantee. The first sync runs immediately at startup.

use crate::catalog::SyncOutcome;
use crate::sync::orchestrator::{SyncAttempt, SyncService};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Runs the startup sync, then one sync per interval, forever
///
/// The caller decides when to stop (process shutdown); an in-flight sync
/// cut off by shutdown cannot corrupt the catalog because persistence is a
/// single atomic rename at the very end of the cycle.
pub async fn run_scheduler(service: Arc<SyncService>, interval: Duration) {
    tracing::info!(
        "Scheduler started, syncing every {} hours",
        interval.as_secs() / 3600
    );

    log_attempt(service.sync_once().await);

    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        tracing::info!("Scheduled sync due");
        log_attempt(service.sync_once().await);
    }
}

fn log_attempt(attempt: SyncAttempt) {
    match attempt {
        SyncAttempt::Completed(run) => match run.outcome {
            SyncOutcome::Success | SyncOutcome::Partial => {
                tracing::info!("Sync finished with outcome {}", run.outcome);
            }
            SyncOutcome::Failed => {
                tracing::error!(
                    "Sync failed: {}",
                    run.error.as_deref().unwrap_or("unknown error")
                );
            }
        },
        SyncAttempt::AlreadyRunning => {
            tracing::warn!("Scheduled sync skipped: previous sync still running");
        }
    }
}
