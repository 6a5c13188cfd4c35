use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::db::PresenceStore;
use crate::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The previous run was still executing.
    Skipped,
    Completed { marked_offline: u64 },
    Failed,
}

/// Periodic correction of durable records whose device stopped reporting
/// without a clean close. Never touches the in-memory registry.
pub struct LivenessSweep {
    store: Arc<dyn PresenceStore>,
    timeout: chrono::Duration,
    interval: Duration,
    run_guard: Mutex<()>,
}

impl LivenessSweep {
    pub fn new(store: Arc<dyn PresenceStore>, interval: Duration, timeout: chrono::Duration) -> Self {
        Self {
            store,
            timeout,
            interval,
            run_guard: Mutex::new(()),
        }
    }

    /// One scheduled pass. Skips instead of queueing behind a run in progress.
    pub async fn run_once(&self) -> SweepOutcome {
        let Ok(_guard) = self.run_guard.try_lock() else {
            debug!("Presence sweep still running, skipping this tick");
            return SweepOutcome::Skipped;
        };

        match self.sweep().await {
            Ok(marked_offline) => SweepOutcome::Completed { marked_offline },
            Err(e) => {
                error!(error = %e, "Presence sweep failed; retrying next interval");
                SweepOutcome::Failed
            }
        }
    }

    /// On-demand reconciliation. Waits for a running pass rather than skipping.
    pub async fn manual_reconcile(&self) -> AppResult<u64> {
        let _guard = self.run_guard.lock().await;
        info!("Manual presence reconciliation requested");
        self.sweep().await
    }

    async fn sweep(&self) -> AppResult<u64> {
        let cutoff = Utc::now() - self.timeout;
        let marked_offline = self.store.mark_stale_offline(cutoff).await?;

        if marked_offline > 0 {
            info!(
                marked_offline = marked_offline,
                cutoff = %cutoff,
                "Marked stale devices offline"
            );
        } else {
            debug!(cutoff = %cutoff, "Presence sweep found no stale devices");
        }

        Ok(marked_offline)
    }

    /// Spawn the periodic task. Returns a handle that can be aborted on shutdown.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.interval.as_secs(),
                timeout_secs = self.timeout.num_seconds(),
                "Presence sweep started"
            );

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; wait a full interval.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let sweep = self.clone();
                // Each pass runs on its own task so a slow store cannot stall the ticker.
                tokio::spawn(async move {
                    sweep.run_once().await;
                });
            }
        })
    }
}
