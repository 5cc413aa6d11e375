//! Recurring sync scheduling
//!
//! A cancellable background task with its own shutdown signal, so process
//! teardown never depends on a detached thread outliving it. The enabled
//! flag is read through an injected accessor once immediately before each
//! prospective pass; flipping it mid-pass never preempts a running pass.

use crate::error::SyncError;
use crate::sync::SyncEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to the running scheduler task
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Spawn the recurring sync task
    ///
    /// The first check happens immediately; afterwards the period is
    /// measured from the end of the previous check, so passes that take
    /// long drift the schedule rather than pile up.
    pub fn start<F>(engine: Arc<SyncEngine>, period: Duration, enabled: F) -> Self
    where
        F: Fn() -> bool + Send + 'static,
    {
        let (shutdown, mut rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            log::info!("Scheduler started, checking every {:?}", period);
            loop {
                if enabled() {
                    log::info!("Running scheduled sync pass");
                    match engine.run_once().await {
                        Ok(summary) => log::info!(
                            "Scheduled pass: {} updated, {} unchanged, {} errors",
                            summary.updated,
                            summary.unchanged,
                            summary.errors
                        ),
                        Err(SyncError::SyncInProgress) => {
                            log::info!("Scheduled pass skipped, another pass is running")
                        }
                        Err(e) => log::error!("Scheduled sync pass failed: {}", e),
                    }
                } else {
                    log::debug!("Sync disabled, skipping scheduled pass");
                }

                tokio::select! {
                    _ = tokio::time::sleep(period) => {}
                    _ = rx.changed() => {
                        log::info!("Scheduler shutting down");
                        break;
                    }
                }
            }
        });

        Self { shutdown, handle }
    }

    /// Signal the task to stop and wait for it to finish
    ///
    /// A pass that is already running completes first; its committed
    /// per-record writes are retained.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}
