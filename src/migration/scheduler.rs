use crate::error::{CourseSearchError, Result};
use crate::index::manager::SearchIndex;
use crate::migration::task::TaskReport;
use std::sync::Arc;
use tokio::sync::Notify;

/// Periodically runs the split and redate loops for one index.
pub struct MigrationScheduler {
    index: Arc<SearchIndex>,
    shutdown: Notify,
}

impl MigrationScheduler {
    pub fn new(index: Arc<SearchIndex>) -> Arc<Self> {
        Arc::new(MigrationScheduler {
            index,
            shutdown: Notify::new(),
        })
    }

    /// Tick every `scheduler_interval_secs` until [`Self::shutdown`].
    /// Errors from a tick are logged; the next tick tries again.
    pub async fn run_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.index.settings().scheduler_interval());
        ticker.tick().await; // skip the first immediate tick

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!("[scheduler] Migration tick failed: {}", e);
                    }
                }
                _ = self.shutdown.notified() => {
                    tracing::info!("[scheduler] Migration loop shutting down");
                    break;
                }
            }
        }
    }

    /// One split run followed by one redate run, on a blocking thread.
    pub async fn tick(&self) -> Result<(TaskReport, TaskReport)> {
        let index = Arc::clone(&self.index);
        tokio::task::spawn_blocking(move || {
            let engine = index.migration();
            let split = engine.run_split_task()?;
            let redate = engine.run_redate_task()?;
            Ok((split, redate))
        })
        .await
        .map_err(|e| CourseSearchError::InvalidState(format!("migration task panicked: {}", e)))?
    }

    /// Signal the loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}
