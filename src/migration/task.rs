use super::MigrationEngine;
use crate::error::Result;
use std::time::{Duration, Instant};

/// What one time-budgeted run of a migration loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskReport {
    pub chunks: usize,
    /// The process has nothing left to do.
    pub finished: bool,
}

impl MigrationEngine<'_> {
    /// Run split chunks until the split completes or the configured time
    /// budget runs out. Does nothing unless transferring.
    pub fn run_split_task(&self) -> Result<TaskReport> {
        if !self.state()?.is_transferring() {
            return Ok(TaskReport::default());
        }
        let chunk_size = self.settings.split_chunk_size;
        let report = run_chunks(self.settings.split_time_budget(), || self.split_chunk(chunk_size))?;
        tracing::info!(
            "[task] Split ran {} chunks{}",
            report.chunks,
            if report.finished { ", finished" } else { "" }
        );
        Ok(report)
    }

    /// Run redate chunks until no course has stale years or the configured
    /// time budget runs out. Does nothing while year shards are off.
    pub fn run_redate_task(&self) -> Result<TaskReport> {
        let mut txn = self.storage.begin()?;
        if txn.migration_state()?.mode == super::MigrationMode::Off {
            return Ok(TaskReport::default());
        }
        if txn.first_stale_course_year()?.is_none() {
            tracing::debug!("[task] No courses changed year recently");
            return Ok(TaskReport {
                chunks: 0,
                finished: true,
            });
        }
        drop(txn);

        let chunk_size = self.settings.redate_chunk_size;
        let report = run_chunks(self.settings.redate_time_budget(), || self.redate_chunk(chunk_size))?;
        tracing::info!(
            "[task] Redate ran {} chunks{}",
            report.chunks,
            if report.finished { ", finished" } else { "" }
        );
        Ok(report)
    }
}

/// Call `chunk` until it reports completion or `budget` has elapsed. The
/// budget is only checked between chunks.
fn run_chunks(budget: Duration, mut chunk: impl FnMut() -> Result<bool>) -> Result<TaskReport> {
    let deadline = Instant::now() + budget;
    let mut report = TaskReport::default();
    while Instant::now() < deadline {
        report.chunks += 1;
        if chunk()? {
            report.finished = true;
            break;
        }
    }
    Ok(report)
}
