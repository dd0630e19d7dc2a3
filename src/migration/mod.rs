//! Moving the index from one unpartitioned shard into per-year shards, and
//! between year shards when a course changes year.
//!
//! Every step loads [`MigrationState`] from storage and saves it back in the
//! same transaction as the rows it moved, so a step interrupted at any point
//! can simply be run again.

pub mod events;
pub mod redate;
pub mod router;
pub mod scheduler;
pub mod split;
pub mod state;
pub mod task;

pub use router::ShardRouter;
pub use scheduler::MigrationScheduler;
pub use state::{MigrationMode, MigrationState};
pub use task::TaskReport;

use crate::catalog::CourseCatalog;
use crate::error::{CourseSearchError, Result};
use crate::index::settings::SearchSettings;
use crate::index::storage::{Storage, Transaction};
use crate::types::{DocumentId, DocumentRecord, Occurrence, Shard};

/// Entry point for all migration operations.
pub struct MigrationEngine<'a> {
    storage: &'a dyn Storage,
    catalog: &'a dyn CourseCatalog,
    settings: &'a SearchSettings,
}

impl<'a> MigrationEngine<'a> {
    pub fn new(storage: &'a dyn Storage, catalog: &'a dyn CourseCatalog, settings: &'a SearchSettings) -> Self {
        MigrationEngine {
            storage,
            catalog,
            settings,
        }
    }

    pub fn router(&self) -> ShardRouter<'a> {
        ShardRouter::new(self.settings, self.catalog)
    }

    pub fn state(&self) -> Result<MigrationState> {
        let mut txn = self.storage.begin()?;
        txn.migration_state()
    }

    /// Turn on year shards: Off becomes Transferring with the cursor on the
    /// course-less documents. Already transferring is a no-op.
    ///
    /// # Errors
    ///
    /// [`CourseSearchError::InvalidState`] once the migration has finished;
    /// there is no way back to a single shard.
    pub fn start_transfer(&self) -> Result<MigrationState> {
        let mut txn = self.storage.begin()?;
        let mut state = txn.migration_state()?;
        match state.mode {
            MigrationMode::Off => {
                state = MigrationState {
                    mode: MigrationMode::Transferring,
                    ..Default::default()
                };
                txn.save_migration_state(&state)?;
                txn.commit()?;
                tracing::info!("[migration] Started transferring to year shards");
                Ok(state)
            }
            MigrationMode::Transferring => Ok(state),
            MigrationMode::On => Err(CourseSearchError::InvalidState(
                "year shards are already on and cannot be restarted".to_string(),
            )),
        }
    }

    /// Share of catalog courses the split has passed, from 0.0 to 1.0.
    pub fn progress(&self) -> Result<f64> {
        let state = self.state()?;
        match (state.mode, state.transferring_course_id) {
            (MigrationMode::Off, _) | (MigrationMode::Transferring, None) => Ok(0.0),
            (MigrationMode::On, _) => Ok(1.0),
            (MigrationMode::Transferring, Some(cursor)) => {
                let total = self.catalog.course_count()?;
                if total == 0 {
                    return Ok(0.0);
                }
                Ok(self.catalog.courses_before(cursor)? as f64 / total as f64)
            }
        }
    }

    /// Insert a copy of `record` and its occurrences into `to`. The source
    /// is left alone.
    fn copy_document(
        &self,
        txn: &mut dyn Transaction,
        from: Shard,
        to: Shard,
        record: &DocumentRecord,
    ) -> Result<DocumentId> {
        let occurrences = txn.document_occurrences(from, record.id)?;
        let new_id = txn.insert_document(to, &record.key, record.time_modified, record.time_expires)?;
        let moved: Vec<Occurrence> = occurrences
            .into_iter()
            .map(|o| Occurrence {
                document_id: new_id,
                ..o
            })
            .collect();
        if self.storage.supports_bulk_copy() {
            txn.bulk_insert_occurrences(to, &moved)?;
        } else {
            for occurrence in moved {
                txn.insert_occurrence(to, occurrence)?;
            }
        }
        Ok(new_id)
    }
}
