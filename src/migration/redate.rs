use super::MigrationEngine;
use crate::error::{CourseSearchError, Result};
use crate::index::storage::{DocumentSelector, ScanOrder};
use crate::types::Shard;

impl MigrationEngine<'_> {
    /// Move up to `chunk_size` documents of one course out of a stale year
    /// shard into its current year shard.
    ///
    /// The course with the lowest id that still has stale years is handled,
    /// starting with its oldest stale year. There is no checkpoint: each call
    /// re-selects whatever is left for that course in that year. When the
    /// stale shard holds no more of the course's documents the year is
    /// removed from its stale set.
    ///
    /// If the current year shard already holds a document with the same key,
    /// that copy is kept and the stale one is dropped.
    ///
    /// Returns true once no course has stale years left.
    ///
    /// # Errors
    ///
    /// [`CourseSearchError::InvalidState`] while the mode is Off.
    pub fn redate_chunk(&self, chunk_size: usize) -> Result<bool> {
        let chunk_size = chunk_size.max(1);
        let mut txn = self.storage.begin()?;
        let state = txn.migration_state()?;
        if state.mode == super::MigrationMode::Off {
            return Err(CourseSearchError::InvalidState(
                "redate called while year shards are off".to_string(),
            ));
        }

        let Some(mut record) = txn.first_stale_course_year()? else {
            return Ok(true);
        };
        let Some(old_year) = record.oldest_stale_year() else {
            return Ok(true);
        };
        let source = Shard::Year(old_year);
        let target = Shard::Year(record.year);

        let selector = DocumentSelector::for_course(Some(record.course_id))
            .ordered_by(ScanOrder::Id)
            .limit(chunk_size + 1);
        let documents = txn.select_documents(source, &selector)?;
        let complete = documents.len() <= chunk_size;

        let mut moved = 0usize;
        let mut dropped = 0usize;
        for document in documents.iter().take(chunk_size) {
            if txn.find_document(target, &document.key)?.is_some() {
                dropped += 1;
            } else {
                self.copy_document(txn.as_mut(), source, target, document)?;
                moved += 1;
            }
            txn.delete_document(source, document.id)?;
        }

        if complete {
            record.remove_stale_year(old_year);
            txn.save_course_year(&record)?;
        }
        let done = complete && txn.first_stale_course_year()?.is_none();
        txn.commit()?;

        tracing::info!(
            "[redate] Course {} ({} -> {}): moved {} documents, dropped {} duplicates{}",
            record.course_id,
            old_year,
            record.year,
            moved,
            dropped,
            if complete { ", year complete" } else { ", more to do" }
        );
        Ok(done)
    }
}
