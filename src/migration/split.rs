use super::MigrationEngine;
use crate::error::{CourseSearchError, Result};
use crate::index::storage::{DocumentSelector, ScanOrder};
use crate::types::{CourseYearRecord, Shard};

impl MigrationEngine<'_> {
    /// Move the next batch of unpartitioned documents into their year shard.
    ///
    /// The cursor first covers documents with no course, then every catalog
    /// course in id order. Documents of the cursor course are taken oldest
    /// first, `chunk_size` at a time, but a batch never ends between two
    /// documents with the same modification time: the checkpoint is that
    /// time, and resuming selects only strictly newer documents.
    ///
    /// Each moved document is deleted from the unpartitioned shard in the
    /// same transaction that inserts its copy. A copy already present in the
    /// target from an interrupted earlier run is replaced.
    ///
    /// Returns true once every course is done; the mode is then On and the
    /// unpartitioned shard has been truncated.
    ///
    /// # Errors
    ///
    /// [`CourseSearchError::InvalidState`] unless the mode is Transferring.
    /// [`CourseSearchError::FutureYear`] when the cursor course starts after
    /// the last year shard; the cursor does not move until the year range is
    /// extended.
    pub fn split_chunk(&self, chunk_size: usize) -> Result<bool> {
        let chunk_size = chunk_size.max(1);
        let mut txn = self.storage.begin()?;
        let mut state = txn.migration_state()?;
        if !state.is_transferring() {
            return Err(CourseSearchError::InvalidState(format!(
                "split called while migration mode is {:?}",
                state.mode
            )));
        }

        let router = self.router();
        let (course, target_year, label) = match state.transferring_course_id {
            None => (None, Some(self.settings.non_course_year), "[non-course]".to_string()),
            Some(id) => match self.catalog.get(id)? {
                Some(course) => {
                    let year = router.year_for_course(&course)?;
                    let label = course.short_name.clone();
                    (Some(course), Some(year), label)
                }
                None => {
                    tracing::warn!(
                        "[split] Course {} is no longer in the catalog; skipping it",
                        id
                    );
                    (None, None, format!("[course {}]", id))
                }
            },
        };

        let mut moved = 0usize;
        let mut replaced = 0usize;
        let mut last_time = None;
        let mut complete = true;

        if let Some(year) = target_year {
            let target = Shard::Year(year);
            let selector = DocumentSelector::for_course(state.transferring_course_id)
                .modified_after(state.done_up_to)
                .ordered_by(ScanOrder::TimeModified);

            for record in txn.select_documents(Shard::Unpartitioned, &selector)? {
                if moved >= chunk_size && last_time != Some(record.time_modified) {
                    complete = false;
                    break;
                }
                if let Some(existing) = txn.find_document(target, &record.key)? {
                    txn.delete_document(target, existing.id)?;
                    replaced += 1;
                }
                self.copy_document(txn.as_mut(), Shard::Unpartitioned, target, &record)?;
                txn.delete_document(Shard::Unpartitioned, record.id)?;
                last_time = Some(record.time_modified);
                moved += 1;
            }
        }

        if !complete {
            state.done_up_to = last_time;
            txn.save_migration_state(&state)?;
            txn.commit()?;
            tracing::info!(
                "[split] {}: moved {} documents ({} replaced), continuing after {:?}",
                label,
                moved,
                replaced,
                last_time
            );
            return Ok(false);
        }

        if let (Some(course), Some(year)) = (&course, target_year) {
            txn.save_course_year(&CourseYearRecord::new(course.id, year))?;
        }

        match self.catalog.next_course_id_after(state.transferring_course_id)? {
            Some(next) => {
                state.advance_to(next);
                txn.save_migration_state(&state)?;
                txn.commit()?;
                tracing::info!(
                    "[split] {}: moved {} documents ({} replaced), complete; next course {}",
                    label,
                    moved,
                    replaced,
                    next
                );
                Ok(false)
            }
            None => {
                state.finish();
                txn.save_migration_state(&state)?;
                txn.commit()?;
                self.storage.truncate_shard(Shard::Unpartitioned)?;
                tracing::info!(
                    "[split] {}: moved {} documents; all courses complete, year shards on",
                    label,
                    moved
                );
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::index::memory::MemoryStorage;
    use crate::index::settings::SearchSettings;
    use crate::index::storage::Storage;
    use crate::migration::state::MigrationMode;
    use crate::types::{Course, DocumentKey, Occurrence};

    const JUNE_2013: i64 = 1_370_044_800;

    fn add(storage: &MemoryStorage, course: Option<i64>, n: i64, time_modified: i64) {
        let mut key = DocumentKey::new("test_x").with_int_refs(n, None);
        key.course_id = course;
        let mut txn = storage.begin().unwrap();
        let id = txn
            .insert_document(Shard::Unpartitioned, &key, time_modified, None)
            .unwrap();
        let word_id = match txn.lookup_words(&["frog".to_string()]).unwrap().get("frog") {
            Some(&id) => id,
            None => txn.insert_word("frog").unwrap(),
        };
        txn.insert_occurrence(
            Shard::Unpartitioned,
            Occurrence {
                word_id,
                document_id: id,
                score: 1,
            },
        )
        .unwrap();
        txn.commit().unwrap();
    }

    fn count(storage: &MemoryStorage, shard: Shard) -> usize {
        storage.begin().unwrap().count_documents(shard).unwrap()
    }

    #[test]
    fn test_split_requires_transferring() {
        let storage = MemoryStorage::new();
        let catalog = InMemoryCatalog::new();
        let settings = SearchSettings::default();
        let engine = MigrationEngine::new(&storage, &catalog, &settings);
        assert!(matches!(
            engine.split_chunk(10),
            Err(CourseSearchError::InvalidState(_))
        ));
    }

    #[test]
    fn test_chunks_never_split_equal_timestamps() {
        let storage = MemoryStorage::new();
        let catalog = InMemoryCatalog::with_courses(vec![Course::new(1, "C1", JUNE_2013)]);
        let settings = SearchSettings::default();
        let engine = MigrationEngine::new(&storage, &catalog, &settings);
        for (n, time) in [(1, 10), (2, 20), (3, 20), (4, 20), (5, 30)] {
            add(&storage, Some(1), n, time);
        }
        engine.start_transfer().unwrap();

        // Non-course pass has nothing to move.
        assert!(!engine.split_chunk(2).unwrap());
        assert_eq!(engine.state().unwrap().transferring_course_id, Some(1));

        assert!(!engine.split_chunk(2).unwrap());
        assert_eq!(engine.state().unwrap().done_up_to, Some(20));
        assert_eq!(count(&storage, Shard::Year(2013)), 4);
        assert_eq!(count(&storage, Shard::Unpartitioned), 1);

        assert!(engine.split_chunk(2).unwrap());
        let state = engine.state().unwrap();
        assert_eq!(state.mode, MigrationMode::On);
        assert_eq!(state.transferring_course_id, None);
        assert_eq!(state.done_up_to, None);
        assert_eq!(count(&storage, Shard::Year(2013)), 5);
        assert_eq!(count(&storage, Shard::Unpartitioned), 0);

        let mut txn = storage.begin().unwrap();
        assert_eq!(txn.course_year(1).unwrap().unwrap().year, 2013);
    }

    #[test]
    fn test_non_course_documents_go_to_non_course_year() {
        let storage = MemoryStorage::new();
        let catalog = InMemoryCatalog::new();
        let settings = SearchSettings::default();
        let engine = MigrationEngine::new(&storage, &catalog, &settings);
        add(&storage, None, 1, 5);
        engine.start_transfer().unwrap();
        assert!(engine.split_chunk(10).unwrap());
        assert_eq!(count(&storage, Shard::Year(2011)), 1);
    }

    #[test]
    fn test_rerun_after_failure_does_not_duplicate() {
        let storage = MemoryStorage::new();
        let catalog = InMemoryCatalog::with_courses(vec![Course::new(1, "C1", JUNE_2013)]);
        let settings = SearchSettings::default();
        let engine = MigrationEngine::new(&storage, &catalog, &settings);
        for n in 1..=3 {
            add(&storage, Some(1), n, n);
        }
        engine.start_transfer().unwrap();
        engine.split_chunk(10).unwrap();

        storage.inject_failure_after(4);
        assert!(engine.split_chunk(10).is_err());
        storage.clear_injected_failure();
        assert_eq!(count(&storage, Shard::Year(2013)), 0);

        assert!(engine.split_chunk(10).unwrap());
        assert_eq!(count(&storage, Shard::Year(2013)), 3);
    }

    #[test]
    fn test_stale_target_copy_is_replaced() {
        let storage = MemoryStorage::new();
        let catalog = InMemoryCatalog::with_courses(vec![Course::new(1, "C1", JUNE_2013)]);
        let settings = SearchSettings::default();
        let engine = MigrationEngine::new(&storage, &catalog, &settings);
        add(&storage, Some(1), 1, 10);
        {
            let key = DocumentKey::new("test_x").with_int_refs(1, None).with_course(1);
            let mut txn = storage.begin().unwrap();
            txn.insert_document(Shard::Year(2013), &key, 1, None).unwrap();
            txn.commit().unwrap();
        }
        engine.start_transfer().unwrap();
        engine.split_chunk(10).unwrap();
        assert!(engine.split_chunk(10).unwrap());

        let key = DocumentKey::new("test_x").with_int_refs(1, None).with_course(1);
        let mut txn = storage.begin().unwrap();
        assert_eq!(txn.count_documents(Shard::Year(2013)).unwrap(), 1);
        let doc = txn.find_document(Shard::Year(2013), &key).unwrap().unwrap();
        assert_eq!(doc.time_modified, 10);
        assert_eq!(txn.document_occurrences(Shard::Year(2013), doc.id).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_course_is_skipped() {
        let storage = MemoryStorage::new();
        let catalog = InMemoryCatalog::with_courses(vec![
            Course::new(1, "C1", JUNE_2013),
            Course::new(2, "C2", JUNE_2013),
        ]);
        let settings = SearchSettings::default();
        let engine = MigrationEngine::new(&storage, &catalog, &settings);
        engine.start_transfer().unwrap();
        engine.split_chunk(10).unwrap();
        catalog.remove(1).unwrap();
        assert!(!engine.split_chunk(10).unwrap());
        assert_eq!(engine.state().unwrap().transferring_course_id, Some(2));
        let mut txn = storage.begin().unwrap();
        assert!(txn.course_year(1).unwrap().is_none());
    }
}
