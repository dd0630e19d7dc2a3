use crate::error::{CourseSearchError, Result};
use crate::index::storage::{DocumentSelector, ScanOrder, Storage, Transaction};
use crate::migration::state::MigrationState;
use crate::types::{
    CourseId, CourseYearRecord, DocumentId, DocumentKey, DocumentRecord, Occurrence, Shard, WordId,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

const NO_INJECTED_FAILURE: usize = usize::MAX;

/// In-process [`Storage`] holding every shard in memory.
///
/// A transaction holds the store lock for its whole lifetime and keeps an
/// undo journal; dropping it uncommitted replays the journal backwards.
/// Id counters are not rolled back, so ids behave like database sequences.
///
/// # Examples
///
/// ```rust
/// use coursesearch::index::memory::MemoryStorage;
/// use coursesearch::index::storage::Storage;
///
/// # fn main() -> coursesearch::Result<()> {
/// let storage = MemoryStorage::new().with_bulk_copy(true);
/// let mut txn = storage.begin()?;
/// let id = txn.insert_word("frog")?;
/// txn.commit()?;
///
/// let mut txn = storage.begin()?;
/// assert_eq!(txn.lookup_words(&["frog".to_string()])?.get("frog"), Some(&id));
/// # Ok(())
/// # }
/// ```
pub struct MemoryStorage {
    data: Mutex<MemoryData>,
    bulk_copy: bool,
    fail_after: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            data: Mutex::new(MemoryData::default()),
            bulk_copy: false,
            fail_after: AtomicUsize::new(NO_INJECTED_FAILURE),
        }
    }

    pub fn with_bulk_copy(mut self, enabled: bool) -> Self {
        self.bulk_copy = enabled;
        self
    }

    /// Allow `operations` more mutations, then fail every later one with
    /// [`CourseSearchError::Storage`] until [`Self::clear_injected_failure`].
    pub fn inject_failure_after(&self, operations: usize) {
        self.fail_after.store(operations, Ordering::SeqCst);
    }

    pub fn clear_injected_failure(&self) {
        self.fail_after.store(NO_INJECTED_FAILURE, Ordering::SeqCst);
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn supports_bulk_copy(&self) -> bool {
        self.bulk_copy
    }

    fn begin(&self) -> Result<Box<dyn Transaction + '_>> {
        Ok(Box::new(MemoryTransaction {
            data: self.data.lock()?,
            fail_after: &self.fail_after,
            journal: Vec::new(),
            committed: false,
        }))
    }

    fn truncate_shard(&self, shard: Shard) -> Result<()> {
        let mut data = self.data.lock()?;
        data.shards.remove(&shard);
        tracing::debug!("[storage] Truncated shard {}", shard);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryData {
    words: HashMap<String, WordId>,
    last_word_id: WordId,
    shards: BTreeMap<Shard, ShardData>,
    migration: Option<MigrationState>,
    course_years: BTreeMap<CourseId, CourseYearRecord>,
}

#[derive(Default)]
struct ShardData {
    documents: BTreeMap<DocumentId, DocumentRecord>,
    keys: HashMap<DocumentKey, DocumentId>,
    last_document_id: DocumentId,
    postings: HashMap<WordId, BTreeMap<DocumentId, u8>>,
    words_by_document: HashMap<DocumentId, BTreeSet<WordId>>,
}

impl ShardData {
    fn put_document(&mut self, record: DocumentRecord) -> Option<DocumentRecord> {
        if let Some(old) = self.documents.get(&record.id) {
            if old.key != record.key {
                self.keys.remove(&old.key);
            }
        }
        self.keys.insert(record.key.clone(), record.id);
        self.last_document_id = self.last_document_id.max(record.id);
        self.documents.insert(record.id, record)
    }

    fn remove_document(&mut self, id: DocumentId) -> Option<DocumentRecord> {
        let old = self.documents.remove(&id)?;
        if self.keys.get(&old.key) == Some(&id) {
            self.keys.remove(&old.key);
        }
        Some(old)
    }

    fn put_occurrence(&mut self, occurrence: Occurrence) -> Option<u8> {
        self.words_by_document
            .entry(occurrence.document_id)
            .or_default()
            .insert(occurrence.word_id);
        self.postings
            .entry(occurrence.word_id)
            .or_default()
            .insert(occurrence.document_id, occurrence.score)
    }

    fn remove_occurrence(&mut self, word_id: WordId, document_id: DocumentId) -> Option<u8> {
        if let Some(words) = self.words_by_document.get_mut(&document_id) {
            words.remove(&word_id);
            if words.is_empty() {
                self.words_by_document.remove(&document_id);
            }
        }
        let list = self.postings.get_mut(&word_id)?;
        let score = list.remove(&document_id);
        if list.is_empty() {
            self.postings.remove(&word_id);
        }
        score
    }

    fn occurrences_of(&self, document_id: DocumentId) -> Vec<Occurrence> {
        self.words_by_document
            .get(&document_id)
            .into_iter()
            .flatten()
            .filter_map(|word_id| {
                self.postings
                    .get(word_id)
                    .and_then(|list| list.get(&document_id))
                    .map(|&score| Occurrence {
                        word_id: *word_id,
                        document_id,
                        score,
                    })
            })
            .collect()
    }
}

enum Undo {
    WordInserted(String),
    DocumentInserted(Shard, DocumentId),
    DocumentReplaced(Shard, DocumentRecord),
    OccurrenceWritten(Shard, WordId, DocumentId, Option<u8>),
    OccurrenceRemoved(Shard, Occurrence),
    MigrationState(Option<MigrationState>),
    CourseYear(CourseId, Option<CourseYearRecord>),
}

pub struct MemoryTransaction<'a> {
    data: MutexGuard<'a, MemoryData>,
    fail_after: &'a AtomicUsize,
    journal: Vec<Undo>,
    committed: bool,
}

impl MemoryTransaction<'_> {
    fn check_injected_failure(&self) -> Result<()> {
        let remaining = self.fail_after.load(Ordering::SeqCst);
        if remaining == NO_INJECTED_FAILURE {
            return Ok(());
        }
        if remaining == 0 {
            return Err(CourseSearchError::Storage("injected failure".to_string()));
        }
        self.fail_after.store(remaining - 1, Ordering::SeqCst);
        Ok(())
    }

    fn shard(&self, shard: Shard) -> Option<&ShardData> {
        self.data.shards.get(&shard)
    }

    fn shard_mut(&mut self, shard: Shard) -> &mut ShardData {
        self.data.shards.entry(shard).or_default()
    }

    fn rollback(&mut self) {
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::WordInserted(word) => {
                    self.data.words.remove(&word);
                }
                Undo::DocumentInserted(shard, id) => {
                    self.shard_mut(shard).remove_document(id);
                }
                Undo::DocumentReplaced(shard, record) => {
                    self.shard_mut(shard).put_document(record);
                }
                Undo::OccurrenceWritten(shard, word_id, document_id, previous) => {
                    let data = self.shard_mut(shard);
                    data.remove_occurrence(word_id, document_id);
                    if let Some(score) = previous {
                        data.put_occurrence(Occurrence {
                            word_id,
                            document_id,
                            score,
                        });
                    }
                }
                Undo::OccurrenceRemoved(shard, occurrence) => {
                    self.shard_mut(shard).put_occurrence(occurrence);
                }
                Undo::MigrationState(previous) => {
                    self.data.migration = previous;
                }
                Undo::CourseYear(course_id, previous) => match previous {
                    Some(record) => {
                        self.data.course_years.insert(course_id, record);
                    }
                    None => {
                        self.data.course_years.remove(&course_id);
                    }
                },
            }
        }
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.journal.is_empty() {
            tracing::debug!(
                "[storage] Rolling back {} uncommitted changes",
                self.journal.len()
            );
            self.rollback();
        }
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn lookup_words(&mut self, words: &[String]) -> Result<HashMap<String, WordId>> {
        Ok(words
            .iter()
            .filter_map(|w| self.data.words.get(w).map(|&id| (w.clone(), id)))
            .collect())
    }

    fn insert_word(&mut self, word: &str) -> Result<WordId> {
        self.check_injected_failure()?;
        if self.data.words.contains_key(word) {
            return Err(CourseSearchError::Storage(format!(
                "duplicate word '{}'",
                word
            )));
        }
        self.data.last_word_id += 1;
        let id = self.data.last_word_id;
        self.data.words.insert(word.to_string(), id);
        self.journal.push(Undo::WordInserted(word.to_string()));
        Ok(id)
    }

    fn bulk_insert_words(&mut self, words: &[String]) -> Result<Vec<WordId>> {
        self.check_injected_failure()?;
        if let Some(dup) = words.iter().find(|w| self.data.words.contains_key(*w)) {
            return Err(CourseSearchError::Storage(format!(
                "duplicate word '{}'",
                dup
            )));
        }
        let mut ids = Vec::with_capacity(words.len());
        for word in words {
            self.data.last_word_id += 1;
            let id = self.data.last_word_id;
            self.data.words.insert(word.clone(), id);
            self.journal.push(Undo::WordInserted(word.clone()));
            ids.push(id);
        }
        Ok(ids)
    }

    fn word_count(&mut self) -> Result<usize> {
        Ok(self.data.words.len())
    }

    fn find_document(&mut self, shard: Shard, key: &DocumentKey) -> Result<Option<DocumentRecord>> {
        Ok(self.shard(shard).and_then(|data| {
            data.keys
                .get(key)
                .and_then(|id| data.documents.get(id))
                .cloned()
        }))
    }

    fn get_document(&mut self, shard: Shard, id: DocumentId) -> Result<Option<DocumentRecord>> {
        Ok(self
            .shard(shard)
            .and_then(|data| data.documents.get(&id))
            .cloned())
    }

    fn insert_document(
        &mut self,
        shard: Shard,
        key: &DocumentKey,
        time_modified: i64,
        time_expires: Option<i64>,
    ) -> Result<DocumentId> {
        self.check_injected_failure()?;
        let data = self.shard_mut(shard);
        let id = data.last_document_id + 1;
        data.put_document(DocumentRecord {
            id,
            key: key.clone(),
            time_modified,
            time_expires,
        });
        self.journal.push(Undo::DocumentInserted(shard, id));
        Ok(id)
    }

    fn update_document(&mut self, shard: Shard, record: &DocumentRecord) -> Result<()> {
        self.check_injected_failure()?;
        let data = self.shard_mut(shard);
        if !data.documents.contains_key(&record.id) {
            return Err(CourseSearchError::NotFound(format!(
                "document {} in shard {}",
                record.id, shard
            )));
        }
        if let Some(old) = data.put_document(record.clone()) {
            self.journal.push(Undo::DocumentReplaced(shard, old));
        }
        Ok(())
    }

    fn delete_document(&mut self, shard: Shard, id: DocumentId) -> Result<bool> {
        self.check_injected_failure()?;
        self.delete_occurrences(shard, id)?;
        match self.shard_mut(shard).remove_document(id) {
            Some(old) => {
                self.journal.push(Undo::DocumentReplaced(shard, old));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn select_documents(
        &mut self,
        shard: Shard,
        selector: &DocumentSelector,
    ) -> Result<Vec<DocumentRecord>> {
        let Some(data) = self.shard(shard) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<DocumentRecord> = data
            .documents
            .values()
            .filter(|record| selector.matches(record))
            .cloned()
            .collect();
        if selector.order == ScanOrder::TimeModified {
            rows.sort_by_key(|record| (record.time_modified, record.id));
        }
        if let Some(limit) = selector.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn count_documents(&mut self, shard: Shard) -> Result<usize> {
        Ok(self.shard(shard).map_or(0, |data| data.documents.len()))
    }

    fn postings(&mut self, shard: Shard, word_id: WordId) -> Result<Vec<(DocumentId, u8)>> {
        Ok(self
            .shard(shard)
            .and_then(|data| data.postings.get(&word_id))
            .map(|list| list.iter().map(|(&doc, &score)| (doc, score)).collect())
            .unwrap_or_default())
    }

    fn document_occurrences(&mut self, shard: Shard, id: DocumentId) -> Result<Vec<Occurrence>> {
        Ok(self
            .shard(shard)
            .map(|data| data.occurrences_of(id))
            .unwrap_or_default())
    }

    fn insert_occurrence(&mut self, shard: Shard, occurrence: Occurrence) -> Result<()> {
        self.check_injected_failure()?;
        let previous = self.shard_mut(shard).put_occurrence(occurrence);
        self.journal.push(Undo::OccurrenceWritten(
            shard,
            occurrence.word_id,
            occurrence.document_id,
            previous,
        ));
        Ok(())
    }

    fn bulk_insert_occurrences(&mut self, shard: Shard, occurrences: &[Occurrence]) -> Result<()> {
        self.check_injected_failure()?;
        for &occurrence in occurrences {
            let previous = self.shard_mut(shard).put_occurrence(occurrence);
            self.journal.push(Undo::OccurrenceWritten(
                shard,
                occurrence.word_id,
                occurrence.document_id,
                previous,
            ));
        }
        Ok(())
    }

    fn delete_occurrences(&mut self, shard: Shard, id: DocumentId) -> Result<usize> {
        self.check_injected_failure()?;
        let existing = match self.shard(shard) {
            Some(data) => data.occurrences_of(id),
            None => return Ok(0),
        };
        let data = self.shard_mut(shard);
        for occurrence in &existing {
            data.remove_occurrence(occurrence.word_id, id);
        }
        let removed = existing.len();
        self.journal
            .extend(existing.into_iter().map(|o| Undo::OccurrenceRemoved(shard, o)));
        Ok(removed)
    }

    fn count_occurrences(&mut self, shard: Shard) -> Result<usize> {
        Ok(self.shard(shard).map_or(0, |data| {
            data.postings.values().map(|list| list.len()).sum()
        }))
    }

    fn migration_state(&mut self) -> Result<MigrationState> {
        Ok(self.data.migration.clone().unwrap_or_default())
    }

    fn save_migration_state(&mut self, state: &MigrationState) -> Result<()> {
        self.check_injected_failure()?;
        let previous = self.data.migration.replace(state.clone());
        self.journal.push(Undo::MigrationState(previous));
        Ok(())
    }

    fn course_year(&mut self, course_id: CourseId) -> Result<Option<CourseYearRecord>> {
        Ok(self.data.course_years.get(&course_id).cloned())
    }

    fn save_course_year(&mut self, record: &CourseYearRecord) -> Result<()> {
        self.check_injected_failure()?;
        let previous = self
            .data
            .course_years
            .insert(record.course_id, record.clone());
        self.journal
            .push(Undo::CourseYear(record.course_id, previous));
        Ok(())
    }

    fn first_stale_course_year(&mut self) -> Result<Option<CourseYearRecord>> {
        Ok(self
            .data
            .course_years
            .values()
            .find(|record| record.is_stale())
            .cloned())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.committed = true;
        self.journal.clear();
        Ok(())
    }
}
