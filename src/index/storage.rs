//! Persistence seam.
//!
//! The engine never talks to a database directly. Hosts implement [`Storage`]
//! over whatever they have (relational tables, a key-value store, an embedded
//! engine); [`crate::index::memory::MemoryStorage`] is the in-process
//! implementation used by tests and embedders without a database.
//!
//! Every mutation happens inside a [`Transaction`]. Dropping a transaction
//! without calling [`Transaction::commit`] must discard all of its changes.

use crate::error::Result;
use crate::migration::state::MigrationState;
use crate::types::{
    CourseId, CourseModuleId, CourseYearRecord, DocumentId, DocumentKey, DocumentRecord,
    Occurrence, Shard, WordId,
};
use std::collections::HashMap;

pub trait Storage: Send + Sync {
    /// Whether the bulk word/occurrence insert paths are available. When
    /// false the engine inserts one row at a time.
    fn supports_bulk_copy(&self) -> bool {
        false
    }

    fn begin(&self) -> Result<Box<dyn Transaction + '_>>;

    /// Remove every document and occurrence in a shard. Runs outside any
    /// transaction so backends can use a fast truncate.
    fn truncate_shard(&self, shard: Shard) -> Result<()>;
}

pub trait Transaction {
    /// Ids for those of `words` that already exist. Unknown words are absent
    /// from the map.
    fn lookup_words(&mut self, words: &[String]) -> Result<HashMap<String, WordId>>;

    fn insert_word(&mut self, word: &str) -> Result<WordId>;

    /// Insert many new words at once, returning ids in input order. Only
    /// called when [`Storage::supports_bulk_copy`] is true.
    fn bulk_insert_words(&mut self, words: &[String]) -> Result<Vec<WordId>>;

    fn word_count(&mut self) -> Result<usize>;

    fn find_document(&mut self, shard: Shard, key: &DocumentKey) -> Result<Option<DocumentRecord>>;

    fn get_document(&mut self, shard: Shard, id: DocumentId) -> Result<Option<DocumentRecord>>;

    fn insert_document(
        &mut self,
        shard: Shard,
        key: &DocumentKey,
        time_modified: i64,
        time_expires: Option<i64>,
    ) -> Result<DocumentId>;

    /// Overwrite the stored record with the same id.
    fn update_document(&mut self, shard: Shard, record: &DocumentRecord) -> Result<()>;

    /// Delete a document and all of its occurrences. Returns false if absent.
    fn delete_document(&mut self, shard: Shard, id: DocumentId) -> Result<bool>;

    fn select_documents(
        &mut self,
        shard: Shard,
        selector: &DocumentSelector,
    ) -> Result<Vec<DocumentRecord>>;

    fn count_documents(&mut self, shard: Shard) -> Result<usize>;

    /// Posting list for a word: every document containing it, with its score.
    fn postings(&mut self, shard: Shard, word_id: WordId) -> Result<Vec<(DocumentId, u8)>>;

    fn document_occurrences(&mut self, shard: Shard, id: DocumentId) -> Result<Vec<Occurrence>>;

    fn insert_occurrence(&mut self, shard: Shard, occurrence: Occurrence) -> Result<()>;

    /// Only called when [`Storage::supports_bulk_copy`] is true.
    fn bulk_insert_occurrences(&mut self, shard: Shard, occurrences: &[Occurrence]) -> Result<()>;

    fn delete_occurrences(&mut self, shard: Shard, id: DocumentId) -> Result<usize>;

    fn count_occurrences(&mut self, shard: Shard) -> Result<usize>;

    /// Stored migration progress, or the default (Off) if never saved.
    fn migration_state(&mut self) -> Result<MigrationState>;

    fn save_migration_state(&mut self, state: &MigrationState) -> Result<()>;

    fn course_year(&mut self, course_id: CourseId) -> Result<Option<CourseYearRecord>>;

    /// Insert or replace the record for `record.course_id`.
    fn save_course_year(&mut self, record: &CourseYearRecord) -> Result<()>;

    /// The stale record with the lowest course id, if any.
    fn first_stale_course_year(&mut self) -> Result<Option<CourseYearRecord>>;

    fn commit(self: Box<Self>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CourseFilter {
    #[default]
    Any,
    NoCourse,
    Course(CourseId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanOrder {
    #[default]
    Id,
    TimeModified,
}

/// Predicate plus ordering for bulk document selects.
#[derive(Debug, Clone, Default)]
pub struct DocumentSelector {
    pub plugin: Option<String>,
    pub course: CourseFilter,
    pub course_module_id: Option<CourseModuleId>,
    pub user_id: Option<i64>,
    /// Only documents with `time_modified` strictly greater than this.
    pub modified_after: Option<i64>,
    pub order: ScanOrder,
    pub limit: Option<usize>,
}

impl DocumentSelector {
    pub fn for_course(course_id: Option<CourseId>) -> Self {
        DocumentSelector {
            course: match course_id {
                Some(id) => CourseFilter::Course(id),
                None => CourseFilter::NoCourse,
            },
            ..Default::default()
        }
    }

    pub fn modified_after(mut self, timestamp: Option<i64>) -> Self {
        self.modified_after = timestamp;
        self
    }

    pub fn ordered_by(mut self, order: ScanOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &DocumentRecord) -> bool {
        let key = &record.key;
        if let Some(plugin) = &self.plugin {
            if &key.plugin != plugin {
                return false;
            }
        }
        let course_ok = match self.course {
            CourseFilter::Any => true,
            CourseFilter::NoCourse => key.course_id.is_none(),
            CourseFilter::Course(id) => key.course_id == Some(id),
        };
        if !course_ok {
            return false;
        }
        if self.course_module_id.is_some() && key.course_module_id != self.course_module_id {
            return false;
        }
        if self.user_id.is_some() && key.user_id != self.user_id {
            return false;
        }
        match self.modified_after {
            Some(after) => record.time_modified > after,
            None => true,
        }
    }
}
