use crate::catalog::CourseCatalog;
use crate::error::Result;
use crate::index::settings::SearchSettings;
use crate::index::storage::{CourseFilter, DocumentSelector, Storage, Transaction};
use crate::migration::router::ShardRouter;
use crate::tokenizer::{split_words, strip_markup, truncate_word, SplitMode};
use crate::types::{occurrence_score, CourseId, CourseModuleId, DocumentId, DocumentKey, Occurrence, Shard, WordId};
use indexmap::IndexMap;
use std::collections::HashMap;

/// New content for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpdate {
    pub key: DocumentKey,
    pub title: String,
    /// XHTML body. Markup is stripped before indexing.
    pub content: String,
    /// Stored only when set; an existing value is never cleared.
    pub time_modified: Option<i64>,
    /// Stored only when set; an existing value is never cleared.
    pub time_expires: Option<i64>,
    /// Indexed as additional body text, markup stripped.
    pub extra_strings: Vec<String>,
}

impl DocumentUpdate {
    pub fn new(key: DocumentKey, title: impl Into<String>, content: impl Into<String>) -> Self {
        DocumentUpdate {
            key,
            title: title.into(),
            content: content.into(),
            time_modified: None,
            time_expires: None,
            extra_strings: Vec::new(),
        }
    }

    pub fn modified_at(mut self, timestamp: i64) -> Self {
        self.time_modified = Some(timestamp);
        self
    }

    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.time_expires = Some(timestamp);
        self
    }

    pub fn with_extra_strings(mut self, extra: Vec<String>) -> Self {
        self.extra_strings = extra;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// No stored document had that key. Not an error.
    NotFound,
}

/// Which documents a bulk delete or user reassignment applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentScope {
    pub plugin: String,
    pub course_id: Option<CourseId>,
    pub course_module_id: Option<CourseModuleId>,
    pub user_id: Option<i64>,
}

impl DocumentScope {
    pub fn plugin(plugin: impl Into<String>) -> Self {
        DocumentScope {
            plugin: plugin.into(),
            ..Default::default()
        }
    }

    pub fn in_course(mut self, course_id: CourseId) -> Self {
        self.course_id = Some(course_id);
        self
    }

    pub fn in_course_module(mut self, course_module_id: CourseModuleId) -> Self {
        self.course_module_id = Some(course_module_id);
        self
    }

    pub fn for_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    fn selector(&self) -> DocumentSelector {
        DocumentSelector {
            plugin: Some(self.plugin.clone()),
            course: self.course_id.map_or(CourseFilter::Any, CourseFilter::Course),
            course_module_id: self.course_module_id,
            user_id: self.user_id,
            ..Default::default()
        }
    }
}

/// Title and body counts per word, in first-seen order.
pub(crate) fn count_words(title: &str, content: &str, extra_strings: &[String]) -> IndexMap<String, (usize, usize)> {
    let mut counts: IndexMap<String, (usize, usize)> = IndexMap::new();
    for word in split_words(title, SplitMode::Index) {
        counts.entry(truncate_word(&word)).or_default().0 += 1;
    }
    let body_words = std::iter::once(content)
        .chain(extra_strings.iter().map(String::as_str))
        .flat_map(|text| split_words(&strip_markup(text), SplitMode::Index));
    for word in body_words {
        counts.entry(truncate_word(&word)).or_default().1 += 1;
    }
    counts
}

/// Writes documents into whichever shard the migration state assigns them.
pub struct IndexWriter<'a> {
    storage: &'a dyn Storage,
    router: ShardRouter<'a>,
}

impl<'a> IndexWriter<'a> {
    pub fn new(storage: &'a dyn Storage, catalog: &'a dyn CourseCatalog, settings: &'a SearchSettings) -> Self {
        IndexWriter {
            storage,
            router: ShardRouter::new(settings, catalog),
        }
    }

    /// Create or replace a document and all of its occurrences.
    ///
    /// The document row, the removal of old occurrences and the insertion of
    /// new ones commit together. Copies of the same key in other shards the
    /// document could be in are removed in the same transaction.
    ///
    /// # Errors
    ///
    /// Storage failures are propagated and leave the index unchanged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use coursesearch::catalog::InMemoryCatalog;
    /// use coursesearch::index::memory::MemoryStorage;
    /// use coursesearch::index::settings::SearchSettings;
    /// use coursesearch::index::writer::{DocumentUpdate, IndexWriter};
    /// use coursesearch::types::DocumentKey;
    ///
    /// # fn main() -> coursesearch::Result<()> {
    /// let storage = MemoryStorage::new();
    /// let catalog = InMemoryCatalog::new();
    /// let settings = SearchSettings::default();
    /// let writer = IndexWriter::new(&storage, &catalog, &settings);
    ///
    /// let key = DocumentKey::new("test_x").with_int_refs(1, None);
    /// let first = writer.update(&DocumentUpdate::new(key.clone(), "Frogs", "All about frogs"))?;
    /// let second = writer.update(&DocumentUpdate::new(key, "Toads", "All about toads"))?;
    /// assert_eq!(first, second);
    /// # Ok(())
    /// # }
    /// ```
    pub fn update(&self, update: &DocumentUpdate) -> Result<DocumentId> {
        let mut txn = self.storage.begin()?;
        let state = txn.migration_state()?;
        let course_id = update.key.course_id;

        let home = self.router.home_shard(txn.as_mut(), &state, course_id)?;
        let candidates = self.router.document_shards(txn.as_mut(), &state, course_id)?;
        let mut existing = Vec::new();
        for shard in candidates {
            if let Some(record) = txn.find_document(shard, &update.key)? {
                existing.push((shard, record));
            }
        }

        let stored = existing.first().map(|(_, record)| record.clone());
        let time_modified = update
            .time_modified
            .or(stored.as_ref().map(|record| record.time_modified));

        // While a course is mid-split, documents already copied to the year
        // shard are updated there rather than pulled back, and documents dated
        // at or before the split checkpoint go straight to the year shard: the
        // split never looks behind its checkpoint again.
        let target = match home {
            Shard::Unpartitioned => {
                let copied = existing
                    .iter()
                    .map(|(shard, _)| *shard)
                    .find(|shard| matches!(shard, Shard::Year(_)));
                match copied {
                    Some(shard) => shard,
                    None => match (state.done_up_to, time_modified) {
                        (Some(done), Some(time)) if time <= done => self
                            .router
                            .split_target(&state, course_id)?
                            .unwrap_or(home),
                        _ => home,
                    },
                }
            }
            _ => home,
        };

        let mut current = None;
        for (shard, record) in existing {
            if shard == target {
                current = Some(record);
            } else {
                tracing::debug!(
                    "[writer] Removing copy of document {} from {}",
                    record.id,
                    shard
                );
                txn.delete_document(shard, record.id)?;
            }
        }

        let document_id = match current {
            Some(mut record) => {
                let mut changed = false;
                if let Some(time_modified) = update.time_modified {
                    record.time_modified = time_modified;
                    changed = true;
                }
                if let Some(time_expires) = update.time_expires {
                    record.time_expires = Some(time_expires);
                    changed = true;
                }
                if changed {
                    txn.update_document(target, &record)?;
                }
                txn.delete_occurrences(target, record.id)?;
                record.id
            }
            None => {
                let time_modified = time_modified.unwrap_or_else(|| chrono::Utc::now().timestamp());
                let time_expires = update
                    .time_expires
                    .or(stored.and_then(|record| record.time_expires));
                txn.insert_document(target, &update.key, time_modified, time_expires)?
            }
        };

        let counts = count_words(&update.title, &update.content, &update.extra_strings);
        let words: Vec<String> = counts.keys().cloned().collect();
        let word_ids = self.resolve_words(txn.as_mut(), &words)?;

        let occurrences: Vec<Occurrence> = counts
            .iter()
            .map(|(word, &(title, body))| Occurrence {
                word_id: word_ids[word],
                document_id,
                score: occurrence_score(title, body),
            })
            .collect();
        if self.storage.supports_bulk_copy() {
            txn.bulk_insert_occurrences(target, &occurrences)?;
        } else {
            for occurrence in &occurrences {
                txn.insert_occurrence(target, *occurrence)?;
            }
        }

        txn.commit()?;
        tracing::debug!(
            "[writer] Indexed document {} in {} ({} words)",
            document_id,
            target,
            occurrences.len()
        );
        Ok(document_id)
    }

    /// Ids for `words`, creating the ones not yet known.
    fn resolve_words(&self, txn: &mut dyn Transaction, words: &[String]) -> Result<HashMap<String, WordId>> {
        let mut ids = txn.lookup_words(words)?;
        let missing: Vec<String> = words
            .iter()
            .filter(|w| !ids.contains_key(*w))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(ids);
        }
        if self.storage.supports_bulk_copy() {
            let created = txn.bulk_insert_words(&missing)?;
            ids.extend(missing.into_iter().zip(created));
        } else {
            for word in missing {
                let id = txn.insert_word(&word)?;
                ids.insert(word, id);
            }
        }
        Ok(ids)
    }

    /// Remove the document with this key from every shard it could be in.
    pub fn delete(&self, key: &DocumentKey) -> Result<DeleteOutcome> {
        let mut txn = self.storage.begin()?;
        let state = txn.migration_state()?;
        let shards = self
            .router
            .document_shards(txn.as_mut(), &state, key.course_id)?;

        let mut deleted = false;
        for shard in shards {
            if let Some(record) = txn.find_document(shard, key)? {
                deleted |= txn.delete_document(shard, record.id)?;
            }
        }
        txn.commit()?;

        if deleted {
            Ok(DeleteOutcome::Deleted)
        } else {
            tracing::debug!("[writer] Delete of unknown document {:?}", key);
            Ok(DeleteOutcome::NotFound)
        }
    }

    /// Remove every document matching `scope` from all shards. Returns the
    /// number removed.
    pub fn delete_all_for(&self, scope: &DocumentScope) -> Result<usize> {
        let selector = scope.selector();
        let mut txn = self.storage.begin()?;
        let mut count = 0;
        for shard in self.router.all_shards() {
            for record in txn.select_documents(shard, &selector)? {
                if txn.delete_document(shard, record.id)? {
                    count += 1;
                }
            }
        }
        txn.commit()?;
        tracing::info!("[writer] Deleted {} documents for {}", count, scope.plugin);
        Ok(count)
    }

    /// Move every document in `scope` owned by `from_user` to `to_user`.
    /// A document already stored under the rewritten key is replaced.
    pub fn reassign_user(&self, scope: &DocumentScope, from_user: i64, to_user: i64) -> Result<usize> {
        let mut selector = scope.selector();
        selector.user_id = Some(from_user);
        let mut txn = self.storage.begin()?;
        let mut count = 0;
        for shard in self.router.all_shards() {
            for mut record in txn.select_documents(shard, &selector)? {
                record.key.user_id = Some(to_user);
                if let Some(clash) = txn.find_document(shard, &record.key)? {
                    txn.delete_document(shard, clash.id)?;
                }
                txn.update_document(shard, &record)?;
                count += 1;
            }
        }
        txn.commit()?;
        tracing::info!(
            "[writer] Reassigned {} documents from user {} to {}",
            count,
            from_user,
            to_user
        );
        Ok(count)
    }
}
