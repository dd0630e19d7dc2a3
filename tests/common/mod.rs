#![allow(dead_code)]

use coursesearch::catalog::InMemoryCatalog;
use coursesearch::index::memory::MemoryStorage;
use coursesearch::index::storage::{Storage, Transaction};
use coursesearch::provider::ResolvedContent;
use coursesearch::query::ScopeRestrictions;
use coursesearch::{
    Course, DocumentId, DocumentKey, DocumentRecord, DocumentUpdate, Result, SearchIndex,
    SearchOutcome, SearchSettings, Shard,
};
use dashmap::DashMap;
use std::sync::Arc;

// 2013-06-01 and 2015-06-01 (UTC)
pub const JUNE_2013: i64 = 1_370_044_800;
pub const JUNE_2015: i64 = 1_433_116_800;

pub const PLUGIN: &str = "test_x";

/// Memory-backed index with a provider that serves whatever content was
/// last indexed for each key.
pub struct Fixture {
    pub index: Arc<SearchIndex>,
    pub storage: Arc<MemoryStorage>,
    pub catalog: Arc<InMemoryCatalog>,
    content: Arc<DashMap<DocumentKey, (String, String)>>,
}

impl Fixture {
    pub fn new(courses: Vec<Course>) -> Self {
        Self::with_settings(courses, SearchSettings::default())
    }

    pub fn with_settings(courses: Vec<Course>, settings: SearchSettings) -> Self {
        Self::build(MemoryStorage::new(), courses, settings)
    }

    pub fn build(storage: MemoryStorage, courses: Vec<Course>, settings: SearchSettings) -> Self {
        let storage = Arc::new(storage);
        let catalog = Arc::new(InMemoryCatalog::with_courses(courses));
        let index = SearchIndex::new(
            Arc::clone(&storage) as Arc<dyn Storage>,
            Arc::clone(&catalog) as Arc<dyn coursesearch::catalog::CourseCatalog>,
            settings,
        );

        let content: Arc<DashMap<DocumentKey, (String, String)>> = Arc::new(DashMap::new());
        let served = Arc::clone(&content);
        index.register_provider(
            PLUGIN,
            Arc::new(move |doc: &DocumentRecord| -> Result<Option<ResolvedContent>> {
                Ok(served.get(&doc.key).map(|entry| {
                    let (title, content) = entry.value().clone();
                    ResolvedContent {
                        title,
                        content,
                        url: format!("/view?id={}", doc.key.int_ref1.unwrap_or_default()),
                        ..Default::default()
                    }
                }))
            }),
        );

        Fixture {
            index,
            storage,
            catalog,
            content,
        }
    }

    pub fn key(n: i64, course: Option<i64>) -> DocumentKey {
        let mut key = DocumentKey::new(PLUGIN).with_int_refs(n, None);
        key.course_id = course;
        key
    }

    pub fn add(&self, key: DocumentKey, title: &str, content: &str) -> DocumentId {
        self.content
            .insert(key.clone(), (title.to_string(), content.to_string()));
        self.index
            .update(&DocumentUpdate::new(key, title, content))
            .unwrap()
    }

    pub fn add_at(&self, key: DocumentKey, title: &str, content: &str, time_modified: i64) -> DocumentId {
        self.content
            .insert(key.clone(), (title.to_string(), content.to_string()));
        self.index
            .update(&DocumentUpdate::new(key, title, content).modified_at(time_modified))
            .unwrap()
    }

    /// Drop the owner's content without telling the index.
    pub fn forget(&self, key: &DocumentKey) {
        self.content.remove(key);
    }

    pub fn search(&self, query: &str) -> SearchOutcome {
        self.search_in(query, &ScopeRestrictions::default())
    }

    pub fn search_in(&self, query: &str, scope: &ScopeRestrictions) -> SearchOutcome {
        self.index.search(query, scope, 0, 1000).unwrap()
    }

    pub fn count(&self, shard: Shard) -> usize {
        self.storage.begin().unwrap().count_documents(shard).unwrap()
    }

    pub fn word_count(&self) -> usize {
        self.storage.begin().unwrap().word_count().unwrap()
    }
}

/// `int_ref1` of every hit, in result order.
pub fn refs(outcome: &SearchOutcome) -> Vec<i64> {
    outcome
        .hits()
        .iter()
        .map(|hit| hit.document.key.int_ref1.unwrap_or_default())
        .collect()
}

pub fn sorted_refs(outcome: &SearchOutcome) -> Vec<i64> {
    let mut list = refs(outcome);
    list.sort_unstable();
    list
}
