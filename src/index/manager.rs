use crate::catalog::CourseCatalog;
use crate::error::Result;
use crate::index::settings::SearchSettings;
use crate::index::storage::Storage;
use crate::index::writer::{DeleteOutcome, DocumentScope, DocumentUpdate, IndexWriter};
use crate::migration::MigrationEngine;
use crate::provider::{DocumentProvider, ProviderRegistry};
use crate::query::{ScopeRestrictions, SearchHit, SearchOutcome, Searcher};
use crate::types::{DocumentId, DocumentKey};
use std::sync::Arc;

/// One search index over a host's storage and course catalog.
///
/// Holds no per-request state; share it behind the returned `Arc`.
///
/// # Examples
///
/// ```rust
/// use coursesearch::catalog::InMemoryCatalog;
/// use coursesearch::index::memory::MemoryStorage;
/// use coursesearch::index::settings::SearchSettings;
/// use coursesearch::index::writer::DocumentUpdate;
/// use coursesearch::provider::ResolvedContent;
/// use coursesearch::query::ScopeRestrictions;
/// use coursesearch::types::{DocumentKey, DocumentRecord};
/// use coursesearch::{Result, SearchIndex};
/// use std::sync::Arc;
///
/// # fn main() -> coursesearch::Result<()> {
/// let index = SearchIndex::new(
///     Arc::new(MemoryStorage::new()),
///     Arc::new(InMemoryCatalog::new()),
///     SearchSettings::default(),
/// );
/// index.register_provider(
///     "test_x",
///     Arc::new(|_: &DocumentRecord| -> Result<Option<ResolvedContent>> {
///         Ok(Some(ResolvedContent {
///             title: "Frogs".to_string(),
///             content: "Green frogs sing".to_string(),
///             ..Default::default()
///         }))
///     }),
/// );
///
/// let key = DocumentKey::new("test_x").with_int_refs(1, None);
/// index.update(&DocumentUpdate::new(key, "Frogs", "Green frogs sing"))?;
///
/// let outcome = index.search("frogs", &ScopeRestrictions::default(), 0, 10)?;
/// assert_eq!(outcome.hits().len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct SearchIndex {
    storage: Arc<dyn Storage>,
    catalog: Arc<dyn CourseCatalog>,
    settings: SearchSettings,
    providers: ProviderRegistry,
}

impl SearchIndex {
    pub fn new(storage: Arc<dyn Storage>, catalog: Arc<dyn CourseCatalog>, settings: SearchSettings) -> Arc<Self> {
        tracing::info!(
            "[index] Search index ready (years {}..={}, bulk copy {})",
            settings.min_year,
            settings.max_year,
            storage.supports_bulk_copy()
        );
        Arc::new(SearchIndex {
            storage,
            catalog,
            settings,
            providers: ProviderRegistry::new(),
        })
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn register_provider(&self, plugin: impl Into<String>, provider: Arc<dyn DocumentProvider>) {
        self.providers.register(plugin, provider);
    }

    pub fn writer(&self) -> IndexWriter<'_> {
        IndexWriter::new(self.storage.as_ref(), self.catalog.as_ref(), &self.settings)
    }

    pub fn migration(&self) -> MigrationEngine<'_> {
        MigrationEngine::new(self.storage.as_ref(), self.catalog.as_ref(), &self.settings)
    }

    pub fn update(&self, update: &DocumentUpdate) -> Result<DocumentId> {
        self.writer().update(update)
    }

    pub fn delete(&self, key: &DocumentKey) -> Result<DeleteOutcome> {
        self.writer().delete(key)
    }

    pub fn delete_all_for(&self, scope: &DocumentScope) -> Result<usize> {
        self.writer().delete_all_for(scope)
    }

    pub fn reassign_user(&self, scope: &DocumentScope, from_user: i64, to_user: i64) -> Result<usize> {
        self.writer().reassign_user(scope, from_user, to_user)
    }

    /// Search with the standard scope restrictions only.
    pub fn search(
        &self,
        query_text: &str,
        scope: &ScopeRestrictions,
        start: usize,
        desired: usize,
    ) -> Result<SearchOutcome> {
        self.search_with_filter(query_text, scope, start, desired, &mut |_| true)
    }

    /// Search, dropping any hit for which `post_filter` returns false.
    ///
    /// `post_filter` and the registered providers run inside the search's
    /// storage transaction and must not re-enter this index.
    pub fn search_with_filter(
        &self,
        query_text: &str,
        scope: &ScopeRestrictions,
        start: usize,
        desired: usize,
        post_filter: &mut dyn FnMut(&mut SearchHit) -> bool,
    ) -> Result<SearchOutcome> {
        Searcher::new(
            self.storage.as_ref(),
            self.catalog.as_ref(),
            &self.settings,
            &self.providers,
        )
        .search(query_text, scope, start, desired, post_filter)
    }
}
