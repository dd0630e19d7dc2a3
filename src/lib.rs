//! # coursesearch
//!
//! A word-occurrence search engine for course content, with a resumable
//! migration that splits the index into per-year shards while searches keep
//! running.
//!
//! The engine owns tokenizing, query parsing, scoring, phrase checks,
//! snippets and pagination. The host supplies persistence through
//! [`index::storage::Storage`], its courses through
//! [`catalog::CourseCatalog`], and current document content through one
//! [`provider::DocumentProvider`] per plugin.
//!
//! ## Quick start
//!
//! ```rust
//! use coursesearch::catalog::InMemoryCatalog;
//! use coursesearch::index::memory::MemoryStorage;
//! use coursesearch::provider::ResolvedContent;
//! use coursesearch::query::ScopeRestrictions;
//! use coursesearch::types::{DocumentKey, DocumentRecord};
//! use coursesearch::{DocumentUpdate, SearchIndex, SearchSettings};
//! use std::sync::Arc;
//!
//! # fn main() -> coursesearch::Result<()> {
//! let index = SearchIndex::new(
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(InMemoryCatalog::new()),
//!     SearchSettings::default(),
//! );
//! index.register_provider(
//!     "test_x",
//!     Arc::new(|_: &DocumentRecord| -> coursesearch::Result<Option<ResolvedContent>> {
//!         Ok(Some(ResolvedContent {
//!             title: "Title title first".to_string(),
//!             ..Default::default()
//!         }))
//!     }),
//! );
//!
//! let key = DocumentKey::new("test_x").with_int_refs(1, None);
//! index.update(&DocumentUpdate::new(key, "Title title first", ""))?;
//!
//! let outcome = index.search("\"title first\"", &ScopeRestrictions::default(), 0, 10)?;
//! assert_eq!(
//!     outcome.hits()[0].title,
//!     "<highlight>Title</highlight> <highlight>title</highlight> <highlight>first</highlight>"
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Year shards
//!
//! [`migration::MigrationEngine::start_transfer`] begins the split; a
//! [`migration::MigrationScheduler`] (or any caller) then runs
//! [`migration::MigrationEngine::run_split_task`] until the mode is On.
//! Course events go to `on_course_created` / `on_course_updated`, and
//! changed years are caught up by the redate task.

pub mod catalog;
pub mod error;
pub mod index;
pub mod migration;
pub mod provider;
pub mod query;
pub mod tokenizer;
pub mod types;

pub use error::{CourseSearchError, Result};
pub use index::{DeleteOutcome, DocumentScope, DocumentUpdate, SearchIndex, SearchSettings};
pub use migration::{MigrationEngine, MigrationMode, MigrationScheduler, MigrationState};
pub use query::{QueryExecutor, QueryParser, SearchHit, SearchOutcome, SearchPage};
pub use types::*;

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG` (default
/// `info`). Later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
