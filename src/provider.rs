//! Lookup of live content for indexed documents.
//!
//! The index only stores word occurrences. When a search hit is shown, the
//! system that registered the document is asked for the current title, body
//! and visibility through its [`DocumentProvider`].

use crate::error::Result;
use crate::types::DocumentRecord;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Current state of an indexed document as reported by its owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedContent {
    pub title: String,
    /// XHTML body. Markup is stripped before matching.
    pub content: String,
    /// Searchable text that is never shown in snippets.
    #[serde(default)]
    pub extra_strings: Vec<String>,
    /// Hidden documents are skipped but not deleted.
    #[serde(default)]
    pub hidden: bool,
    pub activity_name: Option<String>,
    pub activity_url: Option<String>,
    pub url: String,
    /// Owner specific payload copied onto the search hit.
    pub data: Option<serde_json::Value>,
}

/// Called during a search while its storage transaction is open. With
/// [`crate::index::memory::MemoryStorage`] that transaction holds the store's
/// lock, so a provider must not call back into the same index or storage.
pub trait DocumentProvider: Send + Sync {
    /// `Ok(None)` means the referenced content no longer exists and the
    /// document should be dropped from the index.
    fn resolve(&self, document: &DocumentRecord) -> Result<Option<ResolvedContent>>;
}

impl<F> DocumentProvider for F
where
    F: Fn(&DocumentRecord) -> Result<Option<ResolvedContent>> + Send + Sync,
{
    fn resolve(&self, document: &DocumentRecord) -> Result<Option<ResolvedContent>> {
        self(document)
    }
}

/// Maps plugin tags (`mod_forum`, `test_x`, ...) to their providers.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: Arc<DashMap<String, Arc<dyn DocumentProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, plugin: impl Into<String>, provider: Arc<dyn DocumentProvider>) {
        let plugin = plugin.into();
        tracing::debug!("[providers] Registered provider for {}", plugin);
        self.providers.insert(plugin, provider);
    }

    pub fn get(&self, plugin: &str) -> Option<Arc<dyn DocumentProvider>> {
        self.providers.get(plugin).map(|p| Arc::clone(p.value()))
    }

    pub fn contains(&self, plugin: &str) -> bool {
        self.providers.contains_key(plugin)
    }
}
