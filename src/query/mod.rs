//! Read path: parse, translate, scan shards, filter, paginate.

pub mod executor;
pub mod filter;
pub mod highlighter;
pub mod parser;

pub use executor::{QueryExecutor, ScopeRestrictions, Translation};
pub use filter::{FilterOutcome, ResultFilter};
pub use highlighter::Highlighter;
pub use parser::{ParsedQuery, QueryParser};

use crate::catalog::CourseCatalog;
use crate::error::Result;
use crate::index::settings::SearchSettings;
use crate::index::storage::Storage;
use crate::migration::router::ShardRouter;
use crate::provider::ProviderRegistry;
use crate::types::{DocumentRecord, Shard};
use serde::Serialize;

/// Scores at or above this count as a full match for display.
const FULL_SCORE: u32 = 32;

/// Sparsity assumed once a round has accepted nothing at all.
const EMPTY_ROUND_SPARSITY: f64 = 20.0;

/// One accepted search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub shard: Shard,
    pub document: DocumentRecord,
    pub total_score: u32,
    /// Escaped title with query words wrapped in highlight tags.
    pub title: String,
    /// Escaped content snippet around the densest run of query words.
    pub summary: String,
    pub activity_name: Option<String>,
    pub activity_url: Option<String>,
    pub url: String,
    pub data: Option<serde_json::Value>,
}

impl SearchHit {
    /// Score on a 0-100 scale, saturating at a score of 32.
    pub fn score_percent(&self) -> u32 {
        let capped = self.total_score.min(FULL_SCORE);
        (f64::from(100 * capped) / f64::from(FULL_SCORE)).round() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    /// Offset to pass as `start` for the following page.
    pub next_start: usize,
    /// Raw index rows fetched to build this page.
    pub rows_examined: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum SearchOutcome {
    Found(SearchPage),
    /// The query cannot match: `failing_word` is a word missing from the
    /// index, or `None` when the query had no usable words.
    NoMatch { failing_word: Option<String> },
}

impl SearchOutcome {
    pub fn hits(&self) -> &[SearchHit] {
        match self {
            SearchOutcome::Found(page) => &page.hits,
            SearchOutcome::NoMatch { .. } => &[],
        }
    }

    pub fn page(&self) -> Option<&SearchPage> {
        match self {
            SearchOutcome::Found(page) => Some(page),
            SearchOutcome::NoMatch { .. } => None,
        }
    }
}

/// Drives one search across the shards the router picks.
pub struct Searcher<'a> {
    storage: &'a dyn Storage,
    catalog: &'a dyn CourseCatalog,
    settings: &'a SearchSettings,
    providers: &'a ProviderRegistry,
}

impl<'a> Searcher<'a> {
    pub fn new(
        storage: &'a dyn Storage,
        catalog: &'a dyn CourseCatalog,
        settings: &'a SearchSettings,
        providers: &'a ProviderRegistry,
    ) -> Self {
        Searcher {
            storage,
            catalog,
            settings,
            providers,
        }
    }

    /// Collect up to `desired` hits starting at raw offset `start`.
    ///
    /// Raw rows are fetched in rounds. Each round asks for the number of
    /// hits still wanted times the observed ratio of rows fetched to hits
    /// accepted, so heavy post-filtering widens later requests. Searching
    /// stops once enough hits are found or the index runs out of rows.
    ///
    /// One storage transaction spans the whole search, including provider
    /// lookups and `post_filter` calls. Neither may use the same storage.
    ///
    /// # Errors
    ///
    /// [`crate::CourseSearchError::TooManyTerms`] when the query looks up too
    /// many words; storage and provider failures are propagated.
    pub fn search(
        &self,
        query_text: &str,
        scope: &ScopeRestrictions,
        start: usize,
        desired: usize,
        post_filter: &mut dyn FnMut(&mut SearchHit) -> bool,
    ) -> Result<SearchOutcome> {
        let mut query = QueryParser::parse(query_text);
        let mut txn = self.storage.begin()?;

        if let Translation::Unsatisfiable { failing_word } =
            executor::translate_words(&mut query, txn.as_mut())?
        {
            return Ok(SearchOutcome::NoMatch { failing_word });
        }

        let executor = QueryExecutor::new(&query, self.settings.max_terms);
        executor.check_term_count()?;

        let state = txn.migration_state()?;
        let router = ShardRouter::new(self.settings, self.catalog);
        let course_ids = scope.course_ids();
        let shards = router.search_shards(txn.as_mut(), &state, course_ids.as_deref())?;

        let highlighter = Highlighter::default().with_summary_length(self.settings.summary_length);
        let filter = ResultFilter::new(&query, self.providers, &highlighter);

        let mut hits = Vec::new();
        let mut consumed = 0;
        let mut deleted = 0;
        let mut total_requested = 0;
        let mut total_accepted = 0;
        let mut sparsity = if query.has_phrases() { 2.0 } else { 1.0 };

        while hits.len() < desired {
            let wanted = desired - hits.len();
            let request = ((wanted as f64 * sparsity).ceil() as usize)
                .clamp(1, self.settings.max_db_request.max(1));

            // Deleted rows no longer occupy a place in the merged order.
            let offset = start + consumed - deleted;
            let rows = executor.execute(txn.as_mut(), &shards, scope, offset, request)?;
            let returned = rows.len();

            let outcome = filter.filter(txn.as_mut(), rows, wanted, post_filter)?;
            consumed += outcome.consumed;
            deleted += outcome.deleted;
            let accepted = outcome.accepted.len();
            hits.extend(outcome.accepted);

            if hits.len() >= desired || returned < request {
                total_requested += returned;
                break;
            }
            total_requested += request;
            total_accepted += accepted;
            sparsity = if total_accepted == 0 {
                EMPTY_ROUND_SPARSITY
            } else {
                total_requested as f64 / total_accepted as f64
            };
            tracing::debug!(
                "[search] {} of {} hits after {} rows; sparsity now {:.2}",
                hits.len(),
                desired,
                total_requested,
                sparsity
            );
        }

        txn.commit()?;

        Ok(SearchOutcome::Found(SearchPage {
            hits,
            next_start: start + consumed - deleted,
            rows_examined: total_requested,
        }))
    }
}
