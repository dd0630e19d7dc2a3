//! Post-index filtering: phrase verification, provider lookup and hit
//! assembly.

use crate::error::Result;
use crate::index::storage::Transaction;
use crate::provider::{ProviderRegistry, ResolvedContent};
use crate::query::executor::RawRow;
use crate::query::highlighter::Highlighter;
use crate::query::parser::{ParsedQuery, QueryTerm};
use crate::query::SearchHit;
use crate::tokenizer::{
    split_words, split_words_with_positions, strip_markup, truncate_word, SplitMode,
    MAX_WORD_LENGTH,
};
use regex::Regex;
use std::collections::HashSet;

/// Result of filtering one batch of raw rows.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub accepted: Vec<SearchHit>,
    /// Raw rows looked at, including rejected ones.
    pub consumed: usize,
    /// Rows among `consumed` whose documents were removed from the index
    /// because their content no longer exists.
    pub deleted: usize,
}

struct PhraseCheck {
    words: Vec<String>,
    negative: bool,
    quick: Option<Regex>,
}

impl PhraseCheck {
    fn new(term: &QueryTerm, negative: bool) -> Self {
        let quick = match Regex::new(&quick_pattern(&term.words)) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!("[filter] Could not build phrase pattern: {}", e);
                None
            }
        };
        PhraseCheck {
            words: term.words.clone(),
            negative,
            quick,
        }
    }

    /// False only when the phrase certainly does not occur in `text`.
    fn may_occur(&self, text: &str) -> bool {
        self.quick.as_ref().map_or(true, |regex| regex.is_match(text))
    }

    fn occurs_in(&self, segment: &[String]) -> bool {
        segment
            .windows(self.words.len())
            .any(|window| window == self.words.as_slice())
    }
}

/// Pattern matching the phrase words separated by non-alphanumerics. Words
/// cut to the index length also match their longer originals.
fn quick_pattern(words: &[String]) -> String {
    let parts: Vec<String> = words
        .iter()
        .map(|word| {
            let mut part = format!("(?i:{})", regex::escape(word));
            if word.chars().count() >= MAX_WORD_LENGTH {
                part.push_str(r"[\w']*");
            }
            part
        })
        .collect();
    format!(
        "(^|[^A-Za-z0-9]){}($|[^A-Za-z0-9])",
        parts.join("[^A-Za-z0-9]+")
    )
}

/// Turns executor rows into search hits.
pub struct ResultFilter<'a> {
    providers: &'a ProviderRegistry,
    highlighter: &'a Highlighter,
    positive_words: HashSet<String>,
    phrases: Vec<PhraseCheck>,
}

impl<'a> ResultFilter<'a> {
    pub fn new(query: &ParsedQuery, providers: &'a ProviderRegistry, highlighter: &'a Highlighter) -> Self {
        let phrases = query
            .positive
            .iter()
            .map(|t| (t, false))
            .chain(query.negative.iter().map(|t| (t, true)))
            .filter(|(t, _)| t.is_phrase())
            .map(|(t, negative)| PhraseCheck::new(t, negative))
            .collect();
        ResultFilter {
            providers,
            highlighter,
            positive_words: query.positive_words(),
            phrases,
        }
    }

    /// Accept rows in order until `desired` hits are collected.
    ///
    /// Documents whose provider reports them gone are deleted from the shard
    /// the row came from. Rows for plugins without a registered provider are
    /// skipped and left in place.
    ///
    /// # Errors
    ///
    /// Storage failures during self-healing deletes and provider errors are
    /// propagated.
    pub fn filter(
        &self,
        txn: &mut dyn Transaction,
        rows: Vec<RawRow>,
        desired: usize,
        post_filter: &mut dyn FnMut(&mut SearchHit) -> bool,
    ) -> Result<FilterOutcome> {
        let mut outcome = FilterOutcome::default();

        for row in rows {
            if outcome.accepted.len() >= desired {
                break;
            }
            outcome.consumed += 1;

            let plugin = &row.document.key.plugin;
            let Some(provider) = self.providers.get(plugin) else {
                tracing::warn!(
                    "[filter] No provider registered for {}; skipping document {}",
                    plugin,
                    row.document.id
                );
                continue;
            };

            let Some(content) = provider.resolve(&row.document)? else {
                tracing::debug!(
                    "[filter] Document {} ({}) no longer exists; removing it from {}",
                    row.document.id,
                    plugin,
                    row.shard
                );
                txn.delete_document(row.shard, row.document.id)?;
                outcome.deleted += 1;
                continue;
            };
            if content.hidden {
                continue;
            }

            let Some(mut hit) = self.build_hit(row, content) else {
                continue;
            };
            if post_filter(&mut hit) {
                outcome.accepted.push(hit);
            }
        }

        Ok(outcome)
    }

    /// The hit for a row, or `None` when phrase verification rejects it.
    fn build_hit(&self, row: RawRow, content: ResolvedContent) -> Option<SearchHit> {
        let title = content.title.replace('\u{2019}', "'");
        let body = strip_markup(&content.content).replace('\u{2019}', "'");
        let extras: Vec<String> = content
            .extra_strings
            .iter()
            .map(|s| strip_markup(s).replace('\u{2019}', "'"))
            .collect();

        let body_split = split_words_with_positions(&body, SplitMode::Index);

        if !self.phrases.is_empty() {
            let mut quick_text = format!("{} {}", title, body);
            for extra in &extras {
                quick_text.push(' ');
                quick_text.push_str(extra);
            }

            let mut segments: Vec<Vec<String>> = Vec::with_capacity(1 + extras.len());
            let mut main: Vec<String> = split_words(&title, SplitMode::Index);
            main.extend(body_split.words.iter().cloned());
            segments.push(main);
            segments.extend(extras.iter().map(|s| split_words(s, SplitMode::Index)));
            for segment in &mut segments {
                for word in segment.iter_mut() {
                    *word = truncate_word(word);
                }
            }

            for phrase in &self.phrases {
                let found = phrase.may_occur(&quick_text)
                    && segments.iter().any(|segment| phrase.occurs_in(segment));
                if found == phrase.negative {
                    return None;
                }
            }
        }

        Some(SearchHit {
            shard: row.shard,
            total_score: row.total_score,
            title: self.highlighter.highlight_title(&title, &self.positive_words),
            summary: self
                .highlighter
                .snippet(&body, &body_split, &self.positive_words),
            activity_name: content.activity_name,
            activity_url: content.activity_url,
            url: content.url,
            data: content.data,
            document: row.document,
        })
    }
}
