//! Index probing: word translation and the scored AND/NOT scan.

pub mod restrictions;

use crate::error::{CourseSearchError, Result};
use crate::index::storage::Transaction;
use crate::query::parser::ParsedQuery;
use crate::types::{DocumentId, DocumentRecord, Shard, WordId};
use std::collections::{BTreeSet, HashMap, HashSet};

pub use restrictions::{
    CourseModuleRef, GroupRestriction, ModuleRestriction, ScopeRestrictions, UserRestriction,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// Every positive term resolved to word ids.
    Translated,
    /// The query cannot match anything. `failing_word` names a positive word
    /// missing from the index, or is `None` when no usable words were given.
    Unsatisfiable { failing_word: Option<String> },
}

/// Resolve every query word to its id.
///
/// A positive term with an unknown word voids the whole query. A negative
/// term with an unknown word can never exclude anything and is dropped.
pub fn translate_words(query: &mut ParsedQuery, txn: &mut dyn Transaction) -> Result<Translation> {
    let words: Vec<String> = query
        .positive
        .iter()
        .chain(query.negative.iter())
        .flat_map(|t| t.words.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if words.is_empty() {
        return Ok(Translation::Unsatisfiable { failing_word: None });
    }

    let ids = txn.lookup_words(&words)?;

    for term in &mut query.positive {
        if let Some(missing) = term.words.iter().find(|w| !ids.contains_key(*w)) {
            tracing::debug!("[query] Word '{}' is not in the index", missing);
            return Ok(Translation::Unsatisfiable {
                failing_word: Some(missing.clone()),
            });
        }
        term.word_ids = term.words.iter().map(|w| ids[w]).collect();
    }

    query
        .negative
        .retain(|term| term.words.iter().all(|w| ids.contains_key(w)));
    for term in &mut query.negative {
        term.word_ids = term.words.iter().map(|w| ids[w]).collect();
    }

    if query.positive.is_empty() {
        return Ok(Translation::Unsatisfiable { failing_word: None });
    }
    Ok(Translation::Translated)
}

/// A candidate document before phrase verification and provider lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub shard: Shard,
    pub document: DocumentRecord,
    pub total_score: u32,
}

/// Runs a translated query against one or more shards.
pub struct QueryExecutor<'a> {
    query: &'a ParsedQuery,
    max_terms: usize,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(query: &'a ParsedQuery, max_terms: usize) -> Self {
        QueryExecutor { query, max_terms }
    }

    /// Distinct word ids every result must contain.
    fn positive_ids(&self) -> Result<Vec<WordId>> {
        let mut ids = Vec::new();
        for term in &self.query.positive {
            if term.word_ids.len() != term.words.len() {
                return Err(CourseSearchError::InvalidState(
                    "query executed before translation".to_string(),
                ));
            }
            ids.extend(term.word_ids.iter().copied());
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Fail with [`CourseSearchError::TooManyTerms`] when the query probes
    /// more distinct positive words than allowed.
    pub fn check_term_count(&self) -> Result<()> {
        let count = self.positive_ids()?.len();
        if count > self.max_terms {
            return Err(CourseSearchError::TooManyTerms {
                count,
                max: self.max_terms,
            });
        }
        Ok(())
    }

    /// Single-word negative terms, excluded at the index level. Negative
    /// phrases are left to the result filter.
    fn negative_ids(&self) -> Vec<WordId> {
        self.query
            .negative
            .iter()
            .filter(|t| t.word_ids.len() == 1)
            .map(|t| t.word_ids[0])
            .collect()
    }

    /// Rows ordered by total score descending, then shard, then document id,
    /// skipping `start` and returning at most `limit`.
    ///
    /// # Errors
    ///
    /// [`CourseSearchError::TooManyTerms`] when the query has more distinct
    /// positive words than the configured ceiling. Checked before any
    /// posting list is read.
    pub fn execute(
        &self,
        txn: &mut dyn Transaction,
        shards: &[Shard],
        scope: &restrictions::ScopeRestrictions,
        start: usize,
        limit: usize,
    ) -> Result<Vec<RawRow>> {
        self.check_term_count()?;
        let positive = self.positive_ids()?;
        if positive.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let negative = self.negative_ids();

        let mut rows = Vec::new();
        for &shard in shards {
            for (document_id, total_score) in scan_shard(txn, shard, &positive, &negative)? {
                let Some(document) = txn.get_document(shard, document_id)? else {
                    continue;
                };
                if scope.matches(&document.key) {
                    rows.push(RawRow {
                        shard,
                        document,
                        total_score,
                    });
                }
            }
        }

        rows.sort_by(|a, b| {
            b.total_score
                .cmp(&a.total_score)
                .then(a.shard.cmp(&b.shard))
                .then(a.document.id.cmp(&b.document.id))
        });
        Ok(rows.into_iter().skip(start).take(limit).collect())
    }
}

/// Documents holding every positive word and none of the negative ones, with
/// summed scores.
fn scan_shard(
    txn: &mut dyn Transaction,
    shard: Shard,
    positive: &[WordId],
    negative: &[WordId],
) -> Result<Vec<(DocumentId, u32)>> {
    let mut lists = Vec::with_capacity(positive.len());
    for &word_id in positive {
        let list = txn.postings(shard, word_id)?;
        if list.is_empty() {
            return Ok(Vec::new());
        }
        lists.push(list);
    }
    lists.sort_by_key(|list| list.len());

    let mut totals: HashMap<DocumentId, u32> = lists[0]
        .iter()
        .map(|&(doc, score)| (doc, u32::from(score)))
        .collect();
    for list in &lists[1..] {
        let scores: HashMap<DocumentId, u8> = list.iter().copied().collect();
        totals.retain(|doc, total| match scores.get(doc) {
            Some(&score) => {
                *total += u32::from(score);
                true
            }
            None => false,
        });
        if totals.is_empty() {
            return Ok(Vec::new());
        }
    }

    let mut excluded = HashSet::new();
    for &word_id in negative {
        excluded.extend(txn.postings(shard, word_id)?.into_iter().map(|(doc, _)| doc));
    }
    totals.retain(|doc, _| !excluded.contains(doc));

    Ok(totals.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::MemoryStorage;
    use crate::index::storage::Storage;
    use crate::query::parser::QueryParser;
    use crate::types::{DocumentKey, Occurrence};

    /// Documents as lists of (word, score), all in the unpartitioned shard.
    fn storage_with(docs: Vec<(&str, Vec<(&str, u8)>)>) -> MemoryStorage {
        let storage = MemoryStorage::new();
        let mut txn = storage.begin().unwrap();
        let mut words: HashMap<String, WordId> = HashMap::new();
        for (name, occurrences) in docs {
            let key = DocumentKey::new("test_x").with_string_ref(name);
            let doc = txn
                .insert_document(Shard::Unpartitioned, &key, 0, None)
                .unwrap();
            for (word, score) in occurrences {
                let word_id = match words.get(word) {
                    Some(&id) => id,
                    None => {
                        let id = txn.insert_word(word).unwrap();
                        words.insert(word.to_string(), id);
                        id
                    }
                };
                txn.insert_occurrence(
                    Shard::Unpartitioned,
                    Occurrence {
                        word_id,
                        document_id: doc,
                        score,
                    },
                )
                .unwrap();
            }
        }
        txn.commit().unwrap();
        storage
    }

    fn run(storage: &MemoryStorage, text: &str) -> Vec<(String, u32)> {
        let mut query = QueryParser::parse(text);
        let mut txn = storage.begin().unwrap();
        assert_eq!(
            translate_words(&mut query, txn.as_mut()).unwrap(),
            Translation::Translated
        );
        QueryExecutor::new(&query, 20)
            .execute(
                txn.as_mut(),
                &[Shard::Unpartitioned],
                &ScopeRestrictions::default(),
                0,
                100,
            )
            .unwrap()
            .into_iter()
            .map(|row| (row.document.key.string_ref.unwrap(), row.total_score))
            .collect()
    }

    #[test]
    fn test_translate_reports_missing_positive_word() {
        let storage = storage_with(vec![("a", vec![("frog", 1)])]);
        let mut txn = storage.begin().unwrap();
        let mut query = QueryParser::parse("frog toad");
        assert_eq!(
            translate_words(&mut query, txn.as_mut()).unwrap(),
            Translation::Unsatisfiable {
                failing_word: Some("toad".to_string())
            }
        );
    }

    #[test]
    fn test_translate_drops_unknown_negative() {
        let storage = storage_with(vec![("a", vec![("frog", 1)])]);
        let mut txn = storage.begin().unwrap();
        let mut query = QueryParser::parse("frog -toad -\"frog toad\"");
        assert_eq!(
            translate_words(&mut query, txn.as_mut()).unwrap(),
            Translation::Translated
        );
        assert!(query.negative.is_empty());
        assert_eq!(query.positive[0].word_ids.len(), 1);
    }

    #[test]
    fn test_translate_without_positive_terms() {
        let storage = storage_with(vec![("a", vec![("frog", 1)])]);
        let mut txn = storage.begin().unwrap();
        let mut empty = QueryParser::parse("  !! ");
        assert_eq!(
            translate_words(&mut empty, txn.as_mut()).unwrap(),
            Translation::Unsatisfiable { failing_word: None }
        );
        let mut only_negative = QueryParser::parse("-frog");
        assert_eq!(
            translate_words(&mut only_negative, txn.as_mut()).unwrap(),
            Translation::Unsatisfiable { failing_word: None }
        );
    }

    #[test]
    fn test_and_semantics_with_summed_scores() {
        let storage = storage_with(vec![
            ("a", vec![("frog", 1), ("pond", 2)]),
            ("b", vec![("frog", 16)]),
            ("c", vec![("frog", 20), ("pond", 1)]),
        ]);
        assert_eq!(
            run(&storage, "frog pond"),
            vec![("c".to_string(), 21), ("a".to_string(), 3)]
        );
    }

    #[test]
    fn test_single_word_negative_excluded() {
        let storage = storage_with(vec![
            ("a", vec![("title", 16), ("not", 1)]),
            ("b", vec![("title", 16)]),
            ("c", vec![("title", 17)]),
        ]);
        assert_eq!(
            run(&storage, "title -not"),
            vec![("c".to_string(), 17), ("b".to_string(), 16)]
        );
    }

    #[test]
    fn test_ties_break_on_document_id() {
        let storage = storage_with(vec![
            ("a", vec![("frog", 5)]),
            ("b", vec![("frog", 5)]),
            ("c", vec![("frog", 5)]),
        ]);
        let names: Vec<String> = run(&storage, "frog").into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_too_many_terms_rejected() {
        let storage = storage_with(vec![("a", vec![("one", 1), ("two", 1), ("three", 1)])]);
        let mut query = QueryParser::parse("one two three");
        let mut txn = storage.begin().unwrap();
        translate_words(&mut query, txn.as_mut()).unwrap();
        let result = QueryExecutor::new(&query, 2).execute(
            txn.as_mut(),
            &[Shard::Unpartitioned],
            &ScopeRestrictions::default(),
            0,
            10,
        );
        assert_eq!(
            result,
            Err(CourseSearchError::TooManyTerms { count: 3, max: 2 })
        );
    }

    #[test]
    fn test_untranslated_query_is_an_error() {
        let storage = MemoryStorage::new();
        let query = QueryParser::parse("frog");
        let mut txn = storage.begin().unwrap();
        let result = QueryExecutor::new(&query, 20).execute(
            txn.as_mut(),
            &[Shard::Unpartitioned],
            &ScopeRestrictions::default(),
            0,
            10,
        );
        assert!(matches!(result, Err(CourseSearchError::InvalidState(_))));
    }

    #[test]
    fn test_offset_and_limit() {
        let storage = storage_with(vec![
            ("a", vec![("frog", 4)]),
            ("b", vec![("frog", 3)]),
            ("c", vec![("frog", 2)]),
            ("d", vec![("frog", 1)]),
        ]);
        let mut query = QueryParser::parse("frog");
        let mut txn = storage.begin().unwrap();
        translate_words(&mut query, txn.as_mut()).unwrap();
        let rows = QueryExecutor::new(&query, 20)
            .execute(
                txn.as_mut(),
                &[Shard::Unpartitioned],
                &ScopeRestrictions::default(),
                1,
                2,
            )
            .unwrap();
        let scores: Vec<u32> = rows.iter().map(|r| r.total_score).collect();
        assert_eq!(scores, vec![3, 2]);
    }
}
