use crate::tokenizer::{split_words, truncate_word, SplitMode};
use crate::types::WordId;
use std::fmt;

/// One AND-ed unit of a query: a single word, or several words that must
/// appear consecutively (a quoted phrase or a hyphenated word).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryTerm {
    pub words: Vec<String>,
    pub required: bool,
    /// Filled in by translation, parallel to `words`.
    pub word_ids: Vec<WordId>,
}

impl QueryTerm {
    fn new(words: Vec<String>, required: bool) -> Self {
        QueryTerm {
            words,
            required,
            word_ids: Vec::new(),
        }
    }

    pub fn is_phrase(&self) -> bool {
        self.words.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedQuery {
    pub positive: Vec<QueryTerm>,
    pub negative: Vec<QueryTerm>,
}

impl ParsedQuery {
    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty()
    }

    /// True when some term can only be checked after fetching the text.
    pub fn has_phrases(&self) -> bool {
        self.positive
            .iter()
            .chain(self.negative.iter())
            .any(QueryTerm::is_phrase)
    }

    /// Distinct words of the positive terms, used for highlighting.
    pub fn positive_words(&self) -> std::collections::HashSet<String> {
        self.positive
            .iter()
            .flat_map(|t| t.words.iter().cloned())
            .collect()
    }
}

/// `+green/frogs,sing -sing/off/key:req`: positive terms, then negatives;
/// words of a term joined with `/`, terms with `,`.
impl fmt::Display for ParsedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |terms: &[QueryTerm]| {
            terms
                .iter()
                .map(|t| {
                    let mut s = t.words.join("/");
                    if t.required {
                        s.push_str(":req");
                    }
                    s
                })
                .collect::<Vec<_>>()
                .join(",")
        };
        write!(f, "+{} -{}", render(&self.positive), render(&self.negative))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Sign {
    Plain,
    Plus,
    Minus,
}

pub struct QueryParser;

impl QueryParser {
    /// Parse user query text. Never fails; unusable input gives an empty
    /// [`ParsedQuery`].
    ///
    /// ```
    /// use coursesearch::query::QueryParser;
    ///
    /// let parsed = QueryParser::parse("\"green frogs\" -\"sing off key\"");
    /// assert_eq!(parsed.to_string(), "+green/frogs -sing/off/key:req");
    /// ```
    pub fn parse(query_text: &str) -> ParsedQuery {
        let mut parsed = ParsedQuery::default();
        let mut phrase: Option<(Sign, Vec<String>)> = None;

        for raw in split_words(query_text, SplitMode::Query) {
            let cleaned = clean_word(&raw);

            if let Some((_, words)) = phrase.as_mut() {
                words.extend(explode_hyphens(&cleaned));
            } else {
                let sign = match (raw.chars().next(), raw.chars().nth(1)) {
                    (Some('"'), _) => Some(Sign::Plain),
                    (Some('+'), Some('"')) => Some(Sign::Plus),
                    (Some('-'), Some('"')) => Some(Sign::Minus),
                    _ => None,
                };
                match sign {
                    Some(sign) => phrase = Some((sign, explode_hyphens(&cleaned))),
                    None => {
                        let words = explode_hyphens(&cleaned);
                        if !words.is_empty() {
                            if raw.starts_with('-') {
                                parsed.negative.push(QueryTerm::new(words, false));
                            } else {
                                parsed
                                    .positive
                                    .push(QueryTerm::new(words, raw.starts_with('+')));
                            }
                        }
                        continue;
                    }
                }
            }

            if raw.ends_with('"') {
                if let Some((sign, words)) = phrase.take() {
                    parsed.close_phrase(sign, words);
                }
            }
        }

        if let Some((sign, words)) = phrase.take() {
            parsed.close_phrase(sign, words);
        }
        parsed
    }
}

impl ParsedQuery {
    fn close_phrase(&mut self, sign: Sign, words: Vec<String>) {
        if words.is_empty() {
            return;
        }
        match sign {
            Sign::Plain => self.positive.push(QueryTerm::new(words, false)),
            Sign::Plus => self.positive.push(QueryTerm::new(words, true)),
            Sign::Minus => self.negative.push(QueryTerm::new(words, true)),
        }
    }
}

/// Drop quote and plus markers and a leading or trailing hyphen.
fn clean_word(raw: &str) -> String {
    let stripped: String = raw.chars().filter(|&c| c != '+' && c != '"').collect();
    let stripped = stripped.strip_prefix('-').unwrap_or(&stripped);
    let stripped = stripped.strip_suffix('-').unwrap_or(stripped);
    stripped.to_string()
}

/// Split on interior hyphens, trimming the apostrophes the index trims and
/// cutting every part to the stored word length.
fn explode_hyphens(cleaned: &str) -> Vec<String> {
    cleaned
        .split('-')
        .map(|part| part.trim_matches('\''))
        .filter(|part| !part.is_empty())
        .map(truncate_word)
        .collect()
}
