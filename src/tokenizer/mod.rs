//! Word splitting shared by the index writer, query parser and result filter.
//!
//! Words are runs of Unicode letters, digits and apostrophes. Everything else
//! is a separator. In [`SplitMode::Query`] the characters `+`, `"` and `-` are
//! also kept inside words so the parser can see prefix and quote markers.

pub mod markup;

pub use markup::strip_markup;

/// Longest word stored in the index, in characters. Longer words are cut.
pub const MAX_WORD_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    Index,
    Query,
}

/// Words of `text` together with the character offset where each one starts.
///
/// `positions` has one more entry than `words`: the final value is the length
/// of the text in characters, so word `i` spans `positions[i]..` up to (but not
/// necessarily reaching) `positions[i + 1]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionedWords {
    pub words: Vec<String>,
    pub positions: Vec<usize>,
}

impl PositionedWords {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Character length of the source text (the trailing sentinel).
    pub fn text_length(&self) -> usize {
        self.positions.last().copied().unwrap_or(0)
    }
}

/// Split text into normalized lowercase words.
///
/// ```
/// use coursesearch::tokenizer::{split_words, SplitMode};
///
/// let words = split_words("It's all double-dutch to me", SplitMode::Index);
/// assert_eq!(words, vec!["it's", "all", "double", "dutch", "to", "me"]);
/// ```
pub fn split_words(text: &str, mode: SplitMode) -> Vec<String> {
    let chars = normalize(text, mode);
    chars
        .split(|&c| c == SEPARATOR)
        .filter(|w| !w.is_empty())
        .map(|w| w.iter().collect())
        .collect()
}

/// Split text and record the character offset of every word.
pub fn split_words_with_positions(text: &str, mode: SplitMode) -> PositionedWords {
    let chars = normalize(text, mode);
    let mut words = Vec::new();
    let mut positions = Vec::new();

    let mut pos = 0;
    while pos < chars.len() {
        if chars[pos] == SEPARATOR {
            pos += 1;
            continue;
        }
        let end = chars[pos..]
            .iter()
            .position(|&c| c == SEPARATOR)
            .map(|offset| pos + offset)
            .unwrap_or(chars.len());
        words.push(chars[pos..end].iter().collect());
        positions.push(pos);
        pos = end + 1;
    }
    positions.push(chars.len());

    PositionedWords { words, positions }
}

/// Cut a word down to [`MAX_WORD_LENGTH`] characters.
pub fn truncate_word(word: &str) -> String {
    match word.char_indices().nth(MAX_WORD_LENGTH) {
        Some((byte_end, _)) => word[..byte_end].to_string(),
        None => word.to_string(),
    }
}

const SEPARATOR: char = '_';

fn is_word_char(c: char, mode: SplitMode) -> bool {
    c.is_alphabetic()
        || c.is_numeric()
        || c == '\''
        || (mode == SplitMode::Query && matches!(c, '+' | '"' | '-'))
}

/// One output char per input char so offsets line up with the original text.
fn normalize(text: &str, mode: SplitMode) -> Vec<char> {
    let mut chars: Vec<char> = text
        .chars()
        .map(|c| if c == '\u{2019}' { '\'' } else { c })
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .map(|c| if is_word_char(c, mode) { c } else { SEPARATOR })
        .collect();

    if mode == SplitMode::Index {
        trim_apostrophes(&mut chars);
    }
    chars
}

/// Apostrophe runs touching a separator or either end of the text become
/// separators; interior ones (`it's`) survive.
fn trim_apostrophes(chars: &mut [char]) {
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '\'' {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && chars[i] == '\'' {
            i += 1;
        }
        let at_start = start == 0 || chars[start - 1] == SEPARATOR;
        let at_end = i == chars.len() || chars[i] == SEPARATOR;
        if at_start || at_end {
            for c in &mut chars[start..i] {
                *c = SEPARATOR;
            }
        }
    }
}
