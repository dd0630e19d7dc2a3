use crate::tokenizer::{split_words_with_positions, truncate_word, PositionedWords, SplitMode};
use std::collections::HashSet;
use std::ops::Range;

/// Marks query words in titles and builds content snippets.
///
/// Output is HTML-escaped text in which only the highlight tags are markup.
pub struct Highlighter {
    pre_tag: String,
    post_tag: String,
    summary_length: usize,
}

impl Default for Highlighter {
    fn default() -> Self {
        Self {
            pre_tag: "<highlight>".to_string(),
            post_tag: "</highlight>".to_string(),
            summary_length: 50,
        }
    }
}

impl Highlighter {
    pub fn new(pre_tag: String, post_tag: String) -> Self {
        Self {
            pre_tag,
            post_tag,
            ..Default::default()
        }
    }

    pub fn with_summary_length(mut self, words: usize) -> Self {
        self.summary_length = words.max(1);
        self
    }

    pub fn highlight_title(&self, title: &str, positive: &HashSet<String>) -> String {
        let split = split_words_with_positions(title, SplitMode::Index);
        self.highlight_range(title, &split, 0..split.len(), 0, positive)
    }

    /// The stretch of `content` with the densest run of query words.
    ///
    /// A running count of query words in the trailing window is kept at every
    /// position. The window chosen ends halfway along the longest run at the
    /// maximum count. `split` must come from the same `content`.
    pub fn snippet(&self, content: &str, split: &PositionedWords, positive: &HashSet<String>) -> String {
        let window = self.summary_length;
        let count = split.len();
        let hits: Vec<bool> = split
            .words
            .iter()
            .map(|w| is_positive(w, positive))
            .collect();

        let mut current = 0usize;
        let mut max_score: Option<usize> = None;
        let mut max_start = 0;
        let mut max_length = 0;
        let mut run = true;
        for pos in 0..count {
            if pos >= window && hits[pos - window] {
                current -= 1;
            }
            if hits[pos] {
                current += 1;
            }
            match max_score {
                Some(max) if current == max && run => max_length += 1,
                Some(max) if current <= max => run = false,
                _ => {
                    max_score = Some(current);
                    max_start = pos;
                    max_length = 1;
                    run = true;
                }
            }
        }

        let start = (max_start + max_length / 2).saturating_sub(window);
        let end = (start + window).min(count);

        let chars: Vec<char> = content.chars().collect();
        let from = split.positions[start].min(chars.len());
        let to = split.positions[end].min(chars.len());
        let mut summary: String = chars[from..to].iter().collect();
        if end < count {
            summary.push_str("...");
        }

        let mut summary = self.highlight_range(&summary, split, start..end, from, positive);
        if start != 0 {
            summary.insert_str(0, "...");
        }
        summary.trim().to_string()
    }

    /// Wrap every query word among `split.words[range]` in highlight tags.
    /// `offset` is the character position in the original text at which
    /// `text` begins.
    fn highlight_range(
        &self,
        text: &str,
        split: &PositionedWords,
        range: Range<usize>,
        offset: usize,
        positive: &HashSet<String>,
    ) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;

        for i in range {
            let word = &split.words[i];
            if !is_positive(word, positive) {
                continue;
            }
            let begin = split.positions[i].saturating_sub(offset).clamp(cursor, chars.len());
            let end = (begin + word.chars().count()).min(chars.len());
            push_escaped(&mut out, &chars[cursor..begin]);
            out.push_str(&self.pre_tag);
            push_escaped(&mut out, &chars[begin..end]);
            out.push_str(&self.post_tag);
            cursor = end;
        }
        push_escaped(&mut out, &chars[cursor..]);
        out
    }
}

fn is_positive(word: &str, positive: &HashSet<String>) -> bool {
    positive.contains(word) || positive.contains(&truncate_word(word))
}

fn push_escaped(out: &mut String, chars: &[char]) {
    let text: String = chars.iter().collect();
    out.push_str(&html_escape::encode_text(&text));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> HashSet<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_title_highlight_exact_offsets() {
        let h = Highlighter::default();
        assert_eq!(
            h.highlight_title("Title title first", &words(&["title"])),
            "<highlight>Title</highlight> <highlight>title</highlight> first"
        );
    }

    #[test]
    fn test_title_is_escaped_but_tags_are_not() {
        let h = Highlighter::default();
        assert_eq!(
            h.highlight_title("Fish & <chips>", &words(&["chips"])),
            "Fish &amp; &lt;<highlight>chips</highlight>&gt;"
        );
    }

    #[test]
    fn test_custom_tags() {
        let h = Highlighter::new("<em>".to_string(), "</em>".to_string());
        assert_eq!(h.highlight_title("a frog", &words(&["frog"])), "a <em>frog</em>");
    }

    #[test]
    fn test_short_content_snippet_is_whole_text() {
        let h = Highlighter::default();
        let content = "  The green frog sat.  ";
        let split = split_words_with_positions(content, SplitMode::Index);
        assert_eq!(
            h.snippet(content, &split, &words(&["frog"])),
            "The green <highlight>frog</highlight> sat."
        );
    }

    #[test]
    fn test_snippet_centres_on_dense_region() {
        let h = Highlighter::default().with_summary_length(4);
        let content = "a b c d e f frog frog g h i j k l";
        let split = split_words_with_positions(content, SplitMode::Index);
        let snippet = h.snippet(content, &split, &words(&["frog"]));
        assert_eq!(
            snippet,
            "...e f <highlight>frog</highlight> <highlight>frog</highlight> ..."
        );
    }

    #[test]
    fn test_snippet_without_hits_starts_at_beginning() {
        let h = Highlighter::default().with_summary_length(3);
        let content = "one two three four five";
        let split = split_words_with_positions(content, SplitMode::Index);
        assert_eq!(h.snippet(content, &split, &words(&["zzz"])), "one two three ...");
    }

    #[test]
    fn test_empty_content_snippet() {
        let h = Highlighter::default();
        let split = split_words_with_positions("", SplitMode::Index);
        assert_eq!(h.snippet("", &split, &words(&["frog"])), "");
    }

    #[test]
    fn test_long_words_match_truncated_query_words() {
        let h = Highlighter::default();
        let long = "a".repeat(40);
        let query_word = "a".repeat(32);
        assert_eq!(
            h.highlight_title(&long, &words(&[query_word.as_str()])),
            format!("<highlight>{}</highlight>", long)
        );
    }
}
