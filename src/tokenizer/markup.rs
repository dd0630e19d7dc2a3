use once_cell::sync::Lazy;
use regex::Regex;

static COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

static INVISIBLE_ELEMENTS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"(?is)<script.*?</script>").unwrap(),
        Regex::new(r"(?is)<noscript.*?</noscript>").unwrap(),
        Regex::new(r"(?is)<object.*?</object>").unwrap(),
    ]
});

static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<.*?>").unwrap());

/// Reduce XHTML content to its visible text.
///
/// Comments and script, noscript and object elements are dropped entirely;
/// every other tag becomes a single space so adjacent words stay apart.
/// Entities are decoded last.
pub fn strip_markup(content: &str) -> String {
    let mut text = COMMENTS.replace_all(content, "").into_owned();
    for element in INVISIBLE_ELEMENTS.iter() {
        text = element.replace_all(&text, "").into_owned();
    }
    let text = TAGS.replace_all(&text, " ");
    html_escape::decode_html_entities(&text).into_owned()
}
