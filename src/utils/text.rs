use regex::Regex;
use std::sync::LazyLock;

static CITATION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[(?:\d+(?:[-–,]\s*\d+)*|[a-z]|citation needed|clarification needed|note \d+)\]")
        .expect("citation marker regex")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\n]+").expect("whitespace regex"));

/// First character upper case, the rest lower case.
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Capitalizes every whitespace separated word and joins them with single spaces.
pub fn capwords(text: &str) -> String {
    text.split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Key under which near-identical spellings of a common name collapse:
/// "Common Raven", "raven" and "Ra-ven" all share one key.
pub fn spelling_key(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let without_prefix = lowered.strip_prefix("common ").unwrap_or(&lowered);
    let compact: String = without_prefix
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| if c == '’' { '\'' } else { c })
        .collect();
    deunicode::deunicode(&compact)
}

/// Removes bracketed reference markers such as `[3]` or `[citation needed]`.
pub fn strip_citation_markers(text: &str) -> String {
    CITATION_MARKER.replace_all(text, "").into_owned()
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Turns a taxon name into a tag-safe token.
pub fn tag_token(text: &str) -> String {
    text.trim().replace(' ', "-")
}
