//! Slicing of encyclopedia HTML into the part that describes what a species
//! looks like.
//!
//! This is a tag scanner, not a parser: it tracks open elements well enough
//! to walk the siblings that follow a section header in the flat markup that
//! encyclopedia dumps use.

use crate::utils::text::{collapse_whitespace, strip_citation_markers};
use regex::Regex;
use std::sync::LazyLock;

/// Header ids tried in order; the first keyword with a matching header wins.
pub const SECTION_KEYWORDS: [&str; 6] = [
    "description",
    "morphology",
    "appearance",
    "characteristics",
    "identification",
    "anatomy",
];

const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<(/?)([A-Za-z][A-Za-z0-9]*)\b[^>]*?(/?)>").expect("tag regex")
});

static HEADER_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<(?:h2|span)\b[^>]*?\bid\s*=\s*["']([^"']*)["']"#).expect("header id regex")
});

static CITE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<sup\b[^>]*?\bid\s*=\s*["']cite_ref[^"']*["'][^>]*>.*?</sup>"#)
        .expect("cite_ref regex")
});

static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<img\b").expect("img regex"));

static SUBHEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<h[23]\b").expect("subheading regex"));

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph regex"));

#[derive(Debug)]
struct Tag {
    start: usize,
    end: usize,
    name: String,
    closing: bool,
    self_closing: bool,
}

impl Tag {
    fn opens_element(&self) -> bool {
        !self.closing && !self.self_closing && !VOID_ELEMENTS.contains(&self.name.as_str())
    }
}

fn tokenize(html: &str) -> Vec<Tag> {
    TAG.captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(2)?;
            Some(Tag {
                start: whole.start(),
                end: whole.end(),
                name: name.as_str().to_ascii_lowercase(),
                closing: caps.get(1).is_some_and(|m| !m.as_str().is_empty()),
                self_closing: caps.get(3).is_some_and(|m| !m.as_str().is_empty()),
            })
        })
        .collect()
}

/// Applies one tag to the stack of open element names. Closing tags without
/// a matching open element are ignored; closing tags that skip unclosed
/// children pop those too.
fn apply(stack: &mut Vec<String>, tag: &Tag) {
    if tag.closing {
        if let Some(pos) = stack.iter().rposition(|name| *name == tag.name) {
            stack.truncate(pos);
        }
    } else if tag.opens_element() {
        stack.push(tag.name.clone());
    }
}

/// Byte offset of the first `h2`/`span` whose id matches a section keyword.
pub fn find_description_header(html: &str) -> Option<usize> {
    let headers: Vec<(usize, String)> = HEADER_ID
        .captures_iter(html)
        .filter_map(|caps| Some((caps.get(0)?.start(), caps.get(1)?.as_str().to_lowercase())))
        .collect();

    SECTION_KEYWORDS.iter().find_map(|keyword| {
        headers
            .iter()
            .find(|(_, id)| id.contains(keyword))
            .map(|(start, _)| *start)
    })
}

/// Drops `<sup id="cite_ref...">` reference markers.
pub fn remove_refs(html: &str) -> String {
    CITE_REF.replace_all(html, "").into_owned()
}

/// Elements following the header's parent (or the header itself when it sits
/// at the top level), as `(tag name, outer html)`.
fn following_siblings<'a>(html: &'a str, tags: &[Tag], header_start: usize) -> Vec<(&'a str, &'a str)> {
    let Some(header_idx) = tags.iter().position(|t| t.start == header_start) else {
        return Vec::new();
    };

    let mut stack = Vec::new();
    for tag in &tags[..header_idx] {
        apply(&mut stack, tag);
    }
    let anchor_depth = stack.len().saturating_sub(1);

    let mut idx = header_idx;
    loop {
        let Some(tag) = tags.get(idx) else {
            return Vec::new();
        };
        apply(&mut stack, tag);
        idx += 1;
        if stack.len() <= anchor_depth {
            break;
        }
    }

    let mut siblings = Vec::new();
    let mut current: Option<(usize, &str)> = None;
    for tag in &tags[idx..] {
        if current.is_none() {
            if tag.closing {
                apply(&mut stack, tag);
                if stack.len() < anchor_depth {
                    break;
                }
                continue;
            }
            let name = &html[tag.start + 1..tag.start + 1 + tag.name.len()];
            if tag.opens_element() {
                stack.push(tag.name.clone());
                current = Some((tag.start, name));
            } else {
                siblings.push((name, &html[tag.start..tag.end]));
            }
            continue;
        }

        apply(&mut stack, tag);
        if stack.len() <= anchor_depth {
            if let Some((start, name)) = current.take() {
                siblings.push((name, &html[start..tag.end]));
            }
            if stack.len() < anchor_depth {
                break;
            }
        }
    }

    siblings
}

/// Extracts the description section of an encyclopedia page.
///
/// Siblings containing images are skipped. Collection stops at the next
/// `h2`/`h3` once something was collected, or once more than `max_len`
/// characters were gathered.
pub fn extract_section(html: &str, max_len: usize) -> Option<String> {
    let header_start = find_description_header(html)?;
    let tags = tokenize(html);

    let mut descriptions: Vec<String> = Vec::new();
    let mut collected = 0;
    for (name, outer) in following_siblings(html, &tags, header_start) {
        if IMAGE.is_match(outer) {
            continue;
        }

        let is_heading = name.eq_ignore_ascii_case("h2")
            || name.eq_ignore_ascii_case("h3")
            || SUBHEADING.is_match(outer);
        if (is_heading && !descriptions.is_empty()) || collected > max_len {
            break;
        }

        let without_refs = remove_refs(outer);
        collected += without_refs.chars().count();
        descriptions.push(without_refs);
    }

    let section = descriptions.concat();
    (!section.trim().is_empty()).then_some(section)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Plain-text counterpart of [`extract_section`]: citation markers are
/// removed, whitespace is collapsed and paragraphs are wrapped in `<p>`.
pub fn extract_text_section(text: &str, max_len: usize) -> Option<String> {
    let mut paragraphs = Vec::new();
    let mut collected = 0;
    for raw in PARAGRAPH_BREAK.split(text) {
        if collected > max_len {
            break;
        }
        let cleaned = collapse_whitespace(&strip_citation_markers(raw));
        if cleaned.is_empty() {
            continue;
        }
        collected += cleaned.chars().count();
        paragraphs.push(format!("<p>{}</p>", escape_html(&cleaned)));
    }

    (!paragraphs.is_empty()).then(|| paragraphs.concat())
}
