pub mod details;
pub mod summary;

use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;

pub use details::{extract_details, PageDetails};
pub use summary::{extract_summary, listing_cards};

/// Plain-element descriptions are cut to this many characters.
pub const DESCRIPTION_MAX_CHARS: usize = 500;

static DOLLAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\s?(\d[\d,]*)").unwrap());
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$?\s?(\d[\d,]*)").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// First `$1,234` token in `text`.
pub fn first_dollar_amount(text: &str) -> Option<u64> {
    DOLLAR_RE
        .captures_iter(text)
        .find_map(|caps| parse_digits(&caps[1]))
}

/// Largest `$1,234` token in `text`.
pub fn max_dollar_amount(text: &str) -> Option<u64> {
    DOLLAR_RE
        .captures_iter(text)
        .filter_map(|caps| parse_digits(&caps[1]))
        .max()
}

/// First number in a labelled amount element, `$` optional ("1,250 raised").
pub fn labelled_amount(text: &str) -> Option<u64> {
    NUMBER_RE
        .captures_iter(text)
        .find_map(|caps| parse_digits(&caps[1]))
}

fn parse_digits(raw: &str) -> Option<u64> {
    raw.replace(',', "").parse().ok()
}

pub fn collapse_whitespace(s: &str) -> String {
    WS_RE.replace_all(s.trim(), " ").into_owned()
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Text of an element, skipping `<script>`/`<style>` bodies.
pub fn visible_text(el: ElementRef) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(ElementRef::wrap)
            .is_some_and(|p| matches!(p.value().name(), "script" | "style" | "noscript"));
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}

pub(crate) fn class_matches(el: ElementRef, re: &Regex) -> bool {
    el.value().attr("class").is_some_and(|c| re.is_match(c))
}

/// First descendant (not `scope` itself) whose class attribute matches `re`,
/// optionally restricted to the given tag names.
pub(crate) fn find_classed<'a>(
    scope: ElementRef<'a>,
    tags: &[&str],
    re: &Regex,
) -> Option<ElementRef<'a>> {
    scope
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .filter(|el| tags.is_empty() || tags.contains(&el.value().name()))
        .find(|el| class_matches(*el, re))
}

pub(crate) fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_tokens() {
        assert_eq!(first_dollar_amount("$1,250 raised"), Some(1250));
        assert_eq!(first_dollar_amount("raised of $5,000 goal"), Some(5000));
        assert_eq!(first_dollar_amount("no money here 42"), None);
        assert_eq!(max_dollar_amount("$20 from Ann, $1,250 raised, $50"), Some(1250));
    }

    #[test]
    fn labelled_amount_accepts_bare_number() {
        assert_eq!(labelled_amount("1,250 raised"), Some(1250));
        assert_eq!(labelled_amount("$980"), Some(980));
        assert_eq!(labelled_amount("raised"), None);
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let s = "é".repeat(600);
        assert_eq!(truncate_chars(&s, DESCRIPTION_MAX_CHARS).chars().count(), 500);
    }
}
