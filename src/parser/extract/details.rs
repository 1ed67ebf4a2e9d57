use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;

use super::{
    collapse_whitespace, find_classed, labelled_amount, max_dollar_amount, non_empty,
    truncate_chars, visible_text, DESCRIPTION_MAX_CHARS,
};

const CREATED_MAX_CHARS: usize = 200;

static LD_JSON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static OG_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static OG_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:image"]"#).unwrap());
static OG_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:description"]"#).unwrap());
static PUBLISHED: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="article:published_time"]"#).unwrap());
static BYLINE_CREATED: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".m-campaign-byline-created").unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

static DESCRIPTION_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)description|story").unwrap());
static RAISED_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)raised").unwrap());
/// "Created"/"Started" followed by something datable: a count ("3 d ago",
/// "5 hours ago") or a month-name date. A bare "Get Started" button fails.
static CREATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:Created|Started)\b[:\s]*(?:on\s+)?(?:\d|(?i:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d)",
    )
    .unwrap()
});

/// Everything a full campaign page can tell us. `None` means "not on the page";
/// the caller keeps whatever the listing card said instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageDetails {
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub amount_raised: Option<u64>,
    pub description: String,
    /// Text around the "Created …" byline, fed to the age normalizer.
    pub created_text: Option<String>,
    /// Machine-readable publication timestamp (ISO-8601).
    pub published: Option<String>,
}

pub fn extract_details(page: &Html) -> PageDetails {
    let ld = ld_json_blocks(page);
    let body = page.select(&BODY).next().unwrap_or_else(|| page.root_element());

    PageDetails {
        title: meta_content(page, &OG_TITLE),
        image_url: meta_content(page, &OG_IMAGE),
        amount_raised: amount(body),
        description: description(page, body, &ld),
        created_text: created_text(page, body),
        published: meta_content(page, &PUBLISHED)
            .or_else(|| ld_field(&ld, "datePublished"))
            .or_else(|| ld_field(&ld, "dateCreated")),
    }
}

/// Structured metadata first (untouched), then the story element, then
/// `og:description`; the last two are cut to `DESCRIPTION_MAX_CHARS`.
fn description(page: &Html, body: ElementRef, ld: &[Value]) -> String {
    if let Some(desc) = ld_field(ld, "description") {
        return desc;
    }

    find_classed(body, &["div", "section", "article"], &DESCRIPTION_CLASS_RE)
        .map(visible_text)
        .and_then(non_empty)
        .or_else(|| meta_content(page, &OG_DESCRIPTION))
        .map(|d| truncate_chars(&d, DESCRIPTION_MAX_CHARS))
        .unwrap_or_default()
}

fn amount(body: ElementRef) -> Option<u64> {
    find_classed(body, &[], &RAISED_CLASS_RE)
        .and_then(|el| labelled_amount(&el.text().collect::<String>()))
        .or_else(|| max_dollar_amount(&visible_text(body)))
}

fn created_text(page: &Html, body: ElementRef) -> Option<String> {
    if let Some(el) = page.select(&BYLINE_CREATED).next() {
        if let Some(text) = non_empty(collapse_whitespace(&el.text().collect::<String>())) {
            return Some(truncate_chars(&text, CREATED_MAX_CHARS));
        }
    }

    body.descendants()
        .filter(|node| {
            node.value()
                .as_text()
                .is_some_and(|t| CREATED_RE.is_match(t))
        })
        .filter_map(|node| node.parent().and_then(ElementRef::wrap))
        .find(|parent| {
            !matches!(parent.value().name(), "script" | "style" | "noscript")
                && !in_page_chrome(*parent)
        })
        .map(visible_text)
        .and_then(non_empty)
        .map(|t| truncate_chars(&t, CREATED_MAX_CHARS))
}

/// Inside site navigation, header or footer rather than campaign content.
fn in_page_chrome(el: ElementRef) -> bool {
    std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .any(|e| matches!(e.value().name(), "nav" | "header" | "footer"))
}

fn meta_content(page: &Html, sel: &Selector) -> Option<String> {
    page.select(sel)
        .find_map(|m| m.value().attr("content"))
        .map(|c| c.trim().to_string())
        .and_then(non_empty)
}

/// Every JSON-LD block that parses; malformed ones are skipped.
fn ld_json_blocks(page: &Html) -> Vec<Value> {
    page.select(&LD_JSON)
        .filter_map(|script| {
            let raw = script.text().collect::<String>();
            match serde_json::from_str::<Value>(raw.trim()) {
                Ok(v) => Some(v),
                Err(e) => {
                    debug!("Skipping malformed ld+json block: {}", e);
                    None
                }
            }
        })
        .collect()
}

fn ld_field(blocks: &[Value], key: &str) -> Option<String> {
    blocks.iter().find_map(|b| find_string(b, key))
}

/// String value of `key` in an object, an array of objects, or an `@graph`.
fn find_string(value: &Value, key: &str) -> Option<String> {
    match value {
        Value::Object(map) => map
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .or_else(|| map.get("@graph").and_then(|g| find_string(g, key))),
        Value::Array(items) => items.iter().find_map(|v| find_string(v, key)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> PageDetails {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        extract_details(&Html::parse_document(&html))
    }

    #[test]
    fn structured_description_is_exact() {
        let d = fixture("campaign_ld");
        assert_eq!(d.description, "Help Max recover");
        assert_eq!(d.title.as_deref(), Some("Help Max Recover"));
        assert_eq!(d.image_url.as_deref(), Some("https://images.gfm.com/max-og.jpg"));
        assert_eq!(d.amount_raised, Some(1250));
        assert_eq!(d.created_text.as_deref(), Some("Created 3 d ago"));
        assert_eq!(d.published.as_deref(), Some("2025-10-20T10:00:00Z"));
    }

    #[test]
    fn story_element_is_truncated() {
        let d = fixture("campaign_plain");
        assert_eq!(d.description.chars().count(), DESCRIPTION_MAX_CHARS);
        assert!(d.description.starts_with("Luna was found"));
        assert_eq!(d.title, None);
        assert_eq!(d.image_url, None);
        // no raised-classed element: largest dollar figure on the page
        assert_eq!(d.amount_raised, Some(4000));
        assert_eq!(d.created_text.as_deref(), Some("Created October 1, 2025"));
        assert_eq!(d.published.as_deref(), Some("2025-09-30T12:00:00+00:00"));
    }

    #[test]
    fn get_started_button_does_not_win_created_text() {
        let html = r#"<html><body>
            <nav><a class="btn">Get Started</a></nav>
            <main><p>Started as a small rescue</p><p>Created October 1, 2025</p></main>
            </body></html>"#;
        let d = extract_details(&Html::parse_document(html));
        assert_eq!(d.created_text.as_deref(), Some("Created October 1, 2025"));
    }

    #[test]
    fn byline_text_in_header_is_ignored() {
        let html = r#"<html><body>
            <header><span>Started 2 d ago? Start yours</span></header>
            <p>Created 5 d ago</p>
            </body></html>"#;
        let d = extract_details(&Html::parse_document(html));
        assert_eq!(d.created_text.as_deref(), Some("Created 5 d ago"));
    }

    #[test]
    fn get_started_alone_is_no_created_text() {
        let html = r#"<html><body><a>Get Started</a><button>Started?</button></body></html>"#;
        let d = extract_details(&Html::parse_document(html));
        assert_eq!(d.created_text, None);
    }

    #[test]
    fn og_description_when_no_story() {
        let html = r#"<html><head>
            <meta property="og:description" content="Short blurb">
            </head><body><p>nothing</p></body></html>"#;
        let d = extract_details(&Html::parse_document(html));
        assert_eq!(d.description, "Short blurb");
    }

    #[test]
    fn empty_page_degrades_to_defaults() {
        let d = extract_details(&Html::parse_document("<html><body></body></html>"));
        assert_eq!(d, PageDetails::default());
    }

    #[test]
    fn graph_and_array_ld_json() {
        let html = r#"<script type="application/ld+json">
            [{"@type":"BreadcrumbList"},{"@graph":[{"description":"From graph"}]}]
            </script>"#;
        let d = extract_details(&Html::parse_document(html));
        assert_eq!(d.description, "From graph");
    }
}
