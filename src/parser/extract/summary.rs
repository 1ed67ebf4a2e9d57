use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{
    class_matches, collapse_whitespace, find_classed, first_dollar_amount, labelled_amount,
    visible_text,
};
use crate::frontier::canonicalize;
use crate::record::CampaignRecord;

/// Path segment every fundraiser page lives under.
pub const FUNDRAISER_PATH: &str = "/f/";

/// How far above a link we look for its card container.
const CARD_MAX_DEPTH: usize = 6;

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static SUBHEADING: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2, h3").unwrap());
static CARD_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)campaign|card|tile").unwrap());
static TITLE_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)title|heading").unwrap());
static AMOUNT_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)raised|amount").unwrap());

/// Card containers on a listing page, one per distinct campaign link, in document order.
pub fn listing_cards<'a>(html: &'a Html, base: &Url) -> Vec<ElementRef<'a>> {
    let mut seen = HashSet::new();
    let mut cards = Vec::new();

    for anchor in html.select(&ANCHOR) {
        if !is_campaign_anchor(anchor, base) {
            continue;
        }
        let card = card_container(anchor, base);
        if seen.insert(card.id()) {
            cards.push(card);
        }
    }

    cards
}

/// Summary fields from one listing card. `None` when the card has no
/// fundraiser link; every other missing field falls back to its default.
pub fn extract_summary(card: ElementRef, base: &Url) -> Option<CampaignRecord> {
    let url = identifying_url(card, base)?;

    let mut record = CampaignRecord::skeleton(&canonicalize(url.as_str()));
    record.image_url = image_url(card, base);
    record.title = title(card);
    record.amount_raised = amount(card);
    Some(record)
}

/// `href` resolved against `base` when it names a fundraiser on the same
/// site: http(s), same host modulo `www.`, path under `/f/<slug>`.
/// Category tiles (`/discover/...`), sign-in links and off-site shares fail.
pub fn fundraiser_url(href: &str, base: &Url) -> Option<Url> {
    let url = base.join(href.trim()).ok()?;
    let slug = url.path().strip_prefix(FUNDRAISER_PATH)?;
    let on_site = site(&url).is_some() && site(&url) == site(base);
    (matches!(url.scheme(), "http" | "https") && on_site && !slug.trim_matches('/').is_empty())
        .then_some(url)
}

fn site(url: &Url) -> Option<&str> {
    url.host_str().map(|h| h.trim_start_matches("www."))
}

fn is_campaign_anchor(anchor: ElementRef, base: &Url) -> bool {
    anchor
        .value()
        .attr("href")
        .is_some_and(|h| fundraiser_url(h, base).is_some())
}

/// Nearest card-classed ancestor that still holds only this one campaign.
/// Falls back to the direct parent, then to the anchor itself.
fn card_container<'a>(anchor: ElementRef<'a>, base: &Url) -> ElementRef<'a> {
    for el in anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .take(CARD_MAX_DEPTH)
    {
        if distinct_campaign_links(el, base) > 1 {
            break;
        }
        if class_matches(el, &CARD_CLASS_RE) {
            return el;
        }
    }

    anchor
        .parent()
        .and_then(ElementRef::wrap)
        .filter(|p| distinct_campaign_links(*p, base) <= 1)
        .unwrap_or(anchor)
}

fn distinct_campaign_links(el: ElementRef, base: &Url) -> usize {
    el.select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|h| fundraiser_url(h, base))
        .map(|u| canonicalize(u.as_str()))
        .collect::<HashSet<_>>()
        .len()
}

fn elements<'a>(scope: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    scope.descendants().filter_map(ElementRef::wrap)
}

fn identifying_url(card: ElementRef, base: &Url) -> Option<Url> {
    elements(card)
        .filter(|el| el.value().name() == "a")
        .filter_map(|a| a.value().attr("href"))
        .find_map(|h| fundraiser_url(h, base))
}

fn image_url(card: ElementRef, base: &Url) -> String {
    let Some(img) = elements(card).find(|el| el.value().name() == "img") else {
        return String::new();
    };
    // Lazy-loaded cards carry a data: placeholder in src and the real URL in data-src.
    let usable = |v: &&str| !v.trim().is_empty() && !v.starts_with("data:");
    img.value()
        .attr("src")
        .filter(usable)
        .or_else(|| img.value().attr("data-src").filter(usable))
        .and_then(|src| base.join(src.trim()).ok())
        .map(String::from)
        .unwrap_or_default()
}

fn title(card: ElementRef) -> String {
    find_classed(card, &[], &TITLE_CLASS_RE)
        .or_else(|| card.select(&SUBHEADING).next())
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default()
}

fn amount(card: ElementRef) -> u64 {
    find_classed(card, &[], &AMOUNT_CLASS_RE)
        .and_then(|el| labelled_amount(&el.text().collect::<String>()))
        .or_else(|| first_dollar_amount(&visible_text(card)))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.gofundme.com/discover/animal-fundraiser").unwrap()
    }

    fn summaries(html: &str) -> Vec<CampaignRecord> {
        let doc = Html::parse_document(html);
        listing_cards(&doc, &base())
            .into_iter()
            .filter_map(|c| extract_summary(c, &base()))
            .collect()
    }

    #[test]
    fn listing_fixture_cards() {
        let html = std::fs::read_to_string("tests/fixtures/listing.html").unwrap();
        let recs = summaries(&html);
        assert_eq!(recs.len(), 3);

        assert_eq!(recs[0].url, "https://www.gofundme.com/f/help-max-recover");
        assert_eq!(recs[0].id, "help-max-recover");
        assert_eq!(recs[0].title, "Help Max Recover");
        assert_eq!(recs[0].amount_raised, 1250);
        assert_eq!(recs[0].image_url, "https://images.gfm.com/max.jpg");

        // lazy image + title from h3 + amount from a bare $ token
        assert_eq!(recs[1].id, "shelter-roof");
        assert_eq!(recs[1].image_url, "https://images.gfm.com/roof.jpg");
        assert_eq!(recs[1].title, "New roof for the shelter");
        assert_eq!(recs[1].amount_raised, 320);

        assert_eq!(recs[2].id, "luna-surgery");
        assert_eq!(recs[2].image_url, "");
    }

    #[test]
    fn amount_text_with_commas() {
        let recs = summaries(
            r#"<div class="card"><a href="/f/x">x</a><span class="amount">$1,250 raised</span></div>"#,
        );
        assert_eq!(recs[0].amount_raised, 1250);
    }

    // Known ambiguity: a card without any amount is indistinguishable from one
    // that truly raised $0.
    #[test]
    fn missing_amount_is_lossy_zero() {
        let recs = summaries(r#"<div class="card"><a href="/f/x">Just started</a></div>"#);
        assert_eq!(recs[0].amount_raised, 0);
    }

    #[test]
    fn card_without_link_is_skipped() {
        let doc = Html::parse_document(r#"<div class="card"><span>$50 raised</span></div>"#);
        let card = doc.select(&Selector::parse("div").unwrap()).next().unwrap();
        assert!(extract_summary(card, &base()).is_none());
    }

    #[test]
    fn category_tiles_are_not_campaigns() {
        let recs = summaries(
            r#"<div class="category-grid">
                 <a class="category-tile" href="/discover/dog-fundraiser">Dogs</a>
                 <a class="CampaignTile-link" href="/discover/cat-fundraiser">Cats</a>
               </div>
               <div class="campaign-card"><a href="/f/help-max">Help Max</a> $40 raised</div>"#,
        );
        let urls: Vec<&str> = recs.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://www.gofundme.com/f/help-max"]);
        assert_eq!(recs[0].amount_raised, 40);
    }

    #[test]
    fn only_same_site_fundraiser_paths_qualify() {
        let b = base();
        assert!(fundraiser_url("/f/help-max?qid=1", &b).is_some());
        assert!(fundraiser_url("https://gofundme.com/f/help-max", &b).is_some());
        assert!(fundraiser_url("https://evil.example/f/help-max", &b).is_none());
        assert!(fundraiser_url("https://twitter.com/share?u=/f/help-max", &b).is_none());
        assert!(fundraiser_url("/discover/dog-fundraiser", &b).is_none());
        assert!(fundraiser_url("/c/abc", &b).is_none());
        assert!(fundraiser_url("/f/", &b).is_none());
        assert!(fundraiser_url("mailto:a@b.c?body=/f/x", &b).is_none());
    }

    #[test]
    fn grid_container_is_not_a_card() {
        let recs = summaries(
            r#"<div class="campaign-grid">
                 <div><a href="/f/one">One</a> $10</div>
                 <div><a href="/f/two">Two</a> $20</div>
               </div>"#,
        );
        let amounts: Vec<u64> = recs.iter().map(|r| r.amount_raised).collect();
        assert_eq!(amounts, vec![10, 20]);
    }
}
