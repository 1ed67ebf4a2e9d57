pub mod age;
pub mod extract;

use chrono::NaiveDate;
use scraper::Html;
use url::Url;

use crate::record::{CampaignRecord, UNKNOWN};
use extract::PageDetails;

/// Listing HTML → one summary record per card that has an identifying link.
pub fn read_listing(html: &str, base: &Url) -> Vec<CampaignRecord> {
    let doc = Html::parse_document(html);
    extract::listing_cards(&doc, base)
        .into_iter()
        .filter_map(|card| extract::extract_summary(card, base))
        .collect()
}

/// Campaign page HTML → detail fields.
pub fn read_campaign_page(html: &str) -> PageDetails {
    extract::extract_details(&Html::parse_document(html))
}

/// Fill `record` from a campaign page. Page values win when present; the
/// listing card's values stay otherwise.
pub fn apply_details(record: &mut CampaignRecord, details: PageDetails, today: NaiveDate) {
    record.days_running = age::normalize_age(
        details.created_text.as_deref().unwrap_or_default(),
        details.published.as_deref(),
        today,
    );
    record.created_date = details
        .created_text
        .or_else(|| details.published.clone())
        .unwrap_or_else(|| UNKNOWN.to_string());

    if let Some(title) = details.title {
        record.title = title;
    }
    if let Some(image) = details.image_url {
        record.image_url = image;
    }
    if let Some(amount) = details.amount_raised {
        record.amount_raised = amount;
    }
    record.description = details.description;
}
