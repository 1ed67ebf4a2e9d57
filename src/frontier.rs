use std::collections::HashSet;

use crate::record::{campaign_id, CampaignRecord};

/// Scheme + host + path, without query string, fragment or trailing slash.
pub fn canonicalize(url: &str) -> String {
    let trimmed = url.trim();
    let end = trimmed.find(['?', '#']).unwrap_or(trimmed.len());
    trimmed[..end].trim_end_matches('/').to_string()
}

/// Discovered campaigns deduplicated by canonical URL, iterated in discovery
/// order. Nothing is ever removed.
#[derive(Debug, Default)]
pub struct Frontier {
    seen: HashSet<String>,
    records: Vec<CampaignRecord>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a bare URL. Returns true if it was not already present.
    pub fn add(&mut self, url: &str) -> bool {
        self.insert(CampaignRecord::skeleton(&canonicalize(url)))
    }

    /// Insert a skeleton record; a record whose canonical URL is already known is a no-op.
    pub fn insert(&mut self, mut record: CampaignRecord) -> bool {
        let key = canonicalize(&record.url);
        if key.is_empty() || !self.seen.insert(key.clone()) {
            return false;
        }
        record.id = campaign_id(&key);
        record.url = key;
        self.records.push(record);
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(&canonicalize(url))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// At most `limit` records, oldest discovered first.
    pub fn snapshot(&self, limit: usize) -> Vec<CampaignRecord> {
        self.records.iter().take(limit).cloned().collect()
    }
}
