use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const UNKNOWN: &str = "Unknown";

/// One fundraiser, from skeleton (identity only) to fully enriched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: String,
    pub title: String,
    pub url: String,
    pub image_url: String,
    /// Whole dollars. `0` also covers "no amount found on the page".
    pub amount_raised: u64,
    pub description: String,
    pub created_date: String,
    pub days_running: DaysRunning,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_analysis: Option<ClassifierResult>,
}

impl CampaignRecord {
    /// Skeleton record for a canonical campaign URL; content fields at their defaults.
    pub fn skeleton(url: &str) -> Self {
        Self {
            id: campaign_id(url),
            title: String::new(),
            url: url.to_string(),
            image_url: String::new(),
            amount_raised: 0,
            description: String::new(),
            created_date: UNKNOWN.to_string(),
            days_running: DaysRunning::Unknown,
            image_analysis: None,
        }
    }

    /// Drop every content field back to its default, keeping identity.
    pub fn identity_only(&self) -> Self {
        Self::skeleton(&self.url)
    }
}

/// Last path segment of a campaign URL (`https://host/f/help-max` → `help-max`).
pub fn campaign_id(url: &str) -> String {
    url.split("/f/")
        .nth(1)
        .unwrap_or(url)
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DaysRunning {
    Days(u32),
    #[default]
    Unknown,
}

impl DaysRunning {
    pub fn is_known(&self) -> bool {
        matches!(self, DaysRunning::Days(_))
    }
}

impl fmt::Display for DaysRunning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaysRunning::Days(n) => write!(f, "{}", n),
            DaysRunning::Unknown => f.write_str(UNKNOWN),
        }
    }
}

// Serialized as a bare number or the string "Unknown", same as the CSV column.
impl Serialize for DaysRunning {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DaysRunning::Days(n) => serializer.serialize_u32(*n),
            DaysRunning::Unknown => serializer.serialize_str(UNKNOWN),
        }
    }
}

impl<'de> Deserialize<'de> for DaysRunning {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::Number(n) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(DaysRunning::Days)
                .unwrap_or_default(),
            serde_json::Value::String(s) => s
                .parse::<u32>()
                .map(DaysRunning::Days)
                .unwrap_or_default(),
            _ => DaysRunning::Unknown,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub text: String,
    /// In `[0, 1]`.
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub weight: f32,
}

/// Output of the image classifier, stored on the record whether or not it succeeded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassifierResult {
    pub success: bool,
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Whole-image descriptions, best first. Only some backends produce them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub captions: Vec<Label>,
    #[serde(default)]
    pub extracted_text: String,
    #[serde(default)]
    pub dominant_colors: Vec<Color>,
    #[serde(default)]
    pub safety_flags: BTreeMap<String, String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ClassifierResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn top_labels(&self, n: usize) -> Vec<&str> {
        self.labels.iter().take(n).map(|l| l.text.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_last_path_segment() {
        assert_eq!(campaign_id("https://www.gofundme.com/f/help-max-recover"), "help-max-recover");
        assert_eq!(campaign_id("https://www.gofundme.com/f/help-max/"), "help-max");
    }

    #[test]
    fn days_running_serializes_as_number_or_unknown() {
        let known = serde_json::to_string(&DaysRunning::Days(12)).unwrap();
        let unknown = serde_json::to_string(&DaysRunning::Unknown).unwrap();
        assert_eq!(known, "12");
        assert_eq!(unknown, "\"Unknown\"");

        let back: DaysRunning = serde_json::from_str("\"Unknown\"").unwrap();
        assert_eq!(back, DaysRunning::Unknown);
        let back: DaysRunning = serde_json::from_str("7").unwrap();
        assert_eq!(back, DaysRunning::Days(7));
    }

    #[test]
    fn record_fields_serialize_in_fixed_order() {
        let rec = CampaignRecord::skeleton("https://www.gofundme.com/f/abc");
        let json = serde_json::to_string(&rec).unwrap();
        let keys = [
            "\"id\"", "\"title\"", "\"url\"", "\"image_url\"", "\"amount_raised\"",
            "\"description\"", "\"created_date\"", "\"days_running\"",
        ];
        let positions: Vec<usize> = keys.iter().map(|k| json.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(!json.contains("image_analysis"));
    }
}
