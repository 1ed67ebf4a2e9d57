//! Azure Computer Vision `analyze` (v3.2).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use url::Url;

use super::{check_status, http_client, Classifier, Result, VisionError};
use crate::record::{ClassifierResult, Color, Label};

const ANALYZE_PATH: &str = "vision/v3.2/analyze";
const VISUAL_FEATURES: &str = "Tags,Description,Color,Adult";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const MAX_LABELS: usize = 10;

pub struct AzureVision {
    client: reqwest::Client,
    analyze_url: Url,
    key: String,
}

impl AzureVision {
    /// `endpoint` is the resource root, e.g.
    /// `https://my-resource.cognitiveservices.azure.com/`.
    pub fn new(endpoint: &str, key: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            analyze_url: analyze_url(endpoint)?,
            key: key.to_string(),
        })
    }

    async fn analyze(&self, image_url: &str) -> Result<ClassifierResult> {
        let resp = self
            .client
            .post(self.analyze_url.clone())
            .query(&[("visualFeatures", VISUAL_FEATURES)])
            .header(KEY_HEADER, &self.key)
            .json(&json!({ "url": image_url }))
            .send()
            .await?;

        let resp = check_status(resp).await.map_err(|e| match e {
            VisionError::Api { status, message } => VisionError::Api {
                status,
                message: api_message(&message),
            },
            other => other,
        })?;
        Ok(to_result(resp.json().await?))
    }
}

#[async_trait]
impl Classifier for AzureVision {
    async fn classify(&self, image_url: &str) -> ClassifierResult {
        match self.analyze(image_url).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Error analyzing image {} with Azure Vision: {}", image_url, e);
                ClassifierResult::failure(e.to_string())
            }
        }
    }
}

fn analyze_url(endpoint: &str) -> Result<Url> {
    let mut root = endpoint.trim().to_string();
    if !root.ends_with('/') {
        root.push('/');
    }
    Url::parse(&root)
        .and_then(|u| u.join(ANALYZE_PATH))
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .ok_or_else(|| VisionError::Endpoint(endpoint.to_string()))
}

/// `error.message` from an Azure error body, or the raw body.
fn api_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .map(|e| match e.code {
            Some(code) => format!("{}: {}", code, e.message),
            None => e.message,
        })
        .unwrap_or_else(|| body.to_string())
}

// ── Wire format ──

#[derive(Debug, Default, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    tags: Vec<Tag>,
    description: Option<Description>,
    color: Option<ColorInfo>,
    adult: Option<AdultInfo>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    #[serde(default)]
    name: String,
    #[serde(default)]
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct Description {
    #[serde(default)]
    captions: Vec<Caption>,
}

#[derive(Debug, Deserialize)]
struct Caption {
    #[serde(default)]
    text: String,
    #[serde(default)]
    confidence: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColorInfo {
    accent_color: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdultInfo {
    #[serde(default)]
    is_adult_content: bool,
    #[serde(default)]
    is_racy_content: bool,
    #[serde(default)]
    is_gory_content: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: Option<String>,
    #[serde(default)]
    message: String,
}

fn to_result(resp: AnalyzeResponse) -> ClassifierResult {
    let labels = resp
        .tags
        .into_iter()
        .take(MAX_LABELS)
        .map(|t| Label {
            text: t.name,
            confidence: t.confidence.clamp(0.0, 1.0),
        })
        .collect();

    let captions = resp
        .description
        .map(|d| d.captions)
        .unwrap_or_default()
        .into_iter()
        .map(|c| Label {
            text: c.text,
            confidence: c.confidence.clamp(0.0, 1.0),
        })
        .collect();

    // Azure names its dominant colors ("Brown") but gives RGB only for the accent.
    let dominant_colors = resp
        .color
        .and_then(|c| c.accent_color)
        .and_then(|hex| hex_color(&hex))
        .into_iter()
        .collect();

    // Same likelihood vocabulary as Google's safe search.
    let likelihood = |flag: bool| if flag { "LIKELY" } else { "UNLIKELY" }.to_string();
    let safety_flags = resp
        .adult
        .map(|a| {
            BTreeMap::from([
                ("adult".to_string(), likelihood(a.is_adult_content)),
                ("racy".to_string(), likelihood(a.is_racy_content)),
                ("violence".to_string(), likelihood(a.is_gory_content)),
            ])
        })
        .unwrap_or_default();

    ClassifierResult {
        success: true,
        labels,
        captions,
        dominant_colors,
        safety_flags,
        ..Default::default()
    }
}

fn hex_color(hex: &str) -> Option<Color> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Color {
        red: byte(0)?,
        green: byte(2)?,
        blue: byte(4)?,
        weight: 1.0,
    })
}
