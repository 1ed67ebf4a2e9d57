//! Google Cloud Vision `images:annotate`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::{check_status, http_client, Classifier, Result, VisionError};
use crate::record::{ClassifierResult, Color, Label};

pub const DEFAULT_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";
const MAX_LABELS: u32 = 10;
const MAX_COLORS: usize = 5;

pub struct GoogleVision {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GoogleVision {
    pub fn new(api_key: &str) -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT, api_key)
    }

    pub fn with_endpoint(endpoint: &str, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn annotate(&self, image_url: &str) -> Result<ClassifierResult> {
        let body = json!({
            "requests": [{
                "image": { "source": { "imageUri": image_url } },
                "features": [
                    { "type": "LABEL_DETECTION", "maxResults": MAX_LABELS },
                    { "type": "TEXT_DETECTION" },
                    { "type": "IMAGE_PROPERTIES" },
                    { "type": "SAFE_SEARCH_DETECTION" }
                ]
            }]
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await?;

        let batch: BatchResponse = check_status(resp).await?.json().await?;
        let first = batch.responses.into_iter().next().ok_or(VisionError::Empty)?;
        Ok(to_result(first))
    }
}

#[async_trait]
impl Classifier for GoogleVision {
    async fn classify(&self, image_url: &str) -> ClassifierResult {
        match self.annotate(image_url).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Error analyzing image {} with Google Vision: {}", image_url, e);
                ClassifierResult::failure(e.to_string())
            }
        }
    }
}

// ── Wire format ──

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    responses: Vec<AnnotateResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResponse {
    #[serde(default)]
    label_annotations: Vec<EntityAnnotation>,
    #[serde(default)]
    text_annotations: Vec<EntityAnnotation>,
    image_properties_annotation: Option<ImageProperties>,
    safe_search_annotation: Option<BTreeMap<String, serde_json::Value>>,
    error: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
    #[serde(default)]
    score: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageProperties {
    dominant_colors: Option<DominantColors>,
}

#[derive(Debug, Deserialize)]
struct DominantColors {
    #[serde(default)]
    colors: Vec<ColorInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColorInfo {
    #[serde(default)]
    color: RgbColor,
    #[serde(default)]
    score: f32,
}

// Vision omits channels that are zero.
#[derive(Debug, Default, Deserialize)]
struct RgbColor {
    #[serde(default)]
    red: f32,
    #[serde(default)]
    green: f32,
    #[serde(default)]
    blue: f32,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

fn to_result(resp: AnnotateResponse) -> ClassifierResult {
    if let Some(err) = resp.error {
        return ClassifierResult::failure(err.message);
    }

    let labels = resp
        .label_annotations
        .into_iter()
        .map(|l| Label {
            text: l.description,
            confidence: l.score.clamp(0.0, 1.0),
        })
        .collect();

    // The first text annotation is the full block; the rest are single words.
    let extracted_text = resp
        .text_annotations
        .into_iter()
        .next()
        .map(|t| t.description)
        .unwrap_or_default();

    let dominant_colors = resp
        .image_properties_annotation
        .and_then(|p| p.dominant_colors)
        .map(|d| d.colors)
        .unwrap_or_default()
        .into_iter()
        .take(MAX_COLORS)
        .map(|c| Color {
            red: channel(c.color.red),
            green: channel(c.color.green),
            blue: channel(c.color.blue),
            weight: c.score,
        })
        .collect();

    let safety_flags = resp
        .safe_search_annotation
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
        .collect();

    ClassifierResult {
        success: true,
        labels,
        extracted_text,
        dominant_colors,
        safety_flags,
        ..Default::default()
    }
}

fn channel(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
