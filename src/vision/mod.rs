//! Image classifiers behind one trait: Google Cloud Vision and Azure
//! Computer Vision, both over their REST APIs.

pub mod azure;
pub mod google;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::ClassifierResult;

pub use azure::AzureVision;
pub use google::GoogleVision;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything that can label an image by URL. Failures are reported inside the
/// result, never as an `Err`.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image_url: &str) -> ClassifierResult;
}

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Vision API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Vision API returned no response for the image")]
    Empty,

    #[error("Invalid vision endpoint {0:?}")]
    Endpoint(String),
}

pub type Result<T> = std::result::Result<T, VisionError>;

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// Turn a non-2xx response into `VisionError::Api`, keeping the body as the message.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(VisionError::Api {
        status: status.as_u16(),
        message,
    })
}
