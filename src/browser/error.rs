use std::time::Duration;

use chromiumoxide::error::CdpError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Could not start browser: {0}")]
    Launch(String),

    #[error("DevTools protocol error: {0}")]
    Cdp(String),

    #[error("Failed to load {url}: {message}")]
    Navigation { url: String, message: String },

    #[error("Page did not load within {0:?}")]
    Timeout(Duration),

    #[error("Browser session already closed")]
    Closed,
}

impl From<CdpError> for BrowserError {
    fn from(err: CdpError) -> Self {
        BrowserError::Cdp(err.to_string())
    }
}
