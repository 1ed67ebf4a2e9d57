//! The page-fetching capability both collection phases drive.
//!
//! Node queries are not part of the trait: callers take a `content()` snapshot
//! and query it with `scraper`. The trait only covers what needs a live page.

pub mod chrome;
pub mod error;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use serde_json::Value;

pub use error::{BrowserError, Result};
pub use chrome::{ChromeConfig, ChromeSession};

#[async_trait]
pub trait PageFetcher: Send {
    /// Load `url` in the current tab and wait for the document to be ready.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Serialized DOM of the current page, including script-rendered nodes.
    async fn content(&mut self) -> Result<String>;

    /// Run `script` as a function body in the page (it may `return`) and
    /// give back its JSON result.
    async fn execute_script(&mut self, script: &str) -> Result<Value>;

    /// Release the underlying browser. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

/// Truthiness of a script result the way JavaScript would judge it.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
