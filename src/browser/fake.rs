//! Scripted in-memory fetcher for loop tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{BrowserError, PageFetcher, Result};
use crate::discovery::{REVEAL_MORE_SCRIPT, SCROLL_TO_BOTTOM_SCRIPT};

#[derive(Debug, Default)]
pub struct FakeLog {
    pub navigations: Vec<String>,
    pub clicks: usize,
    pub scrolls: usize,
    pub closed: bool,
}

enum Current {
    Blank,
    Listing,
    Page(String),
}

pub struct FakeFetcher {
    pages: HashMap<String, String>,
    listing_url: Option<String>,
    /// Successive renderings of the listing; each reveal shows the next one.
    frames: Vec<String>,
    has_button: bool,
    reveals: usize,
    current: Current,
    cancel_after: Option<(usize, CancellationToken)>,
    reads: usize,
    log: Arc<Mutex<FakeLog>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            listing_url: None,
            frames: Vec::new(),
            has_button: false,
            reveals: 0,
            current: Current::Blank,
            cancel_after: None,
            reads: 0,
            log: Arc::new(Mutex::new(FakeLog::default())),
        }
    }

    pub fn with_listing(mut self, url: &str, frames: Vec<String>, has_button: bool) -> Self {
        self.listing_url = Some(url.to_string());
        self.frames = frames;
        self.has_button = has_button;
        self
    }

    /// Any URL not registered here fails to navigate.
    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// Fire `token` during the `n`-th page read.
    pub fn cancel_on_read(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    pub fn log(&self) -> Arc<Mutex<FakeLog>> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.log.lock().unwrap().navigations.push(url.to_string());
        if self.listing_url.as_deref() == Some(url) {
            self.current = Current::Listing;
            return Ok(());
        }
        match self.pages.get(url) {
            Some(html) => {
                self.current = Current::Page(html.clone());
                Ok(())
            }
            None => Err(BrowserError::Navigation {
                url: url.to_string(),
                message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            }),
        }
    }

    async fn content(&mut self) -> Result<String> {
        self.reads += 1;
        if let Some((n, token)) = &self.cancel_after {
            if self.reads == *n {
                token.cancel();
            }
        }
        match &self.current {
            Current::Blank => Ok("<html><body></body></html>".to_string()),
            Current::Listing => {
                let idx = self.reveals.min(self.frames.len().saturating_sub(1));
                Ok(self.frames.get(idx).cloned().unwrap_or_default())
            }
            Current::Page(html) => Ok(html.clone()),
        }
    }

    async fn execute_script(&mut self, script: &str) -> Result<Value> {
        let mut log = self.log.lock().unwrap();
        if script == REVEAL_MORE_SCRIPT {
            if self.has_button {
                log.clicks += 1;
                self.reveals += 1;
                return Ok(Value::String("show more".into()));
            }
            return Ok(Value::Bool(false));
        }
        if script == SCROLL_TO_BOTTOM_SCRIPT {
            log.scrolls += 1;
            if !self.has_button {
                self.reveals += 1;
            }
            return Ok(Value::Bool(true));
        }
        Ok(Value::Null)
    }

    async fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}
