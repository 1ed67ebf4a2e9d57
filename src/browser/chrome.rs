use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserError, PageFetcher, Result};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct ChromeConfig {
    /// DevTools websocket of an already running Chrome. A local Chrome is
    /// launched when unset.
    pub connect_url: Option<String>,
    /// Chrome/Chromium binary to launch; auto-detected when unset.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub page_load_timeout: Duration,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            connect_url: None,
            executable: None,
            headless: true,
            page_load_timeout: Duration::from_secs(30),
        }
    }
}

impl ChromeConfig {
    fn launch_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .request_timeout(self.page_load_timeout)
            .arg("--disable-dev-shm-usage")
            .arg(format!("--user-agent={}", USER_AGENT));
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(BrowserError::Launch)
    }
}

/// One Chrome tab driven over the DevTools protocol.
///
/// `close()` is the normal way out. If the session is dropped without it (an
/// early `?` or a panic), `Drop` spawns the cleanup on the runtime captured at
/// start-up.
pub struct ChromeSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    /// Only a browser we launched is shut down on close.
    launched: bool,
    page_load_timeout: Duration,
    runtime: tokio::runtime::Handle,
}

impl ChromeSession {
    /// Start or attach to Chrome and open a blank tab. Failure here is the one
    /// fatal error of a run.
    pub async fn start(config: &ChromeConfig) -> Result<Self> {
        let (browser, mut handler) = match &config.connect_url {
            Some(ws) => Browser::connect(ws.clone()).await,
            None => Browser::launch(config.launch_config()?).await,
        }
        .map_err(|e| BrowserError::Launch(e.to_string()))?;

        // The handler stream carries every DevTools message; it must be polled
        // for any page call to complete.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("DevTools handler: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        info!(
            "Browser {} ({})",
            if config.connect_url.is_some() { "attached" } else { "launched" },
            if config.headless { "headless" } else { "visible" }
        );

        Ok(Self {
            browser: Some(browser),
            page: Some(page),
            handler: Some(handler),
            launched: config.connect_url.is_none(),
            page_load_timeout: config.page_load_timeout,
            runtime: tokio::runtime::Handle::current(),
        })
    }

    fn page(&self) -> Result<&Page> {
        self.page.as_ref().ok_or(BrowserError::Closed)
    }
}

#[async_trait]
impl PageFetcher for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let page = self.page()?;
        let load = async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };
        match tokio::time::timeout(self.page_load_timeout, load).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BrowserError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(BrowserError::Timeout(self.page_load_timeout)),
        }
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.page()?.content().await?)
    }

    async fn execute_script(&mut self, script: &str) -> Result<Value> {
        let result = self.page()?.evaluate_expression(function_body(script)).await?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Closing tab: {}", e);
            }
        }
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };
        if self.launched {
            browser.close().await?;
            if let Err(e) = browser.wait().await {
                warn!("Waiting for Chrome to exit: {}", e);
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        info!("Browser closed");
        Ok(())
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        let page = self.page.take();
        let browser = self.browser.take().filter(|_| self.launched);
        let handler = self.handler.take();
        if page.is_none() && browser.is_none() {
            if let Some(h) = handler {
                h.abort();
            }
            return;
        }
        self.runtime.spawn(async move {
            if let Some(page) = page {
                if let Err(e) = page.close().await {
                    debug!("Drop cleanup of tab failed: {}", e);
                }
            }
            if let Some(mut browser) = browser {
                match browser.close().await {
                    Ok(_) => debug!("Browser closed on drop"),
                    Err(e) => warn!("Drop cleanup of browser failed: {}", e),
                }
                let _ = browser.wait().await;
            }
            if let Some(h) = handler {
                h.abort();
            }
        });
    }
}

/// Wrap a script body in an immediately invoked arrow function so a
/// top-level `return` is legal.
fn function_body(script: &str) -> String {
    format!("(() => {{\n{}\n}})()", script.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_body_is_wrapped_in_a_call() {
        assert_eq!(
            function_body(" window.scrollTo(0, 1); return true; "),
            "(() => {\nwindow.scrollTo(0, 1); return true;\n})()"
        );
    }

    // An explicit binary skips auto-detection, so this builds without Chrome installed.
    #[test]
    fn visible_launch_config_builds() {
        let visible = ChromeConfig {
            headless: false,
            executable: Some(PathBuf::from("/usr/bin/chromium")),
            ..ChromeConfig::default()
        };
        assert!(visible.launch_config().is_ok());
    }
}
