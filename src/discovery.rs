use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{is_truthy, PageFetcher};
use crate::frontier::Frontier;
use crate::pacing::Pacing;
use crate::parser::read_listing;
use crate::record::CampaignRecord;

/// Consecutive no-progress reads before the listing is deemed exhausted.
pub const STAGNATION_LIMIT: u32 = 3;
/// Hard ceiling on listing reads.
pub const MAX_ATTEMPTS: u32 = 100;

/// Clicks the first "Show more" button (any "more" button as a fallback).
/// Returns the clicked button's text, or `false` when there is none.
pub const REVEAL_MORE_SCRIPT: &str = r#"
window.scrollTo(0, document.body.scrollHeight);
const buttons = Array.from(document.querySelectorAll('button'));
const label = b => (b.innerText || b.textContent || '').trim().toLowerCase();
const target = buttons.find(b => label(b).includes('show more'))
    || buttons.find(b => label(b).includes('more'));
if (!target || target.disabled) { return false; }
target.scrollIntoView({block: 'center'});
target.click();
return label(target) || true;
"#;

pub const SCROLL_TO_BOTTOM_SCRIPT: &str =
    "window.scrollTo(0, document.body.scrollHeight); return true;";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Expanding,
    /// Frontier reached the target size.
    Capped,
    /// Several reads in a row found nothing new.
    Exhausted,
    /// Attempt budget spent without reaching target or exhaustion.
    Converged,
    Cancelled,
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscoveryState::Expanding => "expanding",
            DiscoveryState::Capped => "capped",
            DiscoveryState::Exhausted => "exhausted",
            DiscoveryState::Converged => "converged",
            DiscoveryState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub entry_url: Url,
    pub target: usize,
    pub pacing: Pacing,
    /// Wait after the first load and between the initial settle scrolls.
    pub settle: Duration,
    pub initial_scrolls: u32,
    pub max_attempts: u32,
    pub stagnation_limit: u32,
}

impl DiscoveryOptions {
    pub fn new(entry_url: Url, target: usize) -> Self {
        Self {
            entry_url,
            target,
            pacing: Pacing::from_secs_f64(2.5, 4.0),
            settle: Duration::from_secs(1),
            initial_scrolls: 3,
            max_attempts: MAX_ATTEMPTS,
            stagnation_limit: STAGNATION_LIMIT,
        }
    }
}

pub struct DiscoveryReport {
    pub outcome: DiscoveryState,
    pub iterations: u32,
    /// Skeleton records in discovery order, at most `target` of them.
    pub records: Vec<CampaignRecord>,
}

/// Transition logic of the discovery loop, independent of any browser.
#[derive(Debug)]
pub struct Expansion {
    target: usize,
    stagnation_limit: u32,
    max_attempts: u32,
    pub iterations: u32,
    pub stagnation: u32,
}

impl Expansion {
    pub fn new(target: usize, stagnation_limit: u32, max_attempts: u32) -> Self {
        Self {
            target,
            stagnation_limit,
            max_attempts,
            iterations: 0,
            stagnation: 0,
        }
    }

    /// Fold one read of the listing into `frontier` and decide what happens next.
    /// Returns the state together with how many records were new.
    pub fn step(
        &mut self,
        frontier: &mut Frontier,
        visible: Vec<CampaignRecord>,
    ) -> (DiscoveryState, usize) {
        if frontier.len() >= self.target {
            return (DiscoveryState::Capped, 0);
        }
        self.iterations += 1;

        let mut added = 0;
        for record in visible {
            if frontier.len() >= self.target {
                break;
            }
            if frontier.insert(record) {
                added += 1;
            }
        }

        if added > 0 {
            self.stagnation = 0;
        } else {
            self.stagnation += 1;
        }

        let state = if frontier.len() >= self.target {
            DiscoveryState::Capped
        } else if self.stagnation >= self.stagnation_limit {
            DiscoveryState::Exhausted
        } else if self.iterations >= self.max_attempts {
            DiscoveryState::Converged
        } else {
            DiscoveryState::Expanding
        };
        (state, added)
    }
}

/// Grow a frontier from the listing page until capped, exhausted or out of
/// attempts. The fetcher is closed before returning, whatever the outcome.
pub async fn discover<F: PageFetcher>(
    mut fetcher: F,
    opts: &DiscoveryOptions,
    cancel: &CancellationToken,
) -> Result<DiscoveryReport> {
    let result = expand(&mut fetcher, opts, cancel).await;
    if let Err(e) = fetcher.close().await {
        warn!("Failed to close browser after discovery: {}", e);
    }
    result
}

async fn expand<F: PageFetcher>(
    fetcher: &mut F,
    opts: &DiscoveryOptions,
    cancel: &CancellationToken,
) -> Result<DiscoveryReport> {
    info!("Loading listing: {}", opts.entry_url);
    fetcher
        .navigate(opts.entry_url.as_str())
        .await
        .with_context(|| format!("Failed to load listing page {}", opts.entry_url))?;
    settle(fetcher, opts).await;

    let mut frontier = Frontier::new();
    let mut expansion = Expansion::new(opts.target, opts.stagnation_limit, opts.max_attempts);

    let outcome = loop {
        if cancel.is_cancelled() {
            break DiscoveryState::Cancelled;
        }

        let visible = match fetcher.content().await {
            Ok(html) => read_listing(&html, &opts.entry_url),
            Err(e) => {
                warn!("Could not read listing: {}", e);
                Vec::new()
            }
        };
        let seen = visible.len();
        let (state, added) = expansion.step(&mut frontier, visible);

        if added > 0 {
            info!(
                "[Attempt {}] Visible: {} | New: {} | Total: {}",
                expansion.iterations,
                seen,
                added,
                frontier.len()
            );
        } else {
            info!(
                "[Attempt {}] No new URLs (strike {}/{})",
                expansion.iterations, expansion.stagnation, opts.stagnation_limit
            );
        }

        if state != DiscoveryState::Expanding {
            break state;
        }

        reveal_more(fetcher, opts.settle).await;
        opts.pacing.pause(cancel).await;
    };

    match outcome {
        DiscoveryState::Capped => info!("Reached {} URLs", opts.target),
        DiscoveryState::Exhausted => info!(
            "No new URLs for {} attempts; listing exhausted",
            opts.stagnation_limit
        ),
        DiscoveryState::Converged => info!("Gave up after {} attempts", expansion.iterations),
        DiscoveryState::Cancelled => warn!("Discovery interrupted"),
        DiscoveryState::Expanding => {}
    }
    info!("Discovery collected {} unique URLs", frontier.len());

    Ok(DiscoveryReport {
        outcome,
        iterations: expansion.iterations,
        records: frontier.snapshot(opts.target),
    })
}

/// Scroll a few times after the first load so lazy cards render.
async fn settle<F: PageFetcher>(fetcher: &mut F, opts: &DiscoveryOptions) {
    tokio::time::sleep(opts.settle).await;
    for _ in 0..opts.initial_scrolls {
        if let Err(e) = fetcher.execute_script(SCROLL_TO_BOTTOM_SCRIPT).await {
            debug!("Initial scroll failed: {}", e);
        }
        tokio::time::sleep(opts.settle).await;
    }
}

/// Click "Show more" if the page has one, otherwise scroll to the bottom.
/// Neither path is an error; returns whether a button was clicked.
async fn reveal_more<F: PageFetcher>(fetcher: &mut F, settle: Duration) -> bool {
    match fetcher.execute_script(REVEAL_MORE_SCRIPT).await {
        Ok(v) if is_truthy(&v) => {
            debug!("Clicked {}", v);
            return true;
        }
        Ok(_) => debug!("'Show more' button not found, scrolling instead"),
        Err(e) => debug!("Reveal script failed, scrolling instead: {}", e),
    }

    for _ in 0..3 {
        if let Err(e) = fetcher.execute_script(SCROLL_TO_BOTTOM_SCRIPT).await {
            debug!("Scroll failed: {}", e);
            break;
        }
        tokio::time::sleep(settle).await;
    }
    false
}
