use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser::{BrowserError, PageFetcher};
use crate::pacing::Pacing;
use crate::parser::{apply_details, read_campaign_page};
use crate::record::CampaignRecord;

/// Print a data-quality line every this many campaigns.
const PROGRESS_EVERY: usize = 25;

/// Scrape stats returned after completion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

pub struct DetailOptions {
    pub pacing: Pacing,
    /// Reference date for "days running".
    pub today: NaiveDate,
    pub show_progress: bool,
}

pub struct DetailReport {
    /// One record per campaign visited, in queue order.
    pub records: Vec<CampaignRecord>,
    /// `(url, error)` for every campaign whose page could not be fetched.
    pub failures: Vec<(String, String)>,
    pub stats: ScrapeStats,
    pub cancelled: bool,
}

/// Visit each queued campaign page in order and fill in its details.
///
/// A page that fails to load leaves an identity-only record and the loop moves
/// on. Cancellation is checked between campaigns; whatever was collected so
/// far is returned. The fetcher is closed before returning.
pub async fn scrape_details<F: PageFetcher>(
    mut fetcher: F,
    queue: Vec<CampaignRecord>,
    opts: &DetailOptions,
    cancel: &CancellationToken,
) -> DetailReport {
    let report = scrape_all(&mut fetcher, queue, opts, cancel).await;
    if let Err(e) = fetcher.close().await {
        warn!("Failed to close browser after detail scrape: {}", e);
    }
    report
}

async fn scrape_all<F: PageFetcher>(
    fetcher: &mut F,
    queue: Vec<CampaignRecord>,
    opts: &DetailOptions,
    cancel: &CancellationToken,
) -> DetailReport {
    let total = queue.len();
    let pb = progress_bar(total, opts.show_progress);

    let mut records = Vec::with_capacity(total);
    let mut failures = Vec::new();
    let mut stats = ScrapeStats::default();
    let mut cancelled = false;

    for (i, record) in queue.into_iter().enumerate() {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        match scrape_one(fetcher, &record, opts.today).await {
            Ok(filled) => {
                stats.ok += 1;
                pb.set_message(format!(
                    "{} | ${} | {} days",
                    truncate(&filled.id, 40),
                    filled.amount_raised,
                    filled.days_running
                ));
                records.push(filled);
            }
            Err(e) => {
                stats.errors += 1;
                warn!("Failed to fetch {}: {}", record.url, e);
                failures.push((record.url.clone(), e.to_string()));
                records.push(record.identity_only());
            }
        }
        stats.total += 1;
        pb.inc(1);

        let done = i + 1;
        if done % PROGRESS_EVERY == 0 {
            let with_days = records.iter().filter(|r| r.days_running.is_known()).count();
            let line = format!(
                "Progress: {}/{} | Days: {}/{} ({:.0}%)",
                done,
                total,
                with_days,
                done,
                with_days as f64 / done as f64 * 100.0
            );
            if pb.is_hidden() {
                info!("{}", line);
            } else {
                pb.println(line);
            }
        }

        if done < total {
            opts.pacing.pause(cancel).await;
        }
    }

    pb.finish_and_clear();
    if cancelled {
        warn!("Interrupted! Keeping {} of {} campaigns", records.len(), total);
    }
    info!(
        "Scraped {} campaigns ({} ok, {} errors)",
        stats.total, stats.ok, stats.errors
    );

    DetailReport {
        records,
        failures,
        stats,
        cancelled,
    }
}

async fn scrape_one<F: PageFetcher>(
    fetcher: &mut F,
    record: &CampaignRecord,
    today: NaiveDate,
) -> Result<CampaignRecord, BrowserError> {
    fetcher.navigate(&record.url).await?;
    let html = fetcher.content().await?;

    let mut filled = record.clone();
    apply_details(&mut filled, read_campaign_page(&html), today);
    Ok(filled)
}

/// Styled bar, or a hidden one when `visible` is false (tests, piped output).
pub(crate) fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} ({eta}) {msg}")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakeFetcher;
    use crate::record::DaysRunning;

    #[test]
    fn progress_bar_hidden_unless_shown() {
        assert!(progress_bar(3, false).is_hidden());
        assert_eq!(progress_bar(3, true).length(), Some(3));
    }

    fn opts() -> DetailOptions {
        DetailOptions {
            pacing: Pacing::none(),
            today: NaiveDate::from_ymd_opt(2025, 10, 26).unwrap(),
            show_progress: false,
        }
    }

    fn page(amount: u32) -> String {
        format!(
            r#"<html><head><meta property="og:image" content="https://img/{amount}.jpg"></head>
            <body><span class="raised">${amount} raised</span>
            <span class="m-campaign-byline-created">Created 2 d ago</span>
            <div class="story">Story {amount}</div></body></html>"#
        )
    }

    fn queue(n: usize) -> Vec<CampaignRecord> {
        (0..n)
            .map(|i| CampaignRecord::skeleton(&format!("https://www.gofundme.com/f/c{}", i)))
            .collect()
    }

    fn fetcher_for(n: usize) -> FakeFetcher {
        (0..n).fold(FakeFetcher::new(), |f, i| {
            f.with_page(&format!("https://www.gofundme.com/f/c{}", i), &page(100 + i as u32))
        })
    }

    #[tokio::test]
    async fn fills_every_record_in_order() {
        let fetcher = fetcher_for(3);
        let log = fetcher.log();
        let report = scrape_details(fetcher, queue(3), &opts(), &CancellationToken::new()).await;

        assert!(!report.cancelled);
        assert_eq!(report.stats, ScrapeStats { total: 3, ok: 3, errors: 0 });
        let amounts: Vec<u64> = report.records.iter().map(|r| r.amount_raised).collect();
        assert_eq!(amounts, vec![100, 101, 102]);
        assert_eq!(report.records[1].image_url, "https://img/101.jpg");
        assert_eq!(report.records[1].description, "Story 101");
        assert_eq!(report.records[2].days_running, DaysRunning::Days(2));
        assert!(log.lock().unwrap().closed);
    }

    #[tokio::test]
    async fn fetch_failure_degrades_to_identity() {
        // c1 is not registered, so navigation to it fails
        let fetcher = FakeFetcher::new()
            .with_page("https://www.gofundme.com/f/c0", &page(5))
            .with_page("https://www.gofundme.com/f/c2", &page(7));
        let mut q = queue(3);
        q[1].title = "from card".into();
        q[1].amount_raised = 99;

        let report = scrape_details(fetcher, q, &opts(), &CancellationToken::new()).await;

        assert_eq!(report.records.len(), 3);
        assert_eq!(report.stats.errors, 1);
        let failed = &report.records[1];
        assert_eq!(failed.id, "c1");
        assert_eq!(failed.title, "");
        assert_eq!(failed.amount_raised, 0);
        assert_eq!(failed.days_running, DaysRunning::Unknown);
        assert_eq!(report.failures[0].0, "https://www.gofundme.com/f/c1");
        assert_eq!(report.records[2].amount_raised, 7);
    }

    #[tokio::test]
    async fn interrupt_keeps_completed_records() {
        let cancel = CancellationToken::new();
        let k = 2;
        let fetcher = fetcher_for(5).cancel_on_read(k, cancel.clone());
        let log = fetcher.log();

        let report = scrape_details(fetcher, queue(5), &opts(), &cancel).await;

        assert!(report.cancelled);
        assert_eq!(report.records.len(), k);
        assert!(report.records.iter().all(|r| r.amount_raised >= 100 && !r.description.is_empty()));
        assert_eq!(log.lock().unwrap().navigations.len(), k);
        assert!(log.lock().unwrap().closed);
    }
}
