mod browser;
mod db;
mod discovery;
mod enrich;
mod export;
mod frontier;
mod pacing;
mod parser;
mod record;
mod scraper;
mod vision;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use browser::{ChromeConfig, ChromeSession};
use discovery::DiscoveryOptions;
use pacing::Pacing;
use record::CampaignRecord;
use scraper::DetailOptions;
use enrich::EnrichOptions;
use vision::{AzureVision, Classifier, GoogleVision};

const DEFAULT_ENTRY_URL: &str = "https://www.gofundme.com/discover/animal-fundraiser";

#[derive(Parser)]
#[command(name = "fundraiser_scraper", about = "Animal fundraiser scraper driven through headless Chrome")]
struct Cli {
    /// SQLite run store
    #[arg(long, env = "SCRAPER_DB", default_value = db::DEFAULT_DB_PATH, global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand the listing page and queue campaign URLs
    Discover {
        #[command(flatten)]
        browser: BrowserArgs,
        #[command(flatten)]
        discover: DiscoverArgs,
    },
    /// Visit queued campaign pages and extract their details
    Details {
        #[command(flatten)]
        browser: BrowserArgs,
        #[command(flatten)]
        details: DetailArgs,
    },
    /// Label campaign images with Google Cloud Vision or Azure Computer Vision
    Enrich {
        #[command(flatten)]
        enrich: EnrichArgs,
        /// Max campaigns to analyze (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Discover + details (+ enrich when vision credentials are set) + export
    Run {
        #[command(flatten)]
        browser: BrowserArgs,
        #[command(flatten)]
        discover: DiscoverArgs,
        #[command(flatten)]
        details: DetailArgs,
        #[command(flatten)]
        enrich: EnrichArgs,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Write scraped campaigns to CSV and JSON
    Export {
        #[command(flatten)]
        export: ExportArgs,
        /// Max rows to write
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show run store statistics
    Stats,
}

#[derive(Args)]
struct BrowserArgs {
    /// DevTools websocket of a running Chrome (ws://...); a local Chrome is launched when unset
    #[arg(long, env = "CHROME_WS_URL")]
    chrome_ws: Option<String>,
    /// Chrome/Chromium binary to launch (default: auto-detect)
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,
    /// Run Chrome headless (default)
    #[arg(long, conflicts_with = "visible")]
    headless: bool,
    /// Show the browser window
    #[arg(long)]
    visible: bool,
}

impl BrowserArgs {
    fn config(&self) -> ChromeConfig {
        ChromeConfig {
            connect_url: self.chrome_ws.clone(),
            executable: self.chrome_path.clone(),
            headless: self.headless || !self.visible,
            ..ChromeConfig::default()
        }
    }
}

#[derive(Args)]
struct DiscoverArgs {
    /// Stop once this many campaigns are queued
    #[arg(short = 't', long, default_value_t = 100)]
    target: usize,
    /// Listing page with the "Show more" button
    #[arg(long, default_value = DEFAULT_ENTRY_URL)]
    entry_url: Url,
    /// Lower bound of the delay between "Show more" rounds, seconds
    #[arg(long, default_value_t = 2.5)]
    discover_min_delay: f64,
    /// Upper bound of the delay between "Show more" rounds, seconds
    #[arg(long, default_value_t = 4.0)]
    discover_max_delay: f64,
}

impl DiscoverArgs {
    fn options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            pacing: Pacing::from_secs_f64(self.discover_min_delay, self.discover_max_delay),
            ..DiscoveryOptions::new(self.entry_url.clone(), self.target)
        }
    }
}

#[derive(Args)]
struct DetailArgs {
    /// Max campaign pages to visit (default: all unvisited)
    #[arg(short = 'n', long)]
    limit: Option<usize>,
    /// Lower bound of the delay between pages, seconds
    #[arg(long, default_value_t = 2.0)]
    min_delay: f64,
    /// Upper bound of the delay between pages, seconds
    #[arg(long, default_value_t = 4.0)]
    max_delay: f64,
    /// Reference date for days running, YYYY-MM-DD (default: today, UTC)
    #[arg(long)]
    today: Option<NaiveDate>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum VisionService {
    Google,
    Azure,
}

#[derive(Args)]
struct EnrichArgs {
    /// Image classification backend
    #[arg(long, env = "VISION_SERVICE", value_enum, default_value_t = VisionService::Google)]
    vision_service: VisionService,
    /// Google Cloud Vision API key
    #[arg(long, env = "GOOGLE_VISION_API_KEY", hide_env_values = true)]
    vision_key: Option<String>,
    /// Azure Computer Vision subscription key
    #[arg(long, env = "AZURE_VISION_KEY", hide_env_values = true)]
    azure_key: Option<String>,
    /// Azure resource endpoint, e.g. https://NAME.cognitiveservices.azure.com/
    #[arg(long, env = "AZURE_VISION_ENDPOINT")]
    azure_endpoint: Option<String>,
    /// Seconds between Vision requests
    #[arg(long, default_value_t = 1.0)]
    vision_delay: f64,
}

impl EnrichArgs {
    /// The configured backend, or `None` when its credentials are missing.
    fn classifier(&self) -> Result<Option<Box<dyn Classifier>>> {
        let classifier: Box<dyn Classifier> = match self.vision_service {
            VisionService::Google => match self.vision_key.as_deref() {
                Some(key) => Box::new(GoogleVision::new(key)?),
                None => return Ok(None),
            },
            VisionService::Azure => match (self.azure_endpoint.as_deref(), self.azure_key.as_deref()) {
                (Some(endpoint), Some(key)) => Box::new(AzureVision::new(endpoint, key)?),
                _ => return Ok(None),
            },
        };
        Ok(Some(classifier))
    }

    fn missing_credentials(&self) -> &'static str {
        match self.vision_service {
            VisionService::Google => {
                "No Vision API key. Set GOOGLE_VISION_API_KEY or pass --vision-key."
            }
            VisionService::Azure => {
                "Azure Vision needs AZURE_VISION_ENDPOINT and AZURE_VISION_KEY (or --azure-endpoint and --azure-key)."
            }
        }
    }
}

#[derive(Args)]
struct ExportArgs {
    #[arg(long, default_value = "data/campaigns.csv")]
    csv: PathBuf,
    #[arg(long, default_value = "data/campaigns.json")]
    json: PathBuf,
    /// Add an image_labels column to the CSV
    #[arg(long)]
    with_analysis: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let cancel = interrupt_token();

    let conn = db::connect(&cli.db)?;
    db::init_schema(&conn)?;

    let result = match cli.command {
        Commands::Discover { browser, discover } => {
            run_discovery(&conn, &browser, &discover, &cancel).await
        }
        Commands::Details { browser, details } => {
            run_details(&conn, &browser, &details, &cancel).await
        }
        Commands::Enrich { enrich, limit } => match enrich.classifier()? {
            Some(classifier) => {
                run_enrich(&conn, classifier.as_ref(), enrich.vision_delay, limit, &cancel).await
            }
            None => Err(anyhow::anyhow!(enrich.missing_credentials())),
        },
        Commands::Run {
            browser,
            discover,
            details,
            enrich,
            export,
        } => {
            // Phase 1: Discover
            let t_phase = Instant::now();
            run_discovery(&conn, &browser, &discover, &cancel).await?;
            println!("Discovery took {}", format_duration(t_phase.elapsed()));

            // Phase 2: Details
            if !cancel.is_cancelled() {
                let t_phase = Instant::now();
                run_details(&conn, &browser, &details, &cancel).await?;
                println!("Details took {}", format_duration(t_phase.elapsed()));
            }

            // Phase 3: Enrich
            match enrich.classifier()? {
                Some(classifier) if !cancel.is_cancelled() => {
                    run_enrich(&conn, classifier.as_ref(), enrich.vision_delay, None, &cancel)
                        .await?;
                }
                Some(_) => {}
                None => info!("No vision credentials set, skipping image analysis"),
            }

            // Phase 4: Export, also after an interrupt so partial results land on disk
            run_export(&conn, &export, None)
        }
        Commands::Export { export, limit } => run_export(&conn, &export, limit),
        Commands::Stats => {
            let s = db::get_stats(&conn)?;
            println!("Total:     {}", s.total);
            println!("Visited:   {}", s.visited);
            println!("Unvisited: {}", s.unvisited);
            println!("Errors:    {}", s.errors);
            println!("With days: {}", s.with_days);
            println!("Analyzed:  {} ({} failed)", s.analyzed, s.analysis_failed);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Token cancelled on the first Ctrl-C. Loops stop at their next boundary and
/// keep what they collected.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current step and saving progress...");
            token.cancel();
        }
    });
    cancel
}

async fn start_browser(args: &BrowserArgs) -> Result<ChromeSession> {
    let config = args.config();
    ChromeSession::start(&config).await.with_context(|| match &config.connect_url {
        Some(ws) => format!("attaching to Chrome at {}", ws),
        None => "launching Chrome".to_string(),
    })
}

async fn run_discovery(
    conn: &Connection,
    browser: &BrowserArgs,
    args: &DiscoverArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    println!("Discovering up to {} campaigns from {}", args.target, args.entry_url);
    let session = start_browser(browser).await?;
    let opts = args.options();
    let report = discovery::discover(session, &opts, cancel).await?;

    let inserted = db::insert_campaigns(conn, &report.records)?;
    println!(
        "Discovery {} after {} reads: {} campaigns found, {} new",
        report.outcome,
        report.iterations,
        report.records.len(),
        inserted
    );
    Ok(())
}

async fn run_details(
    conn: &Connection,
    browser: &BrowserArgs,
    args: &DetailArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let queue = db::fetch_unvisited(conn, args.limit)?;
    if queue.is_empty() {
        println!("No unvisited campaigns. Run 'discover' first or all pages are scraped.");
        return Ok(());
    }

    let opts = DetailOptions {
        pacing: Pacing::from_secs_f64(args.min_delay, args.max_delay),
        today: args.today.unwrap_or_else(|| Utc::now().date_naive()),
        show_progress: true,
    };
    println!("Scraping {} campaign pages...", queue.len());
    let session = start_browser(browser).await?;
    let report = scraper::scrape_details(session, queue, &opts, cancel).await;

    db::save_details(conn, &report.records, &report.failures)?;
    println!(
        "Done: {} scraped ({} ok, {} errors){}",
        report.stats.total,
        report.stats.ok,
        report.stats.errors,
        if report.cancelled { ", interrupted" } else { "" }
    );
    print_summary(&report.records);
    Ok(())
}

async fn run_enrich(
    conn: &Connection,
    classifier: &dyn Classifier,
    delay_secs: f64,
    limit: Option<usize>,
    cancel: &CancellationToken,
) -> Result<()> {
    let pending = db::fetch_unenriched(conn, limit)?;
    if pending.is_empty() {
        println!("No campaigns awaiting image analysis.");
        return Ok(());
    }

    let opts = EnrichOptions {
        delay: Duration::from_secs_f64(delay_secs.max(0.0)),
        show_progress: true,
    };
    let (records, stats) = enrich::enrich_all(pending, classifier, &opts, cancel).await;

    let saved = db::save_analysis(conn, &records)?;
    println!(
        "Analyzed {} images: {} successful, {} failed, {} without image ({} saved)",
        stats.total, stats.successful, stats.failed, stats.skipped, saved
    );
    Ok(())
}

fn run_export(conn: &Connection, args: &ExportArgs, limit: Option<usize>) -> Result<()> {
    let records = db::fetch_records(conn, limit)?;
    if records.is_empty() {
        println!("Nothing to export. Run 'details' first.");
        return Ok(());
    }
    export::write_csv(&args.csv, &records, args.with_analysis)?;
    export::write_json(&args.json, &records)?;
    println!(
        "Saved {} campaigns to {} and {}",
        records.len(),
        args.csv.display(),
        args.json.display()
    );
    print_summary(&records);
    Ok(())
}

fn print_summary(records: &[CampaignRecord]) {
    if records.is_empty() {
        return;
    }
    let with_days: Vec<u32> = records
        .iter()
        .filter_map(|r| match r.days_running {
            record::DaysRunning::Days(n) => Some(n),
            record::DaysRunning::Unknown => None,
        })
        .collect();
    let raised: u64 = records.iter().map(|r| r.amount_raised).sum();
    let with_description = records.iter().filter(|r| !r.description.is_empty()).count();

    println!("\n--- Summary ---");
    println!("Campaigns:        {}", records.len());
    println!(
        "With days:        {} ({:.0}%)",
        with_days.len(),
        with_days.len() as f64 / records.len() as f64 * 100.0
    );
    if !with_days.is_empty() {
        let avg = with_days.iter().map(|&d| d as f64).sum::<f64>() / with_days.len() as f64;
        println!("Avg days running: {:.1}", avg);
    }
    println!("With description: {}", with_description);
    println!("Total raised:     ${}", raised);
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("fundraiser_scraper").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn discover_delays_reach_pacing() {
        let cli = parse(&["discover", "--discover-min-delay", "0.5", "--discover-max-delay", "1"]);
        let Commands::Discover { discover, .. } = cli.command else {
            panic!("expected discover");
        };
        let opts = discover.options();
        assert_eq!(opts.pacing, Pacing::from_secs_f64(0.5, 1.0));
        assert_eq!(opts.target, 100);
    }

    #[test]
    fn discover_delays_default_to_listing_pace() {
        let Commands::Run { discover, .. } = parse(&["run"]).command else {
            panic!("expected run");
        };
        assert_eq!(discover.options().pacing, Pacing::from_secs_f64(2.5, 4.0));
    }

    #[test]
    fn azure_needs_endpoint_and_key() {
        let Commands::Enrich { enrich, .. } =
            parse(&["enrich", "--vision-service", "azure", "--azure-key", "k"]).command
        else {
            panic!("expected enrich");
        };
        assert_eq!(enrich.vision_service, VisionService::Azure);
        assert!(enrich.classifier().unwrap().is_none());

        let Commands::Enrich { enrich, .. } = parse(&[
            "enrich",
            "--vision-service",
            "azure",
            "--azure-key",
            "k",
            "--azure-endpoint",
            "https://res.cognitiveservices.azure.com/",
        ])
        .command
        else {
            panic!("expected enrich");
        };
        assert!(enrich.classifier().unwrap().is_some());
    }

    #[test]
    fn visible_flag_turns_headless_off() {
        let Commands::Details { browser, .. } = parse(&["details", "--visible"]).command else {
            panic!("expected details");
        };
        assert!(!browser.config().headless);
    }
}
