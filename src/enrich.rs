use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::pacing::Pacing;
use crate::record::{CampaignRecord, ClassifierResult};
use crate::scraper::progress_bar;
use crate::vision::Classifier;

pub const NO_IMAGE_URL: &str = "No image URL";

pub struct EnrichOptions {
    /// Wait between two classifier calls.
    pub delay: Duration,
    pub show_progress: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnrichStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Records never sent to the classifier (no usable image URL).
    pub skipped: usize,
}

/// Absolute http(s) URL with a host.
pub fn has_usable_image(image_url: &str) -> bool {
    Url::parse(image_url.trim())
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Attach the classifier's verdict on the record's image. Records without a
/// usable image URL get a failed result without any external call.
pub async fn enrich<C: Classifier + ?Sized>(
    mut record: CampaignRecord,
    classifier: &C,
) -> CampaignRecord {
    record.image_analysis = Some(if has_usable_image(&record.image_url) {
        classifier.classify(record.image_url.trim()).await
    } else if record.image_url.trim().is_empty() {
        ClassifierResult::failure(NO_IMAGE_URL)
    } else {
        ClassifierResult::failure(format!("{} (malformed: {})", NO_IMAGE_URL, record.image_url))
    });
    record
}

/// Enrich every record in order, waiting `opts.delay` between classifier
/// calls. Cancellation is checked before each record and again after each
/// wait; the remaining records are returned untouched.
pub async fn enrich_all<C: Classifier + ?Sized>(
    records: Vec<CampaignRecord>,
    classifier: &C,
    opts: &EnrichOptions,
    cancel: &CancellationToken,
) -> (Vec<CampaignRecord>, EnrichStats) {
    let total = records.len();
    let pacing = Pacing::fixed(opts.delay);
    let pb = progress_bar(total, opts.show_progress);
    let mut stats = EnrichStats::default();
    let mut out = Vec::with_capacity(total);
    let mut called_before = false;

    info!("Analyzing {} images", total);

    let mut remaining = records.into_iter();
    for record in remaining.by_ref() {
        if cancel.is_cancelled() {
            warn!("Enrichment interrupted after {} of {} records", out.len(), total);
            out.push(record);
            break;
        }

        let calls_out = has_usable_image(&record.image_url);
        if calls_out && called_before {
            pacing.pause(cancel).await;
            if cancel.is_cancelled() {
                warn!("Enrichment interrupted after {} of {} records", out.len(), total);
                out.push(record);
                break;
            }
        }
        called_before |= calls_out;

        let enriched = enrich(record, classifier).await;
        match enriched.image_analysis.as_ref() {
            Some(a) if a.success => {
                stats.successful += 1;
                debug!("{}: {}", enriched.id, a.top_labels(3).join(", "));
            }
            Some(a) => {
                if calls_out {
                    stats.failed += 1;
                } else {
                    stats.skipped += 1;
                }
                debug!(
                    "{}: {}",
                    enriched.id,
                    a.error.as_deref().unwrap_or("Unknown error")
                );
            }
            None => {}
        }
        stats.total += 1;
        out.push(enriched);
        pb.inc(1);
    }
    out.extend(remaining);

    pb.finish_and_clear();
    info!(
        "Analysis complete: {} successful, {} failed, {} skipped",
        stats.successful, stats.failed, stats.skipped
    );
    (out, stats)
}
