use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::record::CampaignRecord;

pub const CSV_COLUMNS: [&str; 8] = [
    "id",
    "title",
    "url",
    "image_url",
    "amount_raised",
    "description",
    "created_date",
    "days_running",
];
pub const LABELS_COLUMN: &str = "image_labels";
const CSV_LABELS: usize = 5;

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<W: Write>(w: &mut W, row: &[String]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            write!(w, ",")?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    writeln!(w)
}

fn csv_row(r: &CampaignRecord, with_analysis: bool) -> Vec<String> {
    let mut row = vec![
        r.id.clone(),
        r.title.clone(),
        r.url.clone(),
        r.image_url.clone(),
        r.amount_raised.to_string(),
        r.description.clone(),
        r.created_date.clone(),
        r.days_running.to_string(),
    ];
    if with_analysis {
        let labels = r
            .image_analysis
            .as_ref()
            .filter(|a| a.success)
            .map(|a| a.top_labels(CSV_LABELS).join(", "))
            .unwrap_or_default();
        row.push(labels);
    }
    row
}

/// Write records as CSV with a fixed header. `with_analysis` adds the
/// `image_labels` column (top labels, comma-joined).
pub fn write_csv_to<W: Write>(
    mut w: W,
    records: &[CampaignRecord],
    with_analysis: bool,
) -> io::Result<()> {
    let mut header: Vec<String> = CSV_COLUMNS.iter().map(|c| c.to_string()).collect();
    if with_analysis {
        header.push(LABELS_COLUMN.to_string());
    }
    write_row(&mut w, &header)?;
    for r in records {
        write_row(&mut w, &csv_row(r, with_analysis))?;
    }
    w.flush()
}

fn create(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    File::create(path).with_context(|| format!("creating {}", path.display()))
}

pub fn write_csv(path: &Path, records: &[CampaignRecord], with_analysis: bool) -> Result<()> {
    let file = create(path)?;
    write_csv_to(BufWriter::new(file), records, with_analysis)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn write_json(path: &Path, records: &[CampaignRecord]) -> Result<()> {
    let file = create(path)?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut w, records)?;
    writeln!(w)?;
    w.flush()?;
    Ok(())
}
