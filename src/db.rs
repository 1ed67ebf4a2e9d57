use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::record::{campaign_id, CampaignRecord, ClassifierResult, DaysRunning};

pub const DEFAULT_DB_PATH: &str = "data/fundraisers.sqlite";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS campaigns (
            id            INTEGER PRIMARY KEY,
            url           TEXT UNIQUE NOT NULL,
            slug          TEXT NOT NULL,
            title         TEXT NOT NULL DEFAULT '',
            image_url     TEXT NOT NULL DEFAULT '',
            amount_raised INTEGER NOT NULL DEFAULT 0,
            description   TEXT NOT NULL DEFAULT '',
            created_date  TEXT NOT NULL DEFAULT 'Unknown',
            days_running  INTEGER,
            visited       BOOLEAN NOT NULL DEFAULT 0,
            visited_at    TEXT,
            error         TEXT,
            discovered_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_campaigns_visited ON campaigns(visited);

        CREATE TABLE IF NOT EXISTS image_analysis (
            campaign_url TEXT PRIMARY KEY REFERENCES campaigns(url),
            success      BOOLEAN NOT NULL,
            labels       TEXT,
            result       TEXT NOT NULL,
            error        TEXT,
            analyzed_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

const RECORD_COLUMNS: &str = "c.url, c.title, c.image_url, c.amount_raised, c.description,
     c.created_date, c.days_running, a.result";

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<CampaignRecord> {
    let url: String = row.get(0)?;
    let amount: i64 = row.get(3)?;
    let days: Option<u32> = row.get(6)?;
    let analysis: Option<String> = row.get(7)?;
    Ok(CampaignRecord {
        id: campaign_id(&url),
        title: row.get(1)?,
        image_url: row.get(2)?,
        amount_raised: amount.max(0) as u64,
        description: row.get(4)?,
        created_date: row.get(5)?,
        days_running: days.map_or(DaysRunning::Unknown, DaysRunning::Days),
        image_analysis: analysis.and_then(|s| serde_json::from_str::<ClassifierResult>(&s).ok()),
        url,
    })
}

fn limit_clause(limit: Option<usize>) -> String {
    match limit {
        Some(n) => format!(" LIMIT {}", n),
        None => String::new(),
    }
}

fn days_value(days: DaysRunning) -> Option<u32> {
    match days {
        DaysRunning::Days(n) => Some(n),
        DaysRunning::Unknown => None,
    }
}

// ── Discovery ──

/// Store newly discovered campaigns with their card summary fields. URLs
/// already present are left untouched. Returns the number inserted.
pub fn insert_campaigns(conn: &Connection, records: &[CampaignRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO campaigns (url, slug, title, image_url, amount_raised)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for r in records {
            count += stmt.execute(rusqlite::params![
                r.url,
                r.id,
                r.title,
                r.image_url,
                r.amount_raised as i64,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Details ──

pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<CampaignRecord>> {
    let sql = format!(
        "SELECT {}
         FROM campaigns c
         LEFT JOIN image_analysis a ON a.campaign_url = c.url
         WHERE c.visited = 0
         ORDER BY c.id{}",
        RECORD_COLUMNS,
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], row_to_record)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Write detail results back and mark each campaign visited. `failures` holds
/// `(url, error)` pairs for pages that could not be fetched.
pub fn save_details(
    conn: &Connection,
    records: &[CampaignRecord],
    failures: &[(String, String)],
) -> Result<()> {
    let errors: HashMap<&str, &str> = failures
        .iter()
        .map(|(u, e)| (u.as_str(), e.as_str()))
        .collect();

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "UPDATE campaigns
             SET title = ?2, image_url = ?3, amount_raised = ?4, description = ?5,
                 created_date = ?6, days_running = ?7, visited = 1,
                 visited_at = datetime('now'), error = ?8
             WHERE url = ?1",
        )?;
        for r in records {
            stmt.execute(rusqlite::params![
                r.url,
                r.title,
                r.image_url,
                r.amount_raised as i64,
                r.description,
                r.created_date,
                days_value(r.days_running),
                errors.get(r.url.as_str()).copied(),
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Enrichment ──

/// Visited campaigns that have no stored image analysis yet.
pub fn fetch_unenriched(conn: &Connection, limit: Option<usize>) -> Result<Vec<CampaignRecord>> {
    let sql = format!(
        "SELECT {}
         FROM campaigns c
         LEFT JOIN image_analysis a ON a.campaign_url = c.url
         WHERE c.visited = 1 AND a.campaign_url IS NULL
         ORDER BY c.id{}",
        RECORD_COLUMNS,
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], row_to_record)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Store the analysis of every record that carries one. Returns rows written.
pub fn save_analysis(conn: &Connection, records: &[CampaignRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO image_analysis (campaign_url, success, labels, result, error)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for r in records {
            let Some(a) = &r.image_analysis else { continue };
            let result = serde_json::to_string(a)?;
            count += stmt.execute(rusqlite::params![
                r.url,
                a.success,
                a.top_labels(5).join(", "),
                result,
                a.error,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Export ──

/// Visited campaigns in discovery order, with any stored analysis attached.
pub fn fetch_records(conn: &Connection, limit: Option<usize>) -> Result<Vec<CampaignRecord>> {
    let sql = format!(
        "SELECT {}
         FROM campaigns c
         LEFT JOIN image_analysis a ON a.campaign_url = c.url
         WHERE c.visited = 1
         ORDER BY c.id{}",
        RECORD_COLUMNS,
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], row_to_record)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub errors: usize,
    pub with_days: usize,
    pub analyzed: usize,
    pub analysis_failed: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM campaigns", [], |r| r.get(0))?;
    let visited: usize =
        conn.query_row("SELECT COUNT(*) FROM campaigns WHERE visited = 1", [], |r| r.get(0))?;
    let errors: usize = conn.query_row(
        "SELECT COUNT(*) FROM campaigns WHERE error IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let with_days: usize = conn.query_row(
        "SELECT COUNT(*) FROM campaigns WHERE days_running IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let analyzed: usize =
        conn.query_row("SELECT COUNT(*) FROM image_analysis", [], |r| r.get(0))?;
    let analysis_failed: usize = conn.query_row(
        "SELECT COUNT(*) FROM image_analysis WHERE success = 0",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        total,
        visited,
        unvisited: total - visited,
        errors,
        with_days,
        analyzed,
        analysis_failed,
    })
}
