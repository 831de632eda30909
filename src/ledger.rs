// 📒 Win Ledger - Idempotent accumulation of win announcements
// Every run rewrites the whole snapshot; draws already present are never refetched.
//
// Identity of a row = (draw, rank, normalized name, normalized address)
// Persisted order    = (draw, rank, name) ascending, address/choice as tie-breakers

use crate::error::IngestError;
use crate::normalize::{normalize, NormalizedKey};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use tracing::debug;

pub const LEDGER_HEADERS: [&str; 6] = ["draw", "draw_date", "rank", "name", "choice_type", "address"];

/// Wire format for every date in the persisted tables.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Draws happen once per this many days.
pub const DRAW_CADENCE_DAYS: i64 = 7;

// ============================================================================
// WIN RECORD
// ============================================================================

/// One winning retailer for one draw, as announced.
///
/// Fields hold the raw (whitespace-collapsed) text from the source; matching
/// happens later on the normalized key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinRecord {
    pub draw: u32,
    pub draw_date: Option<NaiveDate>,
    /// 1 or 2
    pub rank: u8,
    pub name: String,
    pub choice_type: String,
    pub address: String,
}

impl WinRecord {
    pub fn key(&self) -> NormalizedKey {
        NormalizedKey::new(&self.name, &self.address)
    }

    /// Hash over the deduplication tuple.
    /// NOTE: choice type and draw date are deliberately not part of identity.
    pub fn compute_idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}",
            self.draw,
            self.rank,
            normalize(&self.name),
            normalize(&self.address)
        ));
        format!("{:x}", hasher.finalize())
    }

    fn to_csv_row(&self) -> [String; 6] {
        [
            self.draw.to_string(),
            format_date(self.draw_date),
            self.rank.to_string(),
            self.name.clone(),
            self.choice_type.clone(),
            self.address.clone(),
        ]
    }
}

/// Raw ledger row exactly as stored; validated into a WinRecord on load.
#[derive(Debug, Deserialize)]
struct LedgerRow {
    draw: String,
    #[serde(default)]
    draw_date: String,
    rank: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    choice_type: String,
    #[serde(default)]
    address: String,
}

impl LedgerRow {
    fn into_record(self, path: &str, line: u64) -> Result<WinRecord, IngestError> {
        let draw = parse_draw(&self.draw)
            .ok_or_else(|| IngestError::data_format(path, line, "draw", &self.draw))?;
        let draw_date = parse_optional_date(&self.draw_date)
            .map_err(|_| IngestError::data_format(path, line, "draw_date", &self.draw_date))?;
        let rank = parse_rank(&self.rank)
            .ok_or_else(|| IngestError::data_format(path, line, "rank", &self.rank))?;

        Ok(WinRecord {
            draw,
            draw_date,
            rank,
            name: self.name,
            choice_type: self.choice_type,
            address: self.address,
        })
    }
}

// ============================================================================
// FIELD PARSING (no silent coercion)
// ============================================================================

/// Empty cell = unknown date. Anything else must be a real `YYYY-MM-DD`.
pub fn parse_optional_date(s: &str) -> Result<Option<NaiveDate>, chrono::ParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).map(Some)
}

pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

/// Only the two tracked tiers are valid ranks.
pub fn parse_rank(s: &str) -> Option<u8> {
    match s.trim().parse::<u8>() {
        Ok(rank @ (1 | 2)) => Some(rank),
        _ => None,
    }
}

fn parse_draw(s: &str) -> Option<u32> {
    s.trim().parse::<u32>().ok()
}

// ============================================================================
// DRAW ESTIMATION
// ============================================================================

/// Estimate the latest draw id from a known (draw, date) anchor.
///
/// Assumes exactly one draw every seven days. Days before the anchor floor
/// towards earlier draws.
pub fn estimate_current_draw(base_draw: u32, base_date: NaiveDate, today: NaiveDate) -> u32 {
    let elapsed = (today - base_date).num_days();
    let estimated = i64::from(base_draw) + elapsed.div_euclid(DRAW_CADENCE_DAYS);
    estimated.max(1) as u32
}

/// Draw ids that still have to be fetched.
///
/// Empty ledger → only the estimated draw. Otherwise every id from the
/// smallest known draw (or the estimate, if lower) up to the estimate that is
/// not already present.
pub fn draws_to_fetch(present: &BTreeSet<u32>, estimated: u32) -> Vec<u32> {
    let Some(&first) = present.iter().next() else {
        return vec![estimated];
    };

    let start = first.min(estimated);
    (start..=estimated)
        .filter(|draw| !present.contains(draw))
        .collect()
}

// ============================================================================
// LEDGER
// ============================================================================

/// Deduplicated, sorted history of win events across all runs.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    records: Vec<WinRecord>,
    seen: HashSet<String>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = WinRecord>) -> Self {
        let mut ledger = Ledger::new();
        ledger.merge(records);
        ledger.sort();
        ledger
    }

    /// Load the persisted snapshot. A missing file is an empty ledger.
    ///
    /// Malformed draw ids, ranks or dates abort with `IngestError::DataFormat`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no ledger yet, starting empty");
            return Ok(Ledger::new());
        }

        let mut rdr = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open ledger {}", path.display()))?;
        let display = path.display().to_string();

        let mut records = Vec::new();
        for (i, result) in rdr.deserialize::<LedgerRow>().enumerate() {
            let line = i as u64 + 2;
            let row = result
                .with_context(|| format!("Failed to read ledger row at {}:{}", display, line))?;
            records.push(row.into_record(&display, line)?);
        }

        Ok(Ledger::from_records(records))
    }

    /// Rewrite the full snapshot, sorted.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.sort();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create ledger {}", path.display()))?;
        wtr.write_record(LEDGER_HEADERS)?;
        for record in &self.records {
            wtr.write_record(record.to_csv_row())?;
        }
        wtr.flush()
            .with_context(|| format!("Failed to write ledger {}", path.display()))?;
        Ok(())
    }

    /// Append records not yet known. Returns how many were added.
    pub fn merge(&mut self, records: impl IntoIterator<Item = WinRecord>) -> usize {
        let mut added = 0;
        for record in records {
            if self.seen.insert(record.compute_idempotency_hash()) {
                self.records.push(record);
                added += 1;
            }
        }
        added
    }

    pub fn sort(&mut self) {
        self.records.sort_by(|a, b| {
            a.draw
                .cmp(&b.draw)
                .then(a.rank.cmp(&b.rank))
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.address.cmp(&b.address))
                .then_with(|| a.choice_type.cmp(&b.choice_type))
        });
    }

    pub fn draws(&self) -> BTreeSet<u32> {
        self.records.iter().map(|r| r.draw).collect()
    }

    pub fn contains_draw(&self, draw: u32) -> bool {
        self.records.iter().any(|r| r.draw == draw)
    }

    pub fn records(&self) -> &[WinRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
