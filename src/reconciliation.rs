// ⚖️ Reconciliation Engine - ledger rows → canonical store ids
//
// Every ledger row lands in exactly one of two outputs:
//   Matched   - alias table or registry index resolved a store id
//   Unmatched - nothing resolved; kept for manual alias curation
//
// Resolution is exact normalized-key equality. No fuzzy fallback: a
// near-duplicate spelling is a curation task, never a silent merge.

use crate::entities::{AliasTable, StoreIndex};
use crate::ledger::{format_date, WinRecord};
use crate::normalize::NormalizedKey;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const MATCH_HEADERS: [&str; 6] = ["store_id", "date", "rank", "draw_no", "name", "address"];

// ============================================================================
// MATCH RESULT
// ============================================================================

/// One ledger row tagged with its resolved store (empty id when unmatched).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinMatch {
    pub store_id: String,
    pub date: Option<NaiveDate>,
    pub rank: u8,
    pub draw_no: u32,
    pub name: String,
    pub address: String,
}

impl WinMatch {
    fn from_record(record: &WinRecord, store_id: String) -> Self {
        WinMatch {
            store_id,
            date: record.draw_date,
            rank: record.rank,
            draw_no: record.draw,
            name: record.name.clone(),
            address: record.address.clone(),
        }
    }

    fn to_csv_row(&self) -> [String; 6] {
        [
            self.store_id.clone(),
            format_date(self.date),
            self.rank.to_string(),
            self.draw_no.to_string(),
            self.name.clone(),
            self.address.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(WinMatch),
    Unmatched(WinMatch),
}

impl MatchOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, MatchOutcome::Matched(_))
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ReconciliationReport {
    pub matched: Vec<WinMatch>,
    pub unmatched: Vec<WinMatch>,
}

impl ReconciliationReport {
    pub fn total(&self) -> usize {
        self.matched.len() + self.unmatched.len()
    }

    /// Share of rows resolved (0.0 - 1.0). An empty ledger counts as fully matched.
    pub fn match_rate(&self) -> f64 {
        if self.total() == 0 {
            1.0
        } else {
            self.matched.len() as f64 / self.total() as f64
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation: {} rows, {} matched, {} unmatched ({:.1}% resolved)",
            self.total(),
            self.matched.len(),
            self.unmatched.len(),
            self.match_rate() * 100.0
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine<'a> {
    aliases: &'a AliasTable,
    index: &'a StoreIndex,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(aliases: &'a AliasTable, index: &'a StoreIndex) -> Self {
        ReconciliationEngine { aliases, index }
    }

    /// Alias table first, then the automatic index.
    pub fn resolve(&self, key: &NormalizedKey) -> Option<&'a str> {
        self.aliases.get(key).or_else(|| self.index.get(key))
    }

    pub fn match_record(&self, record: &WinRecord) -> MatchOutcome {
        match self.resolve(&record.key()) {
            Some(store_id) => MatchOutcome::Matched(WinMatch::from_record(record, store_id.to_string())),
            None => MatchOutcome::Unmatched(WinMatch::from_record(record, String::new())),
        }
    }

    /// Split the ledger into Matched / Unmatched, preserving ledger order.
    pub fn reconcile(&self, records: &[WinRecord]) -> ReconciliationReport {
        let mut report = ReconciliationReport::default();
        for record in records {
            match self.match_record(record) {
                MatchOutcome::Matched(m) => report.matched.push(m),
                MatchOutcome::Unmatched(m) => report.unmatched.push(m),
            }
        }
        report
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

/// Write a match table (header is always written, even with no rows).
pub fn write_matches(path: &Path, rows: &[WinMatch]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    wtr.write_record(MATCH_HEADERS)?;
    for row in rows {
        wtr.write_record(row.to_csv_row())?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
