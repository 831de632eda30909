// 📈 Recency-Weighted Scoring - matched wins → per-store score
//
// score = Σ base(rank) × 0.5^(monthsElapsed / halfLifeMonths)
//   base(1) = 5, base(other) = 1
//   monthsElapsed = days / 30.4375
//
// Besides the decayed score, each store gets lifetime win counts, its latest
// win date and the number of wins inside a trailing 365.25-day window. Events
// with an unknown date still count as wins but carry no weight, no last date
// and no window membership.

use crate::entities::StoreRegistry;
use crate::error::IngestError;
use crate::ledger::{format_date, parse_optional_date, parse_rank};
use crate::reconciliation::WinMatch;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const AVG_DAYS_PER_MONTH: f64 = 30.4375;
pub const RECENT_WINDOW_DAYS: f64 = 365.25;
pub const DEFAULT_HALF_LIFE_MONTHS: f64 = 12.0;

pub const RANK1_BASE: f64 = 5.0;
pub const OTHER_RANK_BASE: f64 = 1.0;

pub const SUMMARY_HEADERS: [&str; 7] = [
    "store_id",
    "win1",
    "win2",
    "a3_score",
    "last_win_date",
    "recent12m_win1",
    "recent12m_win2",
];

// ============================================================================
// EVENTS & SCORES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreEvent {
    pub date: Option<NaiveDate>,
    pub rank: u8,
}

/// Derived fields for one store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreScore {
    pub win1: u32,
    pub win2: u32,
    /// Rounded to 6 decimal places
    pub score: f64,
    pub last_win_date: Option<NaiveDate>,
    pub recent12m_win1: u32,
    pub recent12m_win2: u32,
}

/// Flat per-store output row.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSummaryRow {
    pub store_id: String,
    pub score: StoreScore,
}

impl ScoreSummaryRow {
    fn to_csv_row(&self) -> [String; 7] {
        let s = &self.score;
        [
            self.store_id.clone(),
            s.win1.to_string(),
            s.win2.to_string(),
            format_score(s.score),
            format_date(s.last_win_date),
            s.recent12m_win1.to_string(),
            s.recent12m_win2.to_string(),
        ]
    }
}

/// Score text as serde_json prints it, so the summary and the enriched
/// registry agree (`5.0`, not `5`).
pub fn format_score(score: f64) -> String {
    json!(score).to_string()
}

pub fn months_elapsed(today: NaiveDate, date: NaiveDate) -> f64 {
    (today - date).num_days() as f64 / AVG_DAYS_PER_MONTH
}

pub fn round6(x: f64) -> f64 {
    (x * 1_000_000.0).round() / 1_000_000.0
}

/// Group matched rows by store id. Rows without a store id are skipped.
pub fn group_events(matches: &[WinMatch]) -> HashMap<String, Vec<ScoreEvent>> {
    let mut events: HashMap<String, Vec<ScoreEvent>> = HashMap::new();
    for m in matches.iter().filter(|m| !m.store_id.is_empty()) {
        events.entry(m.store_id.clone()).or_default().push(ScoreEvent {
            date: m.date,
            rank: m.rank,
        });
    }
    events
}

// ============================================================================
// SCORE ENGINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct ScoreEngine {
    pub today: NaiveDate,
    pub half_life_months: f64,
}

impl ScoreEngine {
    pub fn new(today: NaiveDate) -> Self {
        Self::with_half_life(today, DEFAULT_HALF_LIFE_MONTHS)
    }

    pub fn with_half_life(today: NaiveDate, half_life_months: f64) -> Self {
        ScoreEngine {
            today,
            half_life_months,
        }
    }

    /// Decay weight for an event on `date` (1.0 today, 0.5 one half-life ago).
    pub fn weight(&self, date: NaiveDate) -> f64 {
        0.5_f64.powf(months_elapsed(self.today, date) / self.half_life_months)
    }

    pub fn is_recent(&self, date: NaiveDate) -> bool {
        (self.today - date).num_days() as f64 <= RECENT_WINDOW_DAYS
    }

    pub fn score_events(&self, events: &[ScoreEvent]) -> StoreScore {
        let mut out = StoreScore::default();
        let mut score = 0.0;

        for event in events {
            let rank1 = event.rank == 1;
            if rank1 {
                out.win1 += 1;
            } else {
                out.win2 += 1;
            }

            let Some(date) = event.date else {
                continue;
            };

            let base = if rank1 { RANK1_BASE } else { OTHER_RANK_BASE };
            score += base * self.weight(date);

            if self.is_recent(date) {
                if rank1 {
                    out.recent12m_win1 += 1;
                } else {
                    out.recent12m_win2 += 1;
                }
            }

            if out.last_win_date.map_or(true, |last| date > last) {
                out.last_win_date = Some(date);
            }
        }

        out.score = round6(score);
        out
    }

    /// Score every registry entry and write the derived fields into its
    /// properties. Returns one summary row per entry, in registry order.
    pub fn score_registry(
        &self,
        registry: &mut StoreRegistry,
        events: &HashMap<String, Vec<ScoreEvent>>,
    ) -> Vec<ScoreSummaryRow> {
        let entries = registry.entries();
        let mut summary = Vec::with_capacity(entries.len());

        for (i, entry) in entries.into_iter().enumerate() {
            let store_events = events
                .get(&entry.store_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let score = self.score_events(store_events);

            if let Some(props) = registry.properties_mut(i) {
                props.insert("win1".to_string(), json!(score.win1));
                props.insert("win2".to_string(), json!(score.win2));
                props.insert("score".to_string(), json!(score.score));
                props.insert(
                    "last_win_date".to_string(),
                    score
                        .last_win_date
                        .map(|d| Value::String(format_date(Some(d))))
                        .unwrap_or(Value::Null),
                );
                props.insert("recent12m_win1".to_string(), json!(score.recent12m_win1));
                props.insert("recent12m_win2".to_string(), json!(score.recent12m_win2));
            }

            summary.push(ScoreSummaryRow {
                store_id: entry.store_id,
                score,
            });
        }

        summary
    }
}

// ============================================================================
// SCORING STAGE (pipeline collaborator)
// ============================================================================

/// Downstream scoring step invoked by the pipeline after matching.
pub trait ScoringStage {
    fn score(&self, registry: &mut StoreRegistry, matched: &[WinMatch]) -> Result<Vec<ScoreSummaryRow>>;
}

impl ScoringStage for ScoreEngine {
    fn score(&self, registry: &mut StoreRegistry, matched: &[WinMatch]) -> Result<Vec<ScoreSummaryRow>> {
        Ok(self.score_registry(registry, &group_events(matched)))
    }
}

// ============================================================================
// FILES
// ============================================================================

#[derive(Debug, Deserialize)]
struct EventRow {
    #[serde(default)]
    store_id: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    rank: String,
}

/// Read an events table (`store_id, date, rank, ...`), e.g. `wins.csv`.
///
/// Lines starting with `#` are comments. Rows with an empty store id are
/// unmatched and skipped. A non-empty bad date or a bad rank is fatal.
pub fn load_events(path: &Path) -> Result<HashMap<String, Vec<ScoreEvent>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .from_path(path)
        .with_context(|| format!("Failed to open events {}", path.display()))?;
    let headers = rdr.headers()?.clone();
    let display = path.display().to_string();

    let mut events: HashMap<String, Vec<ScoreEvent>> = HashMap::new();
    for result in rdr.records() {
        let record = result.with_context(|| format!("Failed to read events row in {}", display))?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row: EventRow = record
            .deserialize(Some(&headers))
            .with_context(|| format!("Failed to read events row at {}:{}", display, line))?;

        let store_id = row.store_id.trim();
        if store_id.is_empty() {
            continue;
        }

        let date = parse_optional_date(&row.date)
            .map_err(|_| IngestError::data_format(&display, line, "date", &row.date))?;
        let rank = parse_rank(&row.rank)
            .ok_or_else(|| IngestError::data_format(&display, line, "rank", &row.rank))?;

        events
            .entry(store_id.to_string())
            .or_default()
            .push(ScoreEvent { date, rank });
    }
    Ok(events)
}

/// Write the flat summary (header always present).
pub fn write_summary(path: &Path, rows: &[ScoreSummaryRow]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    wtr.write_record(SUMMARY_HEADERS)?;
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
