// 🧾 HTML Table Extractor - results page → candidate win records
// Best-effort column inference over markup we don't control.
//
// Heuristics (per body row):
// - leading purely numeric cell = row ordinal, dropped
// - cell containing 자동/수동/반자동 = choice type
// - cell shaped like a Korean address = address
// - longest remaining cell = store name
// - cells mentioning the source site's own domain are navigation/ad noise
//
// Rows that don't yield a name, an address and a rank in {1,2} are dropped
// silently. Nothing here touches the network.

use crate::ledger::WinRecord;
use crate::normalize::collapse_ws;
use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use tracing::trace;

/// Domain string of the results site; cells containing it are ignored.
pub const SOURCE_DOMAIN: &str = "dhlottery.co.kr";

/// Ticket choice vocabulary (automatic / manual / semi-automatic).
pub const CHOICE_TYPES: [&str; 3] = ["자동", "수동", "반자동"];

pub const RANK1_MARKER: &str = "1등";
pub const RANK2_MARKER: &str = "2등";

fn address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(시|군|구|로|길|동|면|리|번지|호)\s*\d*").expect("static regex"))
}

fn ordinal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+$").expect("static regex"))
}

// ============================================================================
// COLUMN GUESSING (pure)
// ============================================================================

/// Columns recovered from one table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessedRow {
    pub name: String,
    pub choice_type: String,
    pub address: String,
}

pub fn is_choice(cell: &str) -> bool {
    CHOICE_TYPES.iter().any(|c| cell.contains(c))
}

/// Number of administrative-unit tokens in the cell. Zero = not address-shaped.
pub fn address_score(cell: &str) -> usize {
    address_re().find_iter(cell).count()
}

pub fn looks_like_address(cell: &str) -> bool {
    address_score(cell) > 0
}

/// Guess (name, choice, address) from a row's raw cell texts.
///
/// When several cells look like addresses, the one with the most
/// administrative tokens wins; ties go to the later cell, since the address is
/// the trailing text column on the results pages.
pub fn guess_columns<S: AsRef<str>>(cells: &[S], domain: &str) -> Option<GuessedRow> {
    let mut cells: Vec<String> = cells
        .iter()
        .map(|c| collapse_ws(c.as_ref()))
        .filter(|c| !c.is_empty())
        .collect();

    if cells.first().is_some_and(|c| ordinal_re().is_match(c)) {
        cells.remove(0);
    }

    // Only cells that may take a role
    let candidates: Vec<(usize, &str)> = cells
        .iter()
        .enumerate()
        .filter(|(_, c)| domain.is_empty() || !c.contains(domain))
        .map(|(i, c)| (i, c.as_str()))
        .collect();

    let choice = candidates.iter().find(|(_, c)| is_choice(c)).copied();
    let choice_idx = choice.map(|(i, _)| i);

    let address = candidates
        .iter()
        .filter(|(i, _)| Some(*i) != choice_idx)
        .map(|&(i, c)| (address_score(c), i, c))
        .filter(|(score, _, _)| *score > 0)
        .max_by_key(|&(score, i, _)| (score, i))
        .map(|(_, i, c)| (i, c));
    let address_idx = address.map(|(i, _)| i);

    // Longest leftover; the first one wins a tie
    let mut name: Option<&str> = None;
    for &(i, c) in &candidates {
        if Some(i) == choice_idx || Some(i) == address_idx {
            continue;
        }
        if name.map_or(true, |n| c.chars().count() > n.chars().count()) {
            name = Some(c);
        }
    }

    match (name, address) {
        (Some(name), Some((_, address))) => Some(GuessedRow {
            name: name.to_string(),
            choice_type: choice.map(|(_, c)| c.to_string()).unwrap_or_default(),
            address: address.to_string(),
        }),
        _ => None,
    }
}

/// Rank implied by a table caption/header. 0 = unknown.
pub fn rank_hint(text: &str) -> u8 {
    if text.contains(RANK1_MARKER) {
        1
    } else if text.contains(RANK2_MARKER) {
        2
    } else {
        0
    }
}

/// Apply an explicit rank marker inside the row on top of the table hint.
pub fn row_rank(hint: u8, row_text: &str) -> u8 {
    let mut rank = hint;
    if row_text.contains(RANK1_MARKER) {
        rank = 1;
    }
    if row_text.contains(RANK2_MARKER) && rank == 0 {
        rank = 2;
    }
    rank
}

// ============================================================================
// DOCUMENT WALKER
// ============================================================================

/// Walks the data tables of one results page.
pub struct TableExtractor {
    domain: String,
    table: Selector,
    head: Selector,
    body_row: Selector,
}

impl TableExtractor {
    pub fn new() -> Self {
        Self::with_domain(SOURCE_DOMAIN)
    }

    pub fn with_domain(domain: &str) -> Self {
        TableExtractor {
            domain: domain.to_string(),
            table: Selector::parse("table.tbl_data").expect("valid selector"),
            head: Selector::parse("caption, th").expect("valid selector"),
            body_row: Selector::parse("tbody > tr").expect("valid selector"),
        }
    }

    /// Extract every recognizable win row for `draw` from the page HTML.
    pub fn extract(&self, html: &str, draw: u32, draw_date: Option<NaiveDate>) -> Vec<WinRecord> {
        let doc = Html::parse_document(html);
        let mut records = Vec::new();

        for table in doc.select(&self.table) {
            let head_text = table
                .select(&self.head)
                .map(|el| el.text().collect::<String>())
                .collect::<Vec<_>>()
                .join(" ");
            let hint = rank_hint(&head_text);

            for tr in table.select(&self.body_row) {
                let cells = row_cells(tr);
                if cells.is_empty() {
                    continue;
                }

                let Some(guessed) = guess_columns(&cells, &self.domain) else {
                    trace!(draw, row = %cells.join(" | "), "row skipped: no name/address");
                    continue;
                };

                let rank = row_rank(hint, &cells.join(" "));
                if !matches!(rank, 1 | 2) {
                    trace!(draw, row = %cells.join(" | "), "row skipped: unknown rank");
                    continue;
                }

                records.push(WinRecord {
                    draw,
                    draw_date,
                    rank,
                    name: guessed.name,
                    choice_type: guessed.choice_type,
                    address: guessed.address,
                });
            }
        }

        records
    }
}

impl Default for TableExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Text of the row's own `<td>` children (nested tables are not descended into
/// as separate cells).
fn row_cells(tr: ElementRef<'_>) -> Vec<String> {
    tr.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "td")
        .map(|td| td.text().collect::<String>().trim().to_string())
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
