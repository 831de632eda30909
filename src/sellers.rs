// 🏪 Seller Directory - every licensed retailer, page by page
//
// Walks the paged seller listing until a page comes back with no rows and
// writes a deduplicated `name, phone, address` master file. Column order on
// the listing varies, so the phone cell is located by shape.

use crate::normalize::collapse_ws;
use crate::source::SellerPageSource;
use anyhow::{Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Safety cap on listing pages walked in one crawl.
pub const MAX_SELLER_PAGES: u32 = 2000;

pub const SELLER_HEADERS: [&str; 3] = ["name", "phone", "address"];

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{2,4}-\d{3,4}-\d{3,4}").expect("static regex"))
}

fn ordinal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+$").expect("static regex"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerRow {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
}

/// Guess (name, phone, address) from one listing row.
///
/// Rows with fewer than three non-empty cells are dropped. The first cell
/// matching the phone pattern is the phone. After dropping it and a leading
/// ordinal, the first remaining cell is the name and the last is the address.
pub fn guess_seller_columns<S: AsRef<str>>(cells: &[S]) -> Option<SellerRow> {
    let mut cells: Vec<String> = cells
        .iter()
        .map(|c| collapse_ws(c.as_ref()))
        .filter(|c| !c.is_empty())
        .collect();

    if cells.len() < 3 {
        return None;
    }

    let phone = match cells.iter().position(|c| phone_re().is_match(c)) {
        Some(i) => cells.remove(i),
        None => String::new(),
    };

    if cells.first().is_some_and(|c| ordinal_re().is_match(c)) {
        cells.remove(0);
    }

    if cells.len() < 2 {
        return None;
    }

    Some(SellerRow {
        name: cells[0].clone(),
        phone,
        address: cells[cells.len() - 1].clone(),
    })
}

/// Parse every listing row on one seller page.
pub fn parse_seller_page(html: &str) -> Vec<SellerRow> {
    let doc = Html::parse_document(html);
    let rows = Selector::parse("table.tbl_data tbody tr").expect("valid selector");

    doc.select(&rows)
        .filter_map(|tr| {
            let cells: Vec<String> = tr
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|el| el.value().name() == "td")
                .map(|td| td.text().collect::<String>())
                .collect();
            guess_seller_columns(&cells)
        })
        .collect()
}

/// Keep the first row for each (name, address).
pub fn dedup_sellers(rows: Vec<SellerRow>) -> Vec<SellerRow> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|r| seen.insert((r.name.clone(), r.address.clone())))
        .collect()
}

/// Walk pages `1..=max_pages` until one yields no rows.
///
/// A failed page fetch aborts the crawl.
pub fn crawl_sellers(
    source: &dyn SellerPageSource,
    max_pages: u32,
    delay: Duration,
) -> Result<Vec<SellerRow>> {
    let mut all = Vec::new();

    for page in 1..=max_pages {
        if page > 1 && !delay.is_zero() {
            thread::sleep(delay);
        }

        let html = source
            .fetch_seller_page(page)
            .with_context(|| format!("Failed to fetch seller page {}", page))?;
        let rows = parse_seller_page(&html);
        debug!(page, rows = rows.len(), "seller page parsed");

        if rows.is_empty() {
            info!(pages = page - 1, "seller listing exhausted");
            return Ok(dedup_sellers(all));
        }
        all.extend(rows);
    }

    warn!(max_pages, "seller crawl hit the page cap");
    Ok(dedup_sellers(all))
}

pub fn write_sellers(path: &Path, rows: &[SellerRow]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    wtr.write_record(SELLER_HEADERS)?;
    for row in rows {
        wtr.write_record([&row.name, &row.phone, &row.address])?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn load_sellers(path: &Path) -> Result<Vec<SellerRow>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open seller master {}", path.display()))?;
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: SellerRow =
            result.with_context(|| format!("Failed to read row in {}", path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::Cell;

    #[test]
    fn test_guess_phone_in_middle() {
        let row = guess_seller_columns(&["12", "행운복권방", "02-123-4567", "서울 종로구 1길"]).unwrap();
        assert_eq!(row.name, "행운복권방");
        assert_eq!(row.phone, "02-123-4567");
        assert_eq!(row.address, "서울 종로구 1길");
    }

    #[test]
    fn test_guess_phone_last() {
        let row = guess_seller_columns(&["1", "대박마트", "부산  해운대구 중동", "051-7777-8888"]).unwrap();
        assert_eq!(row.address, "부산 해운대구 중동");
        assert_eq!(row.phone, "051-7777-8888");
    }

    #[test]
    fn test_guess_without_phone() {
        let row = guess_seller_columns(&["3", "가나상회", "광주 북구 용봉동"]).unwrap();
        assert_eq!(row.phone, "");
        assert_eq!(row.name, "가나상회");
    }

    #[test]
    fn test_guess_too_few_cells() {
        assert_eq!(guess_seller_columns(&["4", "혼자"]), None);
        assert_eq!(guess_seller_columns(&["", "02-123-4567", "혼자"]), None);
        // Two bare cells are not enough, even without an ordinal or phone
        assert_eq!(guess_seller_columns(&["가나상회", "광주 북구 용봉동"]), None);
        assert_eq!(guess_seller_columns(&[" ", "가나상회", "", "광주 북구 용봉동"]), None);
    }

    const PAGE: &str = r#"
        <table class="tbl_data"><tbody>
          <tr><td>1</td><td>행운복권방</td><td>02-123-4567</td><td>서울 종로구 1길</td></tr>
          <tr><td>2</td><td>대박마트</td><td>부산 해운대구 중동</td><td>051-777-8888</td></tr>
          <tr><td colspan="4">조회 결과가 없습니다</td></tr>
        </tbody></table>"#;

    #[test]
    fn test_parse_seller_page() {
        let rows = parse_seller_page(PAGE);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].name, "대박마트");
        assert_eq!(rows[1].address, "부산 해운대구 중동");
    }

    struct TwoPages {
        calls: Cell<u32>,
    }

    impl SellerPageSource for TwoPages {
        fn fetch_seller_page(&self, page: u32) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            match page {
                // Page 2 repeats a seller from page 1
                1 | 2 => Ok(PAGE.to_string()),
                3 => Ok("<table class=\"tbl_data\"><tbody></tbody></table>".to_string()),
                _ => Err(anyhow!("should have stopped")),
            }
        }
    }

    #[test]
    fn test_crawl_stops_on_empty_page_and_dedups() {
        let source = TwoPages { calls: Cell::new(0) };
        let rows = crawl_sellers(&source, MAX_SELLER_PAGES, Duration::ZERO).unwrap();
        assert_eq!(source.calls.get(), 3);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_crawl_respects_page_cap() {
        let source = TwoPages { calls: Cell::new(0) };
        let rows = crawl_sellers(&source, 1, Duration::ZERO).unwrap();
        assert_eq!(source.calls.get(), 1);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_write_and_load_sellers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("sellers_master.csv");
        let rows = parse_seller_page(PAGE);

        write_sellers(&path, &rows).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next(), Some("name,phone,address"));
        assert_eq!(load_sellers(&path).unwrap(), rows);
    }
}
