// 🌐 Sources - external collaborators of the pipeline
//
// The core never talks to the network directly. It asks these traits for
// page bodies and draw dates, so tests can hand it canned documents.
//
// Expression Problem Coverage:
// - New source (mirror site, local archive): implement the trait → core untouched
// - New capability: new trait → existing sources untouched

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

pub const RESULTS_URL: &str =
    "https://www.dhlottery.co.kr/store.do?method=topStore&pageGubun=L645&drwNo={draw}";
pub const DRAW_INFO_URL: &str =
    "https://www.dhlottery.co.kr/common.do?method=getLottoNumber&drwNo={draw}";
pub const SELLER_LIST_URL: &str =
    "https://www.dhlottery.co.kr/store.do?method=sellerInfo645&nowPage={page}";

pub const USER_AGENT: &str = "Mozilla/5.0";
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(15);
pub const DATE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

/// Fetches the winning-retailer results page for one draw.
pub trait DrawPageSource {
    fn fetch_draw_page(&self, draw: u32) -> Result<String>;
}

/// Looks up the calendar date of a draw.
///
/// Errors are reported, not swallowed; the pipeline decides to degrade them to
/// an unknown date.
pub trait DrawDateSource {
    fn draw_date(&self, draw: u32) -> Result<Option<NaiveDate>>;
}

/// Fetches one page of the full seller directory.
pub trait SellerPageSource {
    fn fetch_seller_page(&self, page: u32) -> Result<String>;
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

#[derive(Debug, Deserialize)]
struct DrawInfo {
    #[serde(rename = "drwNoDate")]
    draw_date: Option<String>,
}

/// Blocking client for the official lottery site.
pub struct DhLotteryClient {
    client: Client,
}

impl DhLotteryClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(DhLotteryClient { client })
    }

    fn get_text(&self, url: &str, timeout: Duration) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .with_context(|| format!("GET {}", url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("HTTP {} for {}", status, url));
        }
        response
            .text()
            .with_context(|| format!("Failed to read body of {}", url))
    }
}

impl DrawPageSource for DhLotteryClient {
    fn fetch_draw_page(&self, draw: u32) -> Result<String> {
        let url = RESULTS_URL.replace("{draw}", &draw.to_string());
        self.get_text(&url, PAGE_TIMEOUT)
    }
}

impl DrawDateSource for DhLotteryClient {
    fn draw_date(&self, draw: u32) -> Result<Option<NaiveDate>> {
        let url = DRAW_INFO_URL.replace("{draw}", &draw.to_string());
        let body = self.get_text(&url, DATE_TIMEOUT)?;
        parse_draw_info(&body)
    }
}

impl SellerPageSource for DhLotteryClient {
    fn fetch_seller_page(&self, page: u32) -> Result<String> {
        let url = SELLER_LIST_URL.replace("{page}", &page.to_string());
        self.get_text(&url, PAGE_TIMEOUT)
    }
}

/// Pull `drwNoDate` out of the draw-info JSON. A missing field is `None`.
pub fn parse_draw_info(body: &str) -> Result<Option<NaiveDate>> {
    let info: DrawInfo = serde_json::from_str(body).context("Draw info is not JSON")?;
    match info.draw_date.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, crate::ledger::DATE_FORMAT)
            .map(Some)
            .with_context(|| format!("Unexpected drwNoDate {:?}", raw)),
    }
}
