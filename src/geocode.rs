// 📍 Geocoding - seller master → store master with coordinates
//
// Optional offline step. Each non-empty address is looked up once through the
// Kakao local address API; addresses it can't place keep empty coordinates.

use crate::error::IngestError;
use crate::sellers::SellerRow;
use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

pub const KAKAO_API_KEY_ENV: &str = "KAKAO_API_KEY";
pub const KAKAO_ADDRESS_URL: &str = "https://dapi.kakao.com/v2/local/search/address.json";
pub const GEOCODE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_GEOCODE_DELAY: Duration = Duration::from_millis(150);

pub const STORE_MASTER_HEADERS: [&str; 5] = ["store_id", "name", "address", "lat", "lng"];

/// Coordinates exactly as the API reports them (decimal strings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinates {
    pub lat: String,
    pub lng: String,
}

pub trait Geocoder {
    /// `Ok(None)` when the address is valid input but has no hit.
    fn geocode(&self, address: &str) -> Result<Option<Coordinates>>;
}

// ============================================================================
// KAKAO
// ============================================================================

#[derive(Debug, Deserialize)]
struct AddressSearch {
    #[serde(default)]
    documents: Vec<AddressDocument>,
}

#[derive(Debug, Deserialize)]
struct AddressDocument {
    #[serde(default)]
    x: String,
    #[serde(default)]
    y: String,
}

pub struct KakaoGeocoder {
    client: Client,
    api_key: String,
}

impl KakaoGeocoder {
    /// Read the REST key from `KAKAO_API_KEY`. Missing or blank is a config error.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var(KAKAO_API_KEY_ENV).unwrap_or_default();
        if key.trim().is_empty() {
            return Err(IngestError::Config(format!("{} env missing", KAKAO_API_KEY_ENV)).into());
        }
        Self::with_key(key.trim())
    }

    pub fn with_key(api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(GEOCODE_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(KakaoGeocoder {
            client,
            api_key: api_key.to_string(),
        })
    }
}

impl Geocoder for KakaoGeocoder {
    fn geocode(&self, address: &str) -> Result<Option<Coordinates>> {
        let response = self
            .client
            .get(KAKAO_ADDRESS_URL)
            .query(&[("query", address)])
            .header("Authorization", format!("KakaoAK {}", self.api_key))
            .send()
            .with_context(|| format!("Geocode request failed for {:?}", address))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("HTTP {} geocoding {:?}", status, address));
        }
        let body = response.text().context("Failed to read geocode response")?;
        parse_address_search(&body)
    }
}

/// First document's `y`/`x` as lat/lng.
pub fn parse_address_search(body: &str) -> Result<Option<Coordinates>> {
    let search: AddressSearch =
        serde_json::from_str(body).context("Geocode response is not JSON")?;
    Ok(search.documents.into_iter().next().map(|d| Coordinates {
        lat: d.y,
        lng: d.x,
    }))
}

// ============================================================================
// STORE MASTER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMasterRow {
    /// Left empty; assigned during curation
    pub store_id: String,
    pub name: String,
    pub address: String,
    pub lat: String,
    pub lng: String,
}

/// Geocode every seller in order. Blank addresses are not looked up.
pub fn geocode_sellers(
    sellers: &[SellerRow],
    geocoder: &dyn Geocoder,
    delay: Duration,
) -> Result<Vec<StoreMasterRow>> {
    let total = sellers.len();
    let mut out = Vec::with_capacity(total);

    for (i, seller) in sellers.iter().enumerate() {
        let address = seller.address.trim();
        debug!(n = i + 1, total, name = %seller.name, address, "geocoding");

        let coords = if address.is_empty() {
            None
        } else {
            let coords = geocoder.geocode(address)?;
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            coords
        };

        let (lat, lng) = coords.map_or_else(Default::default, |c| (c.lat, c.lng));
        out.push(StoreMasterRow {
            store_id: String::new(),
            name: seller.name.clone(),
            address: seller.address.clone(),
            lat,
            lng,
        });
    }

    let placed = out.iter().filter(|r| !r.lat.is_empty()).count();
    info!(total, placed, "geocoding finished");
    Ok(out)
}

pub fn write_store_master(path: &Path, rows: &[StoreMasterRow]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    wtr.write_record(STORE_MASTER_HEADERS)?;
    for row in rows {
        wtr.write_record([&row.store_id, &row.name, &row.address, &row.lat, &row.lng])?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
