// ⚙️ Pipeline configuration
// Every path, anchor and knob of one run, resolved up front.

use crate::error::IngestError;
use crate::extractor::SOURCE_DOMAIN;
use crate::scoring::DEFAULT_HALF_LIFE_MONTHS;
use anyhow::Result;
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pause between outbound requests during multi-draw runs.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(400);

// ============================================================================
// DATA PATHS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    /// Accumulated win ledger (rewritten each run)
    pub ledger: PathBuf,
    /// Canonical store registry (GeoJSON)
    pub registry: PathBuf,
    /// Optional manual alias table
    pub aliases: PathBuf,
    pub matched: PathBuf,
    pub unmatched: PathBuf,
    /// Registry copy enriched with score fields
    pub scored_registry: PathBuf,
    pub summary: PathBuf,
}

impl DataPaths {
    /// Conventional layout under `<root>/data/`.
    pub fn under(root: &Path) -> Self {
        let data = root.join("data");
        DataPaths {
            ledger: data.join("dhlottery_stores.csv"),
            registry: data.join("stores_clean.geojson"),
            aliases: data.join("store_aliases.csv"),
            matched: data.join("wins.csv"),
            unmatched: data.join("wins_unmatched.csv"),
            scored_registry: data.join("stores_clean.a3.geojson"),
            summary: data.join("scores_a3_summary.csv"),
        }
    }
}

/// Half-life must be a finite, positive number of months.
pub fn validate_half_life(months: f64) -> Result<()> {
    if !months.is_finite() || months <= 0.0 {
        return Err(IngestError::Config(format!(
            "half-life must be a positive number of months, got {}",
            months
        ))
        .into());
    }
    Ok(())
}

// ============================================================================
// PIPELINE CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Known (draw id, draw date) anchor for estimating the latest draw
    pub base_draw: u32,
    pub base_date: NaiveDate,
    pub paths: DataPaths,
    /// Overrides "today" for draw estimation and scoring
    pub as_of: Option<NaiveDate>,
    pub half_life_months: f64,
    pub request_delay: Duration,
    /// Cells containing this string are treated as site chrome
    pub source_domain: String,
}

impl PipelineConfig {
    pub fn new(root: impl AsRef<Path>, base_draw: u32, base_date: NaiveDate) -> Self {
        PipelineConfig {
            paths: DataPaths::under(root.as_ref()),
            base_draw,
            base_date,
            as_of: None,
            half_life_months: DEFAULT_HALF_LIFE_MONTHS,
            request_delay: DEFAULT_REQUEST_DELAY,
            source_domain: SOURCE_DOMAIN.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_half_life(self.half_life_months)?;
        if self.base_draw == 0 {
            return Err(IngestError::Config("base draw must be at least 1".to_string()).into());
        }
        Ok(())
    }

    pub fn today(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Local::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::new("/repo", 1184, NaiveDate::from_ymd_opt(2025, 8, 9).unwrap())
    }

    #[test]
    fn test_default_layout() {
        let cfg = config();
        assert_eq!(cfg.paths.ledger, Path::new("/repo/data/dhlottery_stores.csv"));
        assert_eq!(cfg.paths.registry, Path::new("/repo/data/stores_clean.geojson"));
        assert_eq!(cfg.paths.summary, Path::new("/repo/data/scores_a3_summary.csv"));
        assert_eq!(cfg.half_life_months, 12.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_as_of_overrides_today() {
        let mut cfg = config();
        cfg.as_of = NaiveDate::from_ymd_opt(2025, 8, 23);
        assert_eq!(cfg.today(), NaiveDate::from_ymd_opt(2025, 8, 23).unwrap());
    }

    #[test]
    fn test_rejects_bad_half_life() {
        let mut cfg = config();
        cfg.half_life_months = 0.0;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err.downcast_ref::<IngestError>(), Some(IngestError::Config(_))));

        cfg.half_life_months = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_half_life() {
        assert!(validate_half_life(12.0).is_ok());
        assert!(validate_half_life(0.5).is_ok());
        for bad in [0.0, -3.0, f64::INFINITY, f64::NAN] {
            let err = validate_half_life(bad).unwrap_err();
            assert!(matches!(err.downcast_ref::<IngestError>(), Some(IngestError::Config(_))));
        }
    }
}
