use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "lotto-stores",
    version,
    about = "Lottery retailer win ledger, store matching and recency scoring"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch new draws, update the ledger, match and score
    Update(UpdateArgs),
    /// Score a registry against an existing events table
    Score(ScoreArgs),
    /// Crawl the full seller directory
    Sellers(SellersArgs),
    /// Geocode the seller master through the Kakao address API
    Geocode(GeocodeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    #[arg(long, default_value = ".")]
    pub repo_root: PathBuf,

    #[arg(long)]
    pub base_draw: u32,

    #[arg(long, value_parser = parse_date)]
    pub base_date: NaiveDate,

    #[arg(long)]
    pub registry: Option<PathBuf>,

    #[arg(long)]
    pub ledger: Option<PathBuf>,

    #[arg(long)]
    pub aliases: Option<PathBuf>,

    /// Matched wins table (default <root>/data/wins.csv)
    #[arg(long)]
    pub matched: Option<PathBuf>,

    #[arg(long)]
    pub unmatched: Option<PathBuf>,

    #[arg(long)]
    pub out_geojson: Option<PathBuf>,

    #[arg(long)]
    pub out_summary: Option<PathBuf>,

    /// Pretend today is this date (draw estimation and scoring)
    #[arg(long, value_parser = parse_date)]
    pub as_of: Option<NaiveDate>,

    #[arg(long, default_value_t = 12.0)]
    pub half_life_months: f64,

    #[arg(long, default_value_t = 400)]
    pub request_delay_ms: u64,

    #[arg(long, default_value_t = false)]
    pub no_score: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    #[arg(long)]
    pub geojson: PathBuf,

    /// CSV with at least store_id, date, rank
    #[arg(long)]
    pub events: PathBuf,

    #[arg(long, default_value = "stores_clean.a3.geojson")]
    pub out_geojson: PathBuf,

    #[arg(long, default_value = "scores_a3_summary.csv")]
    pub out_summary: PathBuf,

    #[arg(long, value_parser = parse_date)]
    pub today: Option<NaiveDate>,

    #[arg(long, default_value_t = 12.0)]
    pub half_life_months: f64,
}

#[derive(Args, Debug, Clone)]
pub struct SellersArgs {
    #[arg(long, default_value = "data/sellers_master.csv")]
    pub out: PathBuf,

    #[arg(long, default_value_t = 2000)]
    pub max_pages: u32,

    #[arg(long, default_value_t = 400)]
    pub delay_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct GeocodeArgs {
    #[arg(long, default_value = "data/sellers_master.csv")]
    pub src: PathBuf,

    #[arg(long, default_value = "data/stores_master.csv")]
    pub dst: PathBuf,

    #[arg(long, default_value_t = 150)]
    pub delay_ms: u64,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, lotto_stores::ledger::DATE_FORMAT)
        .map_err(|e| format!("expected YYYY-MM-DD, got {:?}: {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_update() {
        let cli = Cli::try_parse_from([
            "lotto-stores",
            "update",
            "--base-draw",
            "1184",
            "--base-date",
            "2025-08-09",
            "--no-score",
            "--matched",
            "out/wins.csv",
            "--unmatched",
            "out/wins_unmatched.csv",
        ])
        .unwrap();

        match cli.command {
            Commands::Update(args) => {
                assert_eq!(args.base_draw, 1184);
                assert_eq!(args.base_date, NaiveDate::from_ymd_opt(2025, 8, 9).unwrap());
                assert_eq!(args.repo_root, PathBuf::from("."));
                assert_eq!(args.half_life_months, 12.0);
                assert!(args.no_score);
                assert_eq!(args.as_of, None);
                assert_eq!(args.matched, Some(PathBuf::from("out/wins.csv")));
                assert_eq!(args.unmatched, Some(PathBuf::from("out/wins_unmatched.csv")));
                assert_eq!(args.registry, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_date() {
        let result = Cli::try_parse_from([
            "lotto-stores",
            "update",
            "--base-draw",
            "1184",
            "--base-date",
            "09/08/2025",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_score_defaults() {
        let cli = Cli::try_parse_from([
            "lotto-stores",
            "score",
            "--geojson",
            "stores.geojson",
            "--events",
            "wins.csv",
        ])
        .unwrap();

        match cli.command {
            Commands::Score(args) => {
                assert_eq!(args.out_summary, PathBuf::from("scores_a3_summary.csv"));
                assert_eq!(args.today, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
