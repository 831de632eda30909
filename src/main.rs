mod cli;

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lotto_stores::config::{validate_half_life, PipelineConfig};
use lotto_stores::entities::StoreRegistry;
use lotto_stores::geocode::{geocode_sellers, write_store_master, KakaoGeocoder};
use lotto_stores::pipeline::{self, Collaborators};
use lotto_stores::scoring::{load_events, write_summary, ScoreEngine, ScoringStage};
use lotto_stores::sellers::{crawl_sellers, load_sellers, write_sellers};
use lotto_stores::source::DhLotteryClient;

use crate::cli::{Cli, Commands, GeocodeArgs, ScoreArgs, SellersArgs, UpdateArgs};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Update(args) => run_update(args),
        Commands::Score(args) => run_score(args),
        Commands::Sellers(args) => run_sellers(args),
        Commands::Geocode(args) => run_geocode(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// 🔄 update: fetch → ledger → match → score
fn run_update(args: UpdateArgs) -> Result<()> {
    let mut config = PipelineConfig::new(&args.repo_root, args.base_draw, args.base_date);
    config.as_of = args.as_of;
    config.half_life_months = args.half_life_months;
    config.request_delay = Duration::from_millis(args.request_delay_ms);
    if let Some(path) = args.registry {
        config.paths.registry = path;
    }
    if let Some(path) = args.ledger {
        config.paths.ledger = path;
    }
    if let Some(path) = args.aliases {
        config.paths.aliases = path;
    }
    if let Some(path) = args.matched {
        config.paths.matched = path;
    }
    if let Some(path) = args.unmatched {
        config.paths.unmatched = path;
    }
    if let Some(path) = args.out_geojson {
        config.paths.scored_registry = path;
    }
    if let Some(path) = args.out_summary {
        config.paths.summary = path;
    }
    config.validate()?;

    let today = config.today();
    let client = DhLotteryClient::new()?;
    let scorer = ScoreEngine::with_half_life(today, config.half_life_months);
    let collab = Collaborators {
        pages: &client,
        dates: &client,
        scoring: if args.no_score { None } else { Some(&scorer as &dyn ScoringStage) },
    };

    let report = pipeline::run(&config, today, &collab)?;
    info!("{}", report.summary());
    Ok(())
}

// 📈 score: registry + events table → enriched registry + summary
fn run_score(args: ScoreArgs) -> Result<()> {
    validate_half_life(args.half_life_months)?;

    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let mut registry = StoreRegistry::load(&args.geojson)
        .with_context(|| format!("Failed to load registry {}", args.geojson.display()))?;
    let events = load_events(&args.events)?;

    let engine = ScoreEngine::with_half_life(today, args.half_life_months);
    let summary = engine.score_registry(&mut registry, &events);

    registry.save(&args.out_geojson)?;
    write_summary(&args.out_summary, &summary)?;
    info!(
        stores = summary.len(),
        registry = %args.out_geojson.display(),
        summary = %args.out_summary.display(),
        "scores written"
    );
    Ok(())
}

// 🏪 sellers: full directory crawl
fn run_sellers(args: SellersArgs) -> Result<()> {
    let client = DhLotteryClient::new()?;
    let rows = crawl_sellers(&client, args.max_pages, Duration::from_millis(args.delay_ms))?;
    write_sellers(&args.out, &rows)?;
    info!(path = %args.out.display(), rows = rows.len(), "seller master written");
    Ok(())
}

// 📍 geocode: seller master → store master with coordinates
fn run_geocode(args: GeocodeArgs) -> Result<()> {
    let geocoder = KakaoGeocoder::from_env()?;
    let sellers = load_sellers(&args.src)?;
    let rows = geocode_sellers(&sellers, &geocoder, Duration::from_millis(args.delay_ms))?;
    write_store_master(&args.dst, &rows)?;
    info!(path = %args.dst.display(), rows = rows.len(), "store master written");
    Ok(())
}
