// Lotto Stores - Core Library
// Win ledger accumulation, store reconciliation and recency scoring for
// lottery retailer announcements. The CLI is a thin layer over these modules.

pub mod config;
pub mod entities;       // Store registry + manual alias table
pub mod error;
pub mod extractor;      // Results page → win rows
pub mod geocode;        // Optional Kakao address lookup
pub mod ledger;         // Idempotent win history
pub mod normalize;      // Name/address match keys
pub mod pipeline;       // fetch → accumulate → match → score
pub mod reconciliation; // Ledger rows → store ids
pub mod scoring;        // Half-life decay scoring
pub mod sellers;        // Seller directory crawl
pub mod source;         // HTTP collaborators

// Re-export commonly used types
pub use config::{DataPaths, PipelineConfig};
pub use entities::{AliasEntry, AliasTable, StoreEntry, StoreIndex, StoreRegistry};
pub use error::IngestError;
pub use extractor::{guess_columns, GuessedRow, TableExtractor};
pub use ledger::{draws_to_fetch, estimate_current_draw, Ledger, WinRecord};
pub use normalize::{normalize, NormalizedKey};
pub use pipeline::{Collaborators, RunReport};
pub use reconciliation::{MatchOutcome, ReconciliationEngine, ReconciliationReport, WinMatch};
pub use scoring::{ScoreEngine, ScoreSummaryRow, ScoringStage, StoreScore};
pub use source::{DhLotteryClient, DrawDateSource, DrawPageSource, SellerPageSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
