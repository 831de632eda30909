// 🔄 Update Pipeline - fetch → extract → accumulate → match → score
//
// One synchronous pass per invocation. Each stage works on the full in-memory
// output of the previous one. Re-running is always safe: draws already in the
// ledger are never fetched again.

use crate::config::PipelineConfig;
use crate::entities::{AliasTable, StoreRegistry};
use crate::error::IngestError;
use crate::extractor::TableExtractor;
use crate::ledger::{draws_to_fetch, estimate_current_draw, Ledger};
use crate::reconciliation::{write_matches, ReconciliationEngine};
use crate::scoring::{write_summary, ScoringStage};
use crate::source::{DrawDateSource, DrawPageSource};
use anyhow::Result;
use chrono::NaiveDate;
use std::thread;
use tracing::{debug, info, warn};

/// Collaborators the pipeline calls out to.
pub struct Collaborators<'a> {
    pub pages: &'a dyn DrawPageSource,
    pub dates: &'a dyn DrawDateSource,
    /// `None` skips scoring
    pub scoring: Option<&'a dyn ScoringStage>,
}

/// What one run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub estimated_draw: u32,
    pub draws_fetched: Vec<u32>,
    pub rows_added: usize,
    pub ledger_rows: usize,
    /// `None` when the registry was missing and matching was skipped
    pub matched: Option<usize>,
    pub unmatched: Option<usize>,
    pub stores_scored: Option<usize>,
}

impl RunReport {
    pub fn summary(&self) -> String {
        let opt = |v: Option<usize>| v.map_or_else(|| "-".to_string(), |n| n.to_string());
        format!(
            "est. draw {}, fetched {} draw(s), +{} rows, ledger {} rows, matched {}, unmatched {}, scored {}",
            self.estimated_draw,
            self.draws_fetched.len(),
            self.rows_added,
            self.ledger_rows,
            opt(self.matched),
            opt(self.unmatched),
            opt(self.stores_scored),
        )
    }
}

/// Run the whole update once against `today`.
///
/// A failed page fetch aborts the run, but only after the ledger snapshot
/// (including draws fetched earlier in this run) has been written.
pub fn run(config: &PipelineConfig, today: NaiveDate, collab: &Collaborators<'_>) -> Result<RunReport> {
    config.validate()?;
    let paths = &config.paths;
    let mut report = RunReport::default();

    // ----- accumulate -----
    let mut ledger = Ledger::load(&paths.ledger)?;
    let estimated = estimate_current_draw(config.base_draw, config.base_date, today);
    let to_fetch = draws_to_fetch(&ledger.draws(), estimated);
    report.estimated_draw = estimated;
    info!(estimated, existing = ledger.len(), pending = to_fetch.len(), "ledger loaded");

    let extractor = TableExtractor::with_domain(&config.source_domain);
    for (i, &draw) in to_fetch.iter().enumerate() {
        if i > 0 && !config.request_delay.is_zero() {
            thread::sleep(config.request_delay);
        }

        info!(draw, "scraping draw");
        let html = match collab.pages.fetch_draw_page(draw) {
            Ok(html) => html,
            Err(err) => {
                ledger.save(&paths.ledger)?;
                return Err(IngestError::Fetch {
                    draw,
                    reason: format!("{:#}", err),
                }
                .into());
            }
        };

        let draw_date = match collab.dates.draw_date(draw) {
            Ok(date) => date,
            Err(err) => {
                warn!(draw, error = %format!("{:#}", err), "draw date lookup failed, leaving date empty");
                None
            }
        };

        let records = extractor.extract(&html, draw, draw_date);
        let found = records.len();
        let added = ledger.merge(records);
        debug!(draw, found, added, "draw merged");
        if found == 0 {
            warn!(draw, "no win rows recognized on results page");
        }

        report.draws_fetched.push(draw);
        report.rows_added += added;
    }

    ledger.save(&paths.ledger)?;
    report.ledger_rows = ledger.len();
    info!(path = %paths.ledger.display(), rows = ledger.len(), "ledger saved");

    // ----- match -----
    if !paths.registry.exists() {
        warn!(path = %paths.registry.display(), "registry not found, skipping match and score");
        return Ok(report);
    }

    let mut registry = StoreRegistry::load(&paths.registry)?;
    let index = registry.build_index();
    let aliases = AliasTable::load_optional(&paths.aliases)?;
    debug!(
        indexed = index.len(),
        overwritten = index.overwritten(),
        aliases = aliases.len(),
        "store index built"
    );

    let reconciliation = ReconciliationEngine::new(&aliases, &index).reconcile(ledger.records());
    write_matches(&paths.matched, &reconciliation.matched)?;
    write_matches(&paths.unmatched, &reconciliation.unmatched)?;
    report.matched = Some(reconciliation.matched.len());
    report.unmatched = Some(reconciliation.unmatched.len());
    info!("{}", reconciliation.summary());

    // ----- score -----
    let Some(scoring) = collab.scoring else {
        info!("scoring disabled");
        return Ok(report);
    };

    let summary = scoring.score(&mut registry, &reconciliation.matched)?;
    registry.save(&paths.scored_registry)?;
    write_summary(&paths.summary, &summary)?;
    report.stores_scored = Some(summary.len());
    info!(
        registry = %paths.scored_registry.display(),
        summary = %paths.summary.display(),
        stores = summary.len(),
        "scores written"
    );

    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ScoreEngine;
    use anyhow::anyhow;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    /// Canned pages keyed by draw; records which draws were requested.
    struct FakePages {
        pages: HashMap<u32, String>,
        requested: RefCell<Vec<u32>>,
    }

    impl FakePages {
        fn new(pages: Vec<(u32, String)>) -> Self {
            FakePages {
                pages: pages.into_iter().collect(),
                requested: RefCell::new(Vec::new()),
            }
        }
    }

    impl DrawPageSource for FakePages {
        fn fetch_draw_page(&self, draw: u32) -> Result<String> {
            self.requested.borrow_mut().push(draw);
            self.pages
                .get(&draw)
                .cloned()
                .ok_or_else(|| anyhow!("HTTP 500 for draw {}", draw))
        }
    }

    struct FakeDates;

    impl DrawDateSource for FakeDates {
        fn draw_date(&self, draw: u32) -> Result<Option<NaiveDate>> {
            // Draw 1184 was on 2025-08-09, one per week
            if draw == 9999 {
                return Err(anyhow!("timeout"));
            }
            let base = NaiveDate::from_ymd_opt(2025, 8, 9).unwrap();
            Ok(Some(base + chrono::Duration::days(7 * (i64::from(draw) - 1184))))
        }
    }

    fn page(rank1: &[(&str, &str)], rank2: &[(&str, &str)]) -> String {
        let rows = |rows: &[(&str, &str)]| {
            rows.iter()
                .enumerate()
                .map(|(i, (name, addr))| {
                    format!(
                        "<tr><td>{}</td><td>{}</td><td>자동</td><td>{}</td><td>www.dhlottery.co.kr</td></tr>",
                        i + 1,
                        name,
                        addr
                    )
                })
                .collect::<String>()
        };
        format!(
            "<html><body>\
             <table class=\"tbl_data\"><caption>1등 배출점</caption><tbody>{}</tbody></table>\
             <table class=\"tbl_data\"><caption>2등 배출점</caption><tbody>{}</tbody></table>\
             </body></html>",
            rows(rank1),
            rows(rank2)
        )
    }

    fn write_registry(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":{"type":"Point","coordinates":[127.0,37.5]},
                 "properties":{"store_id":"S1","name":"ABC마트","address":"서울시 강남구 1길 2"}},
                {"type":"Feature","geometry":null,
                 "properties":{"store_id":"S2","name":"대박상회","address":"대구 중구 동성로 2길"}}
            ]}"#,
        )
        .unwrap();
    }

    fn config(root: &Path, today: NaiveDate) -> PipelineConfig {
        let mut cfg = PipelineConfig::new(root, 1184, NaiveDate::from_ymd_opt(2025, 8, 9).unwrap());
        cfg.as_of = Some(today);
        cfg.request_delay = Duration::ZERO;
        cfg
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_first_run_fetches_only_estimated_draw() {
        let dir = tempfile::tempdir().unwrap();
        let today = date(2025, 8, 23);
        let cfg = config(dir.path(), today);
        write_registry(&cfg.paths.registry);

        let pages = FakePages::new(vec![(
            1186,
            page(&[("ABC마트", "서울시 강남구 1길 2")], &[("모르는가게", "광주 북구 용봉동 1")]),
        )]);
        let scorer = ScoreEngine::new(today);
        let collab = Collaborators {
            pages: &pages,
            dates: &FakeDates,
            scoring: Some(&scorer as &dyn ScoringStage),
        };

        let report = run(&cfg, today, &collab).unwrap();

        assert_eq!(*pages.requested.borrow(), vec![1186]);
        assert_eq!(report.estimated_draw, 1186);
        assert_eq!(report.draws_fetched, vec![1186]);
        assert_eq!(report.rows_added, 2);
        assert_eq!(report.ledger_rows, 2);
        assert_eq!(report.matched, Some(1));
        assert_eq!(report.unmatched, Some(1));
        assert_eq!(report.stores_scored, Some(2));

        let ledger = fs::read_to_string(&cfg.paths.ledger).unwrap();
        assert_eq!(ledger.lines().nth(1), Some("1186,2025-08-23,1,ABC마트,자동,서울시 강남구 1길 2"));

        let wins = fs::read_to_string(&cfg.paths.matched).unwrap();
        assert_eq!(wins.lines().nth(1), Some("S1,2025-08-23,1,1186,ABC마트,서울시 강남구 1길 2"));

        let summary = fs::read_to_string(&cfg.paths.summary).unwrap();
        assert_eq!(summary.lines().count(), 3);
        assert_eq!(summary.lines().nth(1), Some("S1,1,0,5.0,2025-08-23,1,0"));
        assert_eq!(summary.lines().nth(2), Some("S2,0,0,0.0,,0,0"));

        let enriched = fs::read_to_string(&cfg.paths.scored_registry).unwrap();
        assert!(enriched.contains("\"coordinates\":[127.0,37.5]"));
        assert!(enriched.contains("\"last_win_date\":\"2025-08-23\""));
        assert!(enriched.contains("\"score\":5.0"));
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let today = date(2025, 8, 23);
        let cfg = config(dir.path(), today);
        write_registry(&cfg.paths.registry);

        let html = page(
            &[("ABC마트", "서울시 강남구 1길 2")],
            &[("대박상회", "대구 중구 동성로 2길"), ("대박상회", "대구 중구 동성로 2길")],
        );
        let scorer = ScoreEngine::new(today);

        let pages = FakePages::new(vec![(1186, html.clone())]);
        let collab = Collaborators {
            pages: &pages,
            dates: &FakeDates,
            scoring: Some(&scorer as &dyn ScoringStage),
        };
        let first = run(&cfg, today, &collab).unwrap();
        let ledger_after_first = fs::read(&cfg.paths.ledger).unwrap();
        let summary_after_first = fs::read(&cfg.paths.summary).unwrap();
        assert_eq!(first.ledger_rows, 2);

        let pages = FakePages::new(vec![(1186, html)]);
        let collab = Collaborators {
            pages: &pages,
            dates: &FakeDates,
            scoring: Some(&scorer as &dyn ScoringStage),
        };
        let second = run(&cfg, today, &collab).unwrap();

        assert!(pages.requested.borrow().is_empty());
        assert!(second.draws_fetched.is_empty());
        assert_eq!(second.rows_added, 0);
        assert_eq!(second.ledger_rows, 2);
        assert_eq!(fs::read(&cfg.paths.ledger).unwrap(), ledger_after_first);
        assert_eq!(fs::read(&cfg.paths.summary).unwrap(), summary_after_first);
    }

    #[test]
    fn test_gap_fill_and_fetch_failure_keeps_earlier_draws() {
        let dir = tempfile::tempdir().unwrap();
        let today = date(2025, 8, 30); // estimate 1187
        let cfg = config(dir.path(), today);

        // Existing ledger knows 1184 only
        fs::create_dir_all(cfg.paths.ledger.parent().unwrap()).unwrap();
        fs::write(
            &cfg.paths.ledger,
            "draw,draw_date,rank,name,choice_type,address\n1184,2025-08-09,1,ABC마트,자동,서울시 강남구 1길 2\n",
        )
        .unwrap();

        // 1185 works, 1186 fails, 1187 never reached
        let pages = FakePages::new(vec![
            (1185, page(&[("대박상회", "대구 중구 동성로 2길")], &[])),
            (1187, page(&[("ABC마트", "서울시 강남구 1길 2")], &[])),
        ]);
        let collab = Collaborators {
            pages: &pages,
            dates: &FakeDates,
            scoring: None,
        };

        let err = run(&cfg, today, &collab).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::Fetch { draw: 1186, .. })
        ));
        assert_eq!(*pages.requested.borrow(), vec![1185, 1186]);

        let ledger = Ledger::load(&cfg.paths.ledger).unwrap();
        assert_eq!(ledger.draws().into_iter().collect::<Vec<_>>(), vec![1184, 1185]);
    }

    #[test]
    fn test_date_lookup_failure_degrades_to_empty_date() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), date(2025, 8, 9));
        cfg.base_draw = 9999;

        let pages = FakePages::new(vec![(9999, page(&[("ABC마트", "서울시 강남구 1길 2")], &[]))]);
        let collab = Collaborators {
            pages: &pages,
            dates: &FakeDates,
            scoring: None,
        };

        let report = run(&cfg, date(2025, 8, 9), &collab).unwrap();
        assert_eq!(report.rows_added, 1);
        // No registry → match and score skipped
        assert_eq!(report.matched, None);
        assert_eq!(report.stores_scored, None);

        let ledger = Ledger::load(&cfg.paths.ledger).unwrap();
        assert_eq!(ledger.records()[0].draw_date, None);
    }

    #[test]
    fn test_empty_page_still_produces_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let today = date(2025, 8, 23);
        let cfg = config(dir.path(), today);
        write_registry(&cfg.paths.registry);

        let pages = FakePages::new(vec![(1186, "<html><body>점검 중</body></html>".to_string())]);
        let scorer = ScoreEngine::new(today);
        let collab = Collaborators {
            pages: &pages,
            dates: &FakeDates,
            scoring: Some(&scorer as &dyn ScoringStage),
        };

        let report = run(&cfg, today, &collab).unwrap();
        assert_eq!(report.ledger_rows, 0);
        assert_eq!(report.matched, Some(0));
        assert_eq!(report.stores_scored, Some(2));
        assert!(cfg.paths.matched.exists());
        assert!(cfg.paths.unmatched.exists());
        assert!(cfg.paths.summary.exists());
        assert_eq!(
            fs::read_to_string(&cfg.paths.ledger).unwrap().trim_end(),
            "draw,draw_date,rank,name,choice_type,address"
        );
    }

    #[test]
    fn test_invalid_config_fails_before_any_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), date(2025, 8, 23));
        cfg.half_life_months = -1.0;

        let pages = FakePages::new(vec![]);
        let collab = Collaborators {
            pages: &pages,
            dates: &FakeDates,
            scoring: None,
        };

        assert!(run(&cfg, date(2025, 8, 23), &collab).is_err());
        assert!(pages.requested.borrow().is_empty());
        assert!(!cfg.paths.ledger.exists());
    }
}
