//! Run configuration — one immutable value passed into every component.
//!
//! Thresholds, URLs, profiles, and strategy order are all construction-time
//! inputs rather than ambient globals, so tests can vary them freely.

use crate::extract::StrategyKind;
use crate::plausibility::PlausibilityBounds;
use crate::renderer::{BrowserProfile, DESKTOP_PROFILE, MOBILE_PROFILE};
use crate::synthetic::DEFAULT_RATE_ENDPOINT;
use std::path::PathBuf;

/// Source label recorded when the value came from the live quote page.
pub const SOURCE_LIVE: &str = "investing_live";
/// Source label recorded when the value came from the FX fallback model.
pub const SOURCE_SYNTHETIC: &str = "synthetic_fx";

/// Everything a scrape run needs to know. Built once in `main` (or a test)
/// and never mutated.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Candidate quote pages, tried in order within each round.
    pub urls: Vec<String>,
    /// Browser profiles rotated per URL.
    pub profiles: Vec<BrowserProfile>,
    /// Extraction strategy order. Default: element lookup, context-anchored
    /// patterns, response interception.
    pub strategy_order: Vec<StrategyKind>,
    /// Acceptance thresholds shared by the orchestrator and the store.
    pub bounds: PlausibilityBounds,
    /// Minimum elapsed seconds between two persisted samples.
    pub dedup_interval_secs: i64,
    /// Percent-change reference when the series is empty.
    pub baseline: f64,
    /// Number of full URL × profile rounds before giving up on the live page.
    pub max_rounds: u32,
    /// Inter-round backoff is `backoff_base_secs × round`, linear.
    pub backoff_base_secs: u64,
    /// Per-attempt navigation timeout in milliseconds.
    pub nav_timeout_ms: u64,
    /// Post-load settle wait in milliseconds.
    pub settle_ms: u64,
    /// Abort image/media/font requests during page load.
    pub block_heavy_resources: bool,
    /// URL substrings marking background responses worth capturing.
    pub capture_url_hints: Vec<String>,
    /// Rate endpoint for the synthetic fallback.
    pub rate_endpoint: String,
    /// Series CSV path.
    pub csv_path: PathBuf,
    /// Where failed-attempt HTML dumps go.
    pub debug_dir: PathBuf,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            urls: vec![
                "https://www.investing.com/currencies/us-dollar-index".to_string(),
                "https://m.investing.com/currencies/us-dollar-index".to_string(),
            ],
            profiles: vec![DESKTOP_PROFILE, MOBILE_PROFILE],
            strategy_order: vec![
                StrategyKind::Selectors,
                StrategyKind::Patterns,
                StrategyKind::Responses,
            ],
            bounds: PlausibilityBounds::default(),
            dedup_interval_secs: 60,
            baseline: 100.0,
            max_rounds: 4,
            backoff_base_secs: 4,
            nav_timeout_ms: 120_000,
            settle_ms: 7_000,
            block_heavy_resources: true,
            capture_url_hints: ["quotes", "chart", "stream", "api", "instrument"]
                .into_iter()
                .map(String::from)
                .collect(),
            rate_endpoint: DEFAULT_RATE_ENDPOINT.to_string(),
            csv_path: PathBuf::from("data/dxy_history.csv"),
            debug_dir: PathBuf::from("debug"),
        }
    }
}
