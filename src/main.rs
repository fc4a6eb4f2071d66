// Copyright 2026 dxy-watch contributors
// SPDX-License-Identifier: Apache-2.0

//! One run = at most one new series record.
//!
//! Scrape the live quote page across rounds of URL × profile attempts; if
//! every round fails, fall back to the synthetic FX estimate. Whatever value
//! survives the plausibility filter is appended to the CSV series. When even
//! the synthetic value is implausible the run exits cleanly without writing
//! — a bad sample is worse than no sample.

use anyhow::Result;
use clap::Parser;
use dxy_watch::config::{ScrapeConfig, SOURCE_SYNTHETIC};
use dxy_watch::extract::StrategyKind;
use dxy_watch::fetch::{Accepted, FetchOrchestrator};
use dxy_watch::renderer::chromium::{ChromiumRenderer, RenderSettings};
use dxy_watch::store::{AppendOutcome, SeriesStore};
use dxy_watch::synthetic;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(
    name = "dxy-watch",
    about = "Scrape the US dollar index, validate it, and append it to a CSV time series",
    version
)]
struct Cli {
    /// Series CSV path
    #[arg(long, default_value = "data/dxy_history.csv")]
    csv: PathBuf,

    /// Directory for failed-attempt HTML dumps
    #[arg(long, default_value = "debug")]
    debug_dir: PathBuf,

    /// Rounds of URL × profile attempts before falling back
    #[arg(long, default_value = "4")]
    rounds: u32,

    /// Maximum per-sample change versus the previous record
    #[arg(long, default_value = "1.5")]
    max_delta: f64,

    /// Minimum seconds between two persisted samples
    #[arg(long, default_value = "60")]
    dedup_secs: i64,

    /// Post-load settle wait in milliseconds
    #[arg(long, default_value = "7000")]
    settle_ms: u64,

    /// Extraction strategy order (comma-separated: selectors,patterns,responses)
    #[arg(long, value_delimiter = ',', value_parser = parse_strategy)]
    strategies: Option<Vec<StrategyKind>>,

    /// Skip the live page entirely and use the synthetic FX estimate
    #[arg(long)]
    synthetic_only: bool,

    /// Enable debug logging
    #[arg(long, short)]
    verbose: bool,
}

fn parse_strategy(s: &str) -> Result<StrategyKind, String> {
    match s.trim().to_lowercase().as_str() {
        "selectors" => Ok(StrategyKind::Selectors),
        "patterns" => Ok(StrategyKind::Patterns),
        "responses" => Ok(StrategyKind::Responses),
        other => Err(format!(
            "unknown strategy {other:?} (expected selectors, patterns, or responses)"
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "dxy_watch=debug" } else { "dxy_watch=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.parse()?),
        )
        .init();

    let mut cfg = ScrapeConfig {
        csv_path: cli.csv,
        debug_dir: cli.debug_dir,
        max_rounds: cli.rounds,
        dedup_interval_secs: cli.dedup_secs,
        settle_ms: cli.settle_ms,
        ..Default::default()
    };
    cfg.bounds.max_delta = cli.max_delta;
    if let Some(order) = cli.strategies {
        cfg.strategy_order = order;
    }

    let store = SeriesStore::new(
        cfg.csv_path.clone(),
        cfg.bounds,
        cfg.dedup_interval_secs,
        cfg.baseline,
    );
    let previous = store.last_value();
    info!(?previous, "starting run");

    let accepted = if cli.synthetic_only {
        None
    } else {
        scrape_live(&cfg, previous).await
    };

    let accepted = match accepted {
        Some(a) => a,
        None => {
            let client = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()?;
            match synthetic::synthetic_index(&client, &cfg.rate_endpoint).await {
                Ok(value) => Accepted {
                    value,
                    source: SOURCE_SYNTHETIC,
                    trace: "synthetic:fx-model".to_string(),
                },
                Err(e) => {
                    error!("synthetic fallback failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    };

    match store.append(accepted.value, accepted.source, &accepted.trace)? {
        AppendOutcome::Appended(record) => {
            info!(
                value = record.dxy_index,
                source = %record.source,
                change_pct = record.dxy_change_pct,
                "run complete, record appended"
            );
        }
        AppendOutcome::SkippedDuplicate => {
            info!("run complete, sample inside dedup interval, nothing written");
        }
        AppendOutcome::RejectedImplausible => {
            // Clean exit by design: nothing can be safely written.
            warn!(
                value = accepted.value,
                "value implausible at persistence time, nothing written"
            );
        }
    }

    Ok(())
}

/// Try the live page; exhaustion falls through to the synthetic path.
async fn scrape_live(cfg: &ScrapeConfig, previous: Option<f64>) -> Option<Accepted> {
    let settings = RenderSettings {
        nav_timeout_ms: cfg.nav_timeout_ms,
        settle_ms: cfg.settle_ms,
        block_heavy_resources: cfg.block_heavy_resources,
        capture_url_hints: cfg.capture_url_hints.clone(),
    };
    let renderer = match ChromiumRenderer::new(settings) {
        Ok(r) => r,
        Err(e) => {
            warn!("browser unavailable, falling back to synthetic: {e:#}");
            return None;
        }
    };

    let orchestrator = FetchOrchestrator::new(&renderer, cfg, previous);
    match orchestrator.fetch(cfg.max_rounds).await {
        Ok(accepted) => Some(accepted),
        Err(e) => {
            warn!("live scrape exhausted, falling back to synthetic: {e}");
            None
        }
    }
}
