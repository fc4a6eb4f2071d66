//! Fetch orchestrator — drives capture attempts until one plausible value
//! lands or every round is exhausted.
//!
//! For each round, every URL × browser-profile combination gets one full
//! page load + extraction + filter cycle. Per-attempt errors (navigation
//! timeouts, empty extractions, implausible candidates) are recorded and the
//! next combination is tried; they never abort the round. A failed round
//! sleeps `backoff_base × round` before the next. Only total exhaustion
//! escapes, carrying the last error for diagnostics.

use crate::artifacts;
use crate::config::{ScrapeConfig, SOURCE_LIVE};
use crate::error::ScrapeError;
use crate::extract::QuoteExtractor;
use crate::renderer::PageRenderer;
use std::time::Duration;
use tracing::{info, warn};

/// A value that passed the plausibility filter, ready for the store.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub value: f64,
    pub source: &'static str,
    /// Provenance trace of the winning candidate.
    pub trace: String,
}

pub struct FetchOrchestrator<'a, R: PageRenderer> {
    renderer: &'a R,
    cfg: &'a ScrapeConfig,
    extractor: QuoteExtractor,
    /// Last persisted value, loaded once at construction; the filter compares
    /// every candidate against it.
    previous: Option<f64>,
}

impl<'a, R: PageRenderer> FetchOrchestrator<'a, R> {
    pub fn new(renderer: &'a R, cfg: &'a ScrapeConfig, previous: Option<f64>) -> Self {
        Self {
            renderer,
            cfg,
            extractor: QuoteExtractor::new(&cfg.strategy_order),
            previous,
        }
    }

    /// Run up to `max_rounds` rounds of capture attempts.
    pub async fn fetch(&self, max_rounds: u32) -> Result<Accepted, ScrapeError> {
        let mut last_error = String::from("no attempts made");

        for round in 1..=max_rounds {
            for url in &self.cfg.urls {
                for profile in &self.cfg.profiles {
                    info!(
                        round,
                        url,
                        profile = profile.name,
                        "attempting page capture"
                    );
                    match self.attempt(url, profile).await {
                        Ok(accepted) => {
                            info!(
                                value = accepted.value,
                                trace = %accepted.trace,
                                "accepted live quote"
                            );
                            return Ok(accepted);
                        }
                        Err(e) => {
                            last_error = format!("{url} | {} -> {e:#}", profile.name);
                            warn!(round, "attempt failed: {last_error}");
                        }
                    }
                }
            }

            if round < max_rounds {
                let backoff = Duration::from_secs(self.cfg.backoff_base_secs * u64::from(round));
                info!(round, backoff_secs = backoff.as_secs(), "round exhausted, backing off");
                tokio::time::sleep(backoff).await;
            }
        }

        Err(ScrapeError::Exhausted {
            rounds: max_rounds,
            last_error,
        })
    }

    /// One page load + extraction + filter cycle.
    async fn attempt(
        &self,
        url: &str,
        profile: &crate::renderer::BrowserProfile,
    ) -> anyhow::Result<Accepted> {
        let capture = self.renderer.capture(url, profile).await?;

        let candidates = self.extractor.extract(&capture);
        if candidates.is_empty() {
            artifacts::try_dump_html(
                &self.cfg.debug_dir,
                &format!("parse_fail_{}", profile.name),
                &capture.html,
            );
            anyhow::bail!("no quote candidate extracted");
        }

        for candidate in &candidates {
            if self.cfg.bounds.is_acceptable(candidate.value, self.previous) {
                return Ok(Accepted {
                    value: candidate.value,
                    source: SOURCE_LIVE,
                    trace: candidate.trace.clone(),
                });
            }
            // Implausible is treated identically to not-found: log and move
            // to the next candidate.
            warn!(
                value = candidate.value,
                trace = %candidate.trace,
                previous = ?self.previous,
                "discarding implausible candidate"
            );
        }

        artifacts::try_dump_html(
            &self.cfg.debug_dir,
            &format!("implausible_{}", profile.name),
            &capture.html,
        );
        anyhow::bail!("all {} candidates implausible", candidates.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{BrowserProfile, PageCapture, PageRenderer, DESKTOP_PROFILE};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Renderer that replays canned captures, failing until `fail_first`
    /// attempts have happened.
    struct ScriptedRenderer {
        capture: PageCapture,
        fail_first: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl PageRenderer for ScriptedRenderer {
        async fn capture(&self, _url: &str, _profile: &BrowserProfile) -> Result<PageCapture> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                anyhow::bail!("navigation timed out");
            }
            Ok(self.capture.clone())
        }
    }

    fn test_config(dir: &TempDir) -> ScrapeConfig {
        ScrapeConfig {
            urls: vec!["https://example.com/q".to_string()],
            profiles: vec![DESKTOP_PROFILE],
            backoff_base_secs: 0,
            debug_dir: dir.path().join("debug"),
            csv_path: dir.path().join("data/history.csv"),
            ..Default::default()
        }
    }

    fn quote_capture(value: &str) -> PageCapture {
        PageCapture {
            html: format!(r#"<span data-test="instrument-price-last">{value}</span>"#),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_plausible_candidate_wins() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(&dir);
        let renderer = ScriptedRenderer {
            capture: quote_capture("97.40"),
            fail_first: 0,
            attempts: AtomicUsize::new(0),
        };
        let orch = FetchOrchestrator::new(&renderer, &cfg, Some(97.3));
        let accepted = orch.fetch(2).await.unwrap();
        assert_eq!(accepted.value, 97.4);
        assert_eq!(accepted.source, "investing_live");
        assert!(accepted.trace.starts_with("selector:"));
    }

    #[tokio::test]
    async fn test_transport_errors_retried_across_rounds() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(&dir);
        // One URL × one profile: the first two attempts (rounds 1 and 2) fail.
        let renderer = ScriptedRenderer {
            capture: quote_capture("97.40"),
            fail_first: 2,
            attempts: AtomicUsize::new(0),
        };
        let orch = FetchOrchestrator::new(&renderer, &cfg, None);
        let accepted = orch.fetch(4).await.unwrap();
        assert_eq!(accepted.value, 97.4);
        assert_eq!(renderer.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_carries_last_error() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(&dir);
        let renderer = ScriptedRenderer {
            capture: PageCapture::default(),
            fail_first: usize::MAX,
            attempts: AtomicUsize::new(0),
        };
        let orch = FetchOrchestrator::new(&renderer, &cfg, None);
        let err = orch.fetch(2).await.unwrap_err();
        match err {
            ScrapeError::Exhausted { rounds, last_error } => {
                assert_eq!(rounds, 2);
                assert!(last_error.contains("navigation timed out"));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_implausible_candidates_rejected_and_dumped() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(&dir);
        // In hard range but 8 points from the previous sample
        let renderer = ScriptedRenderer {
            capture: quote_capture("105.00"),
            fail_first: 0,
            attempts: AtomicUsize::new(0),
        };
        let orch = FetchOrchestrator::new(&renderer, &cfg, Some(97.0));
        let err = orch.fetch(1).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Exhausted { .. }));
        assert!(cfg.debug_dir.join("last_page_implausible_desktop.html").exists());
    }

    #[tokio::test]
    async fn test_empty_page_dumps_parse_fail_artifact() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(&dir);
        let renderer = ScriptedRenderer {
            capture: PageCapture {
                html: "<html><body>blocked</body></html>".to_string(),
                ..Default::default()
            },
            fail_first: 0,
            attempts: AtomicUsize::new(0),
        };
        let orch = FetchOrchestrator::new(&renderer, &cfg, None);
        assert!(orch.fetch(1).await.is_err());
        assert!(cfg.debug_dir.join("last_page_parse_fail_desktop.html").exists());
    }
}
