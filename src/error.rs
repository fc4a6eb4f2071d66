//! Typed failures the control flow branches on.
//!
//! Everything else (navigation timeouts, selector misses, pattern misses) is
//! absorbed at the orchestration boundary and surfaces only as diagnostics;
//! these two variants are the ones callers actually match against.

use thiserror::Error;

/// Errors that escape the scrape pipeline.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Every round × URL × profile combination failed to produce a plausible
    /// quote. Carries the last underlying error for diagnostics.
    #[error("all {rounds} scrape rounds exhausted; last error: {last_error}")]
    Exhausted { rounds: u32, last_error: String },

    /// The fallback exchange-rate source is missing a required rate or
    /// returned an unusable response. Fatal for the current run.
    #[error("fallback rate data unavailable: {0}")]
    DataUnavailable(String),
}
