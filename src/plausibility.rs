//! Plausibility filter — the acceptance gate for extracted quotes.
//!
//! Two tiers: a hard absolute range the index can ever occupy, and a maximum
//! per-sample delta against the previously persisted value. The hard range
//! alone is too permissive (a wrong-but-in-range number from a mismatched
//! page element is the dominant failure mode), and the delta check alone is
//! too strict on a cold start, so both apply when a previous value exists.

/// Immutable acceptance thresholds, constructor-injected into every component
/// that filters values. Never mutated at runtime.
#[derive(Debug, Clone, Copy)]
pub struct PlausibilityBounds {
    /// Lowest value the index can ever plausibly take.
    pub hard_min: f64,
    /// Highest value the index can ever plausibly take.
    pub hard_max: f64,
    /// Maximum absolute change versus the previous persisted sample.
    pub max_delta: f64,
}

impl Default for PlausibilityBounds {
    fn default() -> Self {
        // The dollar index has spent decades inside 70..130; a 1.5-point move
        // inside one 30-minute sampling window would be an extreme session.
        Self {
            hard_min: 70.0,
            hard_max: 130.0,
            max_delta: 1.5,
        }
    }
}

impl PlausibilityBounds {
    /// Decide whether `value` is trustworthy given the last persisted value.
    ///
    /// With no previous value (cold start / empty series) the hard range
    /// alone governs.
    pub fn is_acceptable(&self, value: f64, previous: Option<f64>) -> bool {
        if !value.is_finite() || value < self.hard_min || value > self.hard_max {
            return false;
        }
        match previous {
            Some(prev) => (value - prev).abs() <= self.max_delta,
            None => true,
        }
    }
}
