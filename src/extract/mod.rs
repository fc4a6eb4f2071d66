//! Quote extraction — pulling a numeric index value out of an untrusted,
//! frequently-changing page.
//!
//! Three independent strategies sit behind the `ExtractionStrategy` trait:
//! CSS-selector lookup against the raw HTML, context-anchored regex search
//! over rendered text and HTML, and scanning of intercepted background
//! responses. Strategies run in a configured order; the extractor returns
//! every candidate found, in that order, and the caller (the fetch
//! orchestrator) takes the first one that passes the plausibility filter.
//!
//! All strategies are pure functions of a `PageCapture`, so the whole layer
//! is unit-testable without a browser.

pub mod patterns;
pub mod responses;
pub mod selectors;

use crate::renderer::PageCapture;
use regex::Regex;
use std::sync::LazyLock;

/// First decimal-number token in a separator-stripped string. Compiled once;
/// every strategy funnels through this.
static NUMBER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("number token regex is valid"));

/// Which extraction path produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// A ranked CSS selector matched a price element.
    ElementLookup,
    /// A context-anchored regex matched rendered text or raw HTML.
    ContextPattern,
    /// A background network response carried the quote.
    InterceptedResponse,
    /// Computed from exchange rates, not observed on a page.
    SyntheticModel,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ElementLookup => "element",
            Self::ContextPattern => "pattern",
            Self::InterceptedResponse => "response",
            Self::SyntheticModel => "synthetic",
        }
    }
}

/// An unvalidated numeric extraction result. Ephemeral: lives only within
/// one fetch attempt and is never persisted directly.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Extracted value, rounded to 4 decimal places.
    pub value: f64,
    /// Which strategy produced it.
    pub provenance: Provenance,
    /// Diagnostic string identifying the exact signal (selector, pattern
    /// name, or originating response URL).
    pub trace: String,
}

/// Strategy identifiers, used to configure the extraction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Ranked CSS selectors against the raw HTML.
    Selectors,
    /// Context-anchored regex over text and HTML.
    Patterns,
    /// Intercepted background responses.
    Responses,
}

/// A single extraction approach with a uniform probe signature.
///
/// Returning `None` is the normal "nothing here, try the next strategy"
/// case, never an error.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn try_extract(&self, capture: &PageCapture) -> Option<Candidate>;
}

/// Ordered collection of extraction strategies.
pub struct QuoteExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl QuoteExtractor {
    /// Build an extractor with strategies in the given order. New strategies
    /// slot in here without touching any control flow.
    pub fn new(order: &[StrategyKind]) -> Self {
        let strategies = order
            .iter()
            .map(|kind| -> Box<dyn ExtractionStrategy> {
                match kind {
                    StrategyKind::Selectors => Box::new(selectors::SelectorStrategy::new()),
                    StrategyKind::Patterns => Box::new(patterns::ContextPatternStrategy::new()),
                    StrategyKind::Responses => Box::new(responses::ResponseStrategy::new()),
                }
            })
            .collect();
        Self { strategies }
    }

    /// Run every strategy against the capture and return all candidates in
    /// strategy order (possibly empty).
    pub fn extract(&self, capture: &PageCapture) -> Vec<Candidate> {
        self.strategies
            .iter()
            .filter_map(|s| s.try_extract(capture))
            .collect()
    }
}

/// Parse a quote out of free text: strip thousands separators, take the
/// first decimal-number token, round to 4 decimal places.
///
/// A string with no numeric token yields `None` — absence is the normal
/// "try the next signal" case, not an error.
pub fn parse_quote_text(s: &str) -> Option<f64> {
    let cleaned = s.trim().replace(',', "");
    let token = NUMBER_TOKEN.find(&cleaned)?;
    token.as_str().parse::<f64>().ok().map(round4)
}

/// Round to 4 decimal places, the precision the series stores.
pub fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
