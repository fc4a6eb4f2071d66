//! Element-lookup strategy: ranked CSS selectors against the raw HTML.
//!
//! The selector list is ordered from the page's current markup convention
//! down to the oldest known fallback. The target page's markup drifts over
//! time; trying several selectors in order is the defense against drift.

use super::{parse_quote_text, Candidate, ExtractionStrategy, Provenance};
use crate::renderer::PageCapture;
use scraper::{Html, Selector};
use tracing::trace;

/// Known addresses of the "last price" element, newest convention first.
const PRICE_SELECTORS: &[&str] = &[
    r#"[data-test="instrument-price-last"]"#,
    r#"span[data-test="instrument-price-last"]"#,
    r#"div[data-test="instrument-price-last"]"#,
    r#"span[class*="instrument-price_last"]"#,
    r#"span[class*="text-5xl"]"#,
    r#"span[class*="pid-8827-last"]"#,
];

pub struct SelectorStrategy {
    selectors: Vec<(&'static str, Selector)>,
}

impl SelectorStrategy {
    pub fn new() -> Self {
        // Selectors are static and known-valid; a parse failure here would
        // mean a typo in PRICE_SELECTORS, so invalid entries are dropped.
        let selectors = PRICE_SELECTORS
            .iter()
            .filter_map(|raw| Selector::parse(raw).ok().map(|sel| (*raw, sel)))
            .collect();
        Self { selectors }
    }
}

impl ExtractionStrategy for SelectorStrategy {
    fn name(&self) -> &'static str {
        "element-lookup"
    }

    fn try_extract(&self, capture: &PageCapture) -> Option<Candidate> {
        if capture.html.is_empty() {
            return None;
        }
        let document = Html::parse_document(&capture.html);

        for (raw, selector) in &self.selectors {
            if let Some(element) = document.select(selector).next() {
                let text: String = element.text().collect::<Vec<_>>().join(" ");
                if let Some(value) = parse_quote_text(&text) {
                    trace!(selector = raw, value, "selector hit");
                    return Some(Candidate {
                        value,
                        provenance: Provenance::ElementLookup,
                        trace: format!("selector:{raw}"),
                    });
                }
            }
        }
        None
    }
}
