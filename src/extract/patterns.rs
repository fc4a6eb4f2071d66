//! Context-anchored pattern strategy: regex over rendered text and raw HTML.
//!
//! Every pattern requires the numeric token to sit within a bounded
//! character window of a recognizable anchor (a "Last" label, a quote-JSON
//! key, the instrument id). Patterns run most-specific first; the ordering
//! trades recall for precision deliberately — a wrong number inside a noisy
//! page is worse than no number.

use super::{parse_quote_text, Candidate, ExtractionStrategy, Provenance};
use crate::renderer::PageCapture;
use regex::Regex;
use tracing::trace;

/// Patterns over visible rendered text. The first anchors the number between
/// a "Last" label and a timestamp marker; the second drops the timestamp
/// requirement.
const TEXT_PATTERNS: &[(&str, &str)] = &[
    (
        "text:last+time",
        r"(?is)\blast\b.{0,40}?(\d{1,3}(?:,\d{3})*\.\d+).{0,60}?\d{1,2}:\d{2}",
    ),
    (
        "text:last",
        r"(?is)\blast\b[^0-9]{0,40}(\d{1,3}(?:,\d{3})*\.\d+)",
    ),
];

/// Patterns over raw HTML, anchored on the price element's data attribute,
/// the instrument id, or quote-JSON keys embedded in page scripts.
const HTML_PATTERNS: &[(&str, &str)] = &[
    (
        "html:price-attr",
        r#"(?is)data-test="instrument-price-last"[^>]*>\s*([\d,]+(?:\.\d+)?)\s*<"#,
    ),
    (
        "html:pid-8827",
        r#"(?is)"pid"\s*:\s*"?8827"?.{0,400}?"last"\s*:\s*"?([\d,]+(?:\.\d+)?)"?"#,
    ),
    (
        "html:instrument-8827",
        r#"(?is)"instrumentId"\s*:\s*"?8827"?.{0,400}?"last"\s*:\s*"?([\d,]+(?:\.\d+)?)"?"#,
    ),
    (
        "html:last_price",
        r#"(?i)"last_price"\s*:\s*"?([\d,]+(?:\.\d+)?)"?"#,
    ),
    (
        "html:last",
        r#"(?i)"last"\s*:\s*"?([\d,]+(?:\.\d+)?)"?"#,
    ),
];

pub struct ContextPatternStrategy {
    text_patterns: Vec<(&'static str, Regex)>,
    html_patterns: Vec<(&'static str, Regex)>,
}

impl ContextPatternStrategy {
    pub fn new() -> Self {
        Self {
            text_patterns: compile(TEXT_PATTERNS),
            html_patterns: compile(HTML_PATTERNS),
        }
    }
}

fn compile(table: &[(&'static str, &str)]) -> Vec<(&'static str, Regex)> {
    // Patterns are static; an invalid entry is a typo in the tables above
    // and is dropped rather than propagated.
    table
        .iter()
        .filter_map(|(name, pat)| Regex::new(pat).ok().map(|re| (*name, re)))
        .collect()
}

fn search(patterns: &[(&'static str, Regex)], haystack: &str) -> Option<(f64, &'static str)> {
    if haystack.is_empty() {
        return None;
    }
    for (name, re) in patterns {
        if let Some(caps) = re.captures(haystack) {
            if let Some(m) = caps.get(1) {
                if let Some(value) = parse_quote_text(m.as_str()) {
                    return Some((value, name));
                }
            }
        }
    }
    None
}

impl ExtractionStrategy for ContextPatternStrategy {
    fn name(&self) -> &'static str {
        "context-pattern"
    }

    fn try_extract(&self, capture: &PageCapture) -> Option<Candidate> {
        let hit = search(&self.text_patterns, &capture.text)
            .or_else(|| search(&self.html_patterns, &capture.html));

        hit.map(|(value, name)| {
            trace!(pattern = name, value, "context pattern hit");
            Candidate {
                value,
                provenance: Provenance::ContextPattern,
                trace: format!("pattern:{name}"),
            }
        })
    }
}
