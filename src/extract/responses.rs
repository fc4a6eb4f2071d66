//! Background-response strategy: scan intercepted network responses.
//!
//! The quote page streams price updates over XHR while it loads. The capture
//! layer records every response whose content-type or URL suggests quote
//! data; this strategy searches each body for the instrument id and a
//! price-bearing key co-occurring within a bounded window. Candidates are
//! kept in arrival order and the most recent match wins, since later
//! responses more likely reflect the final rendered state.

use super::{parse_quote_text, Candidate, ExtractionStrategy, Provenance};
use crate::renderer::PageCapture;
use regex::Regex;
use tracing::trace;

/// Instrument token and price key must co-occur within 400 characters, in
/// either order.
const BODY_PATTERNS: &[&str] = &[
    r#"(?is)"(?:pid|instrument_?id)"\s*:\s*"?8827"?.{0,400}?"last(?:_price)?"\s*:\s*"?([\d,]+(?:\.\d+)?)"?"#,
    r#"(?is)"last(?:_price)?"\s*:\s*"?([\d,]+(?:\.\d+)?)"?.{0,400}?"(?:pid|instrument_?id)"\s*:\s*"?8827"?"#,
];

pub struct ResponseStrategy {
    patterns: Vec<Regex>,
}

impl ResponseStrategy {
    pub fn new() -> Self {
        let patterns = BODY_PATTERNS
            .iter()
            .filter_map(|pat| Regex::new(pat).ok())
            .collect();
        Self { patterns }
    }

    fn match_body(&self, body: &str) -> Option<f64> {
        for re in &self.patterns {
            if let Some(caps) = re.captures(body) {
                if let Some(value) = caps.get(1).and_then(|m| parse_quote_text(m.as_str())) {
                    return Some(value);
                }
            }
        }
        None
    }
}

impl ExtractionStrategy for ResponseStrategy {
    fn name(&self) -> &'static str {
        "response-interception"
    }

    fn try_extract(&self, capture: &PageCapture) -> Option<Candidate> {
        // Last-write-wins across the arrival-ordered response list.
        let mut latest: Option<Candidate> = None;
        for response in &capture.responses {
            if let Some(value) = self.match_body(&response.body) {
                trace!(url = %response.url, value, "response body hit");
                latest = Some(Candidate {
                    value,
                    provenance: Provenance::InterceptedResponse,
                    trace: format!("response:{}", response.url),
                });
            }
        }
        latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::CapturedResponse;

    fn capture(bodies: &[(&str, &str)]) -> PageCapture {
        PageCapture {
            responses: bodies
                .iter()
                .map(|(url, body)| CapturedResponse {
                    url: url.to_string(),
                    content_type: "application/json".to_string(),
                    body: body.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_pid_and_last_cooccur() {
        let c = capture(&[(
            "https://api.example.com/quotes/8827",
            r#"{"pid":"8827","last":"97.404","volume":1234}"#,
        )]);
        let candidate = ResponseStrategy::new().try_extract(&c).unwrap();
        assert_eq!(candidate.value, 97.404);
        assert_eq!(candidate.provenance, Provenance::InterceptedResponse);
        assert_eq!(candidate.trace, "response:https://api.example.com/quotes/8827");
    }

    #[test]
    fn test_reverse_order_cooccurrence() {
        let c = capture(&[(
            "https://stream.example.com/q",
            r#"{"last_price":97.38,"instrumentId":8827}"#,
        )]);
        assert_eq!(ResponseStrategy::new().try_extract(&c).unwrap().value, 97.38);
    }

    #[test]
    fn test_last_write_wins() {
        let c = capture(&[
            ("https://api.example.com/a", r#"{"pid":8827,"last":"97.10"}"#),
            ("https://api.example.com/b", r#"{"pid":8827,"last":"97.25"}"#),
        ]);
        let candidate = ResponseStrategy::new().try_extract(&c).unwrap();
        assert_eq!(candidate.value, 97.25);
        assert!(candidate.trace.ends_with("/b"));
    }

    #[test]
    fn test_price_key_without_instrument_token_ignored() {
        // A price for some other instrument must not be picked up.
        let c = capture(&[(
            "https://api.example.com/other",
            r#"{"pid":1234,"last":"15.50"}"#,
        )]);
        assert!(ResponseStrategy::new().try_extract(&c).is_none());
    }

    #[test]
    fn test_window_bound_respected() {
        let filler = "\"k\":\"v\",".repeat(100); // ~800 chars between anchors
        let body = format!(r#"{{"pid":8827,{filler}"last":"97.40"}}"#);
        let c = capture(&[("https://api.example.com/far", &body)]);
        assert!(ResponseStrategy::new().try_extract(&c).is_none());
    }
}
