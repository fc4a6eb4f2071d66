//! Synthetic estimator — model-based dollar-index approximation from
//! exchange rates.
//!
//! Used strictly as a last resort when live extraction exhausts every round.
//! The estimate is a fixed-weight geometric mean over the six index
//! constituents, not a market quote, and it still has to pass the
//! plausibility filter before anything is persisted.

use crate::error::ScrapeError;
use crate::extract::round4;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Default USD-base rate endpoint.
pub const DEFAULT_RATE_ENDPOINT: &str = "https://open.er-api.com/v6/latest/USD";

/// Currencies the model requires, all quoted USD-relative by the endpoint.
const REQUIRED_RATES: [&str; 6] = ["EUR", "JPY", "GBP", "CAD", "SEK", "CHF"];

#[derive(Debug, Deserialize)]
struct RateEnvelope {
    #[serde(default)]
    rates: HashMap<String, f64>,
}

/// Fetch USD-relative rates from a JSON endpoint of the shape
/// `{"rates": {"EUR": 0.92, ...}}`.
///
/// Non-2xx status or a malformed body is a hard `DataUnavailable` failure —
/// there is no further fallback behind this one.
pub async fn fetch_rates(
    client: &reqwest::Client,
    endpoint: &str,
) -> Result<HashMap<String, f64>, ScrapeError> {
    let response = client
        .get(endpoint)
        .send()
        .await
        .map_err(|e| ScrapeError::DataUnavailable(format!("rate request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ScrapeError::DataUnavailable(format!(
            "rate endpoint returned {status}"
        )));
    }

    let envelope: RateEnvelope = response
        .json()
        .await
        .map_err(|e| ScrapeError::DataUnavailable(format!("malformed rate body: {e}")))?;

    debug!(rates = envelope.rates.len(), "fetched exchange rates");
    Ok(envelope.rates)
}

/// Compute the synthetic dollar index from USD-quoted rates.
///
/// EUR and GBP are inverted into their conventional quoting direction
/// (EURUSD, GBPUSD); the rest are already USD-base. Deterministic: identical
/// rates always produce the identical rounded output.
///
/// `index = 50.14348112 × EURUSD^-0.576 × USDJPY^0.136 × GBPUSD^-0.119
///          × USDCAD^0.091 × USDSEK^0.042 × USDCHF^0.036`
pub fn estimate(rates: &HashMap<String, f64>) -> Result<f64, ScrapeError> {
    for code in REQUIRED_RATES {
        match rates.get(code) {
            Some(rate) if *rate > 0.0 && rate.is_finite() => {}
            _ => {
                return Err(ScrapeError::DataUnavailable(format!("missing USD/{code}")));
            }
        }
    }

    let usd_eur = rates["EUR"];
    let usd_jpy = rates["JPY"];
    let usd_gbp = rates["GBP"];
    let usd_cad = rates["CAD"];
    let usd_sek = rates["SEK"];
    let usd_chf = rates["CHF"];

    let eur_usd = 1.0 / usd_eur;
    let gbp_usd = 1.0 / usd_gbp;

    let index = 50.14348112
        * eur_usd.powf(-0.576)
        * usd_jpy.powf(0.136)
        * gbp_usd.powf(-0.119)
        * usd_cad.powf(0.091)
        * usd_sek.powf(0.042)
        * usd_chf.powf(0.036);

    Ok(round4(index))
}

/// One-shot convenience: fetch rates and estimate the index.
pub async fn synthetic_index(
    client: &reqwest::Client,
    endpoint: &str,
) -> Result<f64, ScrapeError> {
    let rates = fetch_rates(client, endpoint).await?;
    let value = estimate(&rates)?;
    info!(value, "computed synthetic index from FX rates");
    Ok(value)
}
