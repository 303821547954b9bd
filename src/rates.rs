//! Lender rate-page extraction: current rate and APR per configured
//! lender, through the same spec-table engine as the monthly reports.
//!
//! Policy: rate and APR stay distinct. A page exposing only an APR yields
//! `rate: null` - the APR is never promoted to the displayed base rate.

use std::collections::BTreeMap;

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::extract::assemble;
use crate::fetch::FetchedDocument;
use crate::specs::RATE_SPECS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LenderRates {
    pub rate: Option<f64>,
    pub apr: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatesResponse {
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    pub lenders: BTreeMap<String, LenderRates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

lazy_static! {
    // The bare `rate` synonym would anchor inside "Annual Percentage
    // Rate"; fold that phrase to its acronym before extraction.
    static ref APR_LONG: Regex = Regex::new(r"(?i)annual\s+percentage\s+rate").unwrap();
}

/// Extract the rate/APR pair from one lender page's text.
pub fn assemble_rates(raw: &str) -> LenderRates {
    let text = APR_LONG.replace_all(raw, "APR");
    let record = assemble(&text, &RATE_SPECS);
    LenderRates {
        rate: record.get("rate").map(|v| v.as_f64()),
        apr: record.get("apr").map(|v| v.as_f64()),
    }
}

/// Last-known-good figures served when a lender page yields nothing.
pub fn fallback_rates() -> LenderRates {
    LenderRates {
        rate: Some(6.4),
        apr: Some(6.6),
    }
}

fn is_usable(rates: &LenderRates) -> bool {
    rates.rate.is_some() || rates.apr.is_some()
}

/// Join per-lender fetch results; a lender whose page failed or parsed
/// empty gets the fallback figures and an `error` marker.
pub fn compose_rates(results: &[(String, Option<FetchedDocument>)]) -> RatesResponse {
    let mut lenders = BTreeMap::new();
    let mut degraded: Vec<&str> = Vec::new();

    // Deployment with no lender pages configured: serve the sample
    // figures, un-flagged (nothing upstream failed).
    if results.is_empty() {
        lenders.insert("sample".to_string(), fallback_rates());
    }

    for (name, doc) in results {
        let extracted = doc.as_ref().map(|d| assemble_rates(&d.text));
        let rates = match extracted {
            Some(r) if is_usable(&r) => r,
            _ => {
                degraded.push(name);
                fallback_rates()
            }
        };
        lenders.insert(name.clone(), rates);
    }

    let error = if degraded.is_empty() {
        None
    } else {
        warn!(lenders = %degraded.join("+"), "serving fallback rates");
        Some(format!("fallback: {}", degraded.join("+")))
    };

    RatesResponse {
        updated_at: Utc::now().format("%Y-%m-%d").to_string(),
        lenders,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_and_apr_from_one_page() {
        let rates = assemble_rates("30-Year Fixed\nInterest Rate 6.125%\nAPR 6.31%");
        assert_eq!(rates.rate, Some(6.1));
        assert_eq!(rates.apr, Some(6.3));
    }

    #[test]
    fn apr_is_never_promoted_to_rate() {
        let rates = assemble_rates("Annual Percentage Rate (APR) 6.31%");
        assert_eq!(rates.rate, None);
        assert_eq!(rates.apr, Some(6.3));
    }

    #[test]
    fn identical_rate_and_apr_survive_disambiguation() {
        // Both labels point at the same figure; the collision rule keeps
        // it for both rather than skipping the only candidate.
        let rates = assemble_rates("Rate 6.5% APR 6.5%");
        assert_eq!(rates.rate, Some(6.5));
        assert_eq!(rates.apr, Some(6.5));
    }

    #[test]
    fn implausible_rates_are_rejected() {
        let rates = assemble_rates("Interest Rate 61.25%");
        assert_eq!(rates.rate, None);
    }

    #[test]
    fn failed_lender_gets_fallback_and_flag() {
        let ok = FetchedDocument {
            url: "https://lender-a.example.com/rates".to_string(),
            text: "Interest Rate 6.0% APR 6.2%".to_string(),
            last_modified: None,
        };
        let results = vec![
            ("lenderA".to_string(), Some(ok)),
            ("lenderB".to_string(), None),
        ];
        let out = compose_rates(&results);
        assert_eq!(out.lenders["lenderA"].rate, Some(6.0));
        assert_eq!(out.lenders["lenderB"], fallback_rates());
        assert_eq!(out.error.as_deref(), Some("fallback: lenderB"));
    }

    #[test]
    fn no_lenders_configured_serves_sample_unflagged() {
        let out = compose_rates(&[]);
        assert_eq!(out.lenders["sample"], fallback_rates());
        assert_eq!(out.error, None);
    }

    #[test]
    fn fallback_rates_are_in_range() {
        let f = fallback_rates();
        for v in [f.rate.unwrap(), f.apr.unwrap()] {
            assert!((1.0..=15.0).contains(&v));
        }
    }
}
