//! Monthly report assembly: month detection, freshness resolution,
//! fallback substitution and the JSON response shape.
//!
//! `compose_stats` is the pure half of the orchestrator: the server fans
//! out the fetches, then hands whatever survived to this function, which
//! always produces a complete, well-formed response. Upstream flakiness
//! degrades to fallback data with an advisory `error` marker, never to
//! a broken record.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, FixedOffset, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::extract::{assemble, MetricRecord, MetricValue};
use crate::fetch::FetchedDocument;
use crate::specs::REPORT_SPECS;
use crate::text::normalize_text;

// =============================================================================
// RESPONSE SHAPE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthEntry {
    pub sf: MetricRecord,
    pub condo: MetricRecord,
    #[serde(rename = "sfReport")]
    pub sf_report: String,
    #[serde(rename = "condoReport")]
    pub condo_report: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    pub months: BTreeMap<String, MonthEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// =============================================================================
// MONTH DETECTION
// =============================================================================

lazy_static! {
    static ref MONTH_YEAR: Regex = Regex::new(
        r"(?i)\b(Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\s+(\d{4})\b"
    ).unwrap();
}

fn month_number(name: &str) -> Option<u32> {
    let n = match name.get(..3)?.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(n)
}

/// First "MonthName YYYY" occurrence in the text, as a `YYYY-MM` key.
pub fn detect_month(raw: &str) -> Option<String> {
    let text = normalize_text(raw);
    let caps = MONTH_YEAR.captures(&text)?;
    let month = month_number(caps.get(1)?.as_str())?;
    let year = caps.get(2)?.as_str();
    Some(format!("{year}-{month:02}"))
}

// =============================================================================
// FALLBACK SAMPLES
// =============================================================================

// Hard-coded last-known-good figures, shaped exactly like live records.
// Must stay inside the REPORT_SPECS ranges (tested below) so consumers
// cannot tell malformed fallback data from a parser bug.

fn sample(values: [(&str, MetricValue); 5]) -> MetricRecord {
    let mut record = MetricRecord::new();
    for (key, value) in values {
        record.set(key, Some(value));
    }
    record
}

pub fn fallback_sf() -> MetricRecord {
    sample([
        ("medianPrice", MetricValue::Int(512_500)),
        ("closed", MetricValue::Int(342)),
        ("dom", MetricValue::Int(28)),
        ("monthsSupply", MetricValue::Float(2.4)),
        ("activeListings", MetricValue::Int(815)),
    ])
}

pub fn fallback_condo() -> MetricRecord {
    sample([
        ("medianPrice", MetricValue::Int(305_000)),
        ("closed", MetricValue::Int(118)),
        ("dom", MetricValue::Int(35)),
        ("monthsSupply", MetricValue::Float(3.1)),
        ("activeListings", MetricValue::Int(362)),
    ])
}

// =============================================================================
// FRESHNESS
// =============================================================================

/// `updatedAt` priority: newest Last-Modified across source documents,
/// else the deployment override, else the first day of the report month.
pub fn resolve_updated_at(
    last_modified: Option<DateTime<FixedOffset>>,
    override_date: Option<&str>,
    month_key: &str,
) -> String {
    if let Some(lm) = last_modified {
        return lm.format("%Y-%m-%d").to_string();
    }
    if let Some(d) = override_date {
        return d.to_string();
    }
    format!("{month_key}-01")
}

// =============================================================================
// COMPOSITION
// =============================================================================

/// A report record is usable only when its required metric (median price)
/// came through.
fn is_complete(record: &MetricRecord) -> bool {
    record.get("medianPrice").is_some()
}

/// Join the (possibly partial) fetch results into the response.
///
/// `sf_url` / `condo_url` are the configured primary URLs, used as
/// provenance when a source never fetched. An incomplete record is
/// replaced wholesale by its fallback sample and flagged in `error`.
pub fn compose_stats(
    sf: Option<&FetchedDocument>,
    condo: Option<&FetchedDocument>,
    sf_url: &str,
    condo_url: &str,
    updated_override: Option<&str>,
) -> StatsResponse {
    // The two documents are independent; assemble them in parallel.
    let (sf_rec, condo_rec) = rayon::join(
        || sf.map(|d| assemble(&d.text, &REPORT_SPECS)),
        || condo.map(|d| assemble(&d.text, &REPORT_SPECS)),
    );

    let mut degraded: Vec<&str> = Vec::new();

    let sf_final = match sf_rec {
        Some(r) if is_complete(&r) => r,
        _ => {
            degraded.push("sf");
            fallback_sf()
        }
    };
    let condo_final = match condo_rec {
        Some(r) if is_complete(&r) => r,
        _ => {
            degraded.push("condo");
            fallback_condo()
        }
    };

    let month_key = sf
        .and_then(|d| detect_month(&d.text))
        .or_else(|| condo.and_then(|d| detect_month(&d.text)))
        .unwrap_or_else(|| {
            let now = Utc::now();
            format!("{}-{:02}", now.year(), now.month())
        });

    let last_modified = match (
        sf.and_then(|d| d.last_modified),
        condo.and_then(|d| d.last_modified),
    ) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };

    let error = if degraded.is_empty() {
        None
    } else {
        warn!(sources = %degraded.join("+"), "serving fallback data");
        Some(format!("fallback: {}", degraded.join("+")))
    };

    let entry = MonthEntry {
        sf: sf_final,
        condo: condo_final,
        sf_report: sf.map(|d| d.url.clone()).unwrap_or_else(|| sf_url.to_string()),
        condo_report: condo
            .map(|d| d.url.clone())
            .unwrap_or_else(|| condo_url.to_string()),
    };

    StatsResponse {
        updated_at: resolve_updated_at(last_modified, updated_override, &month_key),
        months: BTreeMap::from([(month_key, entry)]),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::validate;
    use crate::specs::REPORT_SPECS;

    fn doc(text: &str) -> FetchedDocument {
        FetchedDocument {
            url: "https://reports.example.com/sf.pdf".to_string(),
            text: text.to_string(),
            last_modified: None,
        }
    }

    const SF_TEXT: &str = "Single Family Report August 2026\n\
        Median Sold Price $520,000\n\
        Closed Sales\n5.2% MoM\n312\n\
        Days on Market 24\n\
        Months of Inventory 1.48\n\
        Active Listings 903";

    #[test]
    fn detect_month_from_header() {
        assert_eq!(detect_month(SF_TEXT).as_deref(), Some("2026-08"));
        assert_eq!(detect_month("Sept 2025 summary").as_deref(), Some("2025-09"));
        assert_eq!(detect_month("no header at all"), None);
    }

    #[test]
    fn fallback_samples_pass_the_same_validator() {
        for record in [fallback_sf(), fallback_condo()] {
            for spec in REPORT_SPECS.iter() {
                let v = record.get(spec.key).expect("fallback metric missing").as_f64();
                assert_eq!(validate(v, spec), Some(v), "fallback {} out of range", spec.key);
            }
        }
    }

    #[test]
    fn live_documents_compose_cleanly() {
        let sf = doc(SF_TEXT);
        let condo = doc(
            "Condo Report August 2026\nMedian Sales Price $310,000\nClosed Sales 95",
        );
        let out = compose_stats(Some(&sf), Some(&condo), "u1", "u2", None);
        assert_eq!(out.error, None);
        let entry = out.months.get("2026-08").expect("month entry");
        assert_eq!(entry.sf.get("medianPrice"), Some(MetricValue::Int(520_000)));
        assert_eq!(entry.sf.get("closed"), Some(MetricValue::Int(312)));
        assert_eq!(entry.sf.get("monthsSupply"), Some(MetricValue::Float(1.5)));
        assert_eq!(entry.condo.get("medianPrice"), Some(MetricValue::Int(310_000)));
        assert_eq!(out.updated_at, "2026-08-01");
    }

    #[test]
    fn both_sources_dead_serves_full_fallback() {
        let out = compose_stats(None, None, "https://a/sf.pdf", "https://a/condo.pdf", None);
        assert_eq!(out.months.len(), 1);
        let entry = out.months.values().next().unwrap();
        assert_eq!(entry.sf, fallback_sf());
        assert_eq!(entry.condo, fallback_condo());
        assert_eq!(entry.sf_report, "https://a/sf.pdf");
        assert_eq!(out.error.as_deref(), Some("fallback: sf+condo"));
    }

    #[test]
    fn incomplete_record_is_replaced_wholesale() {
        // Closed sales came through but the required median price did not.
        let sf = doc("August 2026\nClosed Sales 312");
        let out = compose_stats(Some(&sf), None, "u1", "u2", None);
        let entry = out.months.get("2026-08").unwrap();
        assert_eq!(entry.sf, fallback_sf());
        assert_eq!(out.error.as_deref(), Some("fallback: sf+condo"));
    }

    #[test]
    fn freshness_priority_order() {
        let lm = DateTime::parse_from_rfc2822("Wed, 05 Aug 2026 10:00:00 GMT").unwrap();
        assert_eq!(resolve_updated_at(Some(lm), Some("2026-08-09"), "2026-08"), "2026-08-05");
        assert_eq!(resolve_updated_at(None, Some("2026-08-09"), "2026-08"), "2026-08-09");
        assert_eq!(resolve_updated_at(None, None, "2026-08"), "2026-08-01");
    }

    #[test]
    fn newest_last_modified_wins() {
        let older = DateTime::parse_from_rfc2822("Tue, 04 Aug 2026 10:00:00 GMT").unwrap();
        let newer = DateTime::parse_from_rfc2822("Wed, 05 Aug 2026 10:00:00 GMT").unwrap();
        let mut sf = doc(SF_TEXT);
        sf.last_modified = Some(older);
        let mut condo = doc("Condo Report August 2026\nMedian Price $300,000");
        condo.last_modified = Some(newer);
        let out = compose_stats(Some(&sf), Some(&condo), "u1", "u2", None);
        assert_eq!(out.updated_at, "2026-08-05");
    }

    #[test]
    fn response_json_shape() {
        let sf = doc(SF_TEXT);
        let out = compose_stats(Some(&sf), None, "u1", "https://a/condo.pdf", None);
        let json = serde_json::to_value(&out).unwrap();
        let entry = &json["months"]["2026-08"];
        assert_eq!(entry["sf"]["medianPrice"], 520_000);
        assert_eq!(entry["sf"]["monthsSupply"], 1.5);
        assert!(entry["condo"]["medianPrice"].is_number()); // fallback
        assert_eq!(entry["condoReport"], "https://a/condo.pdf");
        assert_eq!(json["updatedAt"], "2026-08-01");
        assert!(json["error"].is_string());
    }
}
