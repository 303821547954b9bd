//! Metric configuration: one table for the monthly report metrics, one for
//! lender rate pages.
//!
//! Every deployment-specific detail of extraction lives here - the label
//! synonym patterns, the numeric kind, the plausible range, the search
//! window and the conflict set used for disambiguation. The engine in
//! `extract` consumes these tables and knows nothing about real estate.

use lazy_static::lazy_static;
use regex::Regex;

/// Numeric shape of a metric's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumKind {
    Integer,
    Decimal,
}

/// One metric to recover from a document.
pub struct MetricSpec {
    /// Canonical JSON key, e.g. `medianPrice`.
    pub key: &'static str,
    /// Label synonyms, tried in priority order; first match wins.
    pub patterns: Vec<Regex>,
    pub kind: NumKind,
    /// Inclusive plausible range; values outside are rejected as
    /// accidental mismatches.
    pub min: f64,
    pub max: f64,
    /// How many lines after the label line to scan for the value.
    pub window: usize,
    /// Rate-style metrics are themselves percentages, so the percent
    /// noise filter must not apply to them.
    pub allow_percent: bool,
    /// Keys of adjacent similar-shaped metrics this one is commonly
    /// confused with (e.g. closed vs. active listings).
    pub conflicts: &'static [&'static str],
}

// Case-insensitive, whitespace-tolerant label pattern. `\s+` inside the
// pattern matches across the single newlines left by normalization, so
// wrapped labels still hit.
fn label(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).unwrap()
}

lazy_static! {
    /// Metrics of the monthly single-family / condo market reports.
    pub static ref REPORT_SPECS: Vec<MetricSpec> = vec![
        MetricSpec {
            key: "medianPrice",
            patterns: vec![
                label(r"median\s+sold\s+price"),
                label(r"median\s+sales?\s+price"),
                label(r"median\s+price"),
            ],
            kind: NumKind::Integer,
            min: 20_000.0,
            max: 2_000_000.0,
            window: 3,
            allow_percent: false,
            conflicts: &[],
        },
        MetricSpec {
            key: "closed",
            patterns: vec![
                label(r"closed\s+sales"),
                label(r"sold\s+listings"),
                label(r"total\s+sales"),
                label(r"homes\s+sold"),
            ],
            kind: NumKind::Integer,
            min: 1.0,
            max: 5_000.0,
            window: 4,
            allow_percent: false,
            conflicts: &["activeListings"],
        },
        MetricSpec {
            key: "dom",
            patterns: vec![
                label(r"median\s+days\s+on\s+market"),
                label(r"(?:average|avg\.?)\s+days\s+on\s+market"),
                label(r"days\s+on\s+market"),
                label(r"\bDOM\b"),
            ],
            kind: NumKind::Integer,
            min: 0.0,
            max: 365.0,
            window: 4,
            allow_percent: false,
            conflicts: &[],
        },
        MetricSpec {
            key: "monthsSupply",
            patterns: vec![
                label(r"months?\s+of\s+inventory"),
                label(r"months?\s+of\s+supply"),
                label(r"months?['\u{2019}]?\s+supply"),
            ],
            kind: NumKind::Decimal,
            min: 0.0,
            max: 50.0,
            window: 3,
            allow_percent: false,
            conflicts: &[],
        },
        MetricSpec {
            key: "activeListings",
            patterns: vec![
                label(r"active\s+listings"),
                label(r"homes\s+for\s+sale"),
                label(r"inventory\s+of\s+homes"),
                label(r"active\s+inventory"),
            ],
            kind: NumKind::Integer,
            min: 1.0,
            max: 20_000.0,
            window: 4,
            allow_percent: false,
            conflicts: &["closed"],
        },
    ];

    /// Metrics of a lender rate page. Both are percentages, so percent
    /// tokens are real values here, not noise.
    pub static ref RATE_SPECS: Vec<MetricSpec> = vec![
        MetricSpec {
            key: "rate",
            patterns: vec![
                label(r"interest\s+rate"),
                label(r"(?:today'?s|current)\s+rate"),
                label(r"\brate\b"),
            ],
            kind: NumKind::Decimal,
            min: 1.0,
            max: 15.0,
            window: 2,
            allow_percent: true,
            conflicts: &["apr"],
        },
        MetricSpec {
            key: "apr",
            patterns: vec![
                label(r"annual\s+percentage\s+rate"),
                label(r"\bAPR\b"),
            ],
            kind: NumKind::Decimal,
            min: 1.0,
            max: 15.0,
            window: 2,
            allow_percent: true,
            conflicts: &["rate"],
        },
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_specs_cover_all_output_keys() {
        let keys: Vec<&str> = REPORT_SPECS.iter().map(|s| s.key).collect();
        for expected in ["medianPrice", "closed", "dom", "monthsSupply", "activeListings"] {
            assert!(keys.contains(&expected), "missing spec for {expected}");
        }
    }

    #[test]
    fn conflict_keys_refer_to_real_specs() {
        let keys: Vec<&str> = REPORT_SPECS.iter().map(|s| s.key).collect();
        for spec in REPORT_SPECS.iter() {
            for c in spec.conflicts {
                assert!(keys.contains(c), "{} conflicts with unknown {c}", spec.key);
            }
        }
    }

    #[test]
    fn labels_match_wrapped_and_cased_variants() {
        let median = &REPORT_SPECS[0];
        assert!(median.patterns[0].is_match("MEDIAN SOLD PRICE"));
        assert!(median.patterns[0].is_match("Median Sold\nPrice"));
    }
}
