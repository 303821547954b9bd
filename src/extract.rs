//! Extraction engine: windowed value recovery, sanity validation,
//! disambiguation and metric-set assembly.
//!
//! Report layouts put percentage deltas, month headers and neighboring
//! metrics right next to the number we actually want, so the window walk
//! filters noise segments first and the assembler applies an explicit
//! tie-break policy for adjacent look-alike metrics.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::specs::{MetricSpec, NumKind};
use crate::text::{locate_label, normalize_text, scan_all, LabelMatch};

// =============================================================================
// OUTPUT TYPES
// =============================================================================

/// Extracted numeric value. Integers serialize without a fractional part
/// (`520000`, not `520000.0`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(self) -> f64 {
        match self {
            MetricValue::Int(v) => v as f64,
            MetricValue::Float(v) => v,
        }
    }
}

/// One document's extracted metrics. Every spec key is present; a metric
/// whose label was never found, or whose candidates all failed the sanity
/// check, is `None` and serializes as JSON `null` - never conflated with
/// a real zero reading.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricRecord(pub BTreeMap<String, Option<MetricValue>>);

impl MetricRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: Option<MetricValue>) {
        self.0.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<MetricValue> {
        self.0.get(key).copied().flatten()
    }
}

// =============================================================================
// NOISE FILTER
// =============================================================================

lazy_static! {
    static ref MONTH_NAME: Regex = Regex::new(
        r"(?i)\b(Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\b"
    ).unwrap();
    static ref YEAR_TOKEN: Regex = Regex::new(r"\b(?:19|20)\d{2}\b").unwrap();
    static ref DELTA_TAG: Regex = Regex::new(r"(?i)\b(?:MoM|YoY)\b").unwrap();
}

/// A window segment is noise when it carries the annotations that sit next
/// to real labels in source reports: percentage deltas, MoM/YoY tags,
/// month names, bare four-digit years.
///
/// Percent-allowed (rate-style) specs only get the delta-tag filter: their
/// values are percentages, and "APR" would otherwise read as the month
/// Apr. Stray year tokens in those windows fall to the range validator.
fn is_noise(segment: &str, allow_percent: bool) -> bool {
    if allow_percent {
        return DELTA_TAG.is_match(segment);
    }
    segment.contains('%')
        || DELTA_TAG.is_match(segment)
        || MONTH_NAME.is_match(segment)
        || YEAR_TOKEN.is_match(segment)
}

// =============================================================================
// WINDOWED EXTRACTION
// =============================================================================

/// Candidate values near a label, in window order: the remainder of the
/// label's own line first, then up to `spec.window` following lines.
/// Forward-only - no backward scan, by policy.
pub fn extract_candidates(text: &str, label: LabelMatch, spec: &MetricSpec) -> Vec<f64> {
    let after = &text[label.start + label.len..];
    let mut out = Vec::new();
    for segment in after.split('\n').take(spec.window + 1) {
        if is_noise(segment, spec.allow_percent) {
            continue;
        }
        out.extend(scan_all(segment, spec.kind, !spec.allow_percent));
    }
    out
}

/// First candidate in the window, pre-validation.
pub fn extract_value(text: &str, label: LabelMatch, spec: &MetricSpec) -> Option<f64> {
    extract_candidates(text, label, spec).first().copied()
}

// =============================================================================
// SANITY VALIDATION
// =============================================================================

/// Round to one decimal digit, half away from zero: 1.48 -> 1.5,
/// 1.44 -> 1.4, -1.45 -> -1.5.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Range-check a candidate against the metric's plausible bounds.
/// Out-of-range values come back as `None`, never an error; decimals are
/// rounded to one place on the way out.
pub fn validate(value: f64, spec: &MetricSpec) -> Option<f64> {
    if value < spec.min || value > spec.max {
        return None;
    }
    match spec.kind {
        NumKind::Integer => Some(value),
        NumKind::Decimal => Some(round1(value)),
    }
}

// =============================================================================
// DISAMBIGUATION
// =============================================================================

/// Tie-break for adjacent look-alike metrics (closed vs. active listings,
/// rate vs. APR): skip a validated candidate that exactly equals a value
/// already assigned to a conflicting metric, as long as a later candidate
/// remains. When every candidate collides the first one is kept - some
/// misattribution on malformed input is an accepted limitation.
pub fn pick_candidate(candidates: &[f64], taken: &[f64]) -> Option<f64> {
    let last = candidates.len().checked_sub(1)?;
    for (i, &c) in candidates.iter().enumerate() {
        if taken.contains(&c) && i < last {
            continue;
        }
        return Some(c);
    }
    None
}

// =============================================================================
// ASSEMBLY
// =============================================================================

/// Run every spec over one document's text and produce a `MetricRecord`.
///
/// Pure and idempotent: normalization happens once here, metrics are
/// extracted independently, and no state survives the call.
pub fn assemble(raw: &str, specs: &[MetricSpec]) -> MetricRecord {
    let text = normalize_text(raw);
    let mut record = MetricRecord::new();

    for spec in specs {
        let value = extract_metric(&text, spec, &record);
        if value.is_none() {
            debug!(key = spec.key, "no confident value");
        }
        record.set(
            spec.key,
            value.map(|v| match spec.kind {
                NumKind::Integer => MetricValue::Int(v as i64),
                NumKind::Decimal => MetricValue::Float(v),
            }),
        );
    }
    record
}

fn extract_metric(text: &str, spec: &MetricSpec, so_far: &MetricRecord) -> Option<f64> {
    let label = locate_label(text, &spec.patterns)?;
    let validated: Vec<f64> = extract_candidates(text, label, spec)
        .into_iter()
        .filter_map(|c| validate(c, spec))
        .collect();

    let taken: Vec<f64> = spec
        .conflicts
        .iter()
        .filter_map(|k| so_far.get(k))
        .map(MetricValue::as_f64)
        .collect();

    pick_candidate(&validated, &taken)
}
