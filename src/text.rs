//! Text primitives: whitespace normalization, label location and numeric
//! token scanning.
//!
//! PDF-to-text output is messy - double spaces, ragged line breaks, labels
//! wrapped mid-phrase. Everything downstream assumes `normalize_text` ran
//! first: runs of spaces/tabs become one space, line-break runs become one
//! newline.

use lazy_static::lazy_static;
use regex::Regex;

use crate::specs::NumKind;

lazy_static! {
    static ref CRLF: Regex = Regex::new(r"\r\n?").unwrap();
    static ref HSPACE: Regex = Regex::new(r"[ \t]+").unwrap();
    static ref NEWLINE_RUN: Regex = Regex::new(r" ?\n[\n ]*").unwrap();

    // Integer: optional sign, digits with optional comma grouping.
    static ref INT_TOKEN: Regex =
        Regex::new(r"[-+]?\d{1,3}(?:,\d{3})+|[-+]?\d+").unwrap();
    // Decimal: same, plus an optional fractional part.
    static ref DEC_TOKEN: Regex =
        Regex::new(r"[-+]?\d{1,3}(?:,\d{3})+(?:\.\d+)?|[-+]?\d+(?:\.\d+)?").unwrap();
}

/// Collapse whitespace so label patterns and line-window logic see a
/// predictable shape. Idempotent.
pub fn normalize_text(raw: &str) -> String {
    let text = CRLF.replace_all(raw, "\n");
    let text = HSPACE.replace_all(&text, " ");
    let text = NEWLINE_RUN.replace_all(&text, "\n");
    text.trim().to_string()
}

/// Where a metric label matched in normalized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelMatch {
    pub start: usize,
    pub len: usize,
}

/// First-match-wins over the synonym list: the highest-priority pattern
/// that occurs anywhere in the text anchors the search window.
pub fn locate_label(text: &str, patterns: &[Regex]) -> Option<LabelMatch> {
    for pattern in patterns {
        if let Some(m) = pattern.find(text) {
            return Some(LabelMatch {
                start: m.start(),
                len: m.len(),
            });
        }
    }
    None
}

/// All numeric tokens of the given kind, in text order.
///
/// Rejected tokens:
/// - mid-token hits (preceded by a digit or `.`)
/// - the integer part of a decimal, when scanning for integers
/// - tokens immediately followed by `%`, when `skip_percent` is set
///
/// A leading currency symbol is not part of the token, so `$520,000`
/// scans as 520000.
pub fn scan_all(text: &str, kind: NumKind, skip_percent: bool) -> Vec<f64> {
    let re: &Regex = match kind {
        NumKind::Integer => &INT_TOKEN,
        NumKind::Decimal => &DEC_TOKEN,
    };

    let mut out = Vec::new();
    for m in re.find_iter(text) {
        let before = text[..m.start()].chars().last();
        if matches!(before, Some(c) if c.is_ascii_digit() || c == '.') {
            continue;
        }
        let mut rest = text[m.end()..].chars();
        let after = rest.next();
        if skip_percent && after == Some('%') {
            continue;
        }
        if kind == NumKind::Integer
            && after == Some('.')
            && rest.next().is_some_and(|c| c.is_ascii_digit())
        {
            continue;
        }
        if let Ok(v) = m.as_str().replace(',', "").parse::<f64>() {
            out.push(v);
        }
    }
    out
}

/// First numeric token of the given kind, if any.
pub fn scan_number(text: &str, kind: NumKind, skip_percent: bool) -> Option<f64> {
    scan_all(text, kind, skip_percent).first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_spaces_and_newlines() {
        let raw = "Median  Sold\t Price\r\n\r\n   $520,000  \n\nClosed Sales";
        let text = normalize_text(raw);
        assert_eq!(text, "Median Sold Price\n$520,000\nClosed Sales");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_text("a  b\n\n c");
        assert_eq!(normalize_text(&once), once);
    }

    #[test]
    fn locate_prefers_earlier_synonym() {
        let patterns = vec![
            Regex::new(r"(?i)closed\s+sales").unwrap(),
            Regex::new(r"(?i)sold\s+listings").unwrap(),
        ];
        // Second synonym appears first in the text, but pattern priority wins.
        let text = "Sold Listings 40\nClosed Sales 312";
        let m = locate_label(text, &patterns).unwrap();
        assert_eq!(&text[m.start..m.start + m.len], "Closed Sales");
    }

    #[test]
    fn locate_absent_label() {
        let patterns = vec![Regex::new(r"(?i)median\s+price").unwrap()];
        assert!(locate_label("nothing relevant here", &patterns).is_none());
    }

    #[test]
    fn scan_integer_strips_grouping_and_currency() {
        assert_eq!(scan_number("$520,000", NumKind::Integer, false), Some(520_000.0));
        assert_eq!(scan_number("1,234,567 homes", NumKind::Integer, false), Some(1_234_567.0));
    }

    #[test]
    fn scan_decimal() {
        assert_eq!(scan_number("1.48 months", NumKind::Decimal, false), Some(1.48));
        assert_eq!(scan_number("no digits", NumKind::Decimal, false), None);
    }

    #[test]
    fn scan_skips_percent_annotated_tokens() {
        assert_eq!(scan_number("5.2% then 312", NumKind::Integer, true), Some(312.0));
        // The 5 of 5.2 is a decimal fragment, the 2 is mid-token;
        // neither surfaces as an integer.
        assert_eq!(scan_number("5.2%", NumKind::Integer, true), None);
        assert_eq!(scan_number("5.2%", NumKind::Decimal, true), None);
    }

    #[test]
    fn integer_scan_does_not_bite_decimals() {
        assert_eq!(scan_number("1.48", NumKind::Integer, false), None);
        assert_eq!(scan_number("1.48 then 312", NumKind::Integer, false), Some(312.0));
    }

    #[test]
    fn scan_handles_signs() {
        assert_eq!(scan_number("-12 days", NumKind::Integer, false), Some(-12.0));
        assert_eq!(scan_number("+3.5", NumKind::Decimal, false), Some(3.5));
    }

    #[test]
    fn scan_all_returns_tokens_in_order() {
        let v = scan_all("10 then 20 then 30", NumKind::Integer, false);
        assert_eq!(v, vec![10.0, 20.0, 30.0]);
    }
}
