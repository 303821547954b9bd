//! County Market Stats - Extraction Engine
//!
//! Recovers monthly real-estate metrics (median price, closed sales, DOM,
//! months of supply, active listings) from noisy report text, plus lender
//! rate/APR figures from rate pages.
//!
//! Architecture:
//! ```text
//! [Report text (PDF-to-text / HTML-to-text)]
//!       ↓ normalize whitespace
//! ┌──────────────────────────────────────────────┐
//! │  locate label → windowed scan → validate     │  per MetricSpec
//! └──────────────────────────────────────────────┘
//!       ↓ assemble
//! [MetricRecord] → [MonthlyReport JSON]
//! ```
//!
//! Fetching, fallback substitution and the HTTP surface live in `fetch`,
//! `report` and the server binary; the extraction core is pure functions
//! over normalized text.

pub mod cache;
pub mod extract;
pub mod fetch;
pub mod rates;
pub mod report;
pub mod specs;
pub mod text;

pub use extract::{assemble, MetricRecord, MetricValue};
pub use report::{compose_stats, StatsResponse};
pub use specs::{MetricSpec, NumKind, RATE_SPECS, REPORT_SPECS};
