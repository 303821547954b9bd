//! Upstream document fetching: timeouts, alternate-URL retry,
//! content-type screening and the plain-text collaborator seam.
//!
//! Failures here are per-source and never fatal - the caller degrades to
//! fallback data. PDF-to-text conversion is a collaborator concern: the
//! built-in converter handles HTML and pre-extracted text, and deployments
//! with PDF upstreams inject their own `TextConverter`.

use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header;
use scraper::Html;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("unexpected content type {got:?} for {url}")]
    UnexpectedContentType { got: String, url: String },
    #[error("text conversion failed: {0}")]
    Convert(String),
    // Field deliberately not named `source`: thiserror would treat that
    // as the error's cause and demand an Error impl.
    #[error("no source URL for {name} succeeded")]
    AllSourcesFailed { name: String },
}

/// What a source is expected to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    Pdf,
    Html,
    Text,
}

/// One upstream report, with alternate URLs tried in order.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    pub name: String,
    pub kind: DocKind,
    pub urls: Vec<String>,
}

/// A fetched document reduced to plain text, with provenance.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub url: String,
    pub text: String,
    pub last_modified: Option<DateTime<FixedOffset>>,
}

/// Collaborator seam: turns fetched bytes into extractable plain text.
pub trait TextConverter: Send + Sync {
    fn to_plain_text(&self, bytes: &[u8], kind: DocKind) -> Result<String, FetchError>;
}

lazy_static! {
    static ref SCRIPT_STYLE: Regex =
        Regex::new(r"(?is)<(script|style)\b.*?</(script|style)>").unwrap();
}

/// Default converter: strips HTML down to text, passes text bodies
/// through, and refuses raw PDF bytes (a real PDF extractor must be
/// injected for those upstreams).
pub struct BasicConverter;

impl TextConverter for BasicConverter {
    fn to_plain_text(&self, bytes: &[u8], kind: DocKind) -> Result<String, FetchError> {
        if bytes.starts_with(b"%PDF") {
            return Err(FetchError::Convert(
                "raw PDF body; inject a PDF-capable TextConverter".into(),
            ));
        }
        let body = String::from_utf8_lossy(bytes);
        match kind {
            DocKind::Html => Ok(strip_html(&body)),
            DocKind::Pdf | DocKind::Text => Ok(body.into_owned()),
        }
    }
}

/// Reduce an HTML body to its text nodes, one per line, so the
/// line-window logic still applies. Parsing through `scraper` decodes
/// entities - named and numeric - before any token scanning sees them.
pub fn strip_html(html: &str) -> String {
    let body = SCRIPT_STYLE.replace_all(html, "\n");
    let document = Html::parse_document(&body);
    let mut out = String::new();
    for piece in document.root_element().text() {
        let piece = piece.trim();
        if !piece.is_empty() {
            out.push_str(piece);
            out.push('\n');
        }
    }
    // Non-breaking spaces would defeat the `[ \t]` whitespace collapse.
    out.replace('\u{a0}', " ")
}

/// Shared HTTP client: bounded timeout, browser-ish UA, limited redirects.
pub fn client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
}

// An HTML body where a PDF was expected is a login/error page, not a
// report; treated the same as a failed fetch.
fn screen_content_type(kind: DocKind, content_type: &str, url: &str) -> Result<(), FetchError> {
    if kind == DocKind::Pdf && content_type.starts_with("text/html") {
        return Err(FetchError::UnexpectedContentType {
            got: content_type.to_string(),
            url: url.to_string(),
        });
    }
    Ok(())
}

/// Fetch one source, walking its alternate URLs until one yields usable
/// text. Every error is logged and the next URL tried; only when the list
/// is exhausted does the source as a whole fail.
pub async fn fetch_document(
    client: &reqwest::Client,
    source: &DocumentSource,
    converter: &dyn TextConverter,
) -> Result<FetchedDocument, FetchError> {
    for url in &source.urls {
        match fetch_one(client, url, source.kind, converter).await {
            Ok(doc) => {
                debug!(source = %source.name, url = %url, "fetched");
                return Ok(doc);
            }
            Err(e) => {
                warn!(source = %source.name, url = %url, error = %e, "source URL failed");
            }
        }
    }
    Err(FetchError::AllSourcesFailed {
        name: source.name.clone(),
    })
}

async fn fetch_one(
    client: &reqwest::Client,
    url: &str,
    kind: DocKind,
    converter: &dyn TextConverter,
) -> Result<FetchedDocument, FetchError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    screen_content_type(kind, &content_type, url)?;

    let last_modified = response
        .headers()
        .get(header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| DateTime::parse_from_rfc2822(s).ok());

    let bytes = response.bytes().await?;
    let text = converter.to_plain_text(&bytes, kind)?;
    if text.trim().len() < 40 {
        return Err(FetchError::Convert(format!(
            "body too short to be a report ({} chars)",
            text.trim().len()
        )));
    }

    Ok(FetchedDocument {
        url: url.to_string(),
        text,
        last_modified,
    })
}
