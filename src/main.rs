//! County Market Stats - HTTP API
//!
//! Serves the extracted monthly market stats and lender rates as JSON.
//! Upstream flakiness never surfaces as a 5xx: every failure path degrades
//! to fallback data with an advisory `error` field.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use county_stats::cache::TtlCache;
use county_stats::fetch::{
    self, BasicConverter, DocKind, DocumentSource, FetchedDocument, TextConverter,
};
use county_stats::rates::{compose_rates, RatesResponse};
use county_stats::report::compose_stats;
use county_stats::StatsResponse;

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Clone)]
struct Config {
    port: u16,
    /// Alternate URLs per report, tried in order.
    sf_urls: Vec<String>,
    condo_urls: Vec<String>,
    /// `name=url` pairs.
    lender_pages: Vec<(String, String)>,
    refresh_key: Option<String>,
    updated_override: Option<String>,
    fetch_timeout: Duration,
    cache_ttl: Duration,
}

fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn env_secs(name: &str, default: u64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("PORT must be a number")?;

        let lender_pages = env_list("LENDER_PAGES")
            .into_iter()
            .filter_map(|pair| {
                let (name, url) = pair.split_once('=')?;
                Some((name.to_string(), url.to_string()))
            })
            .collect();

        Ok(Config {
            port,
            sf_urls: env_list("SF_REPORT_URLS"),
            condo_urls: env_list("CONDO_REPORT_URLS"),
            lender_pages,
            refresh_key: std::env::var("REFRESH_KEY").ok(),
            updated_override: std::env::var("STATS_UPDATED_AT").ok(),
            fetch_timeout: env_secs("FETCH_TIMEOUT_SECS", 8),
            cache_ttl: env_secs("CACHE_TTL_SECS", 600),
        })
    }
}

// URL extension decides what the converter should expect.
fn kind_for(url: &str) -> DocKind {
    let path = url.split('?').next().unwrap_or(url);
    if path.ends_with(".pdf") {
        DocKind::Pdf
    } else if path.ends_with(".txt") {
        DocKind::Text
    } else {
        DocKind::Html
    }
}

struct AppState {
    cfg: Config,
    client: reqwest::Client,
    converter: Arc<dyn TextConverter>,
    stats_cache: TtlCache<StatsResponse>,
    rates_cache: TtlCache<RatesResponse>,
}

// HTTP cache lifetime tracks the server-side TTL.
fn cached_json<T: Serialize>(body: &T, ttl: Duration) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((
            header::CACHE_CONTROL,
            format!(
                "public, max-age={}, stale-while-revalidate=86400",
                ttl.as_secs()
            ),
        ))
        .json(body)
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        service: "county-stats",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn stats(state: web::Data<AppState>) -> HttpResponse {
    if let Some(hit) = state.stats_cache.get() {
        return cached_json(&hit, state.cfg.cache_ttl);
    }
    let out = build_stats(&state).await;
    state.stats_cache.put(out.clone());
    cached_json(&out, state.cfg.cache_ttl)
}

async fn build_stats(state: &AppState) -> StatsResponse {
    let source = |name: &str, urls: &[String]| DocumentSource {
        name: name.to_string(),
        kind: urls.first().map(|u| kind_for(u)).unwrap_or(DocKind::Pdf),
        urls: urls.to_vec(),
    };
    let sf_src = source("sf", &state.cfg.sf_urls);
    let condo_src = source("condo", &state.cfg.condo_urls);

    // Both reports fetched concurrently; one failing never aborts the other.
    let (sf, condo) = tokio::join!(
        fetch::fetch_document(&state.client, &sf_src, &*state.converter),
        fetch::fetch_document(&state.client, &condo_src, &*state.converter),
    );

    compose_stats(
        sf.as_ref().ok(),
        condo.as_ref().ok(),
        state.cfg.sf_urls.first().map(String::as_str).unwrap_or(""),
        state.cfg.condo_urls.first().map(String::as_str).unwrap_or(""),
        state.cfg.updated_override.as_deref(),
    )
}

async fn rates(state: web::Data<AppState>) -> HttpResponse {
    if let Some(hit) = state.rates_cache.get() {
        return cached_json(&hit, state.cfg.cache_ttl);
    }

    let handles: Vec<_> = state
        .cfg
        .lender_pages
        .iter()
        .cloned()
        .map(|(name, url)| {
            let client = state.client.clone();
            let state = state.clone();
            let task_name = name.clone();
            let handle = tokio::spawn(async move {
                let src = DocumentSource {
                    name: task_name,
                    kind: kind_for(&url),
                    urls: vec![url],
                };
                fetch::fetch_document(&client, &src, &*state.converter)
                    .await
                    .ok()
            });
            (name, handle)
        })
        .collect();

    let results = join_lender_fetches(handles).await;
    let out = compose_rates(&results);
    state.rates_cache.put(out.clone());
    cached_json(&out, state.cfg.cache_ttl)
}

// A lender whose task died (panic/cancel) degrades to fallback like any
// failed fetch; it must not vanish from the response.
async fn join_lender_fetches(
    handles: Vec<(String, tokio::task::JoinHandle<Option<FetchedDocument>>)>,
) -> Vec<(String, Option<FetchedDocument>)> {
    let mut results = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        let doc = match handle.await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(lender = %name, error = %e, "lender fetch task failed");
                None
            }
        };
        results.push((name, doc));
    }
    results
}

#[derive(Deserialize)]
struct RefreshQuery {
    key: Option<String>,
}

// Shared-secret cache drop; the next /stats or /rates rebuilds live.
async fn refresh(state: web::Data<AppState>, query: web::Query<RefreshQuery>) -> HttpResponse {
    let authorized = matches!(
        (&state.cfg.refresh_key, &query.key),
        (Some(expected), Some(got)) if expected == got
    );
    if !authorized {
        return HttpResponse::Forbidden().json(serde_json::json!({ "error": "bad key" }));
    }
    state.stats_cache.clear();
    state.rates_cache.clear();
    info!("caches dropped via /refresh");
    HttpResponse::Ok().json(serde_json::json!({ "status": "refreshed" }))
}

// =============================================================================
// MAIN
// =============================================================================

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cfg = Config::from_env()?;
    let addr = format!("0.0.0.0:{}", cfg.port);
    let client = fetch::client(cfg.fetch_timeout).context("failed to build HTTP client")?;

    println!(
        r#"
╔══════════════════════════════════════════════════╗
║        County Market Stats - JSON API            ║
╠══════════════════════════════════════════════════╣
║  GET /stats    - monthly market stats            ║
║  GET /rates    - lender rate snapshot            ║
║  GET /refresh  - drop caches (?key=<secret>)     ║
║  GET /health   - health check                    ║
╚══════════════════════════════════════════════════╝
    "#
    );
    println!("Starting server on {addr}");

    let state = web::Data::new(AppState {
        stats_cache: TtlCache::new(cfg.cache_ttl),
        rates_cache: TtlCache::new(cfg.cache_ttl),
        cfg,
        client,
        converter: Arc::new(BasicConverter),
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .route("/health", web::get().to(health))
            .route("/stats", web::get().to(stats))
            .route("/rates", web::get().to(rates))
            .route("/refresh", web::get().to(refresh))
    })
    .bind(&addr)?
    .run()
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_header_tracks_configured_ttl() {
        let resp = cached_json(&serde_json::json!({}), Duration::from_secs(120));
        let cc = resp
            .headers()
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert_eq!(cc, "public, max-age=120, stale-while-revalidate=86400");
    }

    #[tokio::test]
    async fn dead_lender_task_still_appears_in_results() {
        let handles = vec![
            (
                "lenderA".to_string(),
                tokio::spawn(async { None::<FetchedDocument> }),
            ),
            (
                "lenderB".to_string(),
                tokio::spawn(async { panic!("upstream parser blew up") }),
            ),
        ];
        let results = join_lender_fetches(handles).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].0, "lenderB");
        assert!(results[1].1.is_none());

        // compose still gives that lender fallback figures plus the marker.
        let out = compose_rates(&results);
        assert!(out.lenders.contains_key("lenderB"));
        assert!(out.error.as_deref().unwrap_or("").contains("lenderB"));
    }

    #[test]
    fn kind_follows_url_extension() {
        assert_eq!(kind_for("https://x/report.pdf"), DocKind::Pdf);
        assert_eq!(kind_for("https://x/report.txt?v=2"), DocKind::Text);
        assert_eq!(kind_for("https://x/rates"), DocKind::Html);
    }
}
