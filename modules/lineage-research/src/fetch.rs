//! Live content fetching, routed by each source's access model.
//!
//! - url-template sources render through the browser pool
//! - json-api sources (WikiTree, MatchID) go straight over HTTP
//! - form-submit (FreeBMD) drives a form plan through the pool, narrowing
//!   the year range once when the result cap is hit
//! - location-resolver (Filae) composes its URL through the gazetteer

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdp_client::{BrowserPool, CdpError, FormPlan};
use chrono::Utc;
use lineage_common::{Payload, Query};
use lineage_extract::{fill_template, AccessModel, Gazetteer, Source};
use thiserror::Error;
use tracing::{debug, info};

use crate::traits::{ContentFetcher, Fetched};

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Bot verification detected on {source_name} requires human intervention. Complete the verification in the browser, then retry.")]
    BotCheck { source_name: String },

    #[error("{source_name} daily search limit reached. Try again tomorrow.")]
    DailyLimit { source_name: String },

    #[error("rate limited: {message}")]
    RateLimited { retry_after: Option<f64>, message: String },

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Errors the rate limiter may retry. Human-gated conditions are not
    /// retryable no matter what their message says.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            FetchError::RateLimited { .. } => true,
            FetchError::BotCheck { .. } | FetchError::DailyLimit { .. } => false,
            FetchError::Other(message) => {
                let lower = message.to_lowercase();
                lower.contains("429") || lower.contains("too many") || lower.contains("rate limit")
            }
        }
    }
}

impl From<CdpError> for FetchError {
    fn from(err: CdpError) -> Self {
        match err {
            CdpError::BotCheck { source_name } => FetchError::BotCheck { source_name },
            CdpError::DailyLimit { source_name } => FetchError::DailyLimit { source_name },
            other => FetchError::Other(other.to_string()),
        }
    }
}

const FREEBMD_SEARCH_URL: &str = "https://www.freebmd.org.uk/cgi/search.pl";
const FREEBMD_OVERFLOW_MARKER: &str = "maximum number that can be displayed is 3000";

const WIKITREE_API_URL: &str = "https://api.wikitree.com/api.php";
const MATCHID_API_URL: &str = "https://deces.matchid.io/deces/api/v1/search";

pub struct LiveFetcher {
    pool: Arc<BrowserPool>,
    http: reqwest::Client,
    gazetteer: &'static Gazetteer,
    matchid_token: Option<String>,
}

impl LiveFetcher {
    pub fn new(pool: Arc<BrowserPool>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            pool,
            http,
            gazetteer: Gazetteer::shared(),
            matchid_token: std::env::var("MATCHID_API_TOKEN").ok(),
        }
    }
}

#[async_trait]
impl ContentFetcher for LiveFetcher {
    async fn fetch(&self, source: &Source, query: &Query) -> Result<Fetched, FetchError> {
        match source.access_model {
            AccessModel::UrlTemplate => {
                let template = source
                    .url_template
                    .ok_or_else(|| FetchError::Other(format!("{}: no url template", source.key)))?;
                self.fetch_rendered(source, &fill_template(template, query)).await
            }
            AccessModel::UrlTemplateWithLocation => {
                // Prefer the location template when the query's location is
                // present; location filtering only helps when it resolves.
                let template = match (source.url_template_with_location, &query.location) {
                    (Some(tpl), Some(loc)) if !loc.is_empty() => tpl,
                    _ => source.url_template.ok_or_else(|| {
                        FetchError::Other(format!("{}: no url template", source.key))
                    })?,
                };
                self.fetch_rendered(source, &fill_template(template, query)).await
            }
            AccessModel::JsonApi => match source.key {
                "wikitree" => self.fetch_wikitree(query).await,
                "matchid" => self.fetch_matchid(query).await,
                other => Err(FetchError::Other(format!("{other}: unknown json-api source"))),
            },
            AccessModel::FormSubmit => {
                let pool = Arc::clone(&self.pool);
                fetch_freebmd(move |plan| {
                    let pool = Arc::clone(&pool);
                    async move { Ok(pool.fetch_with_form(&plan).await?) }
                }, query)
                .await
                .map(|payload| Fetched::new(payload, Some(FREEBMD_SEARCH_URL.to_string())))
            }
            AccessModel::LocationResolver => {
                let url = self.gazetteer.build_filae_url(query);
                self.fetch_rendered(source, &url).await
            }
        }
    }
}

impl LiveFetcher {
    async fn fetch_rendered(&self, source: &Source, url: &str) -> Result<Fetched, FetchError> {
        debug!(source = source.key, url, "Fetching");
        let html = self
            .pool
            .fetch(url, source.display_name, source.wait_for_selector)
            .await?;
        Ok(Fetched::new(Payload::Html(html), Some(url.to_string())))
    }

    /// WikiTree searchPerson API. Published limits: 200 requests/minute,
    /// 4000/hour, with Retry-After on 429.
    async fn fetch_wikitree(&self, query: &Query) -> Result<Fetched, FetchError> {
        let birth_year = query.birth_year.unwrap_or(1900);
        let decade = (birth_year / 10) * 10;
        let params = [
            ("action", "searchPerson".to_string()),
            ("FirstName", query.given_name.clone()),
            ("LastName", query.surname.clone()),
            ("BirthDate", query.birth_year.map(|y| y.to_string()).unwrap_or_default()),
            ("BirthDateDecade", decade.to_string()),
            ("format", "json".to_string()),
            ("limit", "20".to_string()),
            (
                "fields",
                "Id,Name,FirstName,LastNameAtBirth,BirthDate,BirthLocation,DeathDate".to_string(),
            ),
        ];

        let response = self
            .http
            .get(WIKITREE_API_URL)
            .query(&params)
            .send()
            .await
            .map_err(|e| FetchError::Other(e.to_string()))?;
        let response = check_http_status(response, "wikitree")?;

        let body: serde_json::Value =
            response.json().await.map_err(|e| FetchError::Other(e.to_string()))?;
        Ok(Fetched::new(Payload::Json(body), Some(WIKITREE_API_URL.to_string())))
    }

    /// MatchID free-text search. One request/second unauthenticated;
    /// a bearer token (MATCHID_API_TOKEN) lifts the cap.
    async fn fetch_matchid(&self, query: &Query) -> Result<Fetched, FetchError> {
        let mut q_parts = vec![query.surname.clone()];
        if !query.given_name.is_empty() {
            q_parts.push(query.given_name.clone());
        }
        if let Some(location) = &query.location {
            if !location.is_empty() {
                q_parts.push(location.clone());
            }
        }
        if let Some(year) = query.birth_year {
            q_parts.push(year.to_string());
        }

        let mut request = self
            .http
            .get(MATCHID_API_URL)
            .query(&[("q", q_parts.join(" ")), ("size", "20".to_string())])
            .header("Accept", "application/json");
        if let Some(token) = &self.matchid_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request.send().await.map_err(|e| FetchError::Other(e.to_string()))?;
        let response = check_http_status(response, "matchid")?;

        let body: serde_json::Value =
            response.json().await.map_err(|e| FetchError::Other(e.to_string()))?;
        Ok(Fetched::new(Payload::Json(body), Some(MATCHID_API_URL.to_string())))
    }
}

/// Map an HTTP status into the fetch taxonomy: 429 carries the parsed
/// Retry-After; other failures keep the status text in the message so
/// classification downstream can see "404" etc.
fn check_http_status(
    response: reqwest::Response,
    source: &str,
) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(FetchError::RateLimited {
            retry_after,
            message: format!("{source}: HTTP 429 Too Many Requests"),
        });
    }
    Err(FetchError::Other(format!("{source}: HTTP {status}")))
}

/// `Retry-After` is either delay-seconds or an HTTP-date. Unparseable
/// values return None and the caller falls back to backoff.
fn parse_retry_after(value: &str) -> Option<f64> {
    if let Ok(seconds) = value.trim().parse::<f64>() {
        return Some(seconds.max(0.0));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value.trim()).ok()?;
    let delta = (date.with_timezone(&Utc) - Utc::now()).num_seconds();
    Some(delta.max(0) as f64)
}

/// Build the FreeBMD births search plan for a year window.
fn freebmd_plan(query: &Query, start_year: i32, end_year: i32) -> FormPlan {
    let mut fills = vec![("input[name=\"surname\"]".to_string(), query.surname.clone())];
    if !query.given_name.is_empty() {
        fills.push(("input[name=\"given\"]".to_string(), query.given_name.clone()));
    }
    fills.push(("input[name=\"start\"]".to_string(), start_year.to_string()));
    fills.push(("input[name=\"end\"]".to_string(), end_year.to_string()));

    FormPlan {
        source_name: "FreeBMD".to_string(),
        url: FREEBMD_SEARCH_URL.to_string(),
        form_selector: "form[name=\"search\"]".to_string(),
        checkboxes: vec!["input#typeBirths".to_string()],
        fills,
        submit_selector: "input[name=\"find\"]".to_string(),
    }
}

/// FreeBMD caps result sets at 3000 rows. Start with a narrow window
/// (the explicit end year, or start+2), and on overflow retry exactly
/// once with a single-year window. Still over the cap means the name is
/// too common to search; an empty payload reads as no match.
pub(crate) async fn fetch_freebmd<F, Fut>(submit: F, query: &Query) -> Result<Payload, FetchError>
where
    F: Fn(FormPlan) -> Fut,
    Fut: Future<Output = Result<String, FetchError>>,
{
    let start_year = query.birth_year.unwrap_or(1880);
    let end_year = query.birth_year_end.unwrap_or(start_year + 2);

    let content = submit(freebmd_plan(query, start_year, end_year)).await?;
    if !content.contains(FREEBMD_OVERFLOW_MARKER) {
        return Ok(Payload::Html(content));
    }

    info!(start_year, "FreeBMD result cap hit, narrowing to a single year");
    let content = submit(freebmd_plan(query, start_year, start_year)).await?;
    if content.contains(FREEBMD_OVERFLOW_MARKER) {
        info!("FreeBMD still over cap with a single year, giving up");
        return Ok(Payload::Html(String::new()));
    }
    Ok(Payload::Html(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn query() -> Query {
        Query {
            surname: "Smith".into(),
            given_name: "John".into(),
            birth_year: Some(1880),
            birth_year_end: Some(1882),
            location: None,
            country: None,
            region: None,
            is_estimated_year: false,
        }
    }

    #[test]
    fn retry_after_parsing() {
        assert_eq!(parse_retry_after("17"), Some(17.0));
        assert_eq!(parse_retry_after(" 2.5 "), Some(2.5));
        // HTTP-date in the past clamps to zero.
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), Some(0.0));
        assert_eq!(parse_retry_after("next tuesday"), None);
    }

    #[test]
    fn rate_limitish_classification() {
        assert!(FetchError::RateLimited { retry_after: None, message: "x".into() }.is_rate_limit());
        assert!(FetchError::Other("HTTP 429".into()).is_rate_limit());
        assert!(FetchError::Other("Too Many Requests".into()).is_rate_limit());
        assert!(!FetchError::Other("HTTP 404".into()).is_rate_limit());
        assert!(!FetchError::BotCheck { source_name: "X".into() }.is_rate_limit());
        assert!(!FetchError::DailyLimit { source_name: "X".into() }.is_rate_limit());
    }

    #[tokio::test]
    async fn freebmd_happy_path_submits_once() {
        let calls = AtomicU32::new(0);
        let payload = fetch_freebmd(
            |plan| {
                calls.fetch_add(1, Ordering::SeqCst);
                assert_eq!(plan.url, FREEBMD_SEARCH_URL);
                async { Ok("var searchData = new Array();".to_string()) }
            },
            &query(),
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(payload.as_html().unwrap().contains("searchData"));
    }

    #[tokio::test]
    async fn freebmd_overflow_narrows_once() {
        let calls = AtomicU32::new(0);
        let payload = fetch_freebmd(
            |plan| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let end = plan.fills.iter().find(|(sel, _)| sel.contains("end")).cloned();
                async move {
                    if n == 0 {
                        // Wide window overflows.
                        assert_eq!(end.unwrap().1, "1882");
                        Ok(format!("page said: {FREEBMD_OVERFLOW_MARKER}"))
                    } else {
                        // Narrowed to the single start year.
                        assert_eq!(end.unwrap().1, "1880");
                        Ok("results".to_string())
                    }
                }
            },
            &query(),
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(payload.as_html(), Some("results"));
    }

    #[tokio::test]
    async fn freebmd_double_overflow_returns_empty() {
        let calls = AtomicU32::new(0);
        let payload = fetch_freebmd(
            |_plan| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(FREEBMD_OVERFLOW_MARKER.to_string()) }
            },
            &query(),
        )
        .await
        .unwrap();
        // Exactly one retry, then give up with an empty payload.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(payload.as_html(), Some(""));
    }
}
