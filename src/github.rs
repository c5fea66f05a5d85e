//! Paged retrieval of a repository's issues from the GitHub REST API.
//!
//! [`IssuePaginator`] is an iterator over pages. Each step performs one blocking GET,
//! waits out the rate-limit window when the quota is exhausted, and follows the
//! `next` relation of the `Link` header until the last page.

use crate::config::{Credentials, IssuesConfig};
use crate::types::Issue;
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, ACCEPT, LINK};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Query sent with the first page request. Later pages use the `next` link verbatim.
pub const ISSUE_QUERY: [(&str, &str); 2] = [("state", "all"), ("per_page", "100")];

const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Added to every rate-limit wait so the retry lands after the reset.
const RESET_GRACE: Duration = Duration::from_secs(15);
/// Longest single sleep between "time remaining" notices.
const WAIT_STEP: Duration = Duration::from_secs(240);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("invalid {header} header: {value:?}")]
    InvalidHeader { header: &'static str, value: String },

    #[error("failed to decode issues page: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The parts of an HTTP response the paginator looks at.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub rate_limit_remaining: Option<String>,
    pub rate_limit_reset: Option<String>,
    pub link: Option<String>,
    pub body: String,
}

impl RawResponse {
    fn is_rate_limited(&self) -> bool {
        self.rate_limit_remaining
            .as_deref()
            .and_then(|v| v.trim().parse::<u64>().ok())
            == Some(0)
    }

    fn reset_at(&self) -> Result<DateTime<Utc>, FetchError> {
        let raw = self.rate_limit_reset.as_deref().unwrap_or_default();
        raw.trim()
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| FetchError::InvalidHeader {
                header: RATE_LIMIT_RESET,
                value: raw.to_string(),
            })
    }
}

/// Issues a single GET and hands back the raw response.
pub trait Transport {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<RawResponse, FetchError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<RawResponse, FetchError> {
        (**self).get(url, query)
    }
}

/// Source of the current time and of blocking sleeps.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration)
    }
}

/// Blocking HTTP transport backed by `reqwest`.
pub struct HttpTransport {
    client: Client,
    credentials: Option<Credentials>,
}

impl HttpTransport {
    pub fn new(credentials: Option<Credentials>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            credentials,
        })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<RawResponse, FetchError> {
        let mut request = self
            .client
            .get(url)
            .query(query)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = request.send()?;
        let status = response.status().as_u16();
        let headers = response.headers();
        let rate_limit_remaining = header_value(headers, RATE_LIMIT_REMAINING);
        let rate_limit_reset = header_value(headers, RATE_LIMIT_RESET);
        let link = header_value(headers, LINK.as_str());
        let body = response.text()?;

        Ok(RawResponse {
            status,
            rate_limit_remaining,
            rate_limit_reset,
            link,
            body,
        })
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PageRequest {
    url: String,
    query: Vec<(String, String)>,
}

/// Lazily fetches pages of issues, one blocking request per page.
///
/// The sequence ends after the last page or after the first error.
pub struct IssuePaginator<T, C = SystemClock> {
    transport: T,
    clock: C,
    next: Option<PageRequest>,
    pages_fetched: usize,
    items_fetched: usize,
}

impl IssuePaginator<HttpTransport, SystemClock> {
    /// Builds a paginator for the configured repository using the real network and clock.
    pub fn from_config(config: &IssuesConfig) -> Result<Self, FetchError> {
        if config.credentials.is_none() {
            tracing::info!(
                "No authentication will be used. This will work, albeit slowly, for public repos."
            );
        }
        let transport = HttpTransport::new(config.credentials.clone())?;
        Ok(Self::new(transport, SystemClock, config.issues_url()))
    }
}

impl<T: Transport, C: Clock> IssuePaginator<T, C> {
    pub fn new(transport: T, clock: C, url: impl Into<String>) -> Self {
        let query = ISSUE_QUERY
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            transport,
            clock,
            next: Some(PageRequest {
                url: url.into(),
                query,
            }),
            pages_fetched: 0,
            items_fetched: 0,
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn items_fetched(&self) -> usize {
        self.items_fetched
    }

    /// Fetches one page, waiting out any rate-limit windows along the way.
    fn fetch(&self, request: &PageRequest) -> Result<RawResponse, FetchError> {
        let query: Vec<(&str, &str)> = request
            .query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        loop {
            let response = self.transport.get(&request.url, &query)?;

            if response.is_rate_limited() {
                let reset_at = response.reset_at()?;
                let now = self.clock.now();
                let wait = (reset_at - now).to_std().unwrap_or(Duration::ZERO);
                tracing::warn!(
                    reset_at = %reset_at,
                    now = %now,
                    wait_minutes = wait.as_secs() / 60,
                    "Rate limit hit, waiting for reset"
                );
                wait_out(&self.clock, wait + RESET_GRACE);
                continue;
            }

            if response.status != 200 {
                return Err(FetchError::UnexpectedStatus {
                    status: response.status,
                    url: request.url.clone(),
                });
            }

            return Ok(response);
        }
    }
}

impl<T: Transport, C: Clock> Iterator for IssuePaginator<T, C> {
    type Item = Result<Vec<Issue>, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        let request = self.next.take()?;

        let response = match self.fetch(&request) {
            Ok(response) => response,
            Err(e) => return Some(Err(e)),
        };
        let items: Vec<Issue> = match serde_json::from_str(&response.body) {
            Ok(items) => items,
            Err(e) => return Some(Err(e.into())),
        };

        self.pages_fetched += 1;
        self.items_fetched += items.len();
        tracing::info!(
            page = self.pages_fetched,
            items = items.len(),
            total = self.items_fetched,
            "Processing issues/pull requests"
        );

        self.next = response
            .link
            .as_deref()
            .and_then(next_page_url)
            .map(|url| PageRequest { url, query: Vec::new() });

        Some(Ok(items))
    }
}

/// Blocks for `total`, logging the time remaining before every step of at most [`WAIT_STEP`].
///
/// Returns the number of sleeps performed.
pub fn wait_out<C: Clock + ?Sized>(clock: &C, total: Duration) -> usize {
    let mut remaining = total;
    let mut cycles = 0;

    loop {
        tracing::info!(
            "Rate limit hit, {:.2} minutes remaining",
            remaining.as_secs_f64() / 60.0
        );
        let step = remaining.min(WAIT_STEP);
        clock.sleep(step);
        cycles += 1;
        remaining -= step;
        if remaining.is_zero() {
            break;
        }
    }

    tracing::info!("Wait completed, continuing execution");
    cycles
}

/// Parses a `Link` header into a map of relation name to URL.
///
/// Entries look like `<https://...?page=2>; rel="next"`; malformed entries are skipped.
pub fn parse_link_header(header: &str) -> HashMap<String, String> {
    header
        .split(',')
        .filter_map(|entry| {
            let (target, params) = entry.split_once(';')?;
            let url = target.trim().strip_prefix('<')?.strip_suffix('>')?;
            let rel = params.split(';').find_map(|param| {
                let (key, value) = param.split_once('=')?;
                (key.trim() == "rel").then(|| value.trim().trim_matches('"'))
            })?;
            Some((rel.to_string(), url.to_string()))
        })
        .collect()
}

/// URL of the following page, only when the header advertises both `next` and `last`.
pub fn next_page_url(header: &str) -> Option<String> {
    let mut relations = parse_link_header(header);
    if relations.contains_key("last") {
        relations.remove("next")
    } else {
        None
    }
}
