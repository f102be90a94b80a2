use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{HarvestError, Result};
use crate::utils::config::HarvestConfig;

const USER_AGENT: &str = concat!("artifact-harvest/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Classifications the collection is commonly filtered by, with the API's ids.
pub const CLASSIFICATIONS: &[(&str, u32)] = &[
    ("Paintings", 26),
    ("Sculpture", 30),
    ("Coins", 50),
    ("Jewelry", 19),
    ("Drawings", 21),
    ("Prints", 23),
    ("Photographs", 17),
    ("Manuscripts", 185),
    ("Vessels", 57),
    ("Furniture", 76),
];

pub fn is_known_classification(label: &str) -> bool {
    CLASSIFICATIONS
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case(label))
}

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Value>,
    pub has_more: bool,
    pub total: Option<u64>,
}

/// Anything that can answer a single page request. Pages are 1-based.
pub trait PageSource {
    fn fetch_page(&self, classification: &str, page: u32, size: u32) -> Result<Page>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchInfo {
    totalrecords: Option<u64>,
    pages: Option<u64>,
    page: Option<u64>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    info: SearchInfo,
    #[serde(default)]
    records: Vec<Value>,
}

impl From<SearchResponse> for Page {
    fn from(resp: SearchResponse) -> Self {
        let has_more = match (&resp.info.next, resp.info.page, resp.info.pages) {
            (Some(_), _, _) => true,
            (None, Some(page), Some(pages)) => page < pages,
            _ => false,
        };
        Page {
            records: resp.records,
            has_more,
            total: resp.info.totalrecords,
        }
    }
}

/// `GET {base}/object` against the museum API.
pub struct HttpPageSource {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpPageSource {
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| HarvestError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
        })
    }
}

impl PageSource for HttpPageSource {
    fn fetch_page(&self, classification: &str, page: u32, size: u32) -> Result<Page> {
        let url = format!("{}/object", self.base_url);
        debug!(%url, classification, page, size, "Requesting page");
        let size = size.to_string();
        let page = page.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("classification", classification),
                ("size", size.as_str()),
                ("page", page.as_str()),
                ("hasimage", "1"),
            ])
            .send()
            .map_err(|e| HarvestError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(HarvestError::ApiResponse {
                status: status.as_u16(),
                message: truncate(&message, 200),
            });
        }

        let body: SearchResponse = response.json().map_err(|e| HarvestError::ApiResponse {
            status: status.as_u16(),
            message: format!("malformed body: {}", e.without_url()),
        })?;
        Ok(body.into())
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Keeps consecutive requests at least `min_interval` apart.
pub struct RateLimiter {
    last_request: Option<Instant>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_request: None,
            min_interval,
        }
    }

    pub fn wait(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                debug!("Rate limiting: waiting {:?}", wait_time);
                thread::sleep(wait_time);
            }
        }
        self.last_request = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): doubles each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }
}

impl From<&HarvestConfig> for RetryPolicy {
    fn from(config: &HarvestConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: config.initial_backoff,
        }
    }
}

/// Lazily walks the search results for one classification.
///
/// Ends after `target` records, when the API has no further page, or when a
/// page still fails after all retries. In the last case `termination()`
/// reports why; what was yielded before that stands.
pub struct ArtifactStream<'a, S: PageSource + ?Sized> {
    source: &'a S,
    classification: String,
    target: usize,
    page_size: u32,
    next_page: u32,
    buffered: VecDeque<Value>,
    yielded: usize,
    has_more: bool,
    total: Option<u64>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    termination: Option<String>,
}

impl<'a, S: PageSource + ?Sized> ArtifactStream<'a, S> {
    pub fn new(source: &'a S, config: &HarvestConfig, classification: &str, target: usize) -> Self {
        Self {
            source,
            classification: classification.to_string(),
            target,
            page_size: config.page_size,
            next_page: 1,
            buffered: VecDeque::new(),
            yielded: 0,
            has_more: true,
            total: None,
            limiter: RateLimiter::new(config.request_delay),
            retry: RetryPolicy::from(config),
            termination: None,
        }
    }

    /// Total matching records reported by the API, once a page has arrived.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Why the stream stopped early, if it did.
    pub fn termination(&self) -> Option<&str> {
        self.termination.as_deref()
    }

    /// Fetches the next page with retries. The cursor only moves on success.
    fn fill(&mut self) {
        let mut attempt = 0;
        loop {
            self.limiter.wait();
            match self
                .source
                .fetch_page(&self.classification, self.next_page, self.page_size)
            {
                Ok(page) => {
                    debug!(
                        page = self.next_page,
                        records = page.records.len(),
                        has_more = page.has_more,
                        "Page received"
                    );
                    self.next_page += 1;
                    self.total = page.total.or(self.total);
                    self.has_more = page.has_more && !page.records.is_empty();
                    self.buffered.extend(page.records);
                    return;
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        page = self.next_page,
                        attempt,
                        ?delay,
                        error = %e,
                        "Page request failed, retrying"
                    );
                    thread::sleep(delay);
                }
                Err(e) => {
                    warn!(page = self.next_page, error = %e, "Giving up on page");
                    self.termination = Some(format!("page {}: {}", self.next_page, e));
                    self.has_more = false;
                    return;
                }
            }
        }
    }
}

impl<S: PageSource + ?Sized> Iterator for ArtifactStream<'_, S> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        if self.yielded >= self.target {
            return None;
        }
        while self.buffered.is_empty() {
            if !self.has_more {
                debug!(yielded = self.yielded, "Source exhausted");
                return None;
            }
            self.fill();
        }
        self.yielded += 1;
        self.buffered.pop_front()
    }
}
