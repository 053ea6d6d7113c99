//! HTTP GET and JSON POST with bounded retries.
//!
//! Timeouts, network errors and non-terminal statuses are retried after a
//! fixed delay. Statuses in [`TERMINAL_STATUSES`] wait one delay and stop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use encoding_rs::Encoding;
use scraper::Html;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

pub const TERMINAL_STATUSES: &[u16] = &[401, 403, 404, 514];

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

// Query parameters masked before a URL reaches logs or errors.
const SECRET_PARAMS: &[&str] = &["token", "key", "apikey", "api_key"];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(40);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("unexpected error: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url} returned terminal status {status}")]
    Terminal { url: String, status: u16 },
    #[error("{url} failed after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: TransportError,
    },
}

impl From<FetchError> for fw_core::Error {
    fn from(e: FetchError) -> Self {
        fw_core::Error::Fetch(e.to_string())
    }
}

/// `url` with credential query values masked.
pub fn redact(url: &str) -> String {
    let is_secret = |key: &str| SECRET_PARAMS.contains(&key);
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.query_pairs().any(|(k, _)| is_secret(&k)) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| {
                    let v = if is_secret(&k) { "***".to_string() } else { v.into_owned() };
                    (k.into_owned(), v)
                })
                .collect();
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}

/// A single request, without retries.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `encoding` forces the charset used to decode the body.
    async fn get(&self, url: &str, encoding: Option<&'static str>) -> Result<String, TransportError>;

    async fn post_json(&self, url: &str, body: &Value) -> Result<String, TransportError>;
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> fw_core::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    // reqwest puts the URL in its message; it may carry a token.
    let e = e.without_url();
    if e.is_timeout() {
        TransportError::Timeout
    } else if let Some(status) = e.status() {
        TransportError::Status(status.as_u16())
    } else if e.is_connect() || e.is_request() || e.is_body() {
        TransportError::Network(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, encoding: Option<&'static str>) -> Result<String, TransportError> {
        let response = self.client.get(url).send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        match encoding {
            Some(label) => {
                let encoding = Encoding::for_label(label.as_bytes())
                    .ok_or_else(|| TransportError::Other(format!("unknown encoding '{}'", label)))?;
                let bytes = response.bytes().await.map_err(classify)?;
                let (text, _, had_errors) = encoding.decode(&bytes);
                if had_errors {
                    debug!(url = %redact(url), encoding = label, "body contained undecodable bytes");
                }
                Ok(text.into_owned())
            }
            None => response.text().await.map_err(classify),
        }
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<String, TransportError> {
        let response = self.client.post(url).json(body).send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        response.text().await.map_err(classify)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// A fetched response body.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub body: String,
}

impl Page {
    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }
}

#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new() -> fw_core::Result<Self> {
        Ok(Self::with_parts(
            Arc::new(ReqwestTransport::new()?),
            Arc::new(TokioSleeper),
            RetryPolicy::default(),
        ))
    }

    pub fn with_parts(transport: Arc<dyn Transport>, sleeper: Arc<dyn Sleeper>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    /// Same transport and clock with a different retry policy.
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_with_encoding(url, None).await
    }

    pub async fn fetch_page(&self, url: &str, encoding: Option<&'static str>) -> Result<Page, FetchError> {
        let body = self.fetch_with_encoding(url, encoding).await?;
        Ok(Page {
            url: url.to_string(),
            body,
        })
    }

    pub async fn fetch_with_encoding(&self, url: &str, encoding: Option<&'static str>) -> Result<String, FetchError> {
        self.with_retries("GET", url, || self.transport.get(url, encoding)).await
    }

    /// POST `body` as JSON, with the same retry rules as GET.
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<String, FetchError> {
        self.with_retries("POST", url, || self.transport.post_json(url, body)).await
    }

    async fn with_retries<F, Fut>(&self, method: &str, url: &str, request: F) -> Result<String, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<String, TransportError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let shown = redact(url);
        let mut last = None;

        for attempt in 1..=max_attempts {
            debug!(url = %shown, attempt, max_attempts, "{}", method);
            match request().await {
                Ok(body) => return Ok(body),
                Err(TransportError::Status(status)) if TERMINAL_STATUSES.contains(&status) => {
                    warn!(url = %shown, status, "Terminal HTTP status, not retrying");
                    self.sleeper.sleep(self.policy.delay).await;
                    return Err(FetchError::Terminal { url: shown, status });
                }
                Err(e) => {
                    match &e {
                        TransportError::Other(_) => error!(url = %shown, attempt, "Unexpected fetch error: {}", e),
                        _ => warn!(url = %shown, attempt, "Fetch failed: {}", e),
                    }
                    last = Some(e);
                    if attempt < max_attempts {
                        self.sleeper.sleep(self.policy.delay).await;
                    }
                }
            }
        }

        Err(FetchError::Exhausted {
            url: shown,
            attempts: max_attempts,
            last: last.unwrap_or_else(|| TransportError::Other("no attempt made".to_string())),
        })
    }
}
