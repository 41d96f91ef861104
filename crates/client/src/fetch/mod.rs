//! Page fetching: plain HTTP and scripted browser sessions.
//!
//! ### Plain fetch
//! - Canonicalize the URL (default `https`, lowercase host, drop fragment).
//! - Bounded retries with exponential backoff on network errors, timeouts,
//!   408/429 and 5xx. Other statuses fail immediately.
//! - Max body bytes: 10MB (configurable)
//!
//! ### Content-type probe
//! - `HEAD` first, `GET` when the server rejects `HEAD`; same retry policy.
//!
//! ### Scripted fetch
//! - See [`browser`]: headless Chrome, scroll-and-wait, lazy image forcing.

pub mod browser;
pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use std::future::Future;
use std::time::{Duration, Instant};

pub use self::url::{UrlError, canonicalize, parse_absolute};
pub use browser::{BrowserError, BrowserFetcher, ScrollConfig};

use ::url::Url;
use webpaper_core::{AppConfig, Error, PageContent};

/// Longest wait between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 10)
    pub max_redirects: usize,

    /// Attempts per request, including the first (default: 5)
    pub max_retries: u32,

    /// Base backoff, doubled after every failed attempt (default: 500ms)
    pub retry_backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

impl FetchConfig {
    /// Derive fetch settings from the application configuration.
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: 10,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
        }
    }
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The final URL after redirects
    pub final_url: Url,
    /// Response body bytes
    pub bytes: Bytes,
}

impl FetchResponse {
    /// Decode the body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// HTTP fetch client with bounded retries.
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Fetch a URL, retrying transient failures.
    pub async fn fetch(&self, url_str: &str) -> Result<FetchResponse, Error> {
        let url = canonicalize(url_str).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        self.with_retry("fetch", || self.fetch_once(&url)).await
    }

    /// Probe the `Content-Type` a URL is served with.
    ///
    /// Returns `Ok(None)` when the server answers without the header.
    pub async fn content_type(&self, url: &Url) -> Result<Option<String>, Error> {
        self.with_retry("content-type probe", || self.probe_once(url)).await
    }

    async fn fetch_once(&self, url: &Url) -> Result<FetchResponse, Error> {
        let start = Instant::now();

        let response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let final_url = response.url().clone();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!(
                "{} bytes exceeds {}",
                bytes.len(),
                self.config.max_bytes
            )));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(%url, %final_url, fetch_ms, bytes = bytes.len(), "fetched page");

        Ok(FetchResponse { final_url, bytes })
    }

    async fn probe_once(&self, url: &Url) -> Result<Option<String>, Error> {
        let response = self.http.head(url.as_str()).send().await.map_err(map_reqwest_error)?;
        let status = response.status();

        let response = if status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::NOT_IMPLEMENTED {
            tracing::debug!(%url, status = status.as_u16(), "HEAD rejected, probing with GET");
            self.http.get(url.as_str()).send().await.map_err(map_reqwest_error)?
        } else {
            response
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        Ok(header_value(response.headers(), header::CONTENT_TYPE))
    }

    async fn with_retry<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = backoff_delay(self.config.retry_backoff, attempt);
                    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "{what} failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Delay before the attempt following `attempt` (1-based).
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

fn map_reqwest_error(e: reqwest::Error) -> Error {
    if e.is_timeout() { Error::FetchTimeout(e.to_string()) } else { Error::HttpError(format!("network error: {}", e)) }
}

fn header_value(headers: &header::HeaderMap, name: header::HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(|s| s.to_string())
}

/// Where pipeline stages get page markup from.
///
/// The extractor and the provider only talk to this trait, so tests can hand
/// them canned pages.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Plain HTTP fetch.
    async fn fetch(&self, url: &Url) -> Result<PageContent, Error>;

    /// Fetch through a scripted browser session that materializes lazy content.
    async fn fetch_rendered(&self, url: &Url) -> Result<PageContent, Error>;

    /// Probe the content type the URL is served with.
    async fn content_type(&self, url: &Url) -> Result<Option<String>, Error>;
}

/// Network-backed [`PageSource`]: reqwest for plain fetches, headless Chrome for
/// scripted ones.
pub struct WebPageSource {
    http: FetchClient,
    browser: Option<BrowserFetcher>,
}

impl WebPageSource {
    pub fn new(http: FetchClient, browser: Option<BrowserFetcher>) -> Self {
        Self { http, browser }
    }

    /// Build both fetchers from the application configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let http = FetchClient::new(FetchConfig::from_app(config))?;
        let browser = config.browser_enabled.then(|| BrowserFetcher::from_app(config));
        Ok(Self::new(http, browser))
    }
}

#[async_trait]
impl PageSource for WebPageSource {
    async fn fetch(&self, url: &Url) -> Result<PageContent, Error> {
        let response = self.http.fetch(url.as_str()).await?;
        Ok(PageContent::new(response.final_url.clone(), response.text()))
    }

    async fn fetch_rendered(&self, url: &Url) -> Result<PageContent, Error> {
        let browser = self.browser.as_ref().ok_or(Error::BrowserDisabled)?;
        Ok(browser.fetch_rendered(url).await?)
    }

    async fn content_type(&self, url: &Url) -> Result<Option<String>, Error> {
        self.http.content_type(url).await
    }
}
