//! HTTP fetcher implementation
//!
//! This module handles all network I/O for the crawler, including:
//! - Building HTTP clients with the configured user agent and timeouts
//! - robots.txt enforcement per origin
//! - Retry logic for transient failures
//! - Redirect following (reqwest, at most 10 hops)
//!
//! Everything above the `Fetcher` trait only ever sees a `Response` or a
//! `FetchError`; it never retries on its own.

use crate::config::Config;
use crate::crawler::request::{FetchRequest, Method, Response};
use crate::robots::{fetch_robots, origin_key, RobotsCache};
use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Maximum redirect hops followed for one request
pub const MAX_REDIRECTS: usize = 10;

/// Errors surfaced by the transport
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Blocked by robots.txt: {0}")]
    RobotsDenied(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FetchError {
    fn from_reqwest(url: &url::Url, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout(url.to_string())
        } else if error.is_connect() {
            FetchError::Connect(format!("{}: {}", url, error))
        } else {
            FetchError::Http(error)
        }
    }
}

/// Asynchronous fetch transport
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches a request, following redirects and retrying transient failures
    async fn fetch(&self, request: &FetchRequest) -> Result<Response, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The full configuration (user agent and timeouts)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use steam_scraper::config::Config;
/// use steam_scraper::crawler::build_http_client;
///
/// let client = build_http_client(&Config::default()).unwrap();
/// ```
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.name.clone())
        .timeout(Duration::from_secs(config.crawler.request_timeout))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `Fetcher` backed by reqwest
pub struct HttpFetcher {
    client: Client,
    robots: Option<RobotsCache>,
    user_agent: String,
    retry_times: u32,
}

impl HttpFetcher {
    /// Creates a fetcher from configuration
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            robots: config.robots.obey.then(RobotsCache::new),
            user_agent: config.user_agent.name.clone(),
            retry_times: config.crawler.retry_times,
        })
    }

    /// Checks the request URL against its origin's robots.txt
    async fn check_robots(&self, request: &FetchRequest) -> Result<(), FetchError> {
        let Some(cache) = &self.robots else {
            return Ok(());
        };

        let key = origin_key(request.url());
        let robots = match cache.get(&key) {
            Some(robots) => robots,
            None => {
                let robots = fetch_robots(&self.client, request.url()).await;
                cache.insert(&key, robots.clone());
                robots
            }
        };

        if robots.is_allowed(request.url(), &self.user_agent) {
            Ok(())
        } else {
            tracing::warn!("URL {} disallowed by robots.txt", request.url());
            Err(FetchError::RobotsDenied(request.url().to_string()))
        }
    }

    /// Sends one attempt of a request
    async fn send_once(&self, request: &FetchRequest) -> Result<Response, reqwest::Error> {
        let mut builder = match request.method() {
            Method::Get => self.client.get(request.url().clone()),
            Method::Post => self.client.post(request.url().clone()),
        };

        if let Some(form) = request.form() {
            builder = builder.form(form);
        }

        if !request.cookies().is_empty() {
            let cookie = request
                .cookies()
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, cookie);
        }

        let started = Instant::now();
        let response = builder.send().await?;

        let url = response.url().clone();
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            url,
            status,
            headers,
            body,
            request: request.clone(),
            from_cache: false,
            latency: started.elapsed(),
        })
    }
}

/// Whether an attempt should be repeated
fn is_retryable(result: &Result<Response, reqwest::Error>) -> bool {
    match result {
        Ok(response) => response.status >= 500,
        Err(e) => e.is_timeout() || e.is_connect(),
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    /// Fetches a URL with robots.txt enforcement and retry logic
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 5xx | Retry up to `retry-times` |
    /// | Timeout | Retry up to `retry-times` |
    /// | Connection refused | Retry up to `retry-times` |
    /// | Other errors | Fail immediately |
    ///
    /// A 5xx response that survives every retry is returned as a response;
    /// the status stage of the pipeline decides what to do with it.
    async fn fetch(&self, request: &FetchRequest) -> Result<Response, FetchError> {
        self.check_robots(request).await?;

        let mut attempt = 0;
        loop {
            let result = self.send_once(request).await;

            if attempt < self.retry_times && is_retryable(&result) {
                attempt += 1;
                tracing::debug!(
                    "Retrying {} (attempt {}/{})",
                    request.url(),
                    attempt,
                    self.retry_times
                );
                tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
                continue;
            }

            return result.map_err(|e| FetchError::from_reqwest(request.url(), e));
        }
    }
}
