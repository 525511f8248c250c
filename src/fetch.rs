use crate::config::UpstreamConfig;
use crate::error::FetchError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER, USER_AGENT};
use reqwest::{Client, Response};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

const BROWSER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub struct ThrottledFetch {
    client: Client,
    retries: u32,
    throttle_backoff: Duration,
    error_backoff: Duration,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl ThrottledFetch {
    pub fn new(config: &UpstreamConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .default_headers(browser_headers(&config.base_url))
            .build()
            .map_err(FetchError::from_reqwest)?;

        Ok(Self {
            client,
            retries: config.retries,
            throttle_backoff: Duration::from_millis(config.throttle_backoff_ms),
            error_backoff: Duration::from_millis(config.error_backoff_ms),
            min_interval: Duration::from_millis(config.min_request_interval_ms),
            last_request: Mutex::new(None),
        })
    }

    /// GETs `url`, retrying after a backoff on 429/403, other non-2xx
    /// statuses, timeouts and transport errors.
    ///
    /// Returns the last failure once retries are exhausted; callers treat
    /// that as "no data" for this call rather than a fatal error.
    pub async fn get(&self, url: &str) -> Result<Response, FetchError> {
        let mut attempt = 0;
        loop {
            let err = match self.attempt(url).await {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };

            if attempt >= self.retries {
                warn!("Giving up on {} after {} attempt(s): {}", url, attempt + 1, err);
                return Err(err);
            }

            let backoff = if err.is_throttled() {
                self.throttle_backoff
            } else {
                self.error_backoff
            };
            debug!("Retrying {} in {:?} after: {}", url, backoff, err);
            sleep(backoff).await;
            attempt += 1;
        }
    }

    // The request future owns its timeout, so dropping it on any path
    // releases the timer.
    async fn attempt(&self, url: &str) -> Result<Response, FetchError> {
        self.wait_turn().await;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(resp)
    }

    async fn wait_turn(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let next = prev + self.min_interval;
            if next > Instant::now() {
                tokio::time::sleep_until(next).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn browser_headers(base_url: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    // Referer/Origin mirror the upstream's own site; skip them if the base
    // URL isn't a valid header value.
    let site = base_url.replace("://api.", "://www.");
    let site = site.trim_end_matches('/');
    if let Ok(origin) = HeaderValue::from_str(site) {
        headers.insert(ORIGIN, origin);
    }
    if let Ok(referer) = HeaderValue::from_str(&format!("{}/", site)) {
        headers.insert(REFERER, referer);
    }
    headers
}
