//! Detail-page retrieval.
//!
//! The fetcher only classifies responses; it never looks inside the body.
//! 404 short-circuits as [`FetchResult::NotFound`], transport problems
//! (timeouts included) become [`FetchResult::TransportError`], and any other
//! status hands back the raw bytes for the decoder to deal with.

use crate::config::ResolverSettings;
use crate::models::FetchResult;
use reqwest::header::{ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::time::Instant;
use tracing::{debug, instrument};

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";
pub const ACCEPT_LANGUAGE_VALUE: &str = "ja,en-US;q=0.9,en;q=0.8";
pub const REFERER_VALUE: &str = "https://video.dmm.co.jp/";

/// Retrieves one candidate URL and classifies the outcome.
pub trait PageFetcher {
    async fn fetch(&self, url: &str) -> FetchResult;
}

/// Map a response status to its short-circuit outcome, if any.
pub fn classify_status(status: StatusCode) -> Option<FetchResult> {
    (status == StatusCode::NOT_FOUND).then_some(FetchResult::NotFound)
}

/// Browser-like headers, plus the configured consent cookie when present.
pub fn default_headers(cookie: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DESKTOP_USER_AGENT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));
    headers.insert(REFERER, HeaderValue::from_static(REFERER_VALUE));
    if let Some(value) = cookie.and_then(|c| HeaderValue::from_str(c).ok()) {
        headers.insert(COOKIE, value);
    }
    headers
}

/// `reqwest`-backed fetcher with a fixed per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(settings: &ResolverSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .default_headers(default_headers(settings.age_gate_cookie.as_deref()))
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpPageFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> FetchResult {
        let t0 = Instant::now();
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return FetchResult::TransportError(e.to_string()),
        };
        let status = response.status();
        if let Some(short) = classify_status(status) {
            return short;
        }
        match response.bytes().await {
            Ok(body) => {
                debug!(
                    status = status.as_u16(),
                    bytes = body.len(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "Fetched detail page"
                );
                FetchResult::Success {
                    body: body.to_vec(),
                    status: status.as_u16(),
                }
            }
            Err(e) => FetchResult::TransportError(e.to_string()),
        }
    }
}
