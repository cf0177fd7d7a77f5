//! DMM affiliate API (`ItemList` v3) client with retry and paging.
//!
//! # Architecture
//!
//! - [`CatalogSource`]: one page of catalog items for an offset
//! - [`DmmCatalogClient`]: the HTTP implementation
//! - [`RetryCatalog`]: decorator adding exponential backoff with jitter
//! - [`fetch_all_pages`]: paging loop with the keyword fallback
//!
//! # Retry Strategy
//!
//! Only transient failures (transport errors, 5xx, 429) are retried:
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```

use crate::config::CatalogSettings;
use crate::models::CatalogItem;
use crate::utils::truncate_for_log;
use rand::{Rng, rng};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

pub const DMM_API_URL: &str = "https://api.dmm.com/affiliate/v3/ItemList";
pub const VR_KEYWORD: &str = "VR";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("catalog API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("catalog API error ({status}): {message}")]
    Api { status: String, message: String },
    #[error("catalog response did not decode: {0}")]
    Decode(#[from] serde_json::Error),
}

impl CatalogError {
    /// Worth retrying the same request.
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Transport(_) => true,
            CatalogError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            _ => false,
        }
    }
}

/// Source of catalog pages.
pub trait CatalogSource {
    /// Items at 1-based `offset`, optionally narrowed by `keyword`.
    async fn fetch_page(
        &self,
        offset: usize,
        keyword: Option<&str>,
    ) -> Result<Vec<CatalogItem>, CatalogError>;
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    result: ApiResult,
}

#[derive(Debug, Default, Deserialize)]
struct ApiResult {
    #[serde(default)]
    status: Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Option<Value>,
    #[serde(default)]
    items: Vec<CatalogItem>,
}

impl ApiResult {
    /// `status` is 200 (number or string) or absent.
    fn is_ok(&self) -> bool {
        match &self.status {
            Value::Null => true,
            Value::Number(n) => n.as_u64() == Some(200),
            Value::String(s) => s.trim() == "200",
            _ => false,
        }
    }

    fn error_message(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.errors.as_ref().map(Value::to_string))
            .unwrap_or_default()
    }
}

/// Decode an `ItemList` body, turning API-level errors into [`CatalogError::Api`].
pub fn parse_item_list(body: &str) -> Result<Vec<CatalogItem>, CatalogError> {
    let envelope: ApiEnvelope = serde_json::from_str(body)?;
    let result = envelope.result;
    if !result.is_ok() {
        let status = match &result.status {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(CatalogError::Api {
            message: result.error_message(),
            status,
        });
    }
    Ok(result.items)
}

/// Query parameters for one `ItemList` page.
pub fn page_query(
    settings: &CatalogSettings,
    offset: usize,
    keyword: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("api_id", settings.api_id.clone()),
        ("affiliate_id", settings.affiliate_id.clone()),
        ("site", "FANZA".to_string()),
        ("service", "digital".to_string()),
        ("floor", "videoa".to_string()),
        ("sort", "date".to_string()),
        ("output", "json".to_string()),
        ("hits", settings.hits.to_string()),
        ("offset", offset.to_string()),
    ];
    if let Some(k) = keyword {
        query.push(("keyword", k.to_string()));
    }
    query
}

/// `reqwest`-backed [`CatalogSource`].
#[derive(Debug, Clone)]
pub struct DmmCatalogClient {
    client: Client,
    settings: CatalogSettings,
}

impl DmmCatalogClient {
    pub fn new(settings: &CatalogSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            settings: settings.clone(),
        })
    }
}

impl CatalogSource for DmmCatalogClient {
    #[instrument(level = "info", skip(self))]
    async fn fetch_page(
        &self,
        offset: usize,
        keyword: Option<&str>,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        let t0 = Instant::now();
        let response = self
            .client
            .get(DMM_API_URL)
            .query(&page_query(&self.settings, offset, keyword))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            error!(status = status.as_u16(), body = %truncate_for_log(&body, 2000), "Catalog API error response");
            return Err(CatalogError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body, 200),
            });
        }
        let items = parse_item_list(&body)?;
        info!(count = items.len(), elapsed_ms = t0.elapsed().as_millis() as u64, "Fetched catalog page");
        Ok(items)
    }
}

/// Wrapper that adds exponential backoff retry to any [`CatalogSource`].
pub struct RetryCatalog<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: CatalogSource> RetryCatalog<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryCatalog<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryCatalog")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: CatalogSource> CatalogSource for RetryCatalog<T> {
    async fn fetch_page(
        &self,
        offset: usize,
        keyword: Option<&str>,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch_page(offset, keyword).await {
                Ok(items) => return Ok(items),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "fetch_page() exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self
                        .base_delay
                        .saturating_mul(1 << (attempt - 1).min(16))
                        .min(self.max_delay);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "fetch_page() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Page through the catalog, newest first.
///
/// Each page is requested with the VR keyword first and, if that fails,
/// once more without it. A page that fails both ways or comes back empty
/// ends the scan. Fails only when not a single page could be fetched.
///
/// # Arguments
///
/// * `source` - Page source, usually a [`RetryCatalog`]
/// * `max_pages` - Upper bound on pages requested
/// * `hits` - Page size; offsets advance by this much
///
/// # Returns
///
/// Every item from the pages fetched, in catalog order, or the first
/// page's error when the scan never got started.
#[instrument(level = "info", skip(source))]
pub async fn fetch_all_pages<S: CatalogSource>(
    source: &S,
    max_pages: usize,
    hits: usize,
) -> Result<Vec<CatalogItem>, CatalogError> {
    let mut all = Vec::new();

    for page in 0..max_pages {
        let offset = 1 + page * hits;
        let items = match source.fetch_page(offset, Some(VR_KEYWORD)).await {
            Ok(items) => items,
            Err(e) => {
                warn!(page = page + 1, offset, error = %e, "Keyword query failed; retrying without keyword");
                match source.fetch_page(offset, None).await {
                    Ok(items) => items,
                    Err(e) if page == 0 => return Err(e),
                    Err(e) => {
                        warn!(page = page + 1, offset, error = %e, "Query without keyword failed too; stopping scan");
                        break;
                    }
                }
            }
        };
        info!(page = page + 1, offset, count = items.len(), "Catalog page received");
        if items.is_empty() {
            break;
        }
        all.extend(items);
    }

    info!(total = all.len(), "Catalog scan finished");
    Ok(all)
}
