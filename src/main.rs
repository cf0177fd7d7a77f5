//! # FANZA VR auto-poster
//!
//! Posts newly released VR titles from the DMM/FANZA affiliate catalog to a
//! WordPress blog, each with a human-readable description scraped from the
//! product's detail page.
//!
//! ## Usage
//!
//! ```sh
//! WP_URL=https://example.com/xmlrpc.php WP_USER=editor WP_PASS=... \
//! DMM_API_ID=... DMM_AFFILIATE_ID=... CATEGORY=VR fanza_autopost
//! ```
//!
//! ## Architecture
//!
//! The run follows a pipeline:
//! 1. **Catalog**: page through the affiliate API (keyword `VR`, with fallback)
//! 2. **Filtering**: keep released VR titles, newest first, recent before backlog
//! 3. **Description**: candidate detail pages → age gate → extraction → fallback
//! 4. **Publishing**: thumbnail upload and `wp.newPost` over XML-RPC, up to the post limit

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod catalog;
mod cli;
mod config;
mod description;
mod filters;
mod job;
mod models;
mod post;
mod publish;
mod utils;
mod xmlrpc;

use catalog::{DmmCatalogClient, RetryCatalog};
use cli::Cli;
use config::{FileConfig, Settings};
use description::HttpPageFetcher;
use job::BatchJob;
use publish::WordPressClient;

const CATALOG_MAX_RETRIES: usize = 3;
const CATALOG_BASE_DELAY: Duration = Duration::from_secs(1);

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "fanza_autopost starting up");

    // --- Configuration ---
    let args = Cli::parse();
    let file_config = match args.config.as_deref() {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = match Settings::from_sources(&args, file_config) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    debug!(
        max_pages = settings.catalog.max_pages,
        hits = settings.catalog.hits,
        post_limit = settings.batch.post_limit,
        recent_days = settings.batch.recent_days,
        "Resolved settings"
    );
    info!(
        scrape = settings.resolver.scrape,
        domain = ?settings.resolver.domain_preference,
        parser = ?settings.resolver.parser_mode,
        cookie = settings.resolver.age_gate_cookie.is_some(),
        "Description scraping configured"
    );

    // --- Clients ---
    let catalog = RetryCatalog::new(
        DmmCatalogClient::new(&settings.catalog)?,
        CATALOG_MAX_RETRIES,
        CATALOG_BASE_DELAY,
    );
    let publisher = WordPressClient::new(&settings.publish)?;
    let fetcher = HttpPageFetcher::new(&settings.resolver)?;

    // --- Run ---
    let job = BatchJob::new(catalog, publisher, fetcher, &settings);
    let summary = match job.run(filters::now_jst()).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Catalog scan failed; nothing posted");
            return Err(e.into());
        }
    };

    let elapsed = start_time.elapsed();
    info!(
        posted = summary.posted,
        already_published = summary.already_published,
        no_images = summary.no_images,
        failed = summary.failed,
        elapsed_secs = elapsed.as_secs_f64(),
        "{summary}"
    );
    Ok(())
}
