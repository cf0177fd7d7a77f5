//! Run configuration, built once at start-up.
//!
//! Values are merged from three layers, highest precedence first:
//! 1. command-line flags / environment variables ([`Cli`])
//! 2. the optional YAML file ([`FileConfig`])
//! 3. built-in defaults
//!
//! The merged [`Settings`] is immutable and passed by reference to the
//! catalog client, the description resolver, the publisher and the batch job.
//! Nothing below `main` reads the environment.

use crate::cli::Cli;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

pub const DEFAULT_MAX_PAGES: usize = 6;
pub const DEFAULT_HITS: usize = 30;
pub const DEFAULT_POST_LIMIT: usize = 2;
pub const DEFAULT_RECENT_DAYS: i64 = 3;

/// Errors raised while assembling [`Settings`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid YAML in config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("{0} must not be empty")]
    Missing(&'static str),
}

/// Which detail-page domain is tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DomainPreference {
    #[default]
    Www,
    Video,
    /// Keep generation order.
    None,
}

impl DomainPreference {
    /// Host prefix of the preferred domain, if any.
    pub fn host_prefix(self) -> Option<&'static str> {
        match self {
            DomainPreference::Www => Some("www."),
            DomainPreference::Video => Some("video."),
            DomainPreference::None => None,
        }
    }
}

impl FromStr for DomainPreference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "www" => Ok(DomainPreference::Www),
            "video" => Ok(DomainPreference::Video),
            "" | "none" | "off" => Ok(DomainPreference::None),
            _ => Err(ConfigError::InvalidValue {
                key: "FORCE_DETAIL_DOMAIN",
                value: s.to_string(),
            }),
        }
    }
}

/// Which HTML parser is tried first on detail pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserMode {
    /// Strict first, lenient on failure.
    #[default]
    Strict,
    Lenient,
}

impl FromStr for ParserMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ParserMode::Strict),
            "lenient" => Ok(ParserMode::Lenient),
            _ => Err(ConfigError::InvalidValue {
                key: "PARSER_MODE",
                value: s.to_string(),
            }),
        }
    }
}

/// Optional tuning values read from YAML. Credentials are never read from file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub max_pages: Option<usize>,
    pub hits: Option<usize>,
    pub post_limit: Option<usize>,
    pub recent_days: Option<i64>,
    pub scrape_desc: Option<bool>,
    pub age_gate_cookie: Option<String>,
    pub force_detail_domain: Option<String>,
    pub parser_mode: Option<String>,
}

impl FileConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    #[instrument(level = "info", skip_all, fields(%path))]
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let parsed = Self::from_yaml_str(&raw)?;
        info!("Loaded config file");
        Ok(parsed)
    }
}

/// Catalog API access and scan bounds.
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub api_id: String,
    pub affiliate_id: String,
    pub max_pages: usize,
    pub hits: usize,
}

/// Detail-page scraping behaviour.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// When false, descriptions come from catalog fields only.
    pub scrape: bool,
    pub age_gate_cookie: Option<String>,
    pub domain_preference: DomainPreference,
    pub parser_mode: ParserMode,
    pub request_timeout: Duration,
    /// Pause after a transport failure before the next candidate.
    pub failure_delay: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            scrape: true,
            age_gate_cookie: None,
            domain_preference: DomainPreference::Www,
            parser_mode: ParserMode::Strict,
            request_timeout: Duration::from_secs(12),
            failure_delay: Duration::from_millis(200),
        }
    }
}

/// WordPress endpoint and credentials.
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub category: String,
}

/// Batch bounds.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub post_limit: usize,
    pub recent_days: i64,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub catalog: CatalogSettings,
    pub resolver: ResolverSettings,
    pub publish: PublishSettings,
    pub batch: BatchSettings,
}

impl Settings {
    /// Merge CLI/env values over the optional file config and defaults.
    pub fn from_sources(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let required = |key: &'static str, value: &str| -> Result<String, ConfigError> {
            let v = value.trim();
            if v.is_empty() {
                Err(ConfigError::Missing(key))
            } else {
                Ok(v.to_string())
            }
        };

        let domain_preference = cli
            .force_detail_domain
            .clone()
            .or(file.force_detail_domain)
            .map(|s| s.parse::<DomainPreference>())
            .transpose()?
            .unwrap_or_default();
        let parser_mode = cli
            .parser_mode
            .clone()
            .or(file.parser_mode)
            .map(|s| s.parse::<ParserMode>())
            .transpose()?
            .unwrap_or_default();
        let age_gate_cookie = cli
            .age_gate_cookie
            .clone()
            .or(file.age_gate_cookie)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let hits = cli.hits.or(file.hits).unwrap_or(DEFAULT_HITS);
        if hits == 0 {
            return Err(ConfigError::InvalidValue {
                key: "HITS",
                value: hits.to_string(),
            });
        }

        Ok(Settings {
            catalog: CatalogSettings {
                api_id: required("DMM_API_ID", &cli.dmm_api_id)?,
                affiliate_id: required("DMM_AFFILIATE_ID", &cli.dmm_affiliate_id)?,
                max_pages: cli.max_pages.or(file.max_pages).unwrap_or(DEFAULT_MAX_PAGES),
                hits,
            },
            resolver: ResolverSettings {
                scrape: cli.scrape_desc.or(file.scrape_desc).unwrap_or(true),
                age_gate_cookie,
                domain_preference,
                parser_mode,
                ..ResolverSettings::default()
            },
            publish: PublishSettings {
                endpoint: required("WP_URL", &cli.wp_url)?,
                username: required("WP_USER", &cli.wp_user)?,
                password: required("WP_PASS", &cli.wp_pass)?,
                category: required("CATEGORY", &cli.category)?,
            },
            batch: BatchSettings {
                post_limit: cli.post_limit.or(file.post_limit).unwrap_or(DEFAULT_POST_LIMIT),
                recent_days: cli
                    .recent_days
                    .or(file.recent_days)
                    .unwrap_or(DEFAULT_RECENT_DAYS),
            },
        })
    }
}
