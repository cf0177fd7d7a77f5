//! Command-line interface definitions for the FANZA auto-poster.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every option can be provided via a command-line flag or the environment
//! variable of the same name, which is how the scheduled job is usually run.
//! Optional tuning values left unset here fall back to the YAML config file
//! (when given) and then to built-in defaults; see [`crate::config`].

use clap::Parser;

/// Command-line arguments for the auto-poster.
///
/// # Examples
///
/// ```sh
/// # Credentials from the environment, defaults for everything else
/// fanza_autopost
///
/// # Post up to five items, preferring the video.* detail pages
/// fanza_autopost --post-limit 5 --force-detail-domain video
///
/// # Tuning values from a YAML file
/// fanza_autopost --config ./autopost.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML file with tuning values
    #[arg(short, long)]
    pub config: Option<String>,

    /// WordPress XML-RPC endpoint (e.g. https://example.com/xmlrpc.php)
    #[arg(long, env = "WP_URL")]
    pub wp_url: String,

    /// WordPress user name
    #[arg(long, env = "WP_USER")]
    pub wp_user: String,

    /// WordPress application password
    #[arg(long, env = "WP_PASS", hide_env_values = true)]
    pub wp_pass: String,

    /// DMM affiliate API id
    #[arg(long, env = "DMM_API_ID", hide_env_values = true)]
    pub dmm_api_id: String,

    /// DMM affiliate id appended to outbound links
    #[arg(long, env = "DMM_AFFILIATE_ID")]
    pub dmm_affiliate_id: String,

    /// WordPress category every post is filed under
    #[arg(long, env = "CATEGORY")]
    pub category: String,

    /// Maximum number of catalog pages to scan
    #[arg(long, env = "MAX_PAGES")]
    pub max_pages: Option<usize>,

    /// Items requested per catalog page
    #[arg(long, env = "HITS")]
    pub hits: Option<usize>,

    /// Maximum number of posts created per run
    #[arg(long, env = "POST_LIMIT")]
    pub post_limit: Option<usize>,

    /// Items released within this many days are posted before the backlog
    #[arg(long, env = "RECENT_DAYS")]
    pub recent_days: Option<i64>,

    /// Scrape detail pages for descriptions (false = catalog fields only)
    #[arg(long, env = "SCRAPE_DESC", value_parser = clap::builder::BoolishValueParser::new())]
    pub scrape_desc: Option<bool>,

    /// Pre-configured consent cookie sent with detail-page requests
    #[arg(long, env = "AGE_GATE_COOKIE")]
    pub age_gate_cookie: Option<String>,

    /// Detail-page domain tried first: www, video, or none
    #[arg(long, env = "FORCE_DETAIL_DOMAIN")]
    pub force_detail_domain: Option<String>,

    /// HTML parser used for detail pages: strict (falls back to lenient) or lenient
    #[arg(long, env = "PARSER_MODE")]
    pub parser_mode: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 13] = [
        "fanza_autopost",
        "--wp-url",
        "https://blog.example/xmlrpc.php",
        "--wp-user",
        "editor",
        "--wp-pass",
        "secret",
        "--dmm-api-id",
        "api",
        "--dmm-affiliate-id",
        "aff-990",
        "--category",
        "VR",
    ];

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(REQUIRED);

        assert_eq!(cli.wp_url, "https://blog.example/xmlrpc.php");
        assert_eq!(cli.dmm_affiliate_id, "aff-990");
        assert_eq!(cli.category, "VR");
        assert!(cli.post_limit.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_tuning_flags() {
        let mut args = REQUIRED.to_vec();
        args.extend([
            "-c",
            "/tmp/autopost.yaml",
            "--post-limit",
            "5",
            "--scrape-desc",
            "0",
            "--force-detail-domain",
            "video",
        ]);
        let cli = Cli::parse_from(args);

        assert_eq!(cli.config.as_deref(), Some("/tmp/autopost.yaml"));
        assert_eq!(cli.post_limit, Some(5));
        assert_eq!(cli.scrape_desc, Some(false));
        assert_eq!(cli.force_detail_domain.as_deref(), Some("video"));
    }
}
