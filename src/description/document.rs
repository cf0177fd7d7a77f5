//! Byte-to-text normalisation and HTML parsing for detail pages.
//!
//! Detail pages sometimes declare one charset and send another, so the raw
//! body is decoded here instead of trusting the HTTP layer. Parsing goes
//! through the [`DocumentParser`] capability so a strict parser can be tried
//! first with the lenient one as fallback.

use crate::config::ParserMode;
use encoding_rs::{EUC_JP, Encoding, SHIFT_JIS, UTF_8};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use thiserror::Error;
use tracing::debug;

#[allow(clippy::expect_used)]
static CHARSET_META_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([^"'\s/>;]+)"#).expect("valid regex")
});

/// Charset declared in the first 1024 bytes, if encoding_rs knows the label.
pub fn declared_encoding(body: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&body[..body.len().min(1024)]);
    CHARSET_META_RE
        .captures(&head)
        .and_then(|c| c.get(1))
        .and_then(|m| Encoding::for_label(m.as_str().trim().as_bytes()))
}

/// Decode a page body to text.
///
/// Uses the declared charset first (UTF-8 when none); if that decode hits
/// malformed sequences, tries UTF-8, Shift_JIS and EUC-JP and keeps the first
/// clean result. Falls back to the lossy declared decode.
pub fn decode_body(body: &[u8]) -> String {
    let declared = declared_encoding(body).unwrap_or(UTF_8);
    let (text, _, had_errors) = declared.decode(body);
    if !had_errors {
        return text.into_owned();
    }

    for candidate in [UTF_8, SHIFT_JIS, EUC_JP] {
        if candidate == declared {
            continue;
        }
        let (alt, _, alt_errors) = candidate.decode(body);
        if !alt_errors {
            debug!(
                declared = declared.name(),
                used = candidate.name(),
                "Declared charset did not match body"
            );
            return alt.into_owned();
        }
    }
    text.into_owned()
}

/// Structural parse failure.
#[derive(Debug, Error)]
#[error("{parser} parser rejected document: {reason}")]
pub struct ParseFailure {
    pub parser: &'static str,
    pub reason: String,
}

/// "Parse text into a navigable document, or fail structurally."
pub trait DocumentParser {
    fn name(&self) -> &'static str;
    fn parse(&self, text: &str) -> Result<Html, ParseFailure>;
}

/// Rejects any document the HTML5 tokenizer reported errors for.
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictParser;

impl DocumentParser for StrictParser {
    fn name(&self) -> &'static str {
        "strict"
    }

    fn parse(&self, text: &str) -> Result<Html, ParseFailure> {
        let html = Html::parse_document(text);
        match html.errors.first() {
            None => Ok(html),
            Some(first) => Err(ParseFailure {
                parser: self.name(),
                reason: format!("{} error(s), first: {first}", html.errors.len()),
            }),
        }
    }
}

/// Accepts whatever the HTML5 tree builder recovers.
#[derive(Debug, Default, Clone, Copy)]
pub struct LenientParser;

impl DocumentParser for LenientParser {
    fn name(&self) -> &'static str {
        "lenient"
    }

    fn parse(&self, text: &str) -> Result<Html, ParseFailure> {
        Ok(Self::recover(text))
    }
}

impl LenientParser {
    fn recover(text: &str) -> Html {
        Html::parse_document(text)
    }
}

/// Configured parser first, lenient parser when it fails.
///
/// The lenient parser always yields a tree, so the chain never fails.
#[derive(Debug, Clone, Copy)]
pub struct ParserChain {
    mode: ParserMode,
}

impl ParserChain {
    pub fn new(mode: ParserMode) -> Self {
        Self { mode }
    }

    pub fn parse(&self, text: &str) -> Html {
        if self.mode == ParserMode::Strict {
            match StrictParser.parse(text) {
                Ok(html) => return html,
                Err(e) => debug!(error = %e, "Strict parse failed; retrying leniently"),
            }
        }
        LenientParser::recover(text)
    }
}
