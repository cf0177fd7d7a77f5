//! Description resolution: candidate URLs → fetch → age gate → extract → fallback.
//!
//! Per candidate, in generator order:
//! - `NotFound` → next candidate, nothing else runs
//! - `TransportError` → log, pause, next candidate
//! - age-gated body → log, next candidate, no extraction
//! - main-body hit → done (`Tier::MainBody`)
//! - metadata hit → done (`OpenGraph` / `MetaDescription` / `StructuredData`)
//! - otherwise → next candidate
//!
//! When the list is exhausted the catalog field and synthesized tiers take
//! over, so [`DescriptionResolver::resolve`] always returns text.

use super::age_gate::is_age_gated;
use super::candidates::generate_candidate_urls;
use super::document::{ParserChain, decode_body};
use super::fallback::fallback_description;
use super::fetcher::PageFetcher;
use super::main_body::extract_main_body;
use super::metadata::extract_metadata;
use crate::config::ResolverSettings;
use crate::models::{CatalogItem, ExtractionCandidate, FetchResult, ResolvedDescription, Tier};
use crate::utils::truncate_for_log;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// What one candidate URL came to.
#[derive(Debug)]
enum Attempt {
    NotFound,
    TransportError(String),
    Blocked,
    NoContent,
    Extracted(ExtractionCandidate),
}

/// Run both extractors on already-decoded page text.
///
/// The age gate is checked first; a gated page is never handed to an extractor.
fn inspect_page(text: &str, parser: &ParserChain) -> Attempt {
    if is_age_gated(text) {
        return Attempt::Blocked;
    }
    let doc = parser.parse(text);
    match extract_main_body(&doc).or_else(|| extract_metadata(&doc)) {
        Some(found) => Attempt::Extracted(found),
        None => Attempt::NoContent,
    }
}

/// Drives the fallback ladder for one item at a time.
#[derive(Debug)]
pub struct DescriptionResolver<'a, F> {
    fetcher: F,
    settings: &'a ResolverSettings,
    parser: ParserChain,
}

impl<'a, F: PageFetcher> DescriptionResolver<'a, F> {
    pub fn new(fetcher: F, settings: &'a ResolverSettings) -> Self {
        Self {
            fetcher,
            parser: ParserChain::new(settings.parser_mode),
            settings,
        }
    }

    async fn attempt(&self, url: &str) -> Attempt {
        match self.fetcher.fetch(url).await {
            FetchResult::NotFound => Attempt::NotFound,
            FetchResult::TransportError(cause) => Attempt::TransportError(cause),
            FetchResult::Success { body, status } => {
                let text = decode_body(&body);
                debug!(%url, status, chars = text.len(), "Decoded detail page");
                inspect_page(&text, &self.parser)
            }
        }
    }

    /// Best available description for `item`, whose detail page is `canonical_url`.
    ///
    /// # Arguments
    ///
    /// * `item` - Catalog record, used for candidate ids and the fallback tiers
    /// * `canonical_url` - Detail URL reported by the catalog
    ///
    /// # Returns
    ///
    /// Always a description. `source_url` is set only when the text came from
    /// a fetched page; `tier` says which rung of the ladder produced it.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let resolver = DescriptionResolver::new(HttpPageFetcher::new(&settings)?, &settings);
    /// let resolved = resolver.resolve(&item, &item.url).await;
    /// println!("{} ({})", resolved.text, resolved.tier);
    /// ```
    #[instrument(level = "info", skip_all, fields(title = %truncate_for_log(&item.title, 80)))]
    pub async fn resolve(&self, item: &CatalogItem, canonical_url: &str) -> ResolvedDescription {
        if !self.settings.scrape {
            debug!("Detail-page scraping disabled; using catalog fallback");
            return fallback_description(item);
        }

        let candidates =
            generate_candidate_urls(item, canonical_url, self.settings.domain_preference);
        let total = candidates.len();
        let mut last_error: Option<String> = None;

        for (i, candidate) in candidates.iter().enumerate() {
            let url = candidate.url.as_str();
            match self.attempt(url).await {
                Attempt::Extracted(found) => {
                    let tier = Tier::from(found.provenance);
                    info!(
                        %url,
                        %tier,
                        provenance = %found.provenance,
                        score = found.score,
                        attempt = i + 1,
                        total,
                        "Description extracted"
                    );
                    return ResolvedDescription {
                        text: found.text,
                        tier,
                        source_url: Some(url.to_string()),
                    };
                }
                Attempt::NotFound => debug!(%url, "Detail page not found"),
                Attempt::TransportError(cause) => {
                    warn!(%url, attempt = i + 1, total, error = %cause, "Detail page fetch failed");
                    last_error = Some(cause);
                    sleep(self.settings.failure_delay).await;
                }
                Attempt::Blocked => info!(%url, "Age-verification page; trying next candidate"),
                Attempt::NoContent => debug!(%url, "No usable description on page"),
            }
        }

        if let Some(e) = last_error {
            warn!(error = %e, "Last detail-page error before fallback");
        }
        let resolved = fallback_description(item);
        info!(tier = %resolved.tier, candidates = total, "Candidates exhausted; using fallback");
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DomainPreference;
    use crate::description::sanitize::{Bounds, char_len, contains_forbidden};
    use crate::models::{ItemInfo, NamedRef};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::time::Duration;

    const CID: &str = "abc00123";
    const PROSE_80: &str =
        "This VR title puts you right in the room with a cast of three performers. Enjoy!";
    const OG_40: &str = "Short og text for the VR title, 40 char.";

    #[derive(Clone)]
    enum Canned {
        Page(String),
        NotFound,
        Down,
    }

    /// In-memory fetcher: unknown URLs fail at the transport level.
    #[derive(Default)]
    struct FakeFetcher {
        pages: HashMap<String, Canned>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        fn with(mut self, url: &str, canned: Canned) -> Self {
            self.pages.insert(url.to_string(), canned);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl PageFetcher for &FakeFetcher {
        async fn fetch(&self, url: &str) -> FetchResult {
            self.calls.borrow_mut().push(url.to_string());
            match self.pages.get(url).cloned().unwrap_or(Canned::Down) {
                Canned::Page(body) => FetchResult::Success {
                    body: body.into_bytes(),
                    status: 200,
                },
                Canned::NotFound => FetchResult::NotFound,
                Canned::Down => FetchResult::TransportError("connection refused".into()),
            }
        }
    }

    fn settings() -> ResolverSettings {
        ResolverSettings {
            failure_delay: Duration::ZERO,
            domain_preference: DomainPreference::Www,
            ..ResolverSettings::default()
        }
    }

    fn item() -> CatalogItem {
        CatalogItem {
            content_id: Some(CID.into()),
            title: "Sample VR Title".into(),
            date: Some("2024-01-10 10:00:00".into()),
            iteminfo: ItemInfo {
                genre: vec![NamedRef {
                    id: None,
                    name: "VR".into(),
                }],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn canonical() -> String {
        format!("https://www.dmm.co.jp/digital/videoa/-/detail/=/cid={CID}/")
    }

    fn second() -> String {
        format!("https://www.dmm.co.jp/digital/vrvideo/-/detail/=/cid={CID}/")
    }

    fn product_page(body_div: &str, og: &str) -> String {
        format!(
            r#"<!DOCTYPE html><html><head><meta property="og:description" content="{og}"></head>
            <body><div class="mg-b20 lh4">{body_div}</div></body></html>"#
        )
    }

    #[tokio::test]
    async fn test_all_fetches_fail_still_returns_text() {
        let fetcher = FakeFetcher::default();
        let s = settings();
        let resolver = DescriptionResolver::new(&fetcher, &s);

        let resolved = resolver.resolve(&item(), &canonical()).await;

        assert_eq!(resolved.tier, Tier::Synthesized);
        assert!(resolved.text.starts_with("Sample VR Title"));
        assert!(resolved.text.contains("VR"));
        assert!(char_len(&resolved.text) > 10);
        assert!(char_len(&resolved.text) <= Bounds::BODY.max);
        assert!(!contains_forbidden(&resolved.text, true));
        assert!(!fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_main_body_beats_og_description() {
        assert_eq!(char_len(OG_40), 40);
        let fetcher = FakeFetcher::default()
            .with(&canonical(), Canned::Page(product_page(PROSE_80, OG_40)));
        let s = settings();
        let resolver = DescriptionResolver::new(&fetcher, &s);

        let resolved = resolver.resolve(&item(), &canonical()).await;

        assert_eq!(resolved.text, PROSE_80);
        assert_eq!(resolved.tier, Tier::MainBody);
        assert_eq!(resolved.source_url.as_deref(), Some(canonical().as_str()));
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_og_used_when_body_missing() {
        let fetcher = FakeFetcher::default()
            .with(&canonical(), Canned::Page(product_page("tiny", OG_40)));
        let s = settings();
        let resolver = DescriptionResolver::new(&fetcher, &s);

        let resolved = resolver.resolve(&item(), &canonical()).await;

        assert_eq!(resolved.tier, Tier::OpenGraph);
        assert_eq!(resolved.text, OG_40);
    }

    #[tokio::test]
    async fn test_age_gate_skips_page_and_moves_on() {
        let gated = format!(
            r#"<html><body><p>You must not enter if you are under the age of 18.</p>
            <div class="mg-b20 lh4">{PROSE_80}</div></body></html>"#
        );
        let real = "別ページの本文です。この作品は臨場感のあるVR映像で、二人の物語を丁寧に描いています。最新機材で撮影された高画質映像です。ぜひお楽しみください。";
        let fetcher = FakeFetcher::default()
            .with(&canonical(), Canned::Page(gated))
            .with(&second(), Canned::Page(product_page(real, OG_40)));
        let s = settings();
        let resolver = DescriptionResolver::new(&fetcher, &s);

        let resolved = resolver.resolve(&item(), &canonical()).await;

        assert_eq!(resolved.text, real);
        assert_eq!(resolved.source_url.as_deref(), Some(second().as_str()));
        assert_eq!(fetcher.calls(), vec![canonical(), second()]);
    }

    #[tokio::test]
    async fn test_age_gate_only_page_falls_back() {
        let gated = format!(
            r#"<html><body><h1>年齢認証</h1><p>18歳未満の方のアクセスは固くお断りします。</p>
            <div class="mg-b20 lh4">{PROSE_80}</div></body></html>"#
        );
        let fetcher = FakeFetcher::default().with(&canonical(), Canned::Page(gated));
        let s = settings();
        let resolver = DescriptionResolver::new(&fetcher, &s);

        let resolved = resolver.resolve(&item(), &canonical()).await;

        assert_ne!(resolved.text, PROSE_80);
        assert_eq!(resolved.tier, Tier::Synthesized);
    }

    #[tokio::test]
    async fn test_not_found_advances_to_next_candidate() {
        let fetcher = FakeFetcher::default()
            .with(&canonical(), Canned::NotFound)
            .with(&second(), Canned::Page(product_page(PROSE_80, OG_40)));
        let s = settings();
        let resolver = DescriptionResolver::new(&fetcher, &s);

        let resolved = resolver.resolve(&item(), &canonical()).await;

        assert_eq!(resolved.text, PROSE_80);
        assert_eq!(fetcher.calls(), vec![canonical(), second()]);
    }

    #[tokio::test]
    async fn test_page_without_content_advances() {
        let fetcher = FakeFetcher::default()
            .with(&canonical(), Canned::Page("<html><body><p>nothing</p></body></html>".into()))
            .with(&second(), Canned::Page(product_page(PROSE_80, OG_40)));
        let s = settings();
        let resolver = DescriptionResolver::new(&fetcher, &s);

        let resolved = resolver.resolve(&item(), &canonical()).await;

        assert_eq!(resolved.text, PROSE_80);
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_scrape_disabled_makes_no_requests() {
        let fetcher = FakeFetcher::default();
        let s = ResolverSettings {
            scrape: false,
            ..settings()
        };
        let resolver = DescriptionResolver::new(&fetcher, &s);

        let resolved = resolver.resolve(&item(), &canonical()).await;

        assert!(fetcher.calls().is_empty());
        assert_eq!(resolved.tier, Tier::Synthesized);
    }

    #[tokio::test]
    async fn test_exhaustion_prefers_catalog_field() {
        let mut it = item();
        it.description = Some(
            "カタログに登録された説明文です。VR作品ならではの臨場感を存分に味わえる一本になっています。"
                .into(),
        );
        let fetcher = FakeFetcher::default();
        let s = settings();
        let resolver = DescriptionResolver::new(&fetcher, &s);

        let resolved = resolver.resolve(&it, &canonical()).await;

        assert_eq!(resolved.tier, Tier::CatalogField);
        assert!(resolved.source_url.is_none());
    }

    #[tokio::test]
    async fn test_every_candidate_tried_in_order() {
        let fetcher = FakeFetcher::default();
        let s = settings();
        let resolver = DescriptionResolver::new(&fetcher, &s);
        let expected: Vec<String> = generate_candidate_urls(&item(), &canonical(), s.domain_preference)
            .into_iter()
            .map(|c| c.url)
            .collect();

        resolver.resolve(&item(), &canonical()).await;

        assert_eq!(fetcher.calls(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_follows_each_transport_failure() {
        let fetcher = FakeFetcher::default();
        let s = ResolverSettings {
            failure_delay: Duration::from_millis(200),
            ..settings()
        };
        let resolver = DescriptionResolver::new(&fetcher, &s);
        let total = generate_candidate_urls(&item(), &canonical(), s.domain_preference).len();

        let t0 = tokio::time::Instant::now();
        resolver.resolve(&item(), &canonical()).await;

        assert_eq!(fetcher.calls().len(), total);
        assert_eq!(t0.elapsed(), s.failure_delay * total as u32);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_advances_without_pause() {
        let s = ResolverSettings {
            failure_delay: Duration::from_millis(200),
            ..settings()
        };
        let fetcher = generate_candidate_urls(&item(), &canonical(), s.domain_preference)
            .into_iter()
            .fold(FakeFetcher::default(), |f, c| f.with(&c.url, Canned::NotFound));
        let resolver = DescriptionResolver::new(&fetcher, &s);

        let t0 = tokio::time::Instant::now();
        let resolved = resolver.resolve(&item(), &canonical()).await;

        assert_eq!(t0.elapsed(), Duration::ZERO);
        assert_eq!(resolved.tier, Tier::Synthesized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_only_after_failed_candidates() {
        let s = ResolverSettings {
            failure_delay: Duration::from_millis(200),
            ..settings()
        };
        let fetcher = FakeFetcher::default()
            .with(&canonical(), Canned::Down)
            .with(&second(), Canned::Page(product_page(PROSE_80, OG_40)));
        let resolver = DescriptionResolver::new(&fetcher, &s);

        let t0 = tokio::time::Instant::now();
        let resolved = resolver.resolve(&item(), &canonical()).await;

        assert_eq!(resolved.text, PROSE_80);
        assert_eq!(t0.elapsed(), s.failure_delay);
    }

    #[test]
    fn test_inspect_page_blocks_before_extraction() {
        let parser = ParserChain::new(crate::config::ParserMode::Lenient);
        let page = product_page(PROSE_80, "age verification required before entering this site");
        assert!(matches!(inspect_page(&page, &parser), Attempt::Blocked));
    }
}
