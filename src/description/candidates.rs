//! Candidate detail-page URLs for a catalog item.
//!
//! The same content id resolves under several inconsistent path and domain
//! conventions on the `www.` and `video.` sites, so the resolver tries a fixed,
//! ordered list of guesses instead of one mapping. No network I/O here.

use crate::config::DomainPreference;
use crate::models::{CandidateUrl, CatalogItem};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Query keys that only carry affiliate/tracking state.
const TRACKING_KEYS: &[&str] = &["affiliate_id", "affi_id", "uid", "af_id"];

/// Detail-page templates, `{cid}` replaced by the content id. Order matters.
const DETAIL_TEMPLATES: &[&str] = &[
    "https://www.dmm.co.jp/digital/videoa/-/detail/=/cid={cid}/",
    "https://www.dmm.co.jp/digital/vrvideo/-/detail/=/cid={cid}/",
    "https://www.dmm.co.jp/vrvideo/-/detail/=/cid={cid}/",
    "https://www.dmm.co.jp/av/-/detail/=/cid={cid}/",
    "https://www.dmm.co.jp/mono/dvd/-/detail/=/cid={cid}/",
    "https://video.dmm.co.jp/av/content/?id={cid}",
];

#[allow(clippy::expect_used)]
static CID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:cid|id)=([a-z0-9_]+)").expect("valid regex"));

/// Drop tracking parameters; the URL is returned unchanged if it does not parse.
pub fn strip_tracking_params(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    if url.query().is_none() {
        return url.to_string();
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_KEYS.contains(&k.to_ascii_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.to_string()
}

/// Content id embedded in a detail URL (`cid=...` or `id=...`).
pub fn extract_cid(url: &str) -> Option<String> {
    CID_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// The same page on the other site: `video.` <-> `www.`.
///
/// Moving to `video.` also renames the `/digital/` taxonomy segment to `/av/`.
pub fn counterpart(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    let host = url.host_str()?.to_string();
    if let Some(rest) = host.strip_prefix("video.") {
        url.set_host(Some(&format!("www.{rest}"))).ok()?;
    } else if let Some(rest) = host.strip_prefix("www.") {
        url.set_host(Some(&format!("video.{rest}"))).ok()?;
        let path = url.path().replace("/digital/", "/av/");
        url.set_path(&path);
    } else {
        return None;
    }
    Some(url.to_string())
}

fn host_starts_with(raw: &str, prefix: &str) -> bool {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.starts_with(prefix)))
        .unwrap_or(false)
}

/// Ordered, de-duplicated detail-page guesses for `item`, most preferred first.
///
/// 1. canonical URL without tracking parameters
/// 2. the known templates for the content id (catalog id, else parsed from the URL)
/// 3. the other-domain counterpart of everything above
/// 4. stable partition by domain preference
/// 5. first occurrence wins
///
/// # Arguments
///
/// * `item` - Catalog record; its `content_id` (or `product_id`) feeds the templates
/// * `canonical_url` - Detail URL reported by the catalog
/// * `preference` - Which domain's URLs are tried first
///
/// # Returns
///
/// Never empty: the stripped canonical URL is always present.
///
/// # Examples
///
/// ```ignore
/// let urls = generate_candidate_urls(&item, &item.url, DomainPreference::Www);
/// assert!(urls[0].url.starts_with("https://www.dmm.co.jp/"));
/// ```
pub fn generate_candidate_urls(
    item: &CatalogItem,
    canonical_url: &str,
    preference: DomainPreference,
) -> Vec<CandidateUrl> {
    let base = strip_tracking_params(canonical_url);
    let mut urls = vec![base.clone()];

    let cid = item
        .catalog_id()
        .map(str::to_string)
        .or_else(|| extract_cid(&base));
    if let Some(cid) = cid {
        urls.extend(DETAIL_TEMPLATES.iter().map(|t| t.replace("{cid}", &cid)));
    }

    let counterparts: Vec<String> = urls.iter().filter_map(|u| counterpart(u)).collect();
    urls.extend(counterparts);

    let rank_of = |u: &str| -> u8 {
        match preference.host_prefix() {
            Some(prefix) if host_starts_with(u, prefix) => 0,
            Some(_) => 1,
            None => 0,
        }
    };

    urls.into_iter()
        .filter(|u| !u.is_empty())
        .map(|u| CandidateUrl {
            rank: rank_of(&u),
            url: u,
        })
        .sorted_by_key(|c| c.rank)
        .unique_by(|c| c.url.clone())
        .collect()
}
