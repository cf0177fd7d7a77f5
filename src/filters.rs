//! Catalog item selection: VR genre test, release check, recency split.
//!
//! Catalog dates are naive `YYYY-MM-DD HH:MM:SS` values in Japan time. Every
//! function takes `now` explicitly so callers (and tests) pin the clock.

use crate::models::CatalogItem;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc};
use itertools::Itertools;
use std::cmp::Reverse;

const JST_OFFSET_SECS: i32 = 9 * 3600;
const CATALOG_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Genre-name fragments that mark an item as VR.
const VR_MARKERS: &[&str] = &["VR", "ＶＲ", "バーチャル"];

pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(JST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

pub fn now_jst() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&jst())
}

/// Parse a catalog date as JST; `None` when missing or malformed.
pub fn parse_jst_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), CATALOG_DATE_FORMAT).ok()?;
    jst().from_local_datetime(&naive).single()
}

fn item_date(item: &CatalogItem) -> Option<DateTime<FixedOffset>> {
    item.date.as_deref().and_then(parse_jst_date)
}

pub fn contains_vr(item: &CatalogItem) -> bool {
    let joined = item.genre_names().join(" ");
    VR_MARKERS.iter().any(|m| joined.contains(m))
}

/// Released at or before `now`. Items without a usable date are not.
pub fn is_released(item: &CatalogItem, now: DateTime<FixedOffset>) -> bool {
    item_date(item).is_some_and(|d| d <= now)
}

/// Released VR items, newest first.
pub fn released_vr_newest_first(
    items: Vec<CatalogItem>,
    now: DateTime<FixedOffset>,
) -> Vec<CatalogItem> {
    items
        .into_iter()
        .filter(|it| contains_vr(it) && is_released(it, now))
        .sorted_by_key(|it| Reverse(item_date(it)))
        .collect()
}

/// Split into items released within `recent_days` of `now` and the rest.
/// Order is preserved within each half; undated items go to the backlog.
/// A window reaching past the representable date range counts every dated
/// item as recent (or none, for a negative window).
pub fn split_recent_and_backlog(
    items: Vec<CatalogItem>,
    now: DateTime<FixedOffset>,
    recent_days: i64,
) -> (Vec<CatalogItem>, Vec<CatalogItem>) {
    let boundary = TimeDelta::try_days(recent_days).and_then(|d| now.checked_sub_signed(d));
    items
        .into_iter()
        .partition(|it| match (item_date(it), boundary) {
            (Some(d), Some(b)) => d >= b,
            (Some(_), None) => recent_days > 0,
            (None, _) => false,
        })
}
