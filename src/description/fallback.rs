//! Last two rungs of the ladder: catalog text fields, then a sentence
//! synthesized from the item's own metadata.

use super::sanitize::{Bounds, accept, char_len, scrub_forbidden};
use crate::models::{CatalogItem, ResolvedDescription, Tier};

/// Used only when even the synthesized sentence comes out (near) empty.
pub const GENERIC_DESCRIPTION: &str = "FANZA（DMM）VR動画の新作情報です。";

const SYNTHESIZED_MIN: usize = 10;

/// First catalog text field (description, comment, story) that passes the
/// catalog acceptance rule.
pub fn catalog_field_description(item: &CatalogItem) -> Option<String> {
    item.raw_text_fields()
        .into_iter()
        .find_map(|raw| accept(raw, Bounds::CATALOG, false))
}

/// Running time with a minutes suffix when the catalog gives a bare number.
fn format_volume(volume: Option<&str>) -> String {
    match volume.map(str::trim) {
        Some(v) if !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()) => format!("{v}分"),
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

/// `{title}。ジャンル：…。出演：…。レーベル：…。収録時間：…。`
///
/// Starts with the title verbatim (minus any disqualifying phrase) and is
/// never empty; capped at [`Bounds::BODY`]'s maximum.
pub fn synthesize_description(item: &CatalogItem) -> String {
    let base = format!(
        "{}。ジャンル：{}。出演：{}。レーベル：{}。収録時間：{}。",
        item.title.trim(),
        item.genre_names().join("、"),
        item.actress_names().join("、"),
        item.label_names().join("、"),
        format_volume(item.volume.as_deref()),
    );
    let text = scrub_forbidden(&base);
    if char_len(&text) <= SYNTHESIZED_MIN {
        return GENERIC_DESCRIPTION.to_string();
    }
    if char_len(&text) > Bounds::BODY.max {
        return text.chars().take(Bounds::BODY.max).collect();
    }
    text
}

/// Catalog field if one qualifies, otherwise the synthesized sentence.
pub fn fallback_description(item: &CatalogItem) -> ResolvedDescription {
    match catalog_field_description(item) {
        Some(text) => ResolvedDescription {
            text,
            tier: Tier::CatalogField,
            source_url: None,
        },
        None => ResolvedDescription {
            text: synthesize_description(item),
            tier: Tier::Synthesized,
            source_url: None,
        },
    }
}
