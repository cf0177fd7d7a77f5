//! WordPress post composition: affiliate link, tags, HTML body.

use crate::models::CatalogItem;
use html_escape::{encode_double_quoted_attribute, encode_text};
use itertools::Itertools;
use url::Url;

/// Everything `wp.newPost` needs for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub category: String,
    pub tags: Vec<String>,
    pub thumbnail_id: Option<i64>,
}

/// `url` with `affiliate_id` set to `affiliate_id`, other parameters kept.
/// Unparseable URLs are returned unchanged.
pub fn affiliate_link(url: &str, affiliate_id: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != "affiliate_id")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("affiliate_id", affiliate_id);
    parsed.to_string()
}

/// Label, maker, actress and genre names; first occurrence wins.
pub fn collect_tags(item: &CatalogItem) -> Vec<String> {
    item.label_names()
        .into_iter()
        .chain(item.maker_names())
        .chain(item.actress_names())
        .chain(item.genre_names())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unique()
        .map(str::to_string)
        .collect()
}

/// Post HTML: linked lead image and title, description, remaining sample
/// images, then the linked image and title again. `images` must not be empty.
pub fn render_body(title: &str, link: &str, description: &str, images: &[String]) -> String {
    let title_attr = encode_double_quoted_attribute(title);
    let title_text = encode_text(title);
    let href = encode_double_quoted_attribute(link);

    let linked = |src: &str| {
        format!(
            r#"<p><a href="{href}" target="_blank"><img src="{}" alt="{title_attr}"></a></p>"#,
            encode_double_quoted_attribute(src)
        )
    };
    let linked_title = format!(r#"<p><a href="{href}" target="_blank">{title_text}</a></p>"#);

    let Some((lead, rest)) = images.split_first() else {
        return format!("{linked_title}\n<div>{}</div>", encode_text(description));
    };

    let mut parts = vec![
        linked(lead),
        linked_title.clone(),
        format!("<div>{}</div>", encode_text(description)),
    ];
    parts.extend(rest.iter().map(|img| {
        format!(
            r#"<p><img src="{}" alt="{title_attr}"></p>"#,
            encode_double_quoted_attribute(img)
        )
    }));
    parts.push(linked(lead));
    parts.push(linked_title);
    parts.join("\n")
}
