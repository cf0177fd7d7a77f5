//! Metadata fallback: `og:description`, `<meta name="description">`, JSON-LD.
//!
//! Tried in that order, first accepted value wins. Metadata is terser than
//! body text, so it is validated against [`Bounds::META`].

use super::main_body::score_text;
use super::sanitize::{Bounds, accept};
use crate::models::{ExtractionCandidate, Provenance};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

static OG_DESCRIPTION: Lazy<Option<Selector>> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:description"]"#).ok());
static META_DESCRIPTION: Lazy<Option<Selector>> =
    Lazy::new(|| Selector::parse(r#"meta[name="description"]"#).ok());
static JSON_LD: Lazy<Option<Selector>> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).ok());

fn meta_content(doc: &Html, selector: &Lazy<Option<Selector>>) -> Option<String> {
    let sel = selector.as_ref()?;
    doc.select(sel)
        .next()
        .and_then(|m| m.value().attr("content"))
        .map(str::to_string)
}

fn candidate(text: String, provenance: Provenance) -> ExtractionCandidate {
    ExtractionCandidate {
        score: score_text(&text),
        text,
        provenance,
    }
}

/// Text of a JSON-LD `description` value. Scalars render as written;
/// arrays join their scalar entries with a space.
fn description_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_array())
            .filter_map(description_text)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Null | Value::Object(_) => return None,
    };
    (!text.trim().is_empty()).then_some(text)
}

/// `description`, then `subjectOf.description`, of one JSON-LD object.
fn object_descriptions(obj: &Value) -> Vec<String> {
    let top = obj.get("description").and_then(description_text);
    let nested = obj
        .get("subjectOf")
        .and_then(|s| s.get("description"))
        .and_then(description_text);
    top.into_iter().chain(nested).collect()
}

/// Description strings from every parseable JSON-LD block, in document order.
/// A block that fails to parse is skipped on its own.
pub fn json_ld_descriptions(doc: &Html) -> Vec<String> {
    let Some(sel) = JSON_LD.as_ref() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (index, script) in doc.select(sel).enumerate() {
        let raw = script.text().collect::<String>();
        let parsed: Value = match serde_json::from_str(raw.trim()) {
            Ok(v) => v,
            Err(e) => {
                debug!(index, error = %e, "Skipping unparseable JSON-LD block");
                continue;
            }
        };
        let objects: Vec<&Value> = match &parsed {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for obj in objects.into_iter().filter(|o| o.is_object()) {
            out.extend(object_descriptions(obj));
        }
    }
    out
}

/// First accepted metadata description, or `None`.
pub fn extract_metadata(doc: &Html) -> Option<ExtractionCandidate> {
    let accept_meta = |raw: &str| accept(raw, Bounds::META, false);

    if let Some(text) = meta_content(doc, &OG_DESCRIPTION).as_deref().and_then(accept_meta) {
        return Some(candidate(text, Provenance::OpenGraph));
    }
    if let Some(text) = meta_content(doc, &META_DESCRIPTION).as_deref().and_then(accept_meta) {
        return Some(candidate(text, Provenance::MetaDescription));
    }
    json_ld_descriptions(doc)
        .iter()
        .find_map(|d| accept_meta(d))
        .map(|text| candidate(text, Provenance::StructuredData))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OG_TEXT: &str = "臨場感あふれるVR映像で描かれる、夏の海辺で出会った二人の物語です。";

    #[test]
    fn test_selectors_compile() {
        assert!(OG_DESCRIPTION.is_some());
        assert!(META_DESCRIPTION.is_some());
        assert!(JSON_LD.is_some());
    }

    #[test]
    fn test_og_description_first() {
        let html = format!(
            r#"<html><head>
                <meta name="description" content="別の説明文。こちらは標準のメタディスクリプションで十分な長さがあります。">
                <meta property="og:description" content="{OG_TEXT}">
            </head><body></body></html>"#
        );
        let doc = Html::parse_document(&html);
        let found = extract_metadata(&doc).unwrap();
        assert_eq!(found.provenance, Provenance::OpenGraph);
        assert_eq!(found.text, OG_TEXT);
    }

    #[test]
    fn test_short_og_falls_through_to_meta() {
        let html = r#"<html><head>
            <meta property="og:description" content="短い">
            <meta name="description" content="標準のメタディスクリプションです。三十文字を超える長さの説明文になっています。">
        </head></html>"#;
        let doc = Html::parse_document(html);
        let found = extract_metadata(&doc).unwrap();
        assert_eq!(found.provenance, Provenance::MetaDescription);
    }

    #[test]
    fn test_meta_upper_bound() {
        let long = "あ".repeat(701);
        let html = format!(r#"<meta property="og:description" content="{long}">"#);
        let doc = Html::parse_document(&html);
        assert!(extract_metadata(&doc).is_none());
    }

    #[test]
    fn test_json_ld_skips_broken_block() {
        let html = r#"<html><head>
            <script type="application/ld+json">{ not json </script>
            <script type="application/ld+json">
                [{"@type": "BreadcrumbList"},
                 {"@type": "Product", "description": "構造化データに含まれる作品の説明文です。十分な長さがあります。ぜひご覧ください。"}]
            </script>
        </head></html>"#;
        let doc = Html::parse_document(html);
        let found = extract_metadata(&doc).unwrap();
        assert_eq!(found.provenance, Provenance::StructuredData);
        assert!(found.text.starts_with("構造化データ"));
    }

    #[test]
    fn test_json_ld_subject_of_description() {
        let html = r#"<script type="application/ld+json">
            {"@type": "VideoObject", "subjectOf": {"description": "subjectOf に入れ子になった説明文です。これも拾えるはずの長さです。"}}
        </script>"#;
        let doc = Html::parse_document(html);
        let all = json_ld_descriptions(&doc);
        assert_eq!(all.len(), 1);
        assert!(all[0].starts_with("subjectOf"));
    }

    #[test]
    fn test_json_ld_non_string_descriptions() {
        let html = r#"<script type="application/ld+json">
            [{"description": ["配列で渡された説明文です。", "二つ目の文も続きます。", 3]},
             {"description": 20240110},
             {"description": {"text": "object"}},
             {"description": null}]
        </script>"#;
        let doc = Html::parse_document(html);
        assert_eq!(
            json_ld_descriptions(&doc),
            vec!["配列で渡された説明文です。 二つ目の文も続きます。 3", "20240110"]
        );
    }

    #[test]
    fn test_metadata_rejects_ng_phrase() {
        let html = r#"<meta property="og:description" content="From here on, it will be an adult site. Please confirm your age to continue.">"#;
        let doc = Html::parse_document(html);
        assert!(extract_metadata(&doc).is_none());
    }
}
