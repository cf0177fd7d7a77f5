//! Data models for catalog items and the description pipeline.
//!
//! This module defines the records that flow through a batch run:
//! - [`CatalogItem`]: one product as returned by the affiliate `ItemList` API
//! - [`CandidateUrl`]: one guessed detail-page address for an item
//! - [`FetchResult`]: the classified outcome of one detail-page request
//! - [`ExtractionCandidate`]: a scored text span found on a page
//! - [`ResolvedDescription`]: the final description and the tier that produced it
//!
//! The API field names are snake_case or upper case (`URL`), so serde renames
//! are used where they differ from Rust naming.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// A named entry in one of the item's tag lists (genre, actress, label, maker).
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct NamedRef {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
}

/// Nested tag lists and optional free-text fields from `iteminfo`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ItemInfo {
    #[serde(default)]
    pub genre: Vec<NamedRef>,
    #[serde(default)]
    pub actress: Vec<NamedRef>,
    #[serde(default)]
    pub label: Vec<NamedRef>,
    #[serde(default)]
    pub maker: Vec<NamedRef>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub comment: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub story: Option<String>,
}

/// A list of image URLs for one resolution tier.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ImageGroup {
    #[serde(default)]
    pub image: Vec<String>,
}

/// Sample images keyed by resolution tier.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SampleImages {
    pub sample_s: Option<ImageGroup>,
    pub sample_l: Option<ImageGroup>,
}

/// One product record from the catalog API.
///
/// Read-only to the rest of the program; nothing is persisted.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub content_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub product_id: Option<String>,
    #[serde(default)]
    pub title: String,
    /// Canonical detail-page URL.
    #[serde(rename = "URL", default)]
    pub url: String,
    /// Release timestamp, `YYYY-MM-DD HH:MM:SS` in JST.
    #[serde(default)]
    pub date: Option<String>,
    /// Running time, usually minutes.
    #[serde(default, deserialize_with = "lenient_string")]
    pub volume: Option<String>,
    #[serde(default)]
    pub iteminfo: ItemInfo,
    #[serde(rename = "sampleImageURL", default)]
    pub sample_images: SampleImages,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub comment: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub story: Option<String>,
}

impl CatalogItem {
    /// Content id from the catalog, falling back to the product id.
    pub fn catalog_id(&self) -> Option<&str> {
        fn present(id: &Option<String>) -> Option<&str> {
            id.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        present(&self.content_id).or_else(|| present(&self.product_id))
    }

    /// Genre names in catalog order.
    pub fn genre_names(&self) -> Vec<&str> {
        names(&self.iteminfo.genre)
    }

    pub fn actress_names(&self) -> Vec<&str> {
        names(&self.iteminfo.actress)
    }

    pub fn label_names(&self) -> Vec<&str> {
        names(&self.iteminfo.label)
    }

    pub fn maker_names(&self) -> Vec<&str> {
        names(&self.iteminfo.maker)
    }

    /// Large sample images when present, otherwise the small ones.
    pub fn sample_image_urls(&self) -> &[String] {
        fn pick(group: &Option<ImageGroup>) -> Option<&[String]> {
            group
                .as_ref()
                .map(|g| g.image.as_slice())
                .filter(|imgs| !imgs.is_empty())
        }
        pick(&self.sample_images.sample_l)
            .or_else(|| pick(&self.sample_images.sample_s))
            .unwrap_or(&[])
    }

    /// Raw catalog text fields in fallback order: description, comment, story.
    /// Top-level values win over their `iteminfo` counterparts.
    pub fn raw_text_fields(&self) -> Vec<&str> {
        let info = &self.iteminfo;
        [
            (&self.description, &info.description),
            (&self.comment, &info.comment),
            (&self.story, &info.story),
        ]
        .into_iter()
        .filter_map(|(top, nested)| {
            top.as_deref()
                .filter(|s| !s.trim().is_empty())
                .or(nested.as_deref())
        })
        .collect()
    }
}

fn names(refs: &[NamedRef]) -> Vec<&str> {
    refs.iter()
        .map(|r| r.name.as_str())
        .filter(|n| !n.is_empty())
        .collect()
}

/// Accept strings, numbers, and booleans as `Some(String)`; anything else is `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// One detail-page address to try, with its domain-preference rank
/// (0 = preferred domain, 1 = the other one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateUrl {
    pub url: String,
    pub rank: u8,
}

/// Classified outcome of a single detail-page request.
#[derive(Debug)]
pub enum FetchResult {
    /// Any non-404 response; the body is left undecoded.
    Success { body: Vec<u8>, status: u16 },
    NotFound,
    TransportError(String),
}

/// Where on the page an extraction candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    MainBody,
    HeadingAdjacent,
    LongParagraph,
    OpenGraph,
    MetaDescription,
    StructuredData,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provenance::MainBody => "main-body",
            Provenance::HeadingAdjacent => "heading-adjacent",
            Provenance::LongParagraph => "long-paragraph",
            Provenance::OpenGraph => "og-description",
            Provenance::MetaDescription => "meta-description",
            Provenance::StructuredData => "structured-data",
        })
    }
}

/// A cleaned, validated text span found on a detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionCandidate {
    pub text: String,
    pub provenance: Provenance,
    pub score: usize,
}

/// Which rung of the fallback ladder produced a description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    MainBody,
    OpenGraph,
    MetaDescription,
    StructuredData,
    CatalogField,
    Synthesized,
}

impl From<Provenance> for Tier {
    fn from(p: Provenance) -> Self {
        match p {
            Provenance::MainBody | Provenance::HeadingAdjacent | Provenance::LongParagraph => {
                Tier::MainBody
            }
            Provenance::OpenGraph => Tier::OpenGraph,
            Provenance::MetaDescription => Tier::MetaDescription,
            Provenance::StructuredData => Tier::StructuredData,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::MainBody => "main-body",
            Tier::OpenGraph => "og-description",
            Tier::MetaDescription => "meta-description",
            Tier::StructuredData => "structured-data",
            Tier::CatalogField => "catalog-field",
            Tier::Synthesized => "synthesized",
        })
    }
}

/// The description handed to the publishing step.
///
/// Already satisfies the acceptance rules; callers do not re-validate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDescription {
    pub text: String,
    pub tier: Tier,
    /// The detail page the text came from, for page tiers.
    pub source_url: Option<String>,
}
