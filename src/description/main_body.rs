//! Main-body description extraction.
//!
//! Three discovery strategies run over the same document and their results
//! are pooled:
//! 1. structural selectors historically used for the product introduction
//! 2. text following a section heading such as 作品紹介 / あらすじ
//! 3. any paragraph of at least [`LONG_PARAGRAPH_MIN`] characters
//!
//! Each candidate is cleaned, validated against [`Bounds::BODY`], scored by
//! [`score_text`], and the best one wins (first wins on ties).

use super::sanitize::{Bounds, accept, char_len};
use crate::models::{ExtractionCandidate, Provenance};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

/// Known product-introduction locations, most specific first.
const STRUCTURAL_SELECTORS: &[&str] = &[
    "div.mg-b20.lh4",
    "div#introduction",
    "section#introduction",
    "div.introduction",
    "section.introduction",
    "[data-contents='introduction']",
    ".vbox .txt",
    ".d-item__intro",
    "#performer + div",
    ".txt",
];

/// Section titles that introduce the synopsis (compared case-insensitively).
const SECTION_KEYWORDS: &[&str] = &[
    "作品紹介",
    "作品内容",
    "ストーリー",
    "あらすじ",
    "解説",
    "introduction",
    "synopsis",
    "story",
    "commentary",
];

pub const LONG_PARAGRAPH_MIN: usize = 60;

/// Weight of each sentence terminator in [`score_text`].
pub const TERMINATOR_WEIGHT: usize = 20;

const SENTENCE_TERMINATORS: &[char] = &['。', '！', '？', '!', '?', '.'];

static STRUCTURAL: Lazy<Vec<Selector>> = Lazy::new(|| {
    STRUCTURAL_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
});

static HEADINGS: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("h1, h2, h3, h4").ok());
static PARAGRAPHS: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("p").ok());

/// `length + 20 × sentence terminators`: favours longer, multi-sentence prose
/// over short fragments and link lists.
pub fn score_text(text: &str) -> usize {
    let terminators = text.chars().filter(|c| SENTENCE_TERMINATORS.contains(c)).count();
    char_len(text) + TERMINATOR_WEIGHT * terminators
}

/// Trimmed, non-empty text nodes of `el` joined by `sep`.
pub(super) fn element_text(el: ElementRef<'_>, sep: &str) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

fn heading_level(el: ElementRef<'_>) -> Option<u8> {
    match el.value().name() {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        _ => None,
    }
}

fn structural_candidates(doc: &Html) -> Vec<(String, Provenance)> {
    STRUCTURAL
        .iter()
        .flat_map(|sel| doc.select(sel))
        .map(|el| element_text(el, "\n"))
        .filter(|t| !t.is_empty())
        .map(|t| (t, Provenance::MainBody))
        .collect()
}

fn heading_candidates(doc: &Html) -> Vec<(String, Provenance)> {
    let Some(headings) = HEADINGS.as_ref() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for heading in doc.select(headings) {
        let title = element_text(heading, "").to_lowercase();
        if !SECTION_KEYWORDS.iter().any(|k| title.contains(k)) {
            continue;
        }
        let Some(level) = heading_level(heading) else {
            continue;
        };
        let mut parts = Vec::new();
        for sibling in heading.next_siblings().filter_map(ElementRef::wrap) {
            if heading_level(sibling).is_some_and(|l| l <= level) {
                break;
            }
            if matches!(sibling.value().name(), "p" | "div" | "section") {
                let text = element_text(sibling, " ");
                if !text.is_empty() {
                    parts.push(text);
                }
            }
        }
        if !parts.is_empty() {
            out.push((parts.join("\n"), Provenance::HeadingAdjacent));
        }
    }
    out
}

fn paragraph_candidates(doc: &Html) -> Vec<(String, Provenance)> {
    let Some(paragraphs) = PARAGRAPHS.as_ref() else {
        return Vec::new();
    };
    doc.select(paragraphs)
        .map(|p| element_text(p, " "))
        .filter(|t| char_len(t) >= LONG_PARAGRAPH_MIN)
        .map(|t| (t, Provenance::LongParagraph))
        .collect()
}

/// Every raw candidate from all three strategies, in discovery order.
pub fn discover(doc: &Html) -> Vec<(String, Provenance)> {
    let mut all = structural_candidates(doc);
    all.extend(heading_candidates(doc));
    all.extend(paragraph_candidates(doc));
    all
}

/// Best valid main-body candidate, or `None` when nothing qualifies.
pub fn extract_main_body(doc: &Html) -> Option<ExtractionCandidate> {
    let mut best: Option<ExtractionCandidate> = None;
    for (raw, provenance) in discover(doc) {
        let Some(text) = accept(&raw, Bounds::BODY, true) else {
            continue;
        };
        let score = score_text(&text);
        if best.as_ref().is_none_or(|b| score > b.score) {
            best = Some(ExtractionCandidate {
                text,
                provenance,
                score,
            });
        }
    }
    best
}
