//! Age-verification interstitial detection.
//!
//! Only detects; the pipeline never submits the gate's form or adds cookies
//! beyond the single consent cookie from the configuration.

/// Phrases (Japanese and English) that only appear on the age-check interstitial.
const AGE_GATE_MARKERS: &[&str] = &[
    "18歳未満",
    "未満の方のアクセス",
    "成人向け",
    "アダルトサイト",
    "under the age of 18",
    "age verification",
];

/// True when the decoded page text is an age-verification page.
pub fn is_age_gated(page_text: &str) -> bool {
    let lowered = page_text.to_lowercase();
    AGE_GATE_MARKERS
        .iter()
        .any(|marker| page_text.contains(marker) || lowered.contains(marker))
}
