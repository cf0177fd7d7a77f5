//! Text cleaning and acceptance rules for description candidates.
//!
//! Every string found on a detail page, and every catalog text field, goes
//! through [`clean_text`] and then [`validate`] against a [`Bounds`] before it
//! may become a description.

use html_escape::decode_html_entities;
use once_cell::sync::Lazy;
use regex::Regex;

/// Regulatory fragments cut out of otherwise good text.
const STRIP_PHRASES: &[&str] = &[
    "18歳未満",
    "成人向け",
    "アダルトサイト",
    "ご利用は18歳以上",
    "年齢認証",
    "無修正",
];

/// Site notices that disqualify a whole candidate.
const NG_PHRASES: &[&str] = &[
    "From here on, it will be an adult site",
    "18歳未満",
    "未成年",
    "18才未満",
    "アダルト商品を取り扱う",
    "成人向け",
    "アダルトサイト",
    "ご利用は18歳以上",
];

/// Page chrome (terms, cookie banner, sign-up, privacy) that disqualifies body text.
const BOILERPLATE_PHRASES: &[&str] = &[
    "利用規約",
    "Cookie",
    "会員登録",
    "プライバシー",
    "Terms of Use",
    "Privacy Policy",
];

#[allow(clippy::expect_used)]
static MULTI_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("valid regex"));

/// Inclusive character-count window a candidate must fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: usize,
    pub max: usize,
}

impl Bounds {
    pub const BODY: Bounds = Bounds { min: 60, max: 1200 };
    pub const META: Bounds = Bounds { min: 30, max: 700 };
    pub const CATALOG: Bounds = Bounds { min: 30, max: 800 };

    pub fn contains(&self, len: usize) -> bool {
        (self.min..=self.max).contains(&len)
    }
}

/// Length in characters, not bytes.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Decode entities, drop regulatory fragments, collapse whitespace, trim.
///
/// Repeats until nothing changes, so `clean_text(clean_text(x)) == clean_text(x)`.
/// Each pass that changes the text makes it strictly shorter, so this terminates.
pub fn clean_text(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = clean_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn clean_once(input: &str) -> String {
    let mut s = decode_html_entities(input).trim().to_string();
    s = collapse_whitespace(&s);
    for phrase in STRIP_PHRASES {
        s = s.replace(phrase, "");
    }
    s.trim().to_string()
}

fn collapse_whitespace(s: &str) -> String {
    MULTI_WS.replace_all(s, " ").into_owned()
}

/// Whether `text` contains any whole-candidate disqualifier.
pub fn contains_forbidden(text: &str, include_boilerplate: bool) -> bool {
    NG_PHRASES.iter().any(|p| text.contains(p))
        || (include_boilerplate && BOILERPLATE_PHRASES.iter().any(|p| text.contains(p)))
}

/// Acceptance rule for cleaned text: length inside `bounds`, no disqualifying phrase.
pub fn validate(text: &str, bounds: Bounds, include_boilerplate: bool) -> bool {
    bounds.contains(char_len(text)) && !contains_forbidden(text, include_boilerplate)
}

/// Clean then validate; `Some(cleaned)` when accepted.
pub fn accept(raw: &str, bounds: Bounds, include_boilerplate: bool) -> Option<String> {
    let cleaned = clean_text(raw);
    validate(&cleaned, bounds, include_boilerplate).then_some(cleaned)
}

/// Remove every disqualifying phrase as a substring. Used on synthesized text,
/// which must be returned even when a title happens to carry one.
pub fn scrub_forbidden(text: &str) -> String {
    let mut current = clean_text(text);
    loop {
        let mut next = current.clone();
        for phrase in NG_PHRASES.iter().chain(BOILERPLATE_PHRASES) {
            next = next.replace(phrase, "");
        }
        let next = clean_text(&next);
        if next == current {
            return next;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_decodes_and_collapses() {
        let cleaned = clean_text("  Tom &amp; Jerry\n\n   meet   again  ");
        assert_eq!(cleaned, "Tom & Jerry meet again");
    }

    #[test]
    fn test_clean_text_keeps_single_newlines() {
        assert_eq!(clean_text("line one\nline two"), "line one\nline two");
    }

    #[test]
    fn test_clean_text_strips_regulatory_fragment() {
        let cleaned = clean_text("素敵な作品です。18歳未満の方はご覧いただけません。");
        assert_eq!(cleaned, "素敵な作品です。の方はご覧いただけません。");
    }

    #[test]
    fn test_clean_text_is_idempotent() {
        let samples = [
            "plain text",
            "&amp;amp; double encoded &lt;b&gt;",
            "18歳18歳未満未満 nested fragment",
            "spaced   \t\n  out\u{3000}\u{3000}text",
            "  成人向け  ",
        ];
        for s in samples {
            let once = clean_text(s);
            assert_eq!(clean_text(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_validate_bounds() {
        let short = "a".repeat(59);
        let ok = "a".repeat(60);
        let long = "a".repeat(1201);
        assert!(!validate(&short, Bounds::BODY, true));
        assert!(validate(&ok, Bounds::BODY, true));
        assert!(!validate(&long, Bounds::BODY, true));
    }

    #[test]
    fn test_validate_counts_characters_not_bytes() {
        let text = "あ".repeat(30);
        assert_eq!(text.len(), 90);
        assert!(validate(&text, Bounds::META, false));
        assert!(!validate(&text, Bounds::BODY, false));
    }

    #[test]
    fn test_validate_rejects_boilerplate() {
        let text = format!("{} 会員登録はこちら", "x".repeat(70));
        assert!(!validate(&text, Bounds::BODY, true));
        assert!(validate(&text, Bounds::BODY, false));
    }

    #[test]
    fn test_validate_rejects_ng_phrase() {
        let text = format!("{} 未成年の方は退出してください", "x".repeat(70));
        assert!(!validate(&text, Bounds::BODY, false));
    }

    #[test]
    fn test_accept_returns_cleaned() {
        let raw = format!("  {}   end ", "word ".repeat(15));
        let accepted = accept(&raw, Bounds::BODY, true).unwrap();
        assert!(accepted.ends_with("word end"));
        assert!(!accepted.contains("  "));
    }

    #[test]
    fn test_scrub_forbidden() {
        let scrubbed = scrub_forbidden("未成年 Cookie title");
        assert_eq!(scrubbed, "title");
        assert!(!contains_forbidden(&scrubbed, true));
    }
}
