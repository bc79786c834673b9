use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::MAX_TITLE_CHARS;

static EMOJI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x{1F300}-\x{1F9FF}\x{1FA70}-\x{1FAFF}\x{2600}-\x{27BF}\x{FE0F}\x{200D}]")
        .unwrap()
});

static HYPE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(huge|mega|super|bumper)\s+(deal|sale|discount|offer)s?[\s:\-—–]*").unwrap()
});

static FILLER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(link\s+in\s+comments?|check\s+comments?|see\s+below|read\s+caption)")
        .unwrap()
});

static EDGE_PUNCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[!\s\-|:;,—–]+|[!\s\-|:;,—–]+$").unwrap());

static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Below this many characters a cleaned title is considered pure decoration.
const MIN_CLEAN_CHARS: usize = 5;

/// Truncate to at most `max` characters.
#[must_use]
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Strip hype, filler and emoji from a post title.
///
/// When nothing meaningful is left the original title is kept (trimmed).
#[must_use]
pub fn clean_title(title: &str) -> String {
    let stripped = EMOJI_RE.replace_all(title, "");
    let stripped = HYPE_PREFIX_RE.replace(stripped.trim_start(), "");
    let stripped = FILLER_RE.replace_all(&stripped, "");
    let stripped = MULTI_SPACE_RE.replace_all(&stripped, " ");
    let cleaned = EDGE_PUNCT_RE.replace_all(&stripped, "");

    let result = if cleaned.chars().count() < MIN_CLEAN_CHARS {
        title.trim().to_string()
    } else {
        capitalize_first(&cleaned)
    };

    truncate_chars(&result, MAX_TITLE_CHARS)
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_hype_and_emoji() {
        assert_eq!(
            clean_title("🔥🔥 HUGE DEAL: boAt Airdopes 141 at ₹999"),
            "BoAt Airdopes 141 at ₹999"
        );
        assert_eq!(
            clean_title("MEGA SALE — Levi's jeans flat 60% off"),
            "Levi's jeans flat 60% off"
        );
    }

    #[test]
    fn test_strips_filler_phrases() {
        assert_eq!(
            clean_title("Samsung 980 SSD 1TB - link in comments"),
            "Samsung 980 SSD 1TB"
        );
        assert_eq!(
            clean_title("kindle paperwhite | see below"),
            "Kindle paperwhite"
        );
    }

    #[test]
    fn test_decoration_only_falls_back() {
        assert_eq!(clean_title("  🔥🔥🔥 !!! "), "🔥🔥🔥 !!!");
        assert_eq!(clean_title("⚡ wow ⚡"), "⚡ wow ⚡");
    }

    #[test]
    fn test_truncates_to_limit() {
        let long = "a".repeat(450);
        let cleaned = clean_title(&long);
        assert_eq!(cleaned.chars().count(), MAX_TITLE_CHARS);
        assert!(cleaned.starts_with('A'));
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("₹₹₹₹", 2), "₹₹");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
