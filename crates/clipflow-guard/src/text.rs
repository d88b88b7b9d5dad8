//! Text measurement helpers shared by the evaluator and the drafting stage

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#[\w\p{Alphabetic}]+").unwrap());

/// Normalize text to NFC so length and ratio measurements are stable
/// regardless of how the source composed its code points.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.nfc().collect()
}

/// Whitespace-separated word count.
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Share of alphabetic characters among all characters, 0.0 for empty text.
#[must_use]
pub fn alpha_ratio(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let alpha = text.chars().filter(|c| c.is_alphabetic()).count();
    alpha as f64 / total as f64
}

/// Repetition ratio: `1 - unique_words / total_words`, case-insensitive.
///
/// Short texts (under 50 characters or 10 words) report 0.0 — too little
/// signal to call them repetitive.
#[must_use]
pub fn repetition_ratio(text: &str) -> f64 {
    if text.chars().count() < 50 {
        return 0.0;
    }
    let words: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
    if words.len() < 10 {
        return 0.0;
    }
    let unique: std::collections::HashSet<&str> = words.iter().map(String::as_str).collect();
    1.0 - unique.len() as f64 / words.len() as f64
}

/// Uppercase share of alphabetic characters, 0.0 when no letters.
#[must_use]
pub fn uppercase_ratio(text: &str) -> f64 {
    let alpha = text.chars().filter(|c| c.is_alphabetic()).count();
    if alpha == 0 {
        return 0.0;
    }
    let upper = text.chars().filter(|c| c.is_uppercase()).count();
    upper as f64 / alpha as f64
}

/// Length of the longest run of punctuation characters (`!?.,;:`).
#[must_use]
pub fn longest_punctuation_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if matches!(c, '!' | '?' | '.' | ',' | ';' | ':') {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Extract hashtag tokens (`#` included) in order of appearance.
#[must_use]
pub fn extract_hashtags(text: &str) -> Vec<String> {
    HASHTAG_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Count hashtags in the text.
#[must_use]
pub fn count_hashtags(text: &str) -> usize {
    HASHTAG_RE.find_iter(text).count()
}

/// Whether a character falls in one of the common emoji blocks.
#[must_use]
pub const fn is_emoji(c: char) -> bool {
    matches!(c,
        '\u{1F300}'..='\u{1F5FF}'   // symbols & pictographs
        | '\u{1F600}'..='\u{1F64F}' // emoticons
        | '\u{1F680}'..='\u{1F6FF}' // transport & map
        | '\u{1F900}'..='\u{1F9FF}' // supplemental symbols
        | '\u{1F1E6}'..='\u{1F1FF}' // regional indicators (flags)
        | '\u{2600}'..='\u{27BF}'   // misc symbols & dingbats
    )
}

/// Count emoji characters via Unicode-range classification.
#[must_use]
pub fn count_emoji(text: &str) -> usize {
    text.chars().filter(|c| is_emoji(*c)).count()
}

/// Detect the dominant script of the text.
///
/// Cyrillic-majority text is tagged `ru`, Latin-majority `en`, anything else
/// `unknown`. Used only when the caption source does not report a language.
#[must_use]
pub fn detect_language(text: &str) -> &'static str {
    let cyrillic = text
        .chars()
        .filter(|c| ('\u{0400}'..='\u{04FF}').contains(c))
        .count();
    let latin = text
        .chars()
        .filter(|c| c.is_alphabetic() && !('\u{0400}'..='\u{04FF}').contains(c))
        .count();

    if cyrillic > latin {
        "ru"
    } else if latin > cyrillic {
        "en"
    } else {
        "unknown"
    }
}

/// Per-text statistics surfaced in status output and approval presentations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStats {
    pub char_count: usize,
    pub word_count: usize,
    pub alpha_ratio: f64,
    pub hashtag_count: usize,
    pub emoji_count: usize,
}

impl TextStats {
    #[must_use]
    pub fn of(text: &str) -> Self {
        Self {
            char_count: text.chars().count(),
            word_count: word_count(text),
            alpha_ratio: alpha_ratio(text),
            hashtag_count: count_hashtags(text),
            emoji_count: count_emoji(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashtag_extraction() {
        let text = "Great talk! #rust #async #rust #кодинг";
        assert_eq!(
            extract_hashtags(text),
            vec!["#rust", "#async", "#rust", "#кодинг"]
        );
        assert_eq!(count_hashtags(text), 4);
    }

    #[test]
    fn emoji_counting() {
        assert_eq!(count_emoji("hello 🚀🔥 world ✨"), 3);
        assert_eq!(count_emoji("plain text"), 0);
    }

    #[test]
    fn repetition_short_text_is_zero() {
        assert_eq!(repetition_ratio("spam spam spam"), 0.0);
    }

    #[test]
    fn repetition_detects_repeated_words() {
        let text = "buy now buy now buy now buy now buy now buy now buy now buy now";
        assert!(repetition_ratio(text) > 0.5);
    }

    #[test]
    fn language_detection() {
        assert_eq!(detect_language("Привет, как дела сегодня"), "ru");
        assert_eq!(detect_language("Hello there friend"), "en");
        assert_eq!(detect_language("12345"), "unknown");
    }

    #[test]
    fn punctuation_runs() {
        assert_eq!(longest_punctuation_run("wait... what?!?!"), 4);
        assert_eq!(longest_punctuation_run("calm text"), 1);
    }

    #[test]
    fn uppercase_ratio_measures_letters_only() {
        assert!((uppercase_ratio("ABC def") - 0.5).abs() < 1e-9);
        assert_eq!(uppercase_ratio("12345"), 0.0);
    }
}
