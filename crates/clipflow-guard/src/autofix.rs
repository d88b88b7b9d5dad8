//! Deterministic auto-fix transformations
//!
//! Each transformation is idempotent: applying it to already-fixed text is a
//! no-op, so re-evaluating fixed text never flags the same fixable rule
//! again.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{AutofixConfig, PlatformRules};

static SPACE_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static BLANK_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#[\w\p{Alphabetic}]+").unwrap());

/// A repair performed by auto-fix, recorded in the evaluation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum AutofixAction {
    /// Trimmed edges, collapsed space runs and duplicate blank lines.
    TrimmedWhitespace,
    /// Removed repeated hashtags, keeping the first occurrence of each.
    DedupedHashtags { removed: usize },
    /// Truncated the body to the platform length limit.
    TruncatedToLimit { limit: usize },
}

/// Apply the enabled transformations for a post body, in fixed order:
/// whitespace → hashtag dedupe → truncation (so the final text respects the
/// length limit whatever the earlier fixes did).
///
/// Returns the fixed text and the actions actually applied; an action is
/// recorded only when it changed the text.
#[must_use]
pub fn fix_post(text: &str, limits: &PlatformRules, cfg: &AutofixConfig) -> (String, Vec<AutofixAction>) {
    let mut actions = Vec::new();
    let mut fixed = text.to_string();

    if cfg.trim_whitespace {
        let cleaned = clean_whitespace(&fixed);
        if cleaned != fixed {
            actions.push(AutofixAction::TrimmedWhitespace);
            fixed = cleaned;
        }
    }

    if cfg.dedupe_hashtags {
        let (deduped, removed) = dedupe_hashtags(&fixed);
        if removed > 0 {
            actions.push(AutofixAction::DedupedHashtags { removed });
            fixed = deduped;
        }
    }

    if cfg.truncate_to_limit && fixed.chars().count() > limits.max_length {
        fixed = truncate(&fixed, limits.max_length);
        actions.push(AutofixAction::TruncatedToLimit {
            limit: limits.max_length,
        });
    }

    (fixed, actions)
}

/// Apply whitespace cleanup for transcripts.
#[must_use]
pub fn fix_transcript(text: &str, cfg: &AutofixConfig) -> (String, Vec<AutofixAction>) {
    let mut actions = Vec::new();
    let mut fixed = text.to_string();

    if cfg.trim_whitespace {
        let cleaned = clean_whitespace(&fixed);
        if cleaned != fixed {
            actions.push(AutofixAction::TrimmedWhitespace);
            fixed = cleaned;
        }
    }

    (fixed, actions)
}

/// Whether whitespace cleanup would change the text.
#[must_use]
pub(crate) fn is_messy_whitespace(text: &str) -> bool {
    clean_whitespace(text) != text
}

/// Trim edges, collapse space/tab runs, collapse 3+ newlines to a blank line.
fn clean_whitespace(text: &str) -> String {
    let collapsed = SPACE_RUN_RE.replace_all(text, " ");
    let collapsed = BLANK_LINE_RE.replace_all(&collapsed, "\n\n");
    collapsed.trim().to_string()
}

/// Remove repeated hashtags (case-insensitive), keeping the first of each.
/// Returns the cleaned text and how many tags were removed.
fn dedupe_hashtags(text: &str) -> (String, usize) {
    let mut seen = std::collections::HashSet::new();
    let mut removed = 0;

    let result = HASHTAG_RE.replace_all(text, |caps: &regex::Captures<'_>| {
        let tag = caps.get(0).map_or("", |m| m.as_str());
        if seen.insert(tag.to_lowercase()) {
            tag.to_string()
        } else {
            removed += 1;
            String::new()
        }
    });

    // Dropping a tag can leave a doubled space behind
    let cleaned = if removed > 0 {
        clean_whitespace(&result)
    } else {
        result.into_owned()
    };

    (cleaned, removed)
}

/// Truncate to `limit` characters total, ending with an ellipsis marker.
fn truncate(text: &str, limit: usize) -> String {
    let keep = limit.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    // Avoid a dangling space before the marker
    while out.ends_with(char::is_whitespace) {
        out.pop();
    }
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> PlatformRules {
        PlatformRules::default()
    }

    fn cfg() -> AutofixConfig {
        AutofixConfig::default()
    }

    #[test]
    fn truncates_to_limit() {
        let long = "a".repeat(600);
        let (fixed, actions) = fix_post(&long, &limits(), &cfg());
        assert!(fixed.chars().count() <= 500);
        assert!(fixed.ends_with("..."));
        assert!(actions.contains(&AutofixAction::TruncatedToLimit { limit: 500 }));
    }

    #[test]
    fn truncation_is_char_aware() {
        let long = "я".repeat(600);
        let (fixed, _) = fix_post(&long, &limits(), &cfg());
        assert!(fixed.chars().count() <= 500);
    }

    #[test]
    fn whitespace_cleanup() {
        let (fixed, actions) = fix_post("  hello   world \n\n\n\nbye  ", &limits(), &cfg());
        assert_eq!(fixed, "hello world\n\nbye");
        assert_eq!(actions, vec![AutofixAction::TrimmedWhitespace]);
    }

    #[test]
    fn dedupes_hashtags_case_insensitive() {
        let (fixed, actions) = fix_post("#Rust is great #rust #RUST #async", &limits(), &cfg());
        assert_eq!(fixed, "#Rust is great #async");
        assert_eq!(actions, vec![AutofixAction::DedupedHashtags { removed: 2 }]);
    }

    #[test]
    fn fix_is_idempotent() {
        let messy = format!("  {}   #tag #tag!!!  ", "word ".repeat(150));
        let (once, _) = fix_post(&messy, &limits(), &cfg());
        let (twice, actions) = fix_post(&once, &limits(), &cfg());
        assert_eq!(once, twice);
        assert!(actions.is_empty());
    }

    #[test]
    fn disabled_fixes_do_nothing() {
        let off = AutofixConfig {
            enabled: true,
            truncate_to_limit: false,
            trim_whitespace: false,
            dedupe_hashtags: false,
        };
        let text = "  #a #a ".to_string() + &"x".repeat(600);
        let (fixed, actions) = fix_post(&text, &limits(), &off);
        assert_eq!(fixed, text);
        assert!(actions.is_empty());
    }
}
