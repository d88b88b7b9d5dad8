//! Guardrail rule thresholds
//!
//! All thresholds live in one serde structure so the full rule set can be
//! embedded in the process configuration file. Defaults follow the
//! production values the system has been run with.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::Rule;

/// Thresholds for transcript evaluation (pass 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptRules {
    /// Minimum transcript length in characters.
    pub min_length: usize,
    /// Maximum transcript length in characters.
    pub max_length: usize,
    /// Minimum transcript word count.
    pub min_word_count: usize,
    /// Repetition ratio (1 - unique/total words) above which content is
    /// considered repetitive.
    pub max_repetition_ratio: f64,
    /// Minimum share of alphabetic characters.
    pub min_alpha_ratio: f64,
}

impl Default for TranscriptRules {
    fn default() -> Self {
        Self {
            min_length: 100,
            max_length: 50_000,
            min_word_count: 20,
            max_repetition_ratio: 0.5,
            min_alpha_ratio: 0.5,
        }
    }
}

/// Per-platform limits for post evaluation (pass 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformRules {
    /// Minimum post length in characters.
    pub min_length: usize,
    /// Maximum post length in characters; breaches are auto-fixable via
    /// truncation when enabled.
    pub max_length: usize,
    /// Hashtag count warning cap.
    pub max_hashtags: usize,
    /// Hashtag count blocking cap.
    pub max_hashtags_hard: usize,
    /// Emoji count warning cap.
    pub max_emoji: usize,
    /// Emoji count blocking cap.
    pub max_emoji_hard: usize,
    /// Maximum hashtag length, `#` excluded.
    pub max_hashtag_length: usize,
}

impl Default for PlatformRules {
    fn default() -> Self {
        Self {
            min_length: 20,
            max_length: 500,
            max_hashtags: 5,
            max_hashtags_hard: 10,
            max_emoji: 10,
            max_emoji_hard: 20,
            max_hashtag_length: 30,
        }
    }
}

/// Spam heuristics applied to post bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpamRules {
    /// Regex patterns whose match is a spam violation.
    pub patterns: Vec<String>,
    /// Uppercase share of alphabetic characters: warning cap.
    pub max_uppercase_ratio: f64,
    /// Uppercase share: blocking cap.
    pub max_uppercase_ratio_hard: f64,
    /// Minimum alphabetic character count before the uppercase rule applies.
    pub uppercase_min_alpha: usize,
    /// Longest punctuation run: warning cap.
    pub max_punctuation_run: usize,
    /// Longest punctuation run: blocking cap.
    pub max_punctuation_run_hard: usize,
}

impl Default for SpamRules {
    fn default() -> Self {
        Self {
            patterns: vec![
                r"!{3,}".to_string(),
                r"[А-ЯA-Z]{20,}".to_string(),
                r"(.)\1{10,}".to_string(),
            ],
            max_uppercase_ratio: 0.5,
            max_uppercase_ratio_hard: 0.8,
            uppercase_min_alpha: 20,
            max_punctuation_run: 4,
            max_punctuation_run_hard: 10,
        }
    }
}

/// Which auto-fix transformations are enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutofixConfig {
    /// Master switch; when false no fix runs and fixable violations stand.
    pub enabled: bool,
    /// Truncate post bodies over the platform length limit.
    pub truncate_to_limit: bool,
    /// Trim edges, collapse space runs and duplicate blank lines.
    pub trim_whitespace: bool,
    /// Remove repeated hashtags, keeping the first occurrence.
    pub dedupe_hashtags: bool,
}

impl Default for AutofixConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            truncate_to_limit: true,
            trim_whitespace: true,
            dedupe_hashtags: true,
        }
    }
}

/// Per-rule severity weights and the blocking cutoff.
///
/// A violation whose severity is at or above `blocking_cutoff` fails the
/// evaluation; anything below is a warning. Cap-style rules (hashtags,
/// emoji, uppercase, punctuation) use `soft_cap` severity when the warning
/// cap is breached and `hard_cap` when the blocking cap is breached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityConfig {
    pub blocking_cutoff: u8,
    pub too_short: u8,
    pub too_long: u8,
    pub length_exceeded: u8,
    pub word_count_low: u8,
    pub repetition: u8,
    pub spam_pattern: u8,
    pub soft_cap: u8,
    pub hard_cap: u8,
    pub hashtag_length: u8,
    pub alpha_ratio: u8,
    pub whitespace: u8,
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            blocking_cutoff: 6,
            too_short: 8,
            too_long: 8,
            length_exceeded: 8,
            word_count_low: 8,
            repetition: 7,
            spam_pattern: 9,
            soft_cap: 4,
            hard_cap: 9,
            hashtag_length: 3,
            alpha_ratio: 7,
            whitespace: 2,
        }
    }
}

impl SeverityConfig {
    /// Severity weight for a rule; cap-style rules pass `hard` according to
    /// which cap was breached.
    #[must_use]
    pub fn weight(&self, rule: Rule, hard: bool) -> u8 {
        match rule {
            Rule::TooShort => self.too_short,
            Rule::TooLong => self.too_long,
            Rule::LengthExceeded => self.length_exceeded,
            Rule::WordCountLow => self.word_count_low,
            Rule::Repetition => self.repetition,
            Rule::SpamPattern => self.spam_pattern,
            Rule::UppercaseRatio
            | Rule::PunctuationRun
            | Rule::ExcessHashtags
            | Rule::ExcessEmoji => {
                if hard {
                    self.hard_cap
                } else {
                    self.soft_cap
                }
            }
            Rule::HashtagLength => self.hashtag_length,
            Rule::AlphaRatio => self.alpha_ratio,
            Rule::Whitespace => self.whitespace,
        }
    }
}

/// Complete guardrail configuration for both evaluation passes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    pub transcript: TranscriptRules,
    /// Limits keyed by platform name (e.g. `"threads"`). Platforms without
    /// an entry use [`PlatformRules::default`].
    pub platforms: BTreeMap<String, PlatformRules>,
    pub spam: SpamRules,
    pub autofix: AutofixConfig,
    pub severity: SeverityConfig,
}

impl GuardrailConfig {
    /// Limits for the given platform, falling back to defaults.
    #[must_use]
    pub fn platform_rules(&self, platform: &str) -> PlatformRules {
        self.platforms.get(platform).cloned().unwrap_or_default()
    }
}
