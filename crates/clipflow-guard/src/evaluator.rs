//! The evaluator: fixed-order rule execution with auto-fix

use regex::Regex;
use thiserror::Error;

use clipflow_utils::Platform;

use crate::autofix;
use crate::config::{GuardrailConfig, PlatformRules};
use crate::text;
use crate::types::{EvalTarget, EvaluationResult, Rule, Verdict, Violation};

/// Errors constructing an [`Evaluator`].
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Invalid spam pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Pure, deterministic content evaluator.
///
/// Construction compiles the configured spam patterns once; evaluation then
/// performs no I/O and no allocation beyond the result itself. Rules are
/// evaluated in the declaration order of [`Rule`] and never short-circuit,
/// so the violation list is complete and stable.
pub struct Evaluator {
    config: GuardrailConfig,
    spam_patterns: Vec<Regex>,
}

impl Evaluator {
    /// Build an evaluator, compiling spam patterns from the configuration.
    ///
    /// # Errors
    /// Returns [`GuardError::InvalidPattern`] if any configured spam regex
    /// fails to compile.
    pub fn new(config: &GuardrailConfig) -> Result<Self, GuardError> {
        let spam_patterns = config
            .spam
            .patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| GuardError::InvalidPattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config: config.clone(),
            spam_patterns,
        })
    }

    /// Evaluate transcript text (pass 1).
    #[must_use]
    pub fn evaluate_transcript(&self, text: &str) -> EvaluationResult {
        let normalized = text::normalize(text);
        let violations = self.transcript_violations(&normalized);

        let (final_violations, fixes_applied, fixed_text) =
            if self.config.autofix.enabled && violations.iter().any(|v| v.auto_fixable) {
                let (fixed, actions) = autofix::fix_transcript(&normalized, &self.config.autofix);
                if actions.is_empty() {
                    (violations, actions, None)
                } else {
                    let remaining = self.transcript_violations(&fixed);
                    (remaining, actions, Some(fixed))
                }
            } else {
                (violations, Vec::new(), None)
            };

        let verdict = self.verdict(&final_violations, !fixes_applied.is_empty());
        EvaluationResult {
            target: EvalTarget::Transcript,
            violations: final_violations,
            verdict,
            fixes_applied,
            fixed_text,
        }
    }

    /// Evaluate a drafted post body for a platform (pass 2).
    #[must_use]
    pub fn evaluate_post(&self, text: &str, platform: Platform) -> EvaluationResult {
        let limits = self.config.platform_rules(platform.as_str());
        let normalized = text::normalize(text);
        let violations = self.post_violations(&normalized, &limits);

        let (final_violations, fixes_applied, fixed_text) =
            if self.config.autofix.enabled && violations.iter().any(|v| v.auto_fixable) {
                let (fixed, actions) =
                    autofix::fix_post(&normalized, &limits, &self.config.autofix);
                if actions.is_empty() {
                    (violations, actions, None)
                } else {
                    let remaining = self.post_violations(&fixed, &limits);
                    (remaining, actions, Some(fixed))
                }
            } else {
                (violations, Vec::new(), None)
            };

        let verdict = self.verdict(&final_violations, !fixes_applied.is_empty());
        EvaluationResult {
            target: EvalTarget::Post { platform },
            violations: final_violations,
            verdict,
            fixes_applied,
            fixed_text,
        }
    }

    fn verdict(&self, violations: &[Violation], fixed: bool) -> Verdict {
        let cutoff = self.config.severity.blocking_cutoff;
        if violations.iter().any(|v| v.severity >= cutoff) {
            Verdict::Fail
        } else if fixed {
            Verdict::PassWithAutofix
        } else {
            Verdict::Pass
        }
    }

    fn violation(&self, rule: Rule, hard: bool, message: String, auto_fixable: bool) -> Violation {
        Violation {
            rule,
            severity: self.config.severity.weight(rule, hard),
            message,
            auto_fixable,
        }
    }

    fn transcript_violations(&self, text: &str) -> Vec<Violation> {
        let rules = &self.config.transcript;
        let autofix_on = self.config.autofix.enabled;
        let mut violations = Vec::new();

        let chars = text.chars().count();
        if chars < rules.min_length {
            violations.push(self.violation(
                Rule::TooShort,
                false,
                format!(
                    "Transcript too short: {chars} chars (min: {})",
                    rules.min_length
                ),
                false,
            ));
        }
        if chars > rules.max_length {
            violations.push(self.violation(
                Rule::TooLong,
                false,
                format!(
                    "Transcript too long: {chars} chars (max: {})",
                    rules.max_length
                ),
                false,
            ));
        }

        let words = text::word_count(text);
        if words < rules.min_word_count {
            violations.push(self.violation(
                Rule::WordCountLow,
                false,
                format!(
                    "Insufficient word count: {words} (min: {})",
                    rules.min_word_count
                ),
                false,
            ));
        }

        let repetition = text::repetition_ratio(text);
        if repetition > rules.max_repetition_ratio {
            violations.push(self.violation(
                Rule::Repetition,
                false,
                format!("Content is too repetitive (ratio: {repetition:.2})"),
                false,
            ));
        }

        let alpha = text::alpha_ratio(text);
        if alpha < rules.min_alpha_ratio {
            violations.push(self.violation(
                Rule::AlphaRatio,
                false,
                format!("Insufficient letter content (alpha ratio: {alpha:.2})"),
                false,
            ));
        }

        if autofix::is_messy_whitespace(text) {
            violations.push(self.violation(
                Rule::Whitespace,
                false,
                "Extraneous whitespace".to_string(),
                autofix_on && self.config.autofix.trim_whitespace,
            ));
        }

        violations
    }

    fn post_violations(&self, text: &str, limits: &PlatformRules) -> Vec<Violation> {
        let spam = &self.config.spam;
        let autofix_cfg = &self.config.autofix;
        let mut violations = Vec::new();

        let chars = text.chars().count();
        if chars < limits.min_length {
            violations.push(self.violation(
                Rule::TooShort,
                false,
                format!("Post too short: {chars} chars (min: {})", limits.min_length),
                false,
            ));
        }
        if chars > limits.max_length {
            violations.push(self.violation(
                Rule::LengthExceeded,
                false,
                format!("Post too long: {chars} chars (max: {})", limits.max_length),
                autofix_cfg.enabled && autofix_cfg.truncate_to_limit,
            ));
        }

        let repetition = text::repetition_ratio(text);
        if repetition > self.config.transcript.max_repetition_ratio {
            violations.push(self.violation(
                Rule::Repetition,
                false,
                format!("Content is too repetitive (ratio: {repetition:.2})"),
                false,
            ));
        }

        for (pattern, regex) in spam.patterns.iter().zip(&self.spam_patterns) {
            if regex.is_match(text) {
                violations.push(self.violation(
                    Rule::SpamPattern,
                    false,
                    format!("Spam pattern matched: {pattern}"),
                    false,
                ));
            }
        }

        let upper = text::uppercase_ratio(text);
        let alpha_chars = text.chars().filter(|c| c.is_alphabetic()).count();
        if alpha_chars >= spam.uppercase_min_alpha && upper > spam.max_uppercase_ratio {
            let hard = upper > spam.max_uppercase_ratio_hard;
            violations.push(self.violation(
                Rule::UppercaseRatio,
                hard,
                format!("Excessive uppercase (ratio: {upper:.2})"),
                false,
            ));
        }

        let run = text::longest_punctuation_run(text);
        if run > spam.max_punctuation_run {
            let hard = run > spam.max_punctuation_run_hard;
            violations.push(self.violation(
                Rule::PunctuationRun,
                hard,
                format!("Punctuation run of {run} characters"),
                false,
            ));
        }

        let hashtags = text::count_hashtags(text);
        if hashtags > limits.max_hashtags {
            let hard = hashtags > limits.max_hashtags_hard;
            violations.push(self.violation(
                Rule::ExcessHashtags,
                hard,
                format!("Too many hashtags: {hashtags} (max: {})", limits.max_hashtags),
                autofix_cfg.enabled && autofix_cfg.dedupe_hashtags,
            ));
        }

        let emoji = text::count_emoji(text);
        if emoji > limits.max_emoji {
            let hard = emoji > limits.max_emoji_hard;
            violations.push(self.violation(
                Rule::ExcessEmoji,
                hard,
                format!("Too many emoji: {emoji} (max: {})", limits.max_emoji),
                false,
            ));
        }

        for tag in text::extract_hashtags(text) {
            let tag_len = tag.trim_start_matches('#').chars().count();
            if tag_len > limits.max_hashtag_length {
                violations.push(self.violation(
                    Rule::HashtagLength,
                    false,
                    format!(
                        "Hashtag too long: {tag_len} chars (max: {})",
                        limits.max_hashtag_length
                    ),
                    false,
                ));
            }
        }

        let alpha = text::alpha_ratio(text);
        if alpha < self.config.transcript.min_alpha_ratio {
            violations.push(self.violation(
                Rule::AlphaRatio,
                false,
                format!("Insufficient letter content (alpha ratio: {alpha:.2})"),
                false,
            ));
        }

        if autofix::is_messy_whitespace(text) {
            violations.push(self.violation(
                Rule::Whitespace,
                false,
                "Extraneous whitespace".to_string(),
                autofix_cfg.enabled && autofix_cfg.trim_whitespace,
            ));
        }

        violations
    }
}
