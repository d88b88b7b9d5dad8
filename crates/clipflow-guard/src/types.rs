//! Result types for guardrail evaluation

use clipflow_utils::Platform;
use serde::{Deserialize, Serialize};

use crate::autofix::AutofixAction;

/// Identifies which rule produced a violation.
///
/// Declaration order is the evaluation and reporting order; results are
/// stable across runs for the same input and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Text below the minimum character length.
    TooShort,
    /// Text above the maximum character length (transcripts).
    TooLong,
    /// Post body above the platform limit; auto-fixable via truncation.
    LengthExceeded,
    /// Transcript below the minimum word count.
    WordCountLow,
    /// Unique-word ratio indicates repetitive content.
    Repetition,
    /// A configured spam regex matched.
    SpamPattern,
    /// Uppercase share of alphabetic characters over a cap.
    UppercaseRatio,
    /// Run of punctuation characters over a cap.
    PunctuationRun,
    /// Hashtag count over a cap.
    ExcessHashtags,
    /// Emoji count over a cap.
    ExcessEmoji,
    /// A hashtag longer than the configured maximum.
    HashtagLength,
    /// Alphabetic share of all characters below the threshold.
    AlphaRatio,
    /// Leading/trailing whitespace, space runs, or duplicate blank lines;
    /// auto-fixable.
    Whitespace,
}

impl Rule {
    /// Canonical snake_case name used in ledger payloads.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TooShort => "too_short",
            Self::TooLong => "too_long",
            Self::LengthExceeded => "length_exceeded",
            Self::WordCountLow => "word_count_low",
            Self::Repetition => "repetition",
            Self::SpamPattern => "spam_pattern",
            Self::UppercaseRatio => "uppercase_ratio",
            Self::PunctuationRun => "punctuation_run",
            Self::ExcessHashtags => "excess_hashtags",
            Self::ExcessEmoji => "excess_emoji",
            Self::HashtagLength => "hashtag_length",
            Self::AlphaRatio => "alpha_ratio",
            Self::Whitespace => "whitespace",
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single rule breach found during evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Which rule was breached.
    pub rule: Rule,
    /// Numeric severity weight from configuration; compared against the
    /// blocking cutoff to decide the verdict.
    pub severity: u8,
    /// Human-readable description with the observed value.
    pub message: String,
    /// Whether an auto-fix transformation can repair this violation.
    pub auto_fixable: bool,
}

/// Aggregate outcome of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// No violation at or above the blocking cutoff, nothing repaired.
    Pass,
    /// Auto-fix repaired every blocking violation; the fixed text must be
    /// used in place of the input.
    PassWithAutofix,
    /// At least one blocking violation remains after auto-fix.
    Fail,
}

/// What kind of text was evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EvalTarget {
    Transcript,
    Post { platform: Platform },
}

/// Full evaluation output, embedded in the stage's ledger transition.
///
/// `violations` is the set remaining after auto-fix ran (the set the verdict
/// was computed from); `fixes_applied` records each repair performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// What was evaluated.
    pub target: EvalTarget,
    /// Violations remaining after auto-fix, in fixed rule order.
    pub violations: Vec<Violation>,
    /// Aggregate verdict.
    pub verdict: Verdict,
    /// Auto-fix transformations applied, in application order.
    pub fixes_applied: Vec<AutofixAction>,
    /// The repaired text, present iff any fix was applied.
    pub fixed_text: Option<String>,
}

impl EvaluationResult {
    /// Whether the workflow may proceed past this evaluation.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.verdict != Verdict::Fail
    }

    /// One-line summary of violations for logs and approval presentations.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.violations.is_empty() {
            "no violations".to_string()
        } else {
            self.violations
                .iter()
                .map(|v| v.message.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        }
    }
}
