//! Rule-based content quality evaluation (guardrails)
//!
//! This crate screens transcript text and drafted post bodies against a
//! configured rule set. Evaluation is pure and deterministic: the same
//! `(text, config)` pair always produces the same [`EvaluationResult`],
//! including violation order, so ledger payloads are reproducible and
//! diffable across runs.
//!
//! Rules are all evaluated (never short-circuited) in a fixed order so the
//! complete violation list is reported. Violations flagged auto-fixable can
//! be repaired by deterministic transformations (truncation, whitespace
//! cleanup, hashtag dedupe) before the final verdict is computed.

mod autofix;
mod config;
mod evaluator;
pub mod text;
mod types;

pub use autofix::AutofixAction;
pub use config::{
    AutofixConfig, GuardrailConfig, PlatformRules, SeverityConfig, SpamRules, TranscriptRules,
};
pub use evaluator::{Evaluator, GuardError};
pub use types::{EvalTarget, EvaluationResult, Rule, Verdict, Violation};
