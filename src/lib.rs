//! clipflow - short-form video to social post workflow engine
//!
//! clipflow ingests newly published short-form video entries from a content
//! feed, derives a transcript, drafts a social post with a language model,
//! screens both through rule-based guardrails, routes the draft to a human
//! reviewer, and publishes approved content — recording every stage
//! transition in an append-only ledger.
//!
//! The workspace splits along the workflow's seams:
//!
//! - [`clipflow_guard`] — pure, deterministic content evaluation
//! - [`clipflow_store`] — status ledger, draft revisions, item leases
//! - [`clipflow_transcript`] / [`clipflow_llm`] / [`clipflow_publish`] —
//!   stage adapters over typed collaborator traits
//! - [`clipflow_approval`] — the human approval gate with bounded edit
//!   cycles and idempotent decision handling
//! - [`clipflow_engine`] — the orchestrator and worker pool
//!
//! External services (the feed, caption/speech-to-text providers, the
//! language model, the publishing platform, the reviewer channel) are
//! consumed through capability traits; this crate ships fixture
//! implementations for dry runs, and deployments embed the library with
//! their own.
//!
//! # Quick start (CLI, dry run)
//!
//! ```bash
//! # Poll the demo feed and process everything through approval parking
//! clipflow run --once
//!
//! # Inspect the queue and one item's ledger
//! clipflow status
//! clipflow ledger demo-001
//!
//! # Decide, then watch it publish
//! clipflow decide demo-001 approve
//! ```

pub mod cli;

pub use clipflow_approval::{Decision, Resolution};
pub use clipflow_config::Config;
pub use clipflow_engine::{CancelOutcome, Orchestrator, WorkerPool};
pub use clipflow_guard::{EvaluationResult, Evaluator, Verdict};
pub use clipflow_store::{JsonLedgerStore, MemoryStore, RecordStore, StatusTransition};
pub use clipflow_utils::{ErrorKind, Item, ItemStatus, Platform, PostDraft, Transcript};
