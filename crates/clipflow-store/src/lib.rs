//! Append-only status ledger, draft revisions, and item leases
//!
//! Every stage transition an item goes through is recorded here as a
//! [`StatusTransition`]; replaying a ledger in insertion order reconstructs
//! the item's full history. The store also owns mutual exclusion: a worker
//! must hold an item's lease before driving it, so no two workers ever
//! process the same item concurrently.
//!
//! Two implementations ship in-tree: [`JsonLedgerStore`] persists one
//! directory per item with atomically written canonical-JSON files, and
//! [`MemoryStore`] backs tests.

mod json;
mod memory;
mod transition;

pub use json::JsonLedgerStore;
pub use memory::MemoryStore;
pub use transition::{StatusTransition, validate_transition};

use thiserror::Error;

use clipflow_utils::{Item, ItemStatus, PostDraft, Transcript};

/// Errors from record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unknown item: {item_id}")]
    UnknownItem { item_id: String },

    #[error("Item {item_id} is terminal ({status}); no further transitions allowed")]
    TerminalStatus { item_id: String, status: ItemStatus },

    #[error("Illegal transition for item {item_id}: {from} -> {to}")]
    IllegalTransition {
        item_id: String,
        from: String,
        to: ItemStatus,
    },

    #[error("Transition prior status mismatch for item {item_id}: ledger says {actual}, transition says {claimed}")]
    PriorStatusMismatch {
        item_id: String,
        actual: String,
        claimed: String,
    },

    #[error("Draft revision gap for item {item_id}: expected {expected}, got {got}")]
    RevisionGap {
        item_id: String,
        expected: u32,
        got: u32,
    },

    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Other(String),
}

/// Durable record store consumed by every stage of the workflow.
///
/// Implementations must be safe for concurrent callers; lease acquisition in
/// particular must be atomic. All methods are synchronous — callers invoke
/// them inline from async stages, matching the short, local nature of the
/// operations.
pub trait RecordStore: Send + Sync {
    /// Register a newly detected item with its initial `Detected` transition.
    ///
    /// Returns `false` (and records nothing) when the external id is already
    /// known, whatever its status — re-detection is a no-op.
    fn register_item(&self, item: &Item) -> Result<bool, StoreError>;

    /// Fetch a registered item by external id.
    fn get_item(&self, item_id: &str) -> Result<Option<Item>, StoreError>;

    /// All registered items, in registration order.
    fn all_items(&self) -> Result<Vec<Item>, StoreError>;

    /// Append one transition to the item's ledger.
    ///
    /// The transition is validated against the current ledger head: the
    /// claimed prior status must match, the edge must be legal in the status
    /// graph, and terminal statuses accept nothing further.
    fn append_transition(&self, transition: StatusTransition) -> Result<(), StoreError>;

    /// Current status of an item — the `to` of the last ledger entry.
    fn current_status(&self, item_id: &str) -> Result<Option<ItemStatus>, StoreError>;

    /// Full ledger for an item, in insertion order.
    fn ledger(&self, item_id: &str) -> Result<Vec<StatusTransition>, StoreError>;

    /// External ids of items currently in the given status.
    fn items_with_status(&self, status: ItemStatus) -> Result<Vec<String>, StoreError>;

    /// Atomically claim the item's lease. Returns `false` when already held.
    fn try_acquire_lease(&self, item_id: &str) -> Result<bool, StoreError>;

    /// Release a held lease. Releasing an unheld lease is a no-op.
    fn release_lease(&self, item_id: &str) -> Result<(), StoreError>;

    /// Record a transcript; a later transcript for the same item supersedes
    /// the earlier one without deleting it.
    fn record_transcript(&self, transcript: &Transcript) -> Result<(), StoreError>;

    /// The most recent transcript for an item.
    fn latest_transcript(&self, item_id: &str) -> Result<Option<Transcript>, StoreError>;

    /// Store a draft revision. Revisions must be contiguous starting at 1;
    /// anything else is a [`StoreError::RevisionGap`].
    fn put_draft_revision(&self, draft: &PostDraft) -> Result<(), StoreError>;

    /// The current (highest-revision) draft for an item.
    fn current_draft(&self, item_id: &str) -> Result<Option<PostDraft>, StoreError>;

    /// All draft revisions for an item, in increasing revision order.
    fn draft_history(&self, item_id: &str) -> Result<Vec<PostDraft>, StoreError>;
}

/// Serialize a value as canonical JSON (RFC 8785) so persisted records are
/// byte-stable and diffable.
///
/// # Errors
/// Fails when the value cannot be represented as JSON.
pub fn emit_jcs<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    let json_value = serde_json::to_value(value)?;
    let bytes = serde_json_canonicalizer::to_vec(&json_value)
        .map_err(|e| StoreError::Other(format!("canonicalization failed: {e}")))?;
    String::from_utf8(bytes).map_err(|e| StoreError::Other(format!("non-UTF8 JSON: {e}")))
}
