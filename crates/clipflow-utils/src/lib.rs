//! Foundation types and utilities shared across the clipflow workspace
//!
//! This crate holds the domain vocabulary (items, transcripts, drafts, the
//! status state machine), the error-kind taxonomy used for retry decisions,
//! and small infrastructure helpers (tracing bootstrap, atomic file writes).

pub mod atomic_write;
pub mod error;
pub mod logging;
pub mod types;

pub use error::{ErrorKind, RecordedError, StageError};
pub use types::{
    Item, ItemStatus, Platform, PostDraft, PublishedReceipt, Transcript, TranscriptSource,
};
