//! Error-kind taxonomy shared by every stage adapter
//!
//! Collaborator crates define their own `thiserror` enums; each classifies
//! its failures into one [`ErrorKind`] before returning to the orchestrator,
//! which applies a uniform retry policy per kind. Guardrail rejections are
//! business outcomes, not errors, and never reach this taxonomy.

use serde::{Deserialize, Serialize};

/// Classification of a stage failure, driving the orchestrator's response.
///
/// Retryable kinds are retried with exponential backoff up to the stage's
/// attempt cap; exhausting the cap converts the failure into the item's
/// `Failed` status (or `PublishFailed` for the publish stage). Non-retryable
/// kinds fail the stage immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient network failure; retryable.
    TransientNetwork,
    /// Upstream rate limit (HTTP 429 equivalent); retryable with backoff.
    RateLimited,
    /// Resource does not exist for this input; triggers a fallback path where
    /// one exists (captions → speech-to-text), otherwise fails the stage.
    NotAvailable,
    /// Input rejected by the collaborator; not retryable.
    Validation,
    /// Credentials rejected; not retryable.
    Auth,
    /// Adapter call exceeded its configured timeout; retryable, counted
    /// against the same budget as `TransientNetwork`.
    Timeout,
}

impl ErrorKind {
    /// Whether the orchestrator should retry a failure of this kind.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork | Self::RateLimited | Self::Timeout
        )
    }

    /// Canonical snake_case name used in ledger error payloads.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::RateLimited => "rate_limited",
            Self::NotAvailable => "not_available",
            Self::Validation => "validation",
            Self::Auth => "auth",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by collaborator error enums so the orchestrator can apply its
/// retry policy without knowing the concrete error type.
pub trait StageError: std::error::Error + Send + Sync + 'static {
    /// Classify this failure.
    fn kind(&self) -> ErrorKind;
}

/// A failure captured in the ledger alongside the transition it caused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedError {
    /// Classification the adapter assigned.
    pub kind: ErrorKind,
    /// Human-readable failure description.
    pub message: String,
    /// How many attempts were made before giving up.
    pub attempts: u32,
}
