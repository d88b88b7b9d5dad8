//! Ledger entry type and transition validation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clipflow_guard::EvaluationResult;
use clipflow_utils::{ItemStatus, PublishedReceipt, RecordedError};

use crate::StoreError;

/// One append-only ledger entry recording a status change.
///
/// Optional payloads carry the audit record for the stage that caused the
/// transition: the evaluation that gated it, the error that failed it, or
/// the receipt that confirmed publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    /// External id of the item.
    pub item_id: String,
    /// Status before this transition; `None` only for the initial
    /// `Detected` entry.
    pub from: Option<ItemStatus>,
    /// Status after this transition.
    pub to: ItemStatus,
    /// When the transition was recorded.
    pub at: DateTime<Utc>,
    /// Name of the stage that produced the transition.
    pub stage: String,
    /// Evaluation payload for moderation transitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationResult>,
    /// Error payload for failure transitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordedError>,
    /// Publish receipt for the `Published` transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<PublishedReceipt>,
}

impl StatusTransition {
    /// Bare transition with no payload.
    #[must_use]
    pub fn new(item_id: impl Into<String>, from: Option<ItemStatus>, to: ItemStatus, stage: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            from,
            to,
            at: Utc::now(),
            stage: stage.into(),
            evaluation: None,
            error: None,
            receipt: None,
        }
    }

    /// Attach an evaluation payload.
    #[must_use]
    pub fn with_evaluation(mut self, evaluation: EvaluationResult) -> Self {
        self.evaluation = Some(evaluation);
        self
    }

    /// Attach an error payload.
    #[must_use]
    pub fn with_error(mut self, error: RecordedError) -> Self {
        self.error = Some(error);
        self
    }

    /// Attach a publish receipt payload.
    #[must_use]
    pub fn with_receipt(mut self, receipt: PublishedReceipt) -> Self {
        self.receipt = Some(receipt);
        self
    }
}

/// Validate a transition against the ledger head before appending.
///
/// Shared by every store implementation so the state machine is enforced at
/// the persistence boundary, not just in the orchestrator.
///
/// # Errors
/// - [`StoreError::TerminalStatus`] when the item is already terminal
/// - [`StoreError::PriorStatusMismatch`] when the claimed `from` disagrees
///   with the ledger
/// - [`StoreError::IllegalTransition`] when the edge is not in the graph
pub fn validate_transition(
    current: Option<ItemStatus>,
    transition: &StatusTransition,
) -> Result<(), StoreError> {
    let fmt_opt = |s: Option<ItemStatus>| {
        s.map_or_else(|| "none".to_string(), |v| v.as_str().to_string())
    };

    if let Some(current) = current {
        if current.is_terminal() {
            return Err(StoreError::TerminalStatus {
                item_id: transition.item_id.clone(),
                status: current,
            });
        }
    }

    if transition.from != current {
        return Err(StoreError::PriorStatusMismatch {
            item_id: transition.item_id.clone(),
            actual: fmt_opt(current),
            claimed: fmt_opt(transition.from),
        });
    }

    let legal = match current {
        None => transition.to == ItemStatus::Detected,
        Some(prior) => prior.can_transition_to(transition.to),
    };

    if !legal {
        return Err(StoreError::IllegalTransition {
            item_id: transition.item_id.clone(),
            from: fmt_opt(current),
            to: transition.to,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(from: Option<ItemStatus>, to: ItemStatus) -> StatusTransition {
        StatusTransition::new("vid-1", from, to, "test")
    }

    #[test]
    fn initial_entry_must_be_detected() {
        assert!(validate_transition(None, &t(None, ItemStatus::Detected)).is_ok());
        assert!(matches!(
            validate_transition(None, &t(None, ItemStatus::Transcribing)),
            Err(StoreError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn terminal_accepts_nothing() {
        let result = validate_transition(
            Some(ItemStatus::Published),
            &t(Some(ItemStatus::Published), ItemStatus::Failed),
        );
        assert!(matches!(result, Err(StoreError::TerminalStatus { .. })));
    }

    #[test]
    fn prior_status_must_match_ledger() {
        let result = validate_transition(
            Some(ItemStatus::Detected),
            &t(Some(ItemStatus::Transcribed), ItemStatus::ModeratingTranscript),
        );
        assert!(matches!(result, Err(StoreError::PriorStatusMismatch { .. })));
    }

    #[test]
    fn illegal_edge_is_rejected() {
        let result = validate_transition(
            Some(ItemStatus::Detected),
            &t(Some(ItemStatus::Detected), ItemStatus::Publishing),
        );
        assert!(matches!(result, Err(StoreError::IllegalTransition { .. })));
    }
}
