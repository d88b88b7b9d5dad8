//! Human approval gate
//!
//! A draft that passes moderation is presented to a reviewer through the
//! [`ApprovalChannel`] collaborator and the item parks in
//! `AwaitingApproval` — no worker slot is held while a human thinks.
//! Decisions arrive asynchronously via [`ApprovalGate::resolve`], which is
//! idempotent: a second decision for an already-resolved item is a reported
//! no-op, never an error and never a second transition.
//!
//! An EDIT decision creates draft revision N+1 and re-runs evaluator pass 2
//! on the edited body before re-presenting; the cycle count is bounded by
//! configuration, after which the item is forced to `RejectedHuman`.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};

use clipflow_guard::text::{count_emoji, extract_hashtags};
use clipflow_guard::{EvaluationResult, Evaluator};
use clipflow_utils::{ErrorKind, ItemStatus, PostDraft, StageError};
use clipflow_store::{RecordStore, StatusTransition, StoreError};

/// Stage name recorded on gate-driven transitions.
const STAGE: &str = "approval";

/// A reviewer's decision on a presented draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
    /// Replace the body with the reviewer's edit.
    Edit { body: String },
}

/// Outcome of resolving a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Item moved to `Approved`; the caller should re-enqueue it for
    /// publication.
    Approved,
    /// Item moved to `RejectedHuman`.
    Rejected,
    /// A new revision was created, re-screened, and re-presented.
    EditAccepted { revision: u32 },
    /// The edit-cycle cap was reached; item forced to `RejectedHuman`.
    EditCapExhausted,
    /// The item was not awaiting approval; nothing changed.
    AlreadyResolved,
}

/// Failures from the approval channel or gate bookkeeping.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Approval channel error: {0}")]
    Channel(String),

    #[error("Approval channel timed out")]
    Timeout,

    #[error("No draft on record for item {item_id}")]
    MissingDraft { item_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StageError for ApprovalError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Channel(_) => ErrorKind::TransientNetwork,
            Self::Timeout => ErrorKind::Timeout,
            Self::MissingDraft { .. } => ErrorKind::Validation,
            Self::Store(_) => ErrorKind::Validation,
        }
    }
}

/// Outbound half of the approval conversation.
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    /// Present a draft and its evaluation summary to the reviewer.
    /// Returns an opaque request id for correlating the decision.
    async fn present(
        &self,
        draft: &PostDraft,
        evaluation_summary: &str,
    ) -> Result<String, ApprovalError>;
}

#[async_trait]
impl<T: ApprovalChannel + ?Sized> ApprovalChannel for Arc<T> {
    async fn present(
        &self,
        draft: &PostDraft,
        evaluation_summary: &str,
    ) -> Result<String, ApprovalError> {
        (**self).present(draft, evaluation_summary).await
    }
}

/// The approval gate: presentation, parking, and idempotent resolution.
pub struct ApprovalGate {
    store: Arc<dyn RecordStore>,
    channel: Box<dyn ApprovalChannel>,
    evaluator: Arc<Evaluator>,
    max_edit_cycles: u32,
    // request id -> item id, for channels that correlate by request
    requests: Mutex<HashMap<String, String>>,
}

impl ApprovalGate {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        channel: Box<dyn ApprovalChannel>,
        evaluator: Arc<Evaluator>,
        max_edit_cycles: u32,
    ) -> Self {
        Self {
            store,
            channel,
            evaluator,
            max_edit_cycles,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Present a draft for approval, returning the channel's request id.
    ///
    /// Called by the orchestrator right after the item parks in
    /// `AwaitingApproval`.
    ///
    /// # Errors
    /// Channel failures are classified for the orchestrator's retry policy.
    pub async fn request_approval(
        &self,
        draft: &PostDraft,
        evaluation: &EvaluationResult,
    ) -> Result<String, ApprovalError> {
        let request_id = self.channel.present(draft, &evaluation.summary()).await?;
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(request_id.clone(), draft.item_id.clone());
        info!(item_id = %draft.item_id, request_id = %request_id, "draft presented for approval");
        Ok(request_id)
    }

    /// Map a channel request id back to its item, for inbound callbacks.
    #[must_use]
    pub fn item_for_request(&self, request_id: &str) -> Option<String> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(request_id)
            .cloned()
    }

    /// Apply a reviewer decision to an item.
    ///
    /// Idempotent: when the item is not currently `AwaitingApproval` the
    /// call reports [`Resolution::AlreadyResolved`] and changes nothing —
    /// a double-tapped "approve" cannot produce a second transition.
    ///
    /// # Errors
    /// Store failures propagate; an EDIT for an item with no draft on
    /// record is [`ApprovalError::MissingDraft`].
    pub async fn resolve(
        &self,
        item_id: &str,
        decision: Decision,
    ) -> Result<Resolution, ApprovalError> {
        let current = self.store.current_status(item_id)?;
        if current != Some(ItemStatus::AwaitingApproval) {
            warn!(item_id, ?current, "duplicate or late approval decision ignored");
            return Ok(Resolution::AlreadyResolved);
        }

        match decision {
            Decision::Approve => {
                self.store.append_transition(StatusTransition::new(
                    item_id,
                    Some(ItemStatus::AwaitingApproval),
                    ItemStatus::Approved,
                    STAGE,
                ))?;
                info!(item_id, "draft approved");
                Ok(Resolution::Approved)
            }
            Decision::Reject => {
                self.store.append_transition(StatusTransition::new(
                    item_id,
                    Some(ItemStatus::AwaitingApproval),
                    ItemStatus::RejectedHuman,
                    STAGE,
                ))?;
                info!(item_id, "draft rejected by reviewer");
                Ok(Resolution::Rejected)
            }
            Decision::Edit { body } => self.apply_edit(item_id, body).await,
        }
    }

    /// Edit cycles already consumed, derived from the ledger.
    fn edit_cycles(&self, item_id: &str) -> Result<u32, ApprovalError> {
        let ledger = self.store.ledger(item_id)?;
        Ok(ledger
            .iter()
            .filter(|t| t.to == ItemStatus::EditRequested)
            .count() as u32)
    }

    async fn apply_edit(&self, item_id: &str, body: String) -> Result<Resolution, ApprovalError> {
        let cycles = self.edit_cycles(item_id)?;
        if cycles >= self.max_edit_cycles {
            self.store.append_transition(StatusTransition::new(
                item_id,
                Some(ItemStatus::AwaitingApproval),
                ItemStatus::RejectedHuman,
                STAGE,
            ))?;
            warn!(item_id, cycles, "edit-cycle cap reached; forcing rejection");
            return Ok(Resolution::EditCapExhausted);
        }

        let prior = self
            .store
            .current_draft(item_id)?
            .ok_or_else(|| ApprovalError::MissingDraft {
                item_id: item_id.to_string(),
            })?;

        self.store.append_transition(StatusTransition::new(
            item_id,
            Some(ItemStatus::AwaitingApproval),
            ItemStatus::EditRequested,
            STAGE,
        ))?;
        self.store.append_transition(StatusTransition::new(
            item_id,
            Some(ItemStatus::EditRequested),
            ItemStatus::ModeratingPost,
            STAGE,
        ))?;

        // An edited post must still pass guardrails before re-presentation
        let evaluation = self.evaluator.evaluate_post(&body, prior.platform);
        let final_body = evaluation.fixed_text.clone().unwrap_or(body);

        let revision = PostDraft {
            item_id: item_id.to_string(),
            platform: prior.platform,
            hashtags: extract_hashtags(&final_body),
            emoji_count: count_emoji(&final_body),
            body: final_body,
            model: prior.model,
            prompt_id: prior.prompt_id,
            revision: prior.revision + 1,
            created_at: Utc::now(),
        };
        self.store.put_draft_revision(&revision)?;

        // Back to the reviewer, carrying the fresh evaluation — failing
        // violations are visible so the reviewer can re-edit or reject
        self.store.append_transition(
            StatusTransition::new(
                item_id,
                Some(ItemStatus::ModeratingPost),
                ItemStatus::AwaitingApproval,
                STAGE,
            )
            .with_evaluation(evaluation.clone()),
        )?;

        let request_id = self.request_approval(&revision, &evaluation).await?;
        info!(
            item_id,
            revision = revision.revision,
            request_id = %request_id,
            "edited revision re-presented"
        );
        Ok(Resolution::EditAccepted {
            revision: revision.revision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipflow_guard::GuardrailConfig;
    use clipflow_store::MemoryStore;
    use clipflow_utils::{Item, Platform};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        presented: AtomicUsize,
    }

    #[async_trait]
    impl ApprovalChannel for CountingChannel {
        async fn present(
            &self,
            draft: &PostDraft,
            _evaluation_summary: &str,
        ) -> Result<String, ApprovalError> {
            let n = self.presented.fetch_add(1, Ordering::SeqCst);
            Ok(format!("req-{}-{}", draft.item_id, n))
        }
    }

    fn parked_item(store: &Arc<dyn RecordStore>) -> String {
        let item_id = "v1".to_string();
        store
            .register_item(&Item {
                external_id: item_id.clone(),
                url: "https://example.com/v1".to_string(),
                title: None,
                published_at: Utc::now(),
                discovered_at: Utc::now(),
            })
            .unwrap();

        for (from, to) in [
            (ItemStatus::Detected, ItemStatus::Transcribing),
            (ItemStatus::Transcribing, ItemStatus::Transcribed),
            (ItemStatus::Transcribed, ItemStatus::ModeratingTranscript),
            (ItemStatus::ModeratingTranscript, ItemStatus::Generating),
            (ItemStatus::Generating, ItemStatus::Generated),
            (ItemStatus::Generated, ItemStatus::ModeratingPost),
            (ItemStatus::ModeratingPost, ItemStatus::AwaitingApproval),
        ] {
            store
                .append_transition(StatusTransition::new(&item_id, Some(from), to, "test"))
                .unwrap();
        }

        store
            .put_draft_revision(&PostDraft {
                item_id: item_id.clone(),
                platform: Platform::Threads,
                body: "A perfectly reasonable first draft about the video's topic."
                    .to_string(),
                hashtags: vec![],
                emoji_count: 0,
                model: "gen-1".to_string(),
                prompt_id: "threads-v1".to_string(),
                revision: 1,
                created_at: Utc::now(),
            })
            .unwrap();

        item_id
    }

    fn gate(store: Arc<dyn RecordStore>, max_edit_cycles: u32) -> ApprovalGate {
        ApprovalGate::new(
            store,
            Box::new(CountingChannel {
                presented: AtomicUsize::new(0),
            }),
            Arc::new(Evaluator::new(&GuardrailConfig::default()).unwrap()),
            max_edit_cycles,
        )
    }

    fn edited_body(n: u32) -> String {
        format!("Revised take number {n} on the video's main point, with enough length to pass.")
    }

    #[tokio::test]
    async fn approve_transitions_to_approved() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let item_id = parked_item(&store);
        let gate = gate(store.clone(), 3);

        let resolution = gate.resolve(&item_id, Decision::Approve).await.unwrap();
        assert_eq!(resolution, Resolution::Approved);
        assert_eq!(
            store.current_status(&item_id).unwrap(),
            Some(ItemStatus::Approved)
        );
    }

    #[tokio::test]
    async fn duplicate_approve_is_noop() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let item_id = parked_item(&store);
        let gate = gate(store.clone(), 3);

        gate.resolve(&item_id, Decision::Approve).await.unwrap();
        let ledger_len = store.ledger(&item_id).unwrap().len();

        let second = gate.resolve(&item_id, Decision::Approve).await.unwrap();
        assert_eq!(second, Resolution::AlreadyResolved);
        // No extra transition appended
        assert_eq!(store.ledger(&item_id).unwrap().len(), ledger_len);
    }

    #[tokio::test]
    async fn reject_is_terminal() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let item_id = parked_item(&store);
        let gate = gate(store.clone(), 3);

        assert_eq!(
            gate.resolve(&item_id, Decision::Reject).await.unwrap(),
            Resolution::Rejected
        );
        assert_eq!(
            store.current_status(&item_id).unwrap(),
            Some(ItemStatus::RejectedHuman)
        );

        // Late decision after terminal is still a no-op
        assert_eq!(
            gate.resolve(&item_id, Decision::Approve).await.unwrap(),
            Resolution::AlreadyResolved
        );
    }

    #[tokio::test]
    async fn edit_creates_contiguous_revisions_and_reparks() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let item_id = parked_item(&store);
        let gate = gate(store.clone(), 3);

        let resolution = gate
            .resolve(&item_id, Decision::Edit { body: edited_body(1) })
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::EditAccepted { revision: 2 });
        assert_eq!(
            store.current_status(&item_id).unwrap(),
            Some(ItemStatus::AwaitingApproval)
        );

        let history = store.draft_history(&item_id).unwrap();
        assert_eq!(
            history.iter().map(|d| d.revision).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(store.current_draft(&item_id).unwrap().unwrap().revision, 2);
    }

    #[tokio::test]
    async fn two_edits_then_approve_leaves_three_revisions() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let item_id = parked_item(&store);
        let gate = gate(store.clone(), 3);

        gate.resolve(&item_id, Decision::Edit { body: edited_body(1) })
            .await
            .unwrap();
        gate.resolve(&item_id, Decision::Edit { body: edited_body(2) })
            .await
            .unwrap();
        let resolution = gate.resolve(&item_id, Decision::Approve).await.unwrap();

        assert_eq!(resolution, Resolution::Approved);
        assert_eq!(store.draft_history(&item_id).unwrap().len(), 3);
        assert_eq!(
            store.current_status(&item_id).unwrap(),
            Some(ItemStatus::Approved)
        );
    }

    #[tokio::test]
    async fn edit_cap_forces_rejection() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let item_id = parked_item(&store);
        let gate = gate(store.clone(), 2);

        gate.resolve(&item_id, Decision::Edit { body: edited_body(1) })
            .await
            .unwrap();
        gate.resolve(&item_id, Decision::Edit { body: edited_body(2) })
            .await
            .unwrap();
        let resolution = gate
            .resolve(&item_id, Decision::Edit { body: edited_body(3) })
            .await
            .unwrap();

        assert_eq!(resolution, Resolution::EditCapExhausted);
        assert_eq!(
            store.current_status(&item_id).unwrap(),
            Some(ItemStatus::RejectedHuman)
        );
        // The capped edit created no new revision
        assert_eq!(store.draft_history(&item_id).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn edited_body_is_rescreened() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let item_id = parked_item(&store);
        let gate = gate(store.clone(), 3);

        // Edited body violates guardrails (spam); it still parks for the
        // reviewer, carrying the failing evaluation
        let resolution = gate
            .resolve(
                &item_id,
                Decision::Edit {
                    body: "BUY NOW!!! LIMITED OFFER!!! DO NOT MISS THIS INCREDIBLE DEAL!!!"
                        .to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::EditAccepted { revision: 2 });

        let ledger = store.ledger(&item_id).unwrap();
        let last = ledger.last().unwrap();
        assert_eq!(last.to, ItemStatus::AwaitingApproval);
        let evaluation = last.evaluation.as_ref().expect("evaluation recorded");
        assert!(!evaluation.passed());
    }
}
