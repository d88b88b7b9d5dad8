//! The workflow orchestrator: one item, strict stage order, durable ledger
//!
//! `advance()` claims the item's lease, loads the current status, and runs
//! stage handlers until the item parks at the approval gate or reaches a
//! terminal status. Every stage persists its transition before the next
//! stage runs, so a crash-and-restart resumes from the last persisted
//! status without re-running completed side-effect-bearing stages
//! (publication is idempotent via the ledger; transcript and draft
//! production are idempotent producers keyed by item id and revision).

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{info, warn};

use clipflow_approval::{ApprovalGate, Decision, Resolution};
use clipflow_config::Config;
use clipflow_feed::FeedSource;
use clipflow_guard::{EvaluationResult, Evaluator};
use clipflow_llm::DraftStage;
use clipflow_publish::{PublishOutcome, PublishStage};
use clipflow_store::{RecordStore, StatusTransition, StoreError};
use clipflow_transcript::TranscriptStage;
use clipflow_utils::{ErrorKind, ItemStatus, RecordedError};

use crate::retry::with_retry;

/// Errors surfaced by orchestrator entry points.
///
/// Stage failures are not errors here — they are recorded in the ledger and
/// expressed as terminal statuses. `EngineError` covers the cases where the
/// engine itself cannot proceed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown item: {item_id}")]
    UnknownItem { item_id: String },

    #[error("Item {item_id} is leased by another worker")]
    Leased { item_id: String },

    #[error("No transcript on record for item {item_id}")]
    MissingTranscript { item_id: String },

    #[error("No draft on record for item {item_id}")]
    MissingDraft { item_id: String },

    #[error("Feed poll failed after {attempts} attempts: {message}")]
    Feed { attempts: u32, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Approval gate error: {0}")]
    Approval(#[from] clipflow_approval::ApprovalError),
}

/// Outcome of a cancellation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// A terminal transition was recorded.
    Cancelled(ItemStatus),
    /// The item was already terminal; nothing changed.
    AlreadyTerminal(ItemStatus),
    /// A worker holds the lease; cancel again once the in-flight stage
    /// finishes.
    Busy,
}

enum Flow {
    /// Run the next stage handler.
    Continue,
    /// Item parked awaiting a human; worker slot is freed.
    Parked,
    /// No further automatic processing.
    Terminal(ItemStatus),
}

/// Releases the item lease when the advance scope ends, whatever the path.
struct LeaseGuard<'a> {
    store: &'a dyn RecordStore,
    item_id: &'a str,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.release_lease(self.item_id) {
            warn!(item_id = %self.item_id, error = %e, "failed to release lease");
        }
    }
}

/// Coordinates the stage adapters for the full workflow.
pub struct Orchestrator {
    store: Arc<dyn RecordStore>,
    feed: Box<dyn FeedSource>,
    transcript_stage: TranscriptStage,
    draft_stage: DraftStage,
    gate: Arc<ApprovalGate>,
    publish_stage: PublishStage,
    evaluator: Arc<Evaluator>,
    config: Arc<Config>,
}

impl Orchestrator {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn RecordStore>,
        feed: Box<dyn FeedSource>,
        transcript_stage: TranscriptStage,
        draft_stage: DraftStage,
        gate: Arc<ApprovalGate>,
        publish_stage: PublishStage,
        evaluator: Arc<Evaluator>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            feed,
            transcript_stage,
            draft_stage,
            gate,
            publish_stage,
            evaluator,
            config,
        }
    }

    /// The record store this orchestrator works against.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Poll the feed and register unseen items.
    ///
    /// Returns the external ids of newly registered items. Entries whose id
    /// is already known — terminal or in flight — are no-ops.
    ///
    /// # Errors
    /// Feed failures that exhaust the retry budget, and store failures.
    pub async fn ingest(&self) -> Result<Vec<String>, EngineError> {
        let since = Utc::now()
            - ChronoDuration::hours(self.config.workers.poll_lookback_hours as i64);

        let entries = with_retry(
            self.config.retry.feed,
            self.config.stage_timeout(),
            "feed",
            || self.feed.poll(since),
        )
        .await
        .map_err(|e| {
            warn!(kind = %e.kind, attempts = e.attempts, "feed poll failed: {}", e.message);
            EngineError::Feed {
                attempts: e.attempts,
                message: e.message,
            }
        })?;

        let mut fresh = Vec::new();
        for entry in entries {
            let item = entry.into_item(Utc::now());
            if self.store.register_item(&item)? {
                info!(item_id = %item.external_id, "item detected");
                fresh.push(item.external_id);
            }
        }
        Ok(fresh)
    }

    /// Items that should be re-enqueued after a restart: every non-terminal
    /// status except the parked one (parked items resume via the approval
    /// callback path).
    ///
    /// # Errors
    /// Store failures.
    pub fn resumable_items(&self) -> Result<Vec<String>, EngineError> {
        let mut ids = Vec::new();
        for item in self.store.all_items()? {
            if let Some(status) = self.store.current_status(&item.external_id)? {
                if !status.is_terminal() && status != ItemStatus::AwaitingApproval {
                    ids.push(item.external_id);
                }
            }
        }
        Ok(ids)
    }

    /// Drive an item from its current status until it parks or terminates.
    ///
    /// Exactly one worker may run this per item at a time; the item lease
    /// enforces that and is released on every exit path, including panics
    /// in stage handlers.
    ///
    /// # Errors
    /// [`EngineError::Leased`] when another worker holds the item,
    /// [`EngineError::UnknownItem`] for unregistered ids, and store failures.
    pub async fn advance(&self, item_id: &str) -> Result<ItemStatus, EngineError> {
        if !self.store.try_acquire_lease(item_id)? {
            return Err(EngineError::Leased {
                item_id: item_id.to_string(),
            });
        }
        let _lease = LeaseGuard {
            store: self.store.as_ref(),
            item_id,
        };

        loop {
            let status =
                self.store
                    .current_status(item_id)?
                    .ok_or_else(|| EngineError::UnknownItem {
                        item_id: item_id.to_string(),
                    })?;

            let flow = match status {
                ItemStatus::Detected | ItemStatus::Transcribing => {
                    self.run_transcribe(item_id, status).await?
                }
                ItemStatus::Transcribed | ItemStatus::ModeratingTranscript => {
                    self.run_moderate_transcript(item_id, status)?
                }
                ItemStatus::Generating => self.run_generate(item_id).await?,
                ItemStatus::Generated | ItemStatus::ModeratingPost => {
                    // Resume path: re-screen the stored draft body
                    let evaluation = self.evaluate_current_draft(item_id)?;
                    self.finish_moderate_post(item_id, status, evaluation).await?
                }
                ItemStatus::EditRequested => {
                    self.transition(item_id, status, ItemStatus::ModeratingPost, "approval", None)?;
                    Flow::Continue
                }
                ItemStatus::AwaitingApproval => Flow::Parked,
                ItemStatus::Approved | ItemStatus::Publishing => {
                    self.run_publish(item_id, status).await?
                }
                terminal => Flow::Terminal(terminal),
            };

            match flow {
                Flow::Continue => continue,
                Flow::Parked => {
                    return Ok(ItemStatus::AwaitingApproval);
                }
                Flow::Terminal(status) => {
                    return Ok(status);
                }
            }
        }
    }

    /// Apply a reviewer decision and, when it approves the draft, continue
    /// the workflow through publication.
    ///
    /// Duplicate decisions resolve to [`Resolution::AlreadyResolved`] and
    /// drive nothing.
    ///
    /// # Errors
    /// Gate/store failures; advancing after approval surfaces engine errors.
    pub async fn resolve_approval(
        &self,
        item_id: &str,
        decision: Decision,
    ) -> Result<Resolution, EngineError> {
        let resolution = self.gate.resolve(item_id, decision).await?;
        if resolution == Resolution::Approved {
            match self.advance(item_id).await {
                // A duplicate enqueue may hold the lease; that worker (or the
                // next resumable scan) carries the item to publication
                Ok(_) | Err(EngineError::Leased { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(resolution)
    }

    /// Externally cancel an item: parked or idle items get a terminal
    /// transition; an item whose lease is held reports `Busy` and is left
    /// for the caller to retry once the in-flight stage completes.
    ///
    /// # Errors
    /// Store failures.
    pub fn cancel(&self, item_id: &str, reason: &str) -> Result<CancelOutcome, EngineError> {
        let Some(status) = self.store.current_status(item_id)? else {
            return Err(EngineError::UnknownItem {
                item_id: item_id.to_string(),
            });
        };
        if status.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal(status));
        }

        if !self.store.try_acquire_lease(item_id)? {
            return Ok(CancelOutcome::Busy);
        }
        let _lease = LeaseGuard {
            store: self.store.as_ref(),
            item_id,
        };

        // Re-read under the lease; the status may have moved
        let Some(status) = self.store.current_status(item_id)? else {
            return Err(EngineError::UnknownItem {
                item_id: item_id.to_string(),
            });
        };
        if status.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal(status));
        }

        let target = if status == ItemStatus::AwaitingApproval {
            ItemStatus::RejectedHuman
        } else {
            ItemStatus::Failed
        };
        self.transition(
            item_id,
            status,
            target,
            "orchestrator",
            Some(RecordedError {
                kind: ErrorKind::Validation,
                message: format!("cancelled: {reason}"),
                attempts: 0,
            }),
        )?;
        info!(item_id, %target, "item cancelled");
        Ok(CancelOutcome::Cancelled(target))
    }

    fn transition(
        &self,
        item_id: &str,
        from: ItemStatus,
        to: ItemStatus,
        stage: &str,
        error: Option<RecordedError>,
    ) -> Result<(), EngineError> {
        let mut t = StatusTransition::new(item_id, Some(from), to, stage);
        if let Some(error) = error {
            t = t.with_error(error);
        }
        self.store.append_transition(t)?;
        Ok(())
    }

    fn fail(
        &self,
        item_id: &str,
        from: ItemStatus,
        stage: &str,
        error: RecordedError,
    ) -> Result<Flow, EngineError> {
        warn!(
            item_id,
            stage,
            kind = %error.kind,
            attempts = error.attempts,
            "stage failed: {}",
            error.message
        );
        self.transition(item_id, from, ItemStatus::Failed, stage, Some(error))?;
        Ok(Flow::Terminal(ItemStatus::Failed))
    }

    async fn run_transcribe(
        &self,
        item_id: &str,
        status: ItemStatus,
    ) -> Result<Flow, EngineError> {
        if status == ItemStatus::Detected {
            self.transition(item_id, status, ItemStatus::Transcribing, "transcript", None)?;
        }

        let item = self
            .store
            .get_item(item_id)?
            .ok_or_else(|| EngineError::UnknownItem {
                item_id: item_id.to_string(),
            })?;

        let produced = with_retry(
            self.config.retry.transcript,
            self.config.stage_timeout(),
            "transcript",
            || self.transcript_stage.produce_transcript(&item),
        )
        .await;

        match produced {
            Ok(transcript) => {
                info!(
                    item_id,
                    words = transcript.word_count,
                    language = %transcript.language,
                    "transcript produced"
                );
                self.store.record_transcript(&transcript)?;
                self.transition(
                    item_id,
                    ItemStatus::Transcribing,
                    ItemStatus::Transcribed,
                    "transcript",
                    None,
                )?;
                Ok(Flow::Continue)
            }
            Err(error) => self.fail(item_id, ItemStatus::Transcribing, "transcript", error),
        }
    }

    fn run_moderate_transcript(
        &self,
        item_id: &str,
        status: ItemStatus,
    ) -> Result<Flow, EngineError> {
        if status == ItemStatus::Transcribed {
            self.transition(
                item_id,
                status,
                ItemStatus::ModeratingTranscript,
                "moderation",
                None,
            )?;
        }

        let transcript = self
            .store
            .latest_transcript(item_id)?
            .ok_or_else(|| EngineError::MissingTranscript {
                item_id: item_id.to_string(),
            })?;

        let evaluation = self.evaluator.evaluate_transcript(&transcript.text);

        // Whitespace repairs supersede the stored transcript
        if let Some(fixed) = &evaluation.fixed_text {
            if let Some(cleaned) = clipflow_utils::Transcript::new(
                item_id,
                fixed.clone(),
                transcript.language.clone(),
                transcript.source,
            ) {
                self.store.record_transcript(&cleaned)?;
            }
        }

        let to = if evaluation.passed() {
            ItemStatus::Generating
        } else {
            ItemStatus::RejectedTranscript
        };
        info!(item_id, verdict = ?evaluation.verdict, %to, "transcript moderated");

        self.store.append_transition(
            StatusTransition::new(item_id, Some(ItemStatus::ModeratingTranscript), to, "moderation")
                .with_evaluation(evaluation),
        )?;

        if to == ItemStatus::RejectedTranscript {
            Ok(Flow::Terminal(to))
        } else {
            Ok(Flow::Continue)
        }
    }

    async fn run_generate(&self, item_id: &str) -> Result<Flow, EngineError> {
        // A crash after the revision write but before the transition leaves
        // a stored draft behind; reuse it rather than generating twice
        if let Some(existing) = self.store.current_draft(item_id)? {
            info!(item_id, revision = existing.revision, "reusing stored draft");
            self.transition(
                item_id,
                ItemStatus::Generating,
                ItemStatus::Generated,
                "generation",
                None,
            )?;
            return Ok(Flow::Continue);
        }

        let transcript = self
            .store
            .latest_transcript(item_id)?
            .ok_or_else(|| EngineError::MissingTranscript {
                item_id: item_id.to_string(),
            })?;

        let drafted = with_retry(
            self.config.retry.generation,
            self.config.stage_timeout(),
            "generation",
            || self.draft_stage.draft_post(&transcript, self.config.platform),
        )
        .await;

        match drafted {
            Ok(result) => {
                self.store.put_draft_revision(&result.draft)?;
                self.transition(
                    item_id,
                    ItemStatus::Generating,
                    ItemStatus::Generated,
                    "generation",
                    None,
                )?;
                self.transition(
                    item_id,
                    ItemStatus::Generated,
                    ItemStatus::ModeratingPost,
                    "moderation",
                    None,
                )?;
                // Carry the drafting evaluation so the ledger records the
                // auto-fix verdict, not a re-screen of the fixed body
                self.finish_moderate_post(item_id, ItemStatus::ModeratingPost, result.evaluation)
                    .await
            }
            Err(error) => self.fail(item_id, ItemStatus::Generating, "generation", error),
        }
    }

    fn evaluate_current_draft(&self, item_id: &str) -> Result<EvaluationResult, EngineError> {
        let draft = self
            .store
            .current_draft(item_id)?
            .ok_or_else(|| EngineError::MissingDraft {
                item_id: item_id.to_string(),
            })?;
        Ok(self.evaluator.evaluate_post(&draft.body, draft.platform))
    }

    async fn finish_moderate_post(
        &self,
        item_id: &str,
        status: ItemStatus,
        evaluation: EvaluationResult,
    ) -> Result<Flow, EngineError> {
        if status == ItemStatus::Generated {
            self.transition(item_id, status, ItemStatus::ModeratingPost, "moderation", None)?;
        }

        let to = if evaluation.passed() {
            ItemStatus::AwaitingApproval
        } else {
            ItemStatus::RejectedPost
        };
        info!(item_id, verdict = ?evaluation.verdict, %to, "post moderated");

        self.store.append_transition(
            StatusTransition::new(item_id, Some(ItemStatus::ModeratingPost), to, "moderation")
                .with_evaluation(evaluation.clone()),
        )?;

        if to == ItemStatus::RejectedPost {
            return Ok(Flow::Terminal(to));
        }

        // Present to the reviewer before the worker lets go of the item
        let draft = self
            .store
            .current_draft(item_id)?
            .ok_or_else(|| EngineError::MissingDraft {
                item_id: item_id.to_string(),
            })?;

        let presented = with_retry(
            self.config.retry.approval,
            self.config.stage_timeout(),
            "approval",
            || self.gate.request_approval(&draft, &evaluation),
        )
        .await;

        match presented {
            Ok(_request_id) => Ok(Flow::Parked),
            Err(error) => self.fail(item_id, ItemStatus::AwaitingApproval, "approval", error),
        }
    }

    async fn run_publish(&self, item_id: &str, status: ItemStatus) -> Result<Flow, EngineError> {
        if status == ItemStatus::Approved {
            self.transition(item_id, status, ItemStatus::Publishing, "publish", None)?;
        }

        let draft = self
            .store
            .current_draft(item_id)?
            .ok_or_else(|| EngineError::MissingDraft {
                item_id: item_id.to_string(),
            })?;

        let published = with_retry(
            self.config.retry.publish,
            self.config.stage_timeout(),
            "publish",
            || self.publish_stage.publish(&draft),
        )
        .await;

        match published {
            Ok(outcome) => {
                let receipt = outcome.receipt().clone();
                if matches!(outcome, PublishOutcome::AlreadyPublished(_)) {
                    warn!(item_id, "publish was a replay of a recorded receipt");
                }
                info!(item_id, remote_post_id = %receipt.remote_post_id, "item published");
                self.store.append_transition(
                    StatusTransition::new(
                        item_id,
                        Some(ItemStatus::Publishing),
                        ItemStatus::Published,
                        "publish",
                    )
                    .with_receipt(receipt),
                )?;
                Ok(Flow::Terminal(ItemStatus::Published))
            }
            Err(error) => {
                warn!(
                    item_id,
                    kind = %error.kind,
                    attempts = error.attempts,
                    "publication failed: {}",
                    error.message
                );
                self.transition(
                    item_id,
                    ItemStatus::Publishing,
                    ItemStatus::PublishFailed,
                    "publish",
                    Some(error),
                )?;
                Ok(Flow::Terminal(ItemStatus::PublishFailed))
            }
        }
    }
}
