//! Canned collaborators for dry runs and tests
//!
//! These fixtures let the full pipeline run with no external services: a
//! feed that yields a fixed batch once, caption and generation stages with
//! deterministic output, an approval channel that only records
//! presentations, and a publisher that can be told to fail a few times
//! first. The CLI wires its orchestrator from these.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use clipflow_approval::{ApprovalChannel, ApprovalError, ApprovalGate};
use clipflow_config::Config;
use clipflow_feed::{FeedEntry, FeedError, FeedSource};
use clipflow_guard::Evaluator;
use clipflow_llm::{DraftStage, GenerationError, GenerationRequest, PromptTemplate, TextGenerator};
use clipflow_publish::{PublishError, PublishRequest, PublishStage, Publisher, RemotePost};
use clipflow_store::RecordStore;
use clipflow_transcript::{
    CaptionSource, Segment, SegmentedTranscript, TranscriptError, TranscriptStage,
};
use clipflow_utils::PostDraft;

use crate::orchestrator::Orchestrator;

/// Feed that yields a fixed batch on the first poll, then nothing.
pub struct FixtureFeed {
    entries: Mutex<Vec<FeedEntry>>,
}

impl FixtureFeed {
    #[must_use]
    pub fn new(entries: Vec<FeedEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// A small demo batch.
    #[must_use]
    pub fn demo() -> Self {
        let entry = |id: &str, title: &str| FeedEntry {
            external_id: id.to_string(),
            url: format!("https://example.com/watch/{id}"),
            title: Some(title.to_string()),
            published_at: Utc::now(),
        };
        Self::new(vec![
            entry("demo-001", "Why borrow checking makes refactors safe"),
            entry("demo-002", "Three async runtime pitfalls"),
        ])
    }
}

#[async_trait]
impl FeedSource for FixtureFeed {
    async fn poll(&self, _since: DateTime<Utc>) -> Result<Vec<FeedEntry>, FeedError> {
        Ok(std::mem::take(
            &mut *self
                .entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        ))
    }
}

/// Caption source with one fixed transcript for every item.
pub struct FixtureCaptions {
    text: String,
    language: Option<String>,
}

impl FixtureCaptions {
    #[must_use]
    pub fn new(text: impl Into<String>, language: Option<String>) -> Self {
        Self {
            text: text.into(),
            language,
        }
    }

    /// A transcript long enough to clear the default guardrails.
    #[must_use]
    pub fn demo() -> Self {
        Self::new(
            "Today we look at how ownership shapes API design in Rust, why \
             borrowed views keep hot paths allocation-free, and where interior \
             mutability is worth its complexity. We finish with a checklist \
             for reviewing lifetimes in public interfaces and a short story \
             about a refactor that the borrow checker caught before CI did.",
            Some("en".to_string()),
        )
    }
}

#[async_trait]
impl CaptionSource for FixtureCaptions {
    async fn get_captions(
        &self,
        _external_id: &str,
        _language_pref: &[&str],
    ) -> Result<SegmentedTranscript, TranscriptError> {
        let segments = self
            .text
            .split(". ")
            .enumerate()
            .map(|(i, sentence)| Segment {
                text: sentence.to_string(),
                start: i as f64 * 4.0,
                duration: 4.0,
            })
            .collect();
        Ok(SegmentedTranscript {
            segments,
            language: self.language.clone(),
        })
    }
}

/// Deterministic generator: summarizes the transcript's opening.
pub struct FixtureGenerator;

#[async_trait]
impl TextGenerator for FixtureGenerator {
    async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        // Summarize by echoing the transcript's opening from the prompt
        let transcript = request
            .user
            .split("Transcript:")
            .nth(1)
            .unwrap_or(&request.user);
        let body: String = transcript.trim().chars().take(300).collect();
        Ok(format!("{} #rust #video", body.trim()))
    }

    fn model_id(&self) -> String {
        "fixture-generator".to_string()
    }
}

/// Approval channel that records presentations and assigns request ids.
pub struct FixtureApprovalChannel {
    presented: AtomicUsize,
}

impl FixtureApprovalChannel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            presented: AtomicUsize::new(0),
        }
    }

    /// How many drafts have been presented so far.
    #[must_use]
    pub fn presented_count(&self) -> usize {
        self.presented.load(Ordering::SeqCst)
    }
}

impl Default for FixtureApprovalChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApprovalChannel for FixtureApprovalChannel {
    async fn present(
        &self,
        draft: &PostDraft,
        _evaluation_summary: &str,
    ) -> Result<String, ApprovalError> {
        let n = self.presented.fetch_add(1, Ordering::SeqCst);
        Ok(format!("req-{}-{}", draft.item_id, n))
    }
}

/// Publisher that can fail a configured number of times before succeeding.
pub struct FixturePublisher {
    calls: AtomicUsize,
    fail_times: AtomicU32,
}

impl FixturePublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::failing_first(0)
    }

    /// Fail the first `n` calls with a rate-limit error, then succeed.
    #[must_use]
    pub fn failing_first(n: u32) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_times: AtomicU32::new(n),
        }
    }

    /// Total publish calls observed.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FixturePublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for FixturePublisher {
    async fn publish(&self, request: PublishRequest) -> Result<RemotePost, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_times.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times.store(remaining - 1, Ordering::SeqCst);
            return Err(PublishError::RateLimited("fixture backpressure".into()));
        }
        let short = &request.idempotency_key[..8.min(request.idempotency_key.len())];
        Ok(RemotePost {
            id: format!("fixture-{short}"),
            url: Some(format!("https://threads.example/p/fixture-{short}")),
        })
    }
}

/// Pluggable pieces for a fixture-backed orchestrator.
pub struct HarnessParts {
    pub feed: FixtureFeed,
    pub captions: FixtureCaptions,
    pub generator: Box<dyn TextGenerator>,
    pub publisher: FixturePublisher,
}

impl HarnessParts {
    /// The demo wiring used by the CLI dry run.
    #[must_use]
    pub fn demo() -> Self {
        Self {
            feed: FixtureFeed::demo(),
            captions: FixtureCaptions::demo(),
            generator: Box::new(FixtureGenerator),
            publisher: FixturePublisher::new(),
        }
    }
}

/// Everything a dry run needs, with handles to the observable fixtures.
pub struct DryRunHarness {
    pub orchestrator: Arc<Orchestrator>,
    pub gate: Arc<ApprovalGate>,
    pub channel: Arc<FixtureApprovalChannel>,
    pub publisher: Arc<FixturePublisher>,
}

/// Wire an orchestrator entirely from demo fixtures over the given store.
///
/// # Errors
/// Fails when the guardrail configuration does not compile.
pub fn dry_run_harness(
    config: Arc<Config>,
    store: Arc<dyn RecordStore>,
) -> anyhow::Result<DryRunHarness> {
    build_harness(config, store, HarnessParts::demo())
}

/// Like [`dry_run_harness`] but with caller-chosen parts, for tests that
/// inject short transcripts, failing publishers, or custom generators.
///
/// # Errors
/// Fails when the guardrail configuration does not compile.
pub fn build_harness(
    config: Arc<Config>,
    store: Arc<dyn RecordStore>,
    parts: HarnessParts,
) -> anyhow::Result<DryRunHarness> {
    let evaluator = Arc::new(Evaluator::new(&config.guardrails)?);
    let channel = Arc::new(FixtureApprovalChannel::new());
    let publisher = Arc::new(parts.publisher);

    let gate = Arc::new(ApprovalGate::new(
        store.clone(),
        Box::new(channel.clone()),
        evaluator.clone(),
        config.approval.max_edit_cycles,
    ));

    let transcript_stage = TranscriptStage::new(Box::new(parts.captions), None);
    let draft_stage = DraftStage::new(
        parts.generator,
        PromptTemplate::load(config.prompts.dir.as_deref(), config.platform)?,
        evaluator.clone(),
    )
    .with_limits(config.prompts.max_tokens, config.prompts.temperature);
    let publish_stage = PublishStage::new(store.clone(), Box::new(publisher.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        store,
        Box::new(parts.feed),
        transcript_stage,
        draft_stage,
        gate.clone(),
        publish_stage,
        evaluator,
        config,
    ));

    Ok(DryRunHarness {
        orchestrator,
        gate,
        channel,
        publisher,
    })
}
