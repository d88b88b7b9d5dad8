//! Text generation interface and the post drafting stage
//!
//! [`TextGenerator`] is the typed boundary to whatever language-model
//! service drafts posts; the stage knows nothing about transports.
//! [`DraftStage`] builds a templated prompt from the transcript, invokes the
//! generator with bounded output, normalizes the response into a
//! [`PostDraft`] (hashtags extracted, emoji counted, revision 1), and runs
//! evaluator pass 2 with auto-fix over the drafted body.

mod template;

pub use template::PromptTemplate;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use clipflow_guard::text::{count_emoji, extract_hashtags};
use clipflow_guard::{EvaluationResult, Evaluator};
use clipflow_utils::{ErrorKind, Platform, PostDraft, StageError, Transcript};

/// Default output bound when configuration does not set one.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Default sampling temperature.
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// One completion request to the text-generation collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// System instructions.
    pub system: String,
    /// User content (template with the transcript substituted in).
    pub user: String,
    /// Output size bound.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Failures from the text-generation collaborator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation rate limited: {0}")]
    RateLimited(String),

    #[error("Generation service error: {0}")]
    Service(String),

    #[error("Generation request timed out")]
    Timeout,

    #[error("Generation authentication failed: {0}")]
    Auth(String),

    #[error("Generation produced an unusable response: {0}")]
    InvalidResponse(String),
}

impl StageError for GenerationError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Service(_) => ErrorKind::TransientNetwork,
            Self::Timeout => ErrorKind::Timeout,
            Self::Auth(_) => ErrorKind::Auth,
            Self::InvalidResponse(_) => ErrorKind::Validation,
        }
    }
}

/// Language-model capability used by the drafting stage.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete the request, returning raw response text.
    async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationError>;

    /// Identifier of the underlying model, recorded on drafts for audit.
    fn model_id(&self) -> String;
}

/// A drafted post together with the evaluation that screened it.
///
/// The draft is produced even when the evaluation failed so the rejected
/// body lands in the ledger for audit.
#[derive(Debug, Clone)]
pub struct DraftResult {
    pub draft: PostDraft,
    pub evaluation: EvaluationResult,
}

/// The post drafting stage adapter.
pub struct DraftStage {
    generator: Box<dyn TextGenerator>,
    template: PromptTemplate,
    evaluator: Arc<Evaluator>,
    max_tokens: u32,
    temperature: f32,
}

impl DraftStage {
    #[must_use]
    pub fn new(
        generator: Box<dyn TextGenerator>,
        template: PromptTemplate,
        evaluator: Arc<Evaluator>,
    ) -> Self {
        Self {
            generator,
            template,
            evaluator,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Override output bounds from configuration.
    #[must_use]
    pub fn with_limits(mut self, max_tokens: Option<u32>, temperature: Option<f32>) -> Self {
        if let Some(max_tokens) = max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(temperature) = temperature {
            self.temperature = temperature;
        }
        self
    }

    /// Draft a post from the transcript and screen it (evaluator pass 2).
    ///
    /// When the evaluation verdict is `PassWithAutofix`, the auto-fixed body
    /// becomes the content of revision 1 — no human intervened, so no new
    /// revision is created.
    ///
    /// # Errors
    /// Classified per [`GenerationError`]; the orchestrator decides retries.
    pub async fn draft_post(
        &self,
        transcript: &Transcript,
        platform: Platform,
    ) -> Result<DraftResult, GenerationError> {
        let title = transcript.item_id.clone();
        let request = GenerationRequest {
            system: self.template.system.clone(),
            user: self.template.render(&transcript.text, &title),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let raw = self.generator.complete(request).await?;
        let body = raw.trim().to_string();
        if body.is_empty() {
            return Err(GenerationError::InvalidResponse(
                "empty completion".to_string(),
            ));
        }

        let evaluation = self.evaluator.evaluate_post(&body, platform);
        let final_body = evaluation.fixed_text.clone().unwrap_or(body);
        debug!(
            item_id = %transcript.item_id,
            verdict = ?evaluation.verdict,
            chars = final_body.chars().count(),
            "post drafted"
        );

        let draft = PostDraft {
            item_id: transcript.item_id.clone(),
            platform,
            hashtags: extract_hashtags(&final_body),
            emoji_count: count_emoji(&final_body),
            body: final_body,
            model: self.generator.model_id(),
            prompt_id: self.template.id.clone(),
            revision: 1,
            created_at: Utc::now(),
        };

        Ok(DraftResult { draft, evaluation })
    }
}
