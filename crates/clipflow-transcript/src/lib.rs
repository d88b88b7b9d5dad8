//! Transcript derivation: caption retrieval with speech-to-text fallback
//!
//! The stage tries the caption collaborator first; when captions are not
//! available it falls back to speech-to-text over the media itself. Segment
//! output from either source is normalized into one flat [`Transcript`]
//! with a language tag. An empty result is an explicit failure, never an
//! empty transcript.
//!
//! Retrying is not done here — transient failures are classified and
//! returned to the orchestrator, which owns the retry policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use clipflow_guard::text::detect_language;
use clipflow_utils::{ErrorKind, Item, StageError, Transcript, TranscriptSource};

/// One timed text segment as produced by caption or speech-to-text services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Segment text.
    pub text: String,
    /// Start offset in seconds.
    pub start: f64,
    /// Duration in seconds.
    pub duration: f64,
}

/// Segments plus the language the producing service reported, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentedTranscript {
    pub segments: Vec<Segment>,
    pub language: Option<String>,
}

impl SegmentedTranscript {
    /// Flatten segments into one space-joined text, dropping empty segments.
    #[must_use]
    pub fn flatten(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Failures from transcript collaborators.
#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("Captions not available: {0}")]
    NotAvailable(String),

    #[error("Transcription network error: {0}")]
    Network(String),

    #[error("Transcription rate limited: {0}")]
    RateLimited(String),

    #[error("Transcription request timed out")]
    Timeout,

    #[error("Transcription rejected the media: {0}")]
    Invalid(String),

    #[error("Transcript is empty for item {item_id}")]
    Empty { item_id: String },
}

impl StageError for TranscriptError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAvailable(_) => ErrorKind::NotAvailable,
            Self::Network(_) => ErrorKind::TransientNetwork,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Timeout => ErrorKind::Timeout,
            Self::Invalid(_) | Self::Empty { .. } => ErrorKind::Validation,
        }
    }
}

/// Platform caption retrieval.
#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// Fetch captions for an external id, preferring `language_pref` order.
    async fn get_captions(
        &self,
        external_id: &str,
        language_pref: &[&str],
    ) -> Result<SegmentedTranscript, TranscriptError>;
}

/// Speech-to-text fallback over the media itself.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe the media behind `media_url`.
    async fn transcribe(&self, media_url: &str) -> Result<SegmentedTranscript, TranscriptError>;
}

/// The transcript stage adapter: captions first, speech-to-text fallback.
pub struct TranscriptStage {
    captions: Box<dyn CaptionSource>,
    fallback: Option<Box<dyn SpeechToText>>,
    language_pref: Vec<String>,
}

impl TranscriptStage {
    #[must_use]
    pub fn new(captions: Box<dyn CaptionSource>, fallback: Option<Box<dyn SpeechToText>>) -> Self {
        Self {
            captions,
            fallback,
            language_pref: vec!["ru".to_string(), "en".to_string()],
        }
    }

    /// Override the caption language preference order.
    #[must_use]
    pub fn with_language_pref(mut self, pref: Vec<String>) -> Self {
        self.language_pref = pref;
        self
    }

    /// Produce a transcript for the item.
    ///
    /// Caption failures of the `NotAvailable` kind trigger the fallback when
    /// one is configured; every other caption failure propagates as-is. An
    /// empty flattened text is a [`TranscriptError::Empty`] failure.
    ///
    /// # Errors
    /// Classified per [`TranscriptError`]; the orchestrator decides retries.
    pub async fn produce_transcript(&self, item: &Item) -> Result<Transcript, TranscriptError> {
        let prefs: Vec<&str> = self.language_pref.iter().map(String::as_str).collect();

        let (segmented, source) = match self.captions.get_captions(&item.external_id, &prefs).await
        {
            Ok(segmented) => (segmented, TranscriptSource::Captions),
            Err(e) if e.kind() == ErrorKind::NotAvailable => {
                debug!(item_id = %item.external_id, reason = %e, "captions unavailable");
                match &self.fallback {
                    Some(stt) => {
                        info!(item_id = %item.external_id, "falling back to speech-to-text");
                        (stt.transcribe(&item.url).await?, TranscriptSource::SpeechToText)
                    }
                    None => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        let text = segmented.flatten();
        let language = segmented
            .language
            .unwrap_or_else(|| detect_language(&text).to_string());

        Transcript::new(&item.external_id, text, language, source).ok_or_else(|| {
            TranscriptError::Empty {
                item_id: item.external_id.clone(),
            }
        })
    }
}
