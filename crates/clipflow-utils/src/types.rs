use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an item as it moves through the workflow.
///
/// Statuses form a directed graph; [`ItemStatus::can_transition_to`] is the
/// single source of truth for which edges are legal. Terminal statuses have no
/// outgoing edges and an item that reaches one is never reprocessed.
///
/// # Status Flow
///
/// ```text
/// Detected → Transcribing → Transcribed → ModeratingTranscript
///   → (RejectedTranscript | Generating) → Generated → ModeratingPost
///   → (RejectedPost | AwaitingApproval)
///   → (Approved | RejectedHuman | EditRequested)
///   → Publishing → (Published | PublishFailed)
/// ```
///
/// `Failed` is reachable from any non-terminal status on an unrecoverable
/// error. `EditRequested` loops back through `ModeratingPost` so edited
/// revisions are re-screened before being presented again.
///
/// # Serialization
///
/// Serializes to the snake_case string form (e.g. `"awaiting_approval"`),
/// which is also what [`ItemStatus::as_str`] returns.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemStatus {
    /// Newly discovered by the feed detector, nothing processed yet.
    Detected,
    /// Transcript derivation in flight.
    Transcribing,
    /// Transcript stored, not yet screened.
    Transcribed,
    /// Evaluator pass 1 (transcript) in flight.
    ModeratingTranscript,
    /// Transcript failed guardrails. Terminal.
    RejectedTranscript,
    /// Post drafting in flight.
    Generating,
    /// Draft stored, not yet screened.
    Generated,
    /// Evaluator pass 2 (post body) in flight.
    ModeratingPost,
    /// Draft failed guardrails. Terminal.
    RejectedPost,
    /// Parked waiting on a human decision; no worker slot is held.
    AwaitingApproval,
    /// Human approved the current revision.
    Approved,
    /// Human rejected, or the edit-cycle cap was exhausted. Terminal.
    RejectedHuman,
    /// Human supplied an edited body; a new revision is being prepared.
    EditRequested,
    /// Publication in flight.
    Publishing,
    /// Publication confirmed. Terminal.
    Published,
    /// Publication failed on a non-retryable error or exhausted retries. Terminal.
    PublishFailed,
    /// Unrecoverable system error at some stage. Terminal.
    Failed,
}

impl ItemStatus {
    /// Canonical snake_case name used in ledgers, status output, and the CLI.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Transcribing => "transcribing",
            Self::Transcribed => "transcribed",
            Self::ModeratingTranscript => "moderating_transcript",
            Self::RejectedTranscript => "rejected_transcript",
            Self::Generating => "generating",
            Self::Generated => "generated",
            Self::ModeratingPost => "moderating_post",
            Self::RejectedPost => "rejected_post",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Approved => "approved",
            Self::RejectedHuman => "rejected_human",
            Self::EditRequested => "edit_requested",
            Self::Publishing => "publishing",
            Self::Published => "published",
            Self::PublishFailed => "publish_failed",
            Self::Failed => "failed",
        }
    }

    /// Whether this status has no outgoing edges.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RejectedTranscript
                | Self::RejectedPost
                | Self::RejectedHuman
                | Self::Published
                | Self::PublishFailed
                | Self::Failed
        )
    }

    /// Statuses this status may legally transition to.
    ///
    /// `Failed` is implicitly reachable from every non-terminal status and is
    /// included in each slice. Terminal statuses return an empty slice.
    #[must_use]
    pub const fn legal_next(&self) -> &'static [ItemStatus] {
        match self {
            Self::Detected => &[Self::Transcribing, Self::RejectedHuman, Self::Failed],
            Self::Transcribing => &[Self::Transcribed, Self::Failed],
            Self::Transcribed => &[Self::ModeratingTranscript, Self::RejectedHuman, Self::Failed],
            Self::ModeratingTranscript => {
                &[Self::RejectedTranscript, Self::Generating, Self::Failed]
            }
            Self::Generating => &[Self::Generated, Self::Failed],
            Self::Generated => &[Self::ModeratingPost, Self::RejectedHuman, Self::Failed],
            Self::ModeratingPost => &[Self::RejectedPost, Self::AwaitingApproval, Self::Failed],
            Self::AwaitingApproval => &[
                Self::Approved,
                Self::RejectedHuman,
                Self::EditRequested,
                Self::Failed,
            ],
            Self::EditRequested => &[Self::ModeratingPost, Self::RejectedHuman, Self::Failed],
            Self::Approved => &[Self::Publishing, Self::RejectedHuman, Self::Failed],
            Self::Publishing => &[Self::Published, Self::PublishFailed, Self::Failed],
            Self::RejectedTranscript
            | Self::RejectedPost
            | Self::RejectedHuman
            | Self::Published
            | Self::PublishFailed
            | Self::Failed => &[],
        }
    }

    /// Check whether `next` is a legal successor of this status.
    #[must_use]
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        self.legal_next().contains(&next)
    }
}

/// Target publishing platform for a drafted post.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    Threads,
}

impl Platform {
    /// Canonical lowercase name, used as the key into per-platform limits.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Threads => "threads",
        }
    }
}

/// One detected content unit, tracked end-to-end.
///
/// Identity fields are immutable after registration; all state changes happen
/// through the status ledger, never by mutating the item record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Stable external id assigned by the feed source.
    pub external_id: String,
    /// Source URL of the content unit.
    pub url: String,
    /// Title as reported by the feed, if any.
    pub title: Option<String>,
    /// When the feed source says the content was published.
    pub published_at: DateTime<Utc>,
    /// When this system first saw the item.
    pub discovered_at: DateTime<Utc>,
}

/// How a transcript was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    /// Platform-provided captions.
    Captions,
    /// Speech-to-text fallback over the media itself.
    SpeechToText,
}

/// Text derived from an item, owned exclusively by that item.
///
/// Regeneration produces a new `Transcript` that supersedes the prior one; a
/// stored transcript is never mutated. Construction goes through
/// [`Transcript::new`], which rejects empty text so downstream stages never
/// see a hollow transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    /// External id of the owning item.
    pub item_id: String,
    /// Flattened transcript text.
    pub text: String,
    /// BCP-47-ish language tag (`"en"`, `"ru"`, `"unknown"`).
    pub language: String,
    /// Which collaborator produced the text.
    pub source: TranscriptSource,
    /// Character count of `text`.
    pub char_count: usize,
    /// Whitespace-separated word count of `text`.
    pub word_count: usize,
}

impl Transcript {
    /// Build a transcript from flattened text, rejecting empty input.
    ///
    /// Returns `None` when `text` is empty or whitespace-only; the transcript
    /// stage turns that into an explicit failure rather than persisting an
    /// empty transcript.
    #[must_use]
    pub fn new(
        item_id: impl Into<String>,
        text: impl Into<String>,
        language: impl Into<String>,
        source: TranscriptSource,
    ) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }
        let char_count = text.chars().count();
        let word_count = text.split_whitespace().count();
        Some(Self {
            item_id: item_id.into(),
            text,
            language: language.into(),
            source,
            char_count,
            word_count,
        })
    }
}

/// A numbered revision of generated candidate content for publication.
///
/// Revision 1 is machine-generated; human edits during approval create
/// revision N+1. Superseded revisions are retained for audit. The record
/// store enforces that revisions are contiguous and marks exactly one as
/// current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDraft {
    /// External id of the owning item.
    pub item_id: String,
    /// Target platform.
    pub platform: Platform,
    /// Post body text (post-auto-fix when auto-fix applied).
    pub body: String,
    /// Hashtag tokens extracted from the body, `#` included.
    pub hashtags: Vec<String>,
    /// Emoji count in the body.
    pub emoji_count: usize,
    /// Identifier of the model that generated revision 1.
    pub model: String,
    /// Identifier of the prompt template used for generation.
    pub prompt_id: String,
    /// Revision number, starting at 1 and strictly increasing.
    pub revision: u32,
    /// When this revision was created.
    pub created_at: DateTime<Utc>,
}

/// Confirmation returned by the publishing collaborator.
///
/// Stored in the `published` ledger transition so a restart after a lost
/// confirmation write can return the existing receipt instead of publishing
/// again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedReceipt {
    /// Post id assigned by the platform.
    pub remote_post_id: String,
    /// Public URL of the published post, when the platform reports one.
    pub url: Option<String>,
    /// When the publish call was confirmed.
    pub published_at: DateTime<Utc>,
    /// Idempotency key the publish request carried.
    pub idempotency_key: String,
}
