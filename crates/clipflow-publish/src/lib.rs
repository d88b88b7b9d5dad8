//! Idempotent publication stage
//!
//! Before calling the publishing collaborator the stage consults the ledger:
//! an item that already carries a `Published` transition returns the stored
//! receipt instead of publishing again. This guards against an orchestrator
//! restart after a publish that succeeded but whose confirmation write was
//! lost — the target is at-least-once delivery with idempotency keys, and
//! exactly one external publish per item in practice.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use clipflow_store::{RecordStore, StoreError};
use clipflow_utils::{ErrorKind, ItemStatus, PostDraft, PublishedReceipt, StageError};

/// One publish request to the platform collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    /// Idempotency key derived from the item, revision, and body; stable
    /// across replays of the same draft.
    pub idempotency_key: String,
    /// Post body.
    pub body: String,
    /// Media attachments, when any.
    pub media_refs: Vec<String>,
}

/// What the platform reports back for a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePost {
    pub id: String,
    pub url: Option<String>,
}

/// Failures from the publishing collaborator.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Publish authentication failed: {0}")]
    Auth(String),

    #[error("Publish rate limited: {0}")]
    RateLimited(String),

    #[error("Publish validation failed: {0}")]
    Validation(String),

    #[error("Publish network error: {0}")]
    Network(String),

    #[error("Publish request timed out")]
    Timeout,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StageError for PublishError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Validation(_) | Self::Store(_) => ErrorKind::Validation,
            Self::Network(_) => ErrorKind::TransientNetwork,
            Self::Timeout => ErrorKind::Timeout,
        }
    }
}

/// Publishing platform capability.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish the body; must tolerate replays of the same idempotency key.
    async fn publish(&self, request: PublishRequest) -> Result<RemotePost, PublishError>;
}

#[async_trait]
impl<T: Publisher + ?Sized> Publisher for Arc<T> {
    async fn publish(&self, request: PublishRequest) -> Result<RemotePost, PublishError> {
        (**self).publish(request).await
    }
}

/// Outcome of the publish stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The collaborator was called and confirmed this publish.
    Published(PublishedReceipt),
    /// A receipt already existed in the ledger; no call was made.
    AlreadyPublished(PublishedReceipt),
}

impl PublishOutcome {
    #[must_use]
    pub fn receipt(&self) -> &PublishedReceipt {
        match self {
            Self::Published(r) | Self::AlreadyPublished(r) => r,
        }
    }
}

/// The publication stage adapter.
pub struct PublishStage {
    store: Arc<dyn RecordStore>,
    publisher: Box<dyn Publisher>,
}

impl PublishStage {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, publisher: Box<dyn Publisher>) -> Self {
        Self { store, publisher }
    }

    /// Stable idempotency key for a draft revision.
    #[must_use]
    pub fn idempotency_key(draft: &PostDraft) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(draft.item_id.as_bytes());
        hasher.update(&draft.revision.to_le_bytes());
        hasher.update(draft.body.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Publish the draft, or return the receipt already on record.
    ///
    /// Exactly one external publish call is made per item across restarts;
    /// replays short-circuit on the ledger's `Published` transition.
    ///
    /// # Errors
    /// Classified per [`PublishError`]; the orchestrator retries
    /// rate-limit/network/timeout kinds with backoff and fails the item to
    /// `PublishFailed` on auth/validation.
    pub async fn publish(&self, draft: &PostDraft) -> Result<PublishOutcome, PublishError> {
        if let Some(receipt) = self.existing_receipt(&draft.item_id)? {
            warn!(
                item_id = %draft.item_id,
                remote_post_id = %receipt.remote_post_id,
                "publish replay detected; returning recorded receipt"
            );
            return Ok(PublishOutcome::AlreadyPublished(receipt));
        }

        let request = PublishRequest {
            idempotency_key: Self::idempotency_key(draft),
            body: draft.body.clone(),
            media_refs: Vec::new(),
        };
        let key = request.idempotency_key.clone();

        let remote = self.publisher.publish(request).await?;
        info!(
            item_id = %draft.item_id,
            remote_post_id = %remote.id,
            "published"
        );

        Ok(PublishOutcome::Published(PublishedReceipt {
            remote_post_id: remote.id,
            url: remote.url,
            published_at: Utc::now(),
            idempotency_key: key,
        }))
    }

    /// Receipt from an existing `Published` transition, if any.
    fn existing_receipt(&self, item_id: &str) -> Result<Option<PublishedReceipt>, StoreError> {
        let ledger = self.store.ledger(item_id)?;
        Ok(ledger
            .iter()
            .find(|t| t.to == ItemStatus::Published)
            .and_then(|t| t.receipt.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clipflow_store::{MemoryStore, StatusTransition};
    use clipflow_utils::{Item, Platform};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPublisher {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Publisher for CountingPublisher {
        async fn publish(&self, _request: PublishRequest) -> Result<RemotePost, PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RemotePost {
                id: "remote-1".to_string(),
                url: Some("https://threads.example/p/remote-1".to_string()),
            })
        }
    }

    fn draft() -> PostDraft {
        PostDraft {
            item_id: "v1".to_string(),
            platform: Platform::Threads,
            body: "The post body".to_string(),
            hashtags: vec![],
            emoji_count: 0,
            model: "gen-1".to_string(),
            prompt_id: "threads-v1".to_string(),
            revision: 1,
            created_at: Utc::now(),
        }
    }

    fn store_with_item() -> Arc<dyn RecordStore> {
        let store = MemoryStore::new();
        store
            .register_item(&Item {
                external_id: "v1".to_string(),
                url: "https://example.com/v1".to_string(),
                title: None,
                published_at: Utc::now(),
                discovered_at: Utc::now(),
            })
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn publishes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stage = PublishStage::new(
            store_with_item(),
            Box::new(CountingPublisher { calls: calls.clone() }),
        );

        let outcome = stage.publish(&draft()).await.unwrap();
        assert!(matches!(outcome, PublishOutcome::Published(_)));
        assert_eq!(outcome.receipt().remote_post_id, "remote-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn replay_returns_recorded_receipt_without_calling_out() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = store_with_item();

        // Simulate a completed publish whose receipt is on the ledger
        let receipt = PublishedReceipt {
            remote_post_id: "remote-prior".to_string(),
            url: None,
            published_at: Utc::now(),
            idempotency_key: "key".to_string(),
        };
        for (from, to) in [
            (ItemStatus::Detected, ItemStatus::Transcribing),
            (ItemStatus::Transcribing, ItemStatus::Transcribed),
            (ItemStatus::Transcribed, ItemStatus::ModeratingTranscript),
            (ItemStatus::ModeratingTranscript, ItemStatus::Generating),
            (ItemStatus::Generating, ItemStatus::Generated),
            (ItemStatus::Generated, ItemStatus::ModeratingPost),
            (ItemStatus::ModeratingPost, ItemStatus::AwaitingApproval),
            (ItemStatus::AwaitingApproval, ItemStatus::Approved),
            (ItemStatus::Approved, ItemStatus::Publishing),
        ] {
            store
                .append_transition(StatusTransition::new("v1", Some(from), to, "test"))
                .unwrap();
        }
        store
            .append_transition(
                StatusTransition::new(
                    "v1",
                    Some(ItemStatus::Publishing),
                    ItemStatus::Published,
                    "publish",
                )
                .with_receipt(receipt),
            )
            .unwrap();

        let stage = PublishStage::new(store, Box::new(CountingPublisher { calls: calls.clone() }));
        let outcome = stage.publish(&draft()).await.unwrap();

        assert!(matches!(outcome, PublishOutcome::AlreadyPublished(_)));
        assert_eq!(outcome.receipt().remote_post_id, "remote-prior");
        assert_eq!(calls.load(Ordering::SeqCst), 0, "no external call on replay");
    }

    #[tokio::test]
    async fn idempotency_key_is_stable_per_revision() {
        let a = PublishStage::idempotency_key(&draft());
        let b = PublishStage::idempotency_key(&draft());
        assert_eq!(a, b);

        let mut revised = draft();
        revised.revision = 2;
        revised.body = "Edited body".to_string();
        assert_ne!(a, PublishStage::idempotency_key(&revised));
    }

    #[tokio::test]
    async fn error_kinds_classify_for_retry() {
        assert!(PublishError::RateLimited("429".into()).kind().is_retryable());
        assert!(PublishError::Network("reset".into()).kind().is_retryable());
        assert!(PublishError::Timeout.kind().is_retryable());
        assert!(!PublishError::Auth("401".into()).kind().is_retryable());
        assert!(!PublishError::Validation("bad body".into()).kind().is_retryable());
    }
}
