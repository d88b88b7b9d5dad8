//! Feed source capability interface
//!
//! The feed is an external collaborator; this crate defines only its typed
//! boundary. Polling returns zero or more entries in no guaranteed order;
//! dedup against already-registered items happens at the store
//! (`register_item` is a no-op for known ids), so a re-poll race can never
//! restart an in-flight item.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use clipflow_utils::{ErrorKind, Item, StageError};

/// One entry returned by a feed poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// Stable external id of the content unit.
    pub external_id: String,
    /// Source URL.
    pub url: String,
    /// Title, when the feed reports one.
    pub title: Option<String>,
    /// Publication time reported by the feed.
    pub published_at: DateTime<Utc>,
}

impl FeedEntry {
    /// Convert into a registered [`Item`], stamping the discovery time.
    #[must_use]
    pub fn into_item(self, discovered_at: DateTime<Utc>) -> Item {
        Item {
            external_id: self.external_id,
            url: self.url,
            title: self.title,
            published_at: self.published_at,
            discovered_at,
        }
    }
}

/// Failures from the feed collaborator.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Feed network error: {0}")]
    Network(String),

    #[error("Feed rate limited: {0}")]
    RateLimited(String),

    #[error("Feed request timed out")]
    Timeout,
}

impl StageError for FeedError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::TransientNetwork,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Timeout => ErrorKind::Timeout,
        }
    }
}

/// External feed of newly published content units.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Return entries published after `since`. Order is not guaranteed and
    /// entries already seen may reappear.
    async fn poll(&self, since: DateTime<Utc>) -> Result<Vec<FeedEntry>, FeedError>;
}
