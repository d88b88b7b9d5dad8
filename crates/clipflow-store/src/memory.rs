//! In-memory record store for tests and dry runs

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::Utc;
use clipflow_utils::{Item, ItemStatus, PostDraft, Transcript};

use crate::transition::{StatusTransition, validate_transition};
use crate::{RecordStore, StoreError};

#[derive(Default)]
struct Inner {
    items: Vec<Item>,
    ledgers: HashMap<String, Vec<StatusTransition>>,
    transcripts: HashMap<String, Vec<Transcript>>,
    drafts: HashMap<String, Vec<PostDraft>>,
    leases: HashSet<String>,
}

/// Thread-safe in-memory [`RecordStore`].
///
/// Same validation behavior as the file-backed store; state disappears with
/// the process.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning only happens when a panicking thread held the lock;
        // the store's state is still consistent because mutations are atomic
        // per call, so recover the guard.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl RecordStore for MemoryStore {
    fn register_item(&self, item: &Item) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if inner.items.iter().any(|i| i.external_id == item.external_id) {
            return Ok(false);
        }
        inner.items.push(item.clone());
        inner.ledgers.insert(
            item.external_id.clone(),
            vec![StatusTransition {
                item_id: item.external_id.clone(),
                from: None,
                to: ItemStatus::Detected,
                at: Utc::now(),
                stage: "detect".to_string(),
                evaluation: None,
                error: None,
                receipt: None,
            }],
        );
        Ok(true)
    }

    fn get_item(&self, item_id: &str) -> Result<Option<Item>, StoreError> {
        let inner = self.lock();
        Ok(inner.items.iter().find(|i| i.external_id == item_id).cloned())
    }

    fn all_items(&self) -> Result<Vec<Item>, StoreError> {
        Ok(self.lock().items.clone())
    }

    fn append_transition(&self, transition: StatusTransition) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let ledger = inner
            .ledgers
            .get_mut(&transition.item_id)
            .ok_or_else(|| StoreError::UnknownItem {
                item_id: transition.item_id.clone(),
            })?;

        let current = ledger.last().map(|t| t.to);
        validate_transition(current, &transition)?;
        ledger.push(transition);
        Ok(())
    }

    fn current_status(&self, item_id: &str) -> Result<Option<ItemStatus>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .ledgers
            .get(item_id)
            .and_then(|l| l.last())
            .map(|t| t.to))
    }

    fn ledger(&self, item_id: &str) -> Result<Vec<StatusTransition>, StoreError> {
        let inner = self.lock();
        Ok(inner.ledgers.get(item_id).cloned().unwrap_or_default())
    }

    fn items_with_status(&self, status: ItemStatus) -> Result<Vec<String>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .items
            .iter()
            .filter(|i| {
                inner
                    .ledgers
                    .get(&i.external_id)
                    .and_then(|l| l.last())
                    .is_some_and(|t| t.to == status)
            })
            .map(|i| i.external_id.clone())
            .collect())
    }

    fn try_acquire_lease(&self, item_id: &str) -> Result<bool, StoreError> {
        Ok(self.lock().leases.insert(item_id.to_string()))
    }

    fn release_lease(&self, item_id: &str) -> Result<(), StoreError> {
        self.lock().leases.remove(item_id);
        Ok(())
    }

    fn record_transcript(&self, transcript: &Transcript) -> Result<(), StoreError> {
        self.lock()
            .transcripts
            .entry(transcript.item_id.clone())
            .or_default()
            .push(transcript.clone());
        Ok(())
    }

    fn latest_transcript(&self, item_id: &str) -> Result<Option<Transcript>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .transcripts
            .get(item_id)
            .and_then(|v| v.last())
            .cloned())
    }

    fn put_draft_revision(&self, draft: &PostDraft) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let drafts = inner.drafts.entry(draft.item_id.clone()).or_default();
        let expected = drafts.last().map_or(1, |d| d.revision + 1);
        if draft.revision != expected {
            return Err(StoreError::RevisionGap {
                item_id: draft.item_id.clone(),
                expected,
                got: draft.revision,
            });
        }
        drafts.push(draft.clone());
        Ok(())
    }

    fn current_draft(&self, item_id: &str) -> Result<Option<PostDraft>, StoreError> {
        let inner = self.lock();
        Ok(inner.drafts.get(item_id).and_then(|v| v.last()).cloned())
    }

    fn draft_history(&self, item_id: &str) -> Result<Vec<PostDraft>, StoreError> {
        let inner = self.lock();
        Ok(inner.drafts.get(item_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipflow_utils::{Platform, TranscriptSource};

    fn item(id: &str) -> Item {
        Item {
            external_id: id.to_string(),
            url: format!("https://example.com/{id}"),
            title: Some("A clip".to_string()),
            published_at: Utc::now(),
            discovered_at: Utc::now(),
        }
    }

    fn draft(id: &str, revision: u32) -> PostDraft {
        PostDraft {
            item_id: id.to_string(),
            platform: Platform::Threads,
            body: "body".to_string(),
            hashtags: vec![],
            emoji_count: 0,
            model: "model".to_string(),
            prompt_id: "threads-v1".to_string(),
            revision,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn registration_is_idempotent() {
        let store = MemoryStore::new();
        assert!(store.register_item(&item("v1")).unwrap());
        assert!(!store.register_item(&item("v1")).unwrap());
        assert_eq!(
            store.current_status("v1").unwrap(),
            Some(ItemStatus::Detected)
        );
    }

    #[test]
    fn re_registration_is_noop_in_any_status() {
        let store = MemoryStore::new();
        store.register_item(&item("v1")).unwrap();
        store
            .append_transition(StatusTransition::new(
                "v1",
                Some(ItemStatus::Detected),
                ItemStatus::Transcribing,
                "transcript",
            ))
            .unwrap();

        assert!(!store.register_item(&item("v1")).unwrap());
        // Status unchanged — no restart of DETECTED
        assert_eq!(
            store.current_status("v1").unwrap(),
            Some(ItemStatus::Transcribing)
        );
    }

    #[test]
    fn lease_is_exclusive() {
        let store = MemoryStore::new();
        store.register_item(&item("v1")).unwrap();
        assert!(store.try_acquire_lease("v1").unwrap());
        assert!(!store.try_acquire_lease("v1").unwrap());
        store.release_lease("v1").unwrap();
        assert!(store.try_acquire_lease("v1").unwrap());
    }

    #[test]
    fn append_rejects_unknown_item() {
        let store = MemoryStore::new();
        let result = store.append_transition(StatusTransition::new(
            "ghost",
            None,
            ItemStatus::Detected,
            "detect",
        ));
        assert!(matches!(result, Err(StoreError::UnknownItem { .. })));
    }

    #[test]
    fn revisions_must_be_contiguous() {
        let store = MemoryStore::new();
        store.register_item(&item("v1")).unwrap();

        store.put_draft_revision(&draft("v1", 1)).unwrap();
        assert!(matches!(
            store.put_draft_revision(&draft("v1", 3)),
            Err(StoreError::RevisionGap { expected: 2, .. })
        ));
        store.put_draft_revision(&draft("v1", 2)).unwrap();

        assert_eq!(store.current_draft("v1").unwrap().unwrap().revision, 2);
        let history = store.draft_history("v1").unwrap();
        assert_eq!(
            history.iter().map(|d| d.revision).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn first_revision_must_be_one() {
        let store = MemoryStore::new();
        store.register_item(&item("v1")).unwrap();
        assert!(matches!(
            store.put_draft_revision(&draft("v1", 2)),
            Err(StoreError::RevisionGap { expected: 1, .. })
        ));
    }

    #[test]
    fn transcripts_supersede() {
        let store = MemoryStore::new();
        store.register_item(&item("v1")).unwrap();

        let first =
            Transcript::new("v1", "first transcript", "en", TranscriptSource::Captions).unwrap();
        store.record_transcript(&first).unwrap();
        let second =
            Transcript::new("v1", "second transcript", "en", TranscriptSource::Captions).unwrap();
        store.record_transcript(&second).unwrap();

        assert_eq!(
            store.latest_transcript("v1").unwrap().unwrap().text,
            "second transcript"
        );
    }
}
