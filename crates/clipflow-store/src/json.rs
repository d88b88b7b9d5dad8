//! File-backed record store: one directory per item, canonical JSON files
//!
//! Layout under the store root:
//!
//! ```text
//! items/<id>/item.json
//! items/<id>/lease.json
//! items/<id>/transitions/0001-detected.json
//! items/<id>/transcripts/0001.json
//! items/<id>/drafts/rev-001.json
//! ```
//!
//! Files are written atomically (temp + fsync + rename) and serialized as
//! canonical JSON, so a ledger replay is byte-reproducible. A process-wide
//! mutex makes read-head-then-append atomic within the process; the lease
//! file (created with `create_new`) excludes other processes.

use std::fs;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::warn;

use clipflow_utils::atomic_write::write_file_atomic;
use clipflow_utils::{Item, ItemStatus, PostDraft, Transcript};

use crate::transition::{StatusTransition, validate_transition};
use crate::{RecordStore, StoreError, emit_jcs};

/// Age in seconds after which a lease is considered abandoned and stolen.
const STALE_LEASE_SECS: u64 = 3600;

/// Lease metadata stored in `lease.json` for operator inspection.
#[derive(Debug, Serialize, Deserialize)]
struct LeaseInfo {
    pid: u32,
    created_at: u64,
    item_id: String,
}

/// File-backed [`RecordStore`] rooted at a directory.
pub struct JsonLedgerStore {
    root: Utf8PathBuf,
    // Serializes validate-then-append sequences within this process.
    append_lock: Mutex<()>,
}

impl JsonLedgerStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    /// Fails when the root directory cannot be created.
    pub fn open(root: impl Into<Utf8PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join("items"))?;
        Ok(Self {
            root,
            append_lock: Mutex::new(()),
        })
    }

    fn item_dir(&self, item_id: &str) -> Result<Utf8PathBuf, StoreError> {
        if item_id.is_empty()
            || item_id.contains(['/', '\\'])
            || item_id == "."
            || item_id == ".."
        {
            return Err(StoreError::Other(format!(
                "invalid item id for store path: {item_id:?}"
            )));
        }
        Ok(self.root.join("items").join(item_id))
    }

    fn write_json<T: Serialize>(&self, path: &Utf8Path, value: &T) -> Result<(), StoreError> {
        let content = emit_jcs(value)?;
        write_file_atomic(path, &content).map_err(|e| StoreError::Other(e.to_string()))
    }

    fn read_json<T: for<'de> Deserialize<'de>>(
        path: &Utf8Path,
    ) -> Result<Option<T>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Read all JSON files in a directory, sorted by filename.
    fn read_dir_sorted<T: for<'de> Deserialize<'de>>(
        dir: &Utf8Path,
    ) -> Result<Vec<T>, StoreError> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut values = Vec::with_capacity(paths.len());
        for path in paths {
            let content = fs::read_to_string(&path)?;
            values.push(serde_json::from_str(&content)?);
        }
        Ok(values)
    }

    fn transitions_dir(&self, item_id: &str) -> Result<Utf8PathBuf, StoreError> {
        Ok(self.item_dir(item_id)?.join("transitions"))
    }

    fn head(&self, item_id: &str) -> Result<Option<ItemStatus>, StoreError> {
        let transitions: Vec<StatusTransition> =
            Self::read_dir_sorted(&self.transitions_dir(item_id)?)?;
        Ok(transitions.last().map(|t| t.to))
    }

    fn append_unchecked(
        &self,
        transition: &StatusTransition,
        seq: usize,
    ) -> Result<(), StoreError> {
        let dir = self.transitions_dir(&transition.item_id)?;
        let filename = format!("{:04}-{}.json", seq, transition.to.as_str());
        self.write_json(&dir.join(filename), transition)
    }
}

impl RecordStore for JsonLedgerStore {
    fn register_item(&self, item: &Item) -> Result<bool, StoreError> {
        let _guard = self.append_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let dir = self.item_dir(&item.external_id)?;
        if dir.join("item.json").exists() {
            return Ok(false);
        }

        self.write_json(&dir.join("item.json"), item)?;
        let initial = StatusTransition::new(
            item.external_id.clone(),
            None,
            ItemStatus::Detected,
            "detect",
        );
        self.append_unchecked(&initial, 1)?;
        Ok(true)
    }

    fn get_item(&self, item_id: &str) -> Result<Option<Item>, StoreError> {
        Self::read_json(&self.item_dir(item_id)?.join("item.json"))
    }

    fn all_items(&self) -> Result<Vec<Item>, StoreError> {
        let items_dir = self.root.join("items");
        let mut dirs: Vec<_> = fs::read_dir(&items_dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        let mut items = Vec::new();
        for dir in dirs {
            let path = dir.join("item.json");
            if path.exists() {
                let content = fs::read_to_string(&path)?;
                items.push(serde_json::from_str(&content)?);
            }
        }
        // Registration order, not directory order
        items.sort_by_key(|i: &Item| i.discovered_at);
        Ok(items)
    }

    fn append_transition(&self, transition: StatusTransition) -> Result<(), StoreError> {
        let _guard = self.append_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        if self.get_item(&transition.item_id)?.is_none() {
            return Err(StoreError::UnknownItem {
                item_id: transition.item_id.clone(),
            });
        }

        let existing: Vec<StatusTransition> =
            Self::read_dir_sorted(&self.transitions_dir(&transition.item_id)?)?;
        let current = existing.last().map(|t| t.to);
        validate_transition(current, &transition)?;

        self.append_unchecked(&transition, existing.len() + 1)
    }

    fn current_status(&self, item_id: &str) -> Result<Option<ItemStatus>, StoreError> {
        self.head(item_id)
    }

    fn ledger(&self, item_id: &str) -> Result<Vec<StatusTransition>, StoreError> {
        Self::read_dir_sorted(&self.transitions_dir(item_id)?)
    }

    fn items_with_status(&self, status: ItemStatus) -> Result<Vec<String>, StoreError> {
        let mut matching = Vec::new();
        for item in self.all_items()? {
            if self.head(&item.external_id)? == Some(status) {
                matching.push(item.external_id);
            }
        }
        Ok(matching)
    }

    fn try_acquire_lease(&self, item_id: &str) -> Result<bool, StoreError> {
        let dir = self.item_dir(item_id)?;
        fs::create_dir_all(&dir)?;
        let lease_path = dir.join("lease.json");

        // Steal leases abandoned by a crashed process
        if let Some(info) = Self::read_json::<LeaseInfo>(&lease_path)? {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            if now.saturating_sub(info.created_at) > STALE_LEASE_SECS {
                warn!(item_id, pid = info.pid, "stealing stale lease");
                fs::remove_file(&lease_path)?;
            }
        }

        let info = LeaseInfo {
            pid: std::process::id(),
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            item_id: item_id.to_string(),
        };

        // create_new is the atomicity point: exactly one caller wins
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lease_path.as_std_path())
        {
            Ok(file) => {
                use std::io::Write;
                let mut file = file;
                let content = emit_jcs(&info)?;
                file.write_all(content.as_bytes())?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn release_lease(&self, item_id: &str) -> Result<(), StoreError> {
        let lease_path = self.item_dir(item_id)?.join("lease.json");
        match fs::remove_file(lease_path.as_std_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn record_transcript(&self, transcript: &Transcript) -> Result<(), StoreError> {
        let _guard = self.append_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let dir = self.item_dir(&transcript.item_id)?.join("transcripts");
        let existing: Vec<Transcript> = Self::read_dir_sorted(&dir)?;
        let filename = format!("{:04}.json", existing.len() + 1);
        self.write_json(&dir.join(filename), transcript)
    }

    fn latest_transcript(&self, item_id: &str) -> Result<Option<Transcript>, StoreError> {
        let dir = self.item_dir(item_id)?.join("transcripts");
        let mut transcripts: Vec<Transcript> = Self::read_dir_sorted(&dir)?;
        Ok(transcripts.pop())
    }

    fn put_draft_revision(&self, draft: &PostDraft) -> Result<(), StoreError> {
        let _guard = self.append_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let dir = self.item_dir(&draft.item_id)?.join("drafts");
        let existing: Vec<PostDraft> = Self::read_dir_sorted(&dir)?;
        let expected = existing.last().map_or(1, |d| d.revision + 1);
        if draft.revision != expected {
            return Err(StoreError::RevisionGap {
                item_id: draft.item_id.clone(),
                expected,
                got: draft.revision,
            });
        }
        let filename = format!("rev-{:03}.json", draft.revision);
        self.write_json(&dir.join(filename), draft)
    }

    fn current_draft(&self, item_id: &str) -> Result<Option<PostDraft>, StoreError> {
        let dir = self.item_dir(item_id)?.join("drafts");
        let mut drafts: Vec<PostDraft> = Self::read_dir_sorted(&dir)?;
        Ok(drafts.pop())
    }

    fn draft_history(&self, item_id: &str) -> Result<Vec<PostDraft>, StoreError> {
        let dir = self.item_dir(item_id)?.join("drafts");
        Self::read_dir_sorted(&dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clipflow_utils::{Platform, TranscriptSource};

    fn open_store() -> (JsonLedgerStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().join("store")).unwrap();
        (JsonLedgerStore::open(root).unwrap(), dir)
    }

    fn item(id: &str) -> Item {
        Item {
            external_id: id.to_string(),
            url: format!("https://example.com/{id}"),
            title: None,
            published_at: Utc::now(),
            discovered_at: Utc::now(),
        }
    }

    #[test]
    fn ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().join("store")).unwrap();

        {
            let store = JsonLedgerStore::open(root.clone()).unwrap();
            store.register_item(&item("v1")).unwrap();
            store
                .append_transition(StatusTransition::new(
                    "v1",
                    Some(ItemStatus::Detected),
                    ItemStatus::Transcribing,
                    "transcript",
                ))
                .unwrap();
        }

        let store = JsonLedgerStore::open(root).unwrap();
        assert_eq!(
            store.current_status("v1").unwrap(),
            Some(ItemStatus::Transcribing)
        );
        let ledger = store.ledger("v1").unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].to, ItemStatus::Detected);
        assert_eq!(ledger[1].to, ItemStatus::Transcribing);
    }

    #[test]
    fn registration_is_idempotent_across_reopen() {
        let (store, _dir) = open_store();
        assert!(store.register_item(&item("v1")).unwrap());
        assert!(!store.register_item(&item("v1")).unwrap());
    }

    #[test]
    fn lease_exclusion_and_release() {
        let (store, _dir) = open_store();
        store.register_item(&item("v1")).unwrap();

        assert!(store.try_acquire_lease("v1").unwrap());
        assert!(!store.try_acquire_lease("v1").unwrap());
        store.release_lease("v1").unwrap();
        assert!(store.try_acquire_lease("v1").unwrap());
        // Releasing twice is fine
        store.release_lease("v1").unwrap();
        store.release_lease("v1").unwrap();
    }

    #[test]
    fn terminal_status_rejects_appends() {
        let (store, _dir) = open_store();
        store.register_item(&item("v1")).unwrap();
        store
            .append_transition(
                StatusTransition::new(
                    "v1",
                    Some(ItemStatus::Detected),
                    ItemStatus::Failed,
                    "orchestrator",
                ),
            )
            .unwrap();

        let result = store.append_transition(StatusTransition::new(
            "v1",
            Some(ItemStatus::Failed),
            ItemStatus::Transcribing,
            "transcript",
        ));
        assert!(matches!(result, Err(StoreError::TerminalStatus { .. })));
    }

    #[test]
    fn items_with_status_filters() {
        let (store, _dir) = open_store();
        store.register_item(&item("v1")).unwrap();
        store.register_item(&item("v2")).unwrap();
        store
            .append_transition(StatusTransition::new(
                "v2",
                Some(ItemStatus::Detected),
                ItemStatus::Transcribing,
                "transcript",
            ))
            .unwrap();

        assert_eq!(
            store.items_with_status(ItemStatus::Detected).unwrap(),
            vec!["v1".to_string()]
        );
    }

    #[test]
    fn path_hostile_item_id_is_rejected() {
        let (store, _dir) = open_store();
        assert!(store.register_item(&item("../escape")).is_err());
    }

    #[test]
    fn drafts_and_transcripts_round_trip() {
        let (store, _dir) = open_store();
        store.register_item(&item("v1")).unwrap();

        let transcript =
            Transcript::new("v1", "some transcript text", "en", TranscriptSource::Captions)
                .unwrap();
        store.record_transcript(&transcript).unwrap();
        assert_eq!(
            store.latest_transcript("v1").unwrap().unwrap().text,
            "some transcript text"
        );

        let draft = PostDraft {
            item_id: "v1".to_string(),
            platform: Platform::Threads,
            body: "the post".to_string(),
            hashtags: vec!["#rust".to_string()],
            emoji_count: 1,
            model: "gen-1".to_string(),
            prompt_id: "threads-v1".to_string(),
            revision: 1,
            created_at: Utc::now(),
        };
        store.put_draft_revision(&draft).unwrap();
        assert!(matches!(
            store.put_draft_revision(&PostDraft { revision: 5, ..draft.clone() }),
            Err(StoreError::RevisionGap { expected: 2, .. })
        ));
        assert_eq!(store.current_draft("v1").unwrap().unwrap().body, "the post");
    }
}
