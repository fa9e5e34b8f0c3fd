//! Push/pull of snapshot records with the remote snapshot API.
//!
//! Only snapshot records travel here, never live CRDT state. Binary CRDT
//! state is base64-encoded on the wire (`yjsState`).
//!
//! Ordering per document is push-then-pull: local snapshots newer than the
//! server's latest timestamp are uploaded first, then every server snapshot
//! unknown locally is imported.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::BoxFuture;
use crate::crdt::{DiffStats, DocumentSnapshot, SnapshotTrigger};
use crate::error::{NexusError, Result};
use crate::store::SnapshotStore;

/// Wire representation of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct SnapshotDto {
    pub id: String,
    pub document_id: String,
    /// Base64 of the CRDT state
    pub yjs_state: String,
    pub plain_text: String,
    /// Unix timestamp (milliseconds)
    pub timestamp: i64,
    pub trigger: SnapshotTrigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub word_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_added: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_removed: Option<usize>,
}

impl From<&DocumentSnapshot> for SnapshotDto {
    fn from(snapshot: &DocumentSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            document_id: snapshot.document_id.clone(),
            yjs_state: STANDARD.encode(&snapshot.crdt_state),
            plain_text: snapshot.plain_text.clone(),
            timestamp: snapshot.timestamp,
            trigger: snapshot.trigger,
            summary: snapshot.summary.clone(),
            word_count: snapshot.word_count,
            diff_added: snapshot.diff_from_previous.map(|d| d.added),
            diff_removed: snapshot.diff_from_previous.map(|d| d.removed),
        }
    }
}

impl TryFrom<SnapshotDto> for DocumentSnapshot {
    type Error = NexusError;

    fn try_from(dto: SnapshotDto) -> Result<Self> {
        let crdt_state = STANDARD.decode(dto.yjs_state.as_bytes())?;
        let diff_from_previous = match (dto.diff_added, dto.diff_removed) {
            (None, None) => None,
            (added, removed) => Some(DiffStats {
                added: added.unwrap_or(0),
                removed: removed.unwrap_or(0),
            }),
        };
        Ok(Self {
            id: dto.id,
            document_id: dto.document_id,
            crdt_state,
            plain_text: dto.plain_text,
            timestamp: dto.timestamp,
            trigger: dto.trigger,
            summary: dto.summary,
            word_count: dto.word_count,
            diff_from_previous,
        })
    }
}

/// Remote snapshot API.
pub trait SnapshotApi: Send + Sync {
    /// Upload a batch of snapshots (`POST /snapshots/sync`).
    fn push_snapshots(&self, snapshots: Vec<SnapshotDto>) -> BoxFuture<'_, Result<()>>;

    /// All server snapshots of a document (`GET /snapshots/:documentId`).
    fn fetch_snapshots<'a>(&'a self, document_id: &'a str)
    -> BoxFuture<'a, Result<Vec<SnapshotDto>>>;

    /// Timestamp of the newest server snapshot, `None` when there is none
    /// (`GET /snapshots/:documentId/latest-timestamp`).
    fn latest_timestamp<'a>(&'a self, document_id: &'a str) -> BoxFuture<'a, Result<Option<i64>>>;

    /// Delete one snapshot (`DELETE /snapshots/:snapshotId`).
    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Outcome of a push-then-pull round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SnapshotSyncReport {
    pub pushed: usize,
    pub pulled: usize,
}

/// Marks a document as having a snapshot sync in flight.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    document_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        set.remove(&self.document_id);
    }
}

/// Reconciles the local snapshot timeline with the snapshot API.
pub struct SnapshotSync {
    snapshots: SnapshotStore,
    api: Arc<dyn SnapshotApi>,
    in_flight: Mutex<HashSet<String>>,
}

impl SnapshotSync {
    pub fn new(snapshots: SnapshotStore, api: Arc<dyn SnapshotApi>) -> Self {
        Self {
            snapshots,
            api,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn try_begin(&self, document_id: &str) -> Option<InFlight<'_>> {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !set.insert(document_id.to_string()) {
            return None;
        }
        Some(InFlight {
            set: &self.in_flight,
            document_id: document_id.to_string(),
        })
    }

    /// Upload local snapshots newer than the server's latest one.
    ///
    /// Returns the number of uploaded snapshots. A push for a document that
    /// already has one in flight is skipped and returns 0.
    pub async fn push_to_server(&self, document_id: &str) -> Result<usize> {
        let Some(_in_flight) = self.try_begin(document_id) else {
            log::info!("Snapshot sync for {} already in progress, skipping push", document_id);
            return Ok(0);
        };
        self.push(document_id).await
    }

    async fn push(&self, document_id: &str) -> Result<usize> {
        let server_latest = self
            .api
            .latest_timestamp(document_id)
            .await
            .inspect_err(|e| {
                log::error!("Failed to fetch latest snapshot timestamp for {}: {}", document_id, e)
            })?;

        let pending: Vec<SnapshotDto> = self
            .snapshots
            .get_snapshots(document_id)
            .await?
            .iter()
            .filter(|s| server_latest.is_none_or(|latest| s.timestamp > latest))
            .map(SnapshotDto::from)
            .collect();
        if pending.is_empty() {
            log::debug!("No snapshots of {} to push", document_id);
            return Ok(0);
        }

        let count = pending.len();
        self.api
            .push_snapshots(pending)
            .await
            .inspect_err(|e| log::error!("Failed to push snapshots of {}: {}", document_id, e))?;
        log::info!("Pushed {} snapshots of {}", count, document_id);
        Ok(count)
    }

    /// Import server snapshots not known locally.
    ///
    /// Returns the number of imported snapshots.
    pub async fn pull_from_server(&self, document_id: &str) -> Result<usize> {
        let remote = self
            .api
            .fetch_snapshots(document_id)
            .await
            .inspect_err(|e| log::error!("Failed to fetch snapshots of {}: {}", document_id, e))?;

        let known: HashSet<String> = self
            .snapshots
            .get_snapshots(document_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();

        let mut incoming = Vec::new();
        for dto in remote {
            if known.contains(&dto.id) {
                continue;
            }
            if dto.document_id != document_id {
                log::warn!(
                    "Ignoring snapshot {} of {} in response for {}",
                    dto.id,
                    dto.document_id,
                    document_id
                );
                continue;
            }
            let id = dto.id.clone();
            match DocumentSnapshot::try_from(dto) {
                Ok(snapshot) => incoming.push(snapshot),
                Err(e) => log::warn!("Skipping undecodable snapshot {}: {}", id, e),
            }
        }
        if incoming.is_empty() {
            return Ok(0);
        }

        let pulled = self.snapshots.import_snapshots(incoming).await?;
        log::info!("Pulled {} snapshots of {}", pulled, document_id);
        Ok(pulled)
    }

    /// Push, then pull.
    pub async fn sync(&self, document_id: &str) -> Result<SnapshotSyncReport> {
        let Some(_in_flight) = self.try_begin(document_id) else {
            log::info!("Snapshot sync for {} already in progress, skipping", document_id);
            return Ok(SnapshotSyncReport::default());
        };
        let pushed = self.push(document_id).await?;
        let pulled = self.pull_from_server(document_id).await?;
        Ok(SnapshotSyncReport { pushed, pulled })
    }

    /// Delete a snapshot on the server. Failures are logged and ignored.
    pub async fn delete_from_server(&self, snapshot_id: &str) -> bool {
        match self.api.delete_snapshot(snapshot_id).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to delete snapshot {} on server: {}", snapshot_id, e);
                false
            }
        }
    }
}

impl std::fmt::Debug for SnapshotSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotSync").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SnapshotPolicy;
    use crate::crdt::{MemoryStorage, NoteDoc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct MockApi {
        server: Mutex<HashMap<String, SnapshotDto>>,
        pushes: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
        gate: Option<Arc<Notify>>,
    }

    impl MockApi {
        fn check(&self) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(NexusError::Network("connection refused".to_string()));
            }
            Ok(())
        }
    }

    impl SnapshotApi for MockApi {
        fn push_snapshots(&self, snapshots: Vec<SnapshotDto>) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                self.check()?;
                self.pushes.fetch_add(1, Ordering::SeqCst);
                let mut server = self.server.lock().unwrap();
                for dto in snapshots {
                    server.insert(dto.id.clone(), dto);
                }
                Ok(())
            })
        }

        fn fetch_snapshots<'a>(
            &'a self,
            document_id: &'a str,
        ) -> BoxFuture<'a, Result<Vec<SnapshotDto>>> {
            Box::pin(async move {
                self.check()?;
                let server = self.server.lock().unwrap();
                Ok(server
                    .values()
                    .filter(|s| s.document_id == document_id)
                    .cloned()
                    .collect())
            })
        }

        fn latest_timestamp<'a>(
            &'a self,
            document_id: &'a str,
        ) -> BoxFuture<'a, Result<Option<i64>>> {
            Box::pin(async move {
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                self.check()?;
                let server = self.server.lock().unwrap();
                Ok(server
                    .values()
                    .filter(|s| s.document_id == document_id)
                    .map(|s| s.timestamp)
                    .max())
            })
        }

        fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                self.check()?;
                self.server.lock().unwrap().remove(snapshot_id);
                Ok(())
            })
        }
    }

    fn setup(api: MockApi) -> (SnapshotSync, SnapshotStore, Arc<MockApi>) {
        let store = SnapshotStore::new(Arc::new(MemoryStorage::new()), SnapshotPolicy::default());
        let api = Arc::new(api);
        let sync = SnapshotSync::new(store.clone(), api.clone() as Arc<dyn SnapshotApi>);
        (sync, store, api)
    }

    async fn snapshot(store: &SnapshotStore, document_id: &str, text: &str) -> DocumentSnapshot {
        let doc = NoteDoc::new();
        doc.set_plain_text(text);
        store
            .create_snapshot(document_id, &doc, SnapshotTrigger::Manual, None)
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_dto_roundtrip_preserves_binary_state() {
        let doc = NoteDoc::new();
        doc.set_plain_text("binary payload");
        let snapshot = DocumentSnapshot {
            id: "s1".to_string(),
            document_id: "a".to_string(),
            crdt_state: doc.encode_state_as_update(),
            plain_text: "binary payload".to_string(),
            timestamp: 1_700_000_000_000,
            trigger: SnapshotTrigger::CollabJoin,
            summary: None,
            word_count: 2,
            diff_from_previous: Some(DiffStats {
                added: 2,
                removed: 0,
            }),
        };

        let json = serde_json::to_value(SnapshotDto::from(&snapshot)).unwrap();
        assert_eq!(json["documentId"], "a");
        assert_eq!(json["trigger"], "collab_join");
        assert_eq!(json["diffAdded"], 2);
        assert!(json["yjsState"].is_string());

        let dto: SnapshotDto = serde_json::from_value(json).unwrap();
        let back = DocumentSnapshot::try_from(dto).unwrap();
        assert_eq!(back, snapshot);
        let restored = NoteDoc::from_state(&back.crdt_state).unwrap();
        assert_eq!(restored.plain_text(), "binary payload");
    }

    #[test]
    fn test_invalid_base64_is_an_error() {
        let dto = SnapshotDto {
            id: "s".to_string(),
            document_id: "a".to_string(),
            yjs_state: "not base64!!".to_string(),
            plain_text: String::new(),
            timestamp: 0,
            trigger: SnapshotTrigger::Auto,
            summary: None,
            word_count: 0,
            diff_added: None,
            diff_removed: None,
        };
        assert!(matches!(
            DocumentSnapshot::try_from(dto),
            Err(NexusError::Base64(_))
        ));
    }

    #[tokio::test]
    async fn test_push_uploads_only_newer_then_pull_finds_nothing() {
        let (sync, store, api) = setup(MockApi::default());
        snapshot(&store, "a", "already on server").await;
        assert_eq!(sync.push_to_server("a").await.unwrap(), 1);

        for text in ["one", "two", "three"] {
            snapshot(&store, "a", text).await;
        }
        assert_eq!(sync.push_to_server("a").await.unwrap(), 3);
        assert_eq!(api.server.lock().unwrap().len(), 4);
        assert_eq!(api.pushes.load(Ordering::SeqCst), 2);

        assert_eq!(sync.pull_from_server("a").await.unwrap(), 0);
        assert_eq!(sync.push_to_server("a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pull_imports_unknown_snapshots() {
        let (sync, store, api) = setup(MockApi::default());

        // Another device's snapshots
        let other = SnapshotStore::new(Arc::new(MemoryStorage::new()), SnapshotPolicy::default());
        let remote = snapshot(&other, "a", "from laptop").await;
        api.server
            .lock()
            .unwrap()
            .insert(remote.id.clone(), SnapshotDto::from(&remote));

        assert_eq!(sync.pull_from_server("a").await.unwrap(), 1);
        let local = store.get_snapshot(&remote.id).await.unwrap().unwrap();
        assert_eq!(local, remote);

        assert_eq!(sync.pull_from_server("a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sync_reports_both_directions() {
        let (sync, store, api) = setup(MockApi::default());
        snapshot(&store, "a", "local").await;

        let other = SnapshotStore::new(Arc::new(MemoryStorage::new()), SnapshotPolicy::default());
        let mut remote = snapshot(&other, "a", "remote").await;
        remote.timestamp -= 60_000;
        api.server
            .lock()
            .unwrap()
            .insert(remote.id.clone(), SnapshotDto::from(&remote));

        let report = sync.sync("a").await.unwrap();
        assert_eq!(report, SnapshotSyncReport { pushed: 1, pulled: 1 });
        assert_eq!(store.get_snapshots("a").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_network_failure_propagates() {
        let (sync, store, api) = setup(MockApi::default());
        snapshot(&store, "a", "text").await;
        api.fail.store(true, Ordering::SeqCst);

        let err = sync.push_to_server("a").await.unwrap_err();
        assert!(err.is_network());
        assert!(sync.pull_from_server("a").await.is_err());

        // The failed push released the in-flight marker
        api.fail.store(false, Ordering::SeqCst);
        assert_eq!(sync.push_to_server("a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_best_effort() {
        let (sync, store, api) = setup(MockApi::default());
        let snap = snapshot(&store, "a", "text").await;
        sync.push_to_server("a").await.unwrap();

        assert!(sync.delete_from_server(&snap.id).await);
        assert!(api.server.lock().unwrap().is_empty());

        api.fail.store(true, Ordering::SeqCst);
        assert!(!sync.delete_from_server("whatever").await);
    }

    #[tokio::test]
    async fn test_concurrent_push_is_skipped() {
        let gate = Arc::new(Notify::new());
        let (sync, store, api) = setup(MockApi {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        snapshot(&store, "a", "text").await;

        let first = sync.push_to_server("a");
        let second = async {
            let skipped = sync.push_to_server("a").await;
            gate.notify_one();
            skipped
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.unwrap(), 1);
        assert_eq!(second.unwrap(), 0);
        assert_eq!(api.pushes.load(Ordering::SeqCst), 1);
    }
}
