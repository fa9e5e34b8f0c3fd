//! Unified NexusNote API.
//!
//! `NexusNote` wires the storage backend, the stores, the sync engine and
//! the snapshot sync together from a [`Config`]. Every service is created
//! explicitly here and handed to its dependents; nothing is global.
//!
//! # Example
//!
//! ```ignore
//! use nexusnote_core::{Config, NexusNote, SnapshotTrigger};
//!
//! let nexus = NexusNote::open(Config::load_from_or_default(path), None)?;
//! let doc = nexus.open_document("note-1").await?;
//! doc.push_paragraph("Hello");
//!
//! nexus
//!     .take_snapshot("note-1", SnapshotTrigger::Manual, Some("first draft".into()))
//!     .await?;
//! ```

use std::sync::Arc;

use crate::config::Config;
use crate::crdt::{DocumentSnapshot, LocalStorage, MemoryStorage, NoteDoc, SnapshotTrigger};
use crate::error::Result;
use crate::store::{DocumentStore, SnapshotComparison, SnapshotStore};
use crate::sync::{CollabConnector, SnapshotApi, SnapshotSync, SnapshotSyncReport, SyncEngine};

/// The main NexusNote instance.
pub struct NexusNote {
    config: Config,
    engine: SyncEngine,
    snapshot_sync: Option<SnapshotSync>,
}

impl NexusNote {
    /// Build every service from `config`.
    ///
    /// Storage is SQLite when `storage.database_path` is set, in-memory
    /// otherwise. The snapshot API client is built from `snapshot_api` when
    /// the `http` feature is enabled.
    pub fn open(config: Config, connector: Option<Arc<dyn CollabConnector>>) -> Result<Self> {
        let storage = open_storage(&config)?;
        let snapshot_api = open_snapshot_api(&config)?;
        Ok(Self::from_parts(config, storage, connector, snapshot_api))
    }

    /// Build from explicit parts.
    pub fn from_parts(
        config: Config,
        storage: Arc<dyn LocalStorage>,
        connector: Option<Arc<dyn CollabConnector>>,
        snapshot_api: Option<Arc<dyn SnapshotApi>>,
    ) -> Self {
        let documents = DocumentStore::new(Arc::clone(&storage));
        let snapshots = SnapshotStore::new(storage, config.snapshots.clone());
        let snapshot_sync = snapshot_api.map(|api| SnapshotSync::new(snapshots.clone(), api));
        let engine = SyncEngine::new(documents, snapshots, config.collab.clone(), connector);
        Self {
            config,
            engine,
            snapshot_sync,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn documents(&self) -> &DocumentStore {
        self.engine.documents()
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        self.engine.snapshots()
    }

    /// Snapshot sync, when a snapshot API is configured.
    pub fn snapshot_sync(&self) -> Option<&SnapshotSync> {
        self.snapshot_sync.as_ref()
    }

    // ==================== Documents ====================

    /// Open a document for editing (see [`SyncEngine::connect`]).
    pub async fn open_document(&self, document_id: &str) -> Result<Arc<NoteDoc>> {
        self.engine.connect(document_id).await
    }

    /// Close the live document and delete it with its snapshots.
    pub async fn purge_document(&self, document_id: &str) -> Result<bool> {
        self.engine.close(document_id).await;
        self.documents().purge_document(document_id).await
    }

    /// The live document if open, otherwise a detached copy of the stored one.
    async fn current_doc(&self, document_id: &str) -> Result<Option<Arc<NoteDoc>>> {
        if let Some(live) = self.engine.live_document(document_id) {
            return Ok(Some(live));
        }
        match self.documents().get_document(document_id).await? {
            Some(record) => Ok(Some(Arc::new(NoteDoc::from_state(&record.crdt_state)?))),
            None => Ok(None),
        }
    }

    // ==================== Snapshots ====================

    /// Snapshot the current content of a document.
    ///
    /// Returns `None` when the document is unknown or an `auto` snapshot
    /// was below the change threshold.
    pub async fn take_snapshot(
        &self,
        document_id: &str,
        trigger: SnapshotTrigger,
        summary: Option<String>,
    ) -> Result<Option<DocumentSnapshot>> {
        let Some(doc) = self.current_doc(document_id).await? else {
            return Ok(None);
        };
        self.snapshots()
            .create_snapshot(document_id, &doc, trigger, summary)
            .await
    }

    /// Restore a snapshot into its (opened) live document.
    ///
    /// Returns the pre-restore backup, or `None` if the snapshot is unknown.
    pub async fn restore_snapshot(&self, snapshot_id: &str) -> Result<Option<DocumentSnapshot>> {
        let Some(target) = self.snapshots().get_snapshot(snapshot_id).await? else {
            return Ok(None);
        };
        let live = self.engine.connect(&target.document_id).await?;
        let backup = self.snapshots().restore_snapshot(snapshot_id, &live).await?;
        self.engine.flush(&target.document_id).await?;
        Ok(backup)
    }

    pub async fn compare_with_current(
        &self,
        snapshot_id: &str,
    ) -> Result<Option<SnapshotComparison>> {
        let Some(target) = self.snapshots().get_snapshot(snapshot_id).await? else {
            return Ok(None);
        };
        let Some(doc) = self.current_doc(&target.document_id).await? else {
            return Ok(None);
        };
        self.snapshots().compare_with_current(snapshot_id, &doc).await
    }

    /// Delete a snapshot locally, then on the server (best effort).
    pub async fn delete_snapshot(&self, snapshot_id: &str) -> Result<bool> {
        let deleted = self.snapshots().delete_snapshot(snapshot_id).await?;
        if let Some(sync) = &self.snapshot_sync {
            sync.delete_from_server(snapshot_id).await;
        }
        Ok(deleted)
    }

    /// Push then pull snapshots of a document. `None` without a snapshot API.
    pub async fn sync_snapshots(&self, document_id: &str) -> Result<Option<SnapshotSyncReport>> {
        match &self.snapshot_sync {
            Some(sync) => Ok(Some(sync.sync(document_id).await?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for NexusNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NexusNote")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

fn open_storage(config: &Config) -> Result<Arc<dyn LocalStorage>> {
    let Some(path) = &config.storage.database_path else {
        log::debug!("No database path configured, using in-memory storage");
        return Ok(Arc::new(MemoryStorage::new()));
    };

    #[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
    {
        log::info!("Opening local database at {}", path.display());
        Ok(Arc::new(crate::crdt::SqliteStorage::open(path)?))
    }

    #[cfg(not(all(not(target_arch = "wasm32"), feature = "sqlite")))]
    {
        Err(crate::error::NexusError::Storage(format!(
            "Cannot open {}: SQLite support is not enabled",
            path.display()
        )))
    }
}

fn open_snapshot_api(config: &Config) -> Result<Option<Arc<dyn SnapshotApi>>> {
    let Some(api_config) = &config.snapshot_api else {
        return Ok(None);
    };

    #[cfg(feature = "http")]
    {
        let api = crate::sync::HttpSnapshotApi::new(api_config.clone())?;
        Ok(Some(Arc::new(api)))
    }

    #[cfg(not(feature = "http"))]
    {
        log::warn!(
            "Snapshot API at {} configured but the http feature is disabled",
            api_config.base_url
        );
        Ok(None)
    }
}
