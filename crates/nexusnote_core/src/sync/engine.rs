//! Sync engine for live documents.
//!
//! The `SyncEngine` owns the live [`NoteDoc`] of every open document and
//! coordinates it with local persistence and the collaboration server:
//!
//! - **Local first**: `connect` hydrates from the local store (or creates the
//!   document) before any network activity, so documents open offline.
//! - **Write-behind**: every committed update is persisted by a per-document
//!   writer task. `local` updates mark the record dirty, `remote` updates are
//!   persisted without touching the dirty flag, `storage` updates are ignored.
//! - **Opportunistic sync**: when online, a connection is opened through the
//!   [`CollabConnector`]. A `synced` event marks the document synced. There is
//!   no retry or polling; reconnection happens on [`SyncEngine::set_online`]
//!   or an explicit call.
//!
//! # Connection state
//!
//! ```text
//! disconnected ──connect()──▶ connecting ──Connected──▶ connected
//!       ▲                                                   │
//!       └──────────── Disconnected / AuthenticationFailed ◀─┘
//! ```
//!
//! `offline` is a global override: while offline no connection is opened.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use ts_rs::TS;

use crate::config::CollabConfig;
use crate::crdt::{NoteDoc, SnapshotTrigger, UpdateOrigin};
use crate::doc_lock::DocLocks;
use crate::error::{NexusError, Result};
use crate::store::{DEFAULT_TITLE, DocumentStore, SnapshotStore};

// ==================== Connection seam ====================

/// Lifecycle events reported by a collaboration connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Transport established
    Connected,
    /// Transport lost or closed
    Disconnected,
    /// Initial state exchange with the server completed
    Synced,
    /// Server rejected the token
    AuthenticationFailed,
}

/// Callback through which a connection reports its events.
pub type ConnectionCallback = Arc<dyn Fn(ConnectionEvent) + Send + Sync>;

/// Everything a connector needs to attach a document to the server.
#[derive(Clone)]
pub struct ConnectionParams {
    /// Collaboration server URL
    pub url: String,
    /// Room name on the server (the document ID)
    pub document_name: String,
    /// Live document the connection reads from and applies updates to
    pub doc: Arc<NoteDoc>,
    /// Token handed over on construction
    pub auth_token: Option<String>,
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("url", &self.url)
            .field("document_name", &self.document_name)
            .finish_non_exhaustive()
    }
}

/// An open collaboration connection for one document.
///
/// Implementations apply server updates to the document with
/// [`UpdateOrigin::Remote`] and must not send updates carrying that origin
/// back to the server.
pub trait CollabConnection: Send + Sync {
    /// Close the transport.
    fn disconnect(&self);

    /// Release every resource held by the connection.
    fn destroy(&self);
}

/// Factory for collaboration connections.
pub trait CollabConnector: Send + Sync {
    /// Start connecting. Must return without waiting for the transport;
    /// progress is reported through `on_event`.
    fn open(
        &self,
        params: ConnectionParams,
        on_event: ConnectionCallback,
    ) -> Result<Box<dyn CollabConnection>>;
}

// ==================== State ====================

/// Per-document connection state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Global network status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum NetworkStatus {
    Online,
    Offline,
}

/// Snapshot of the engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct EngineStatus {
    pub network: NetworkStatus,
    /// Connection state of every live document
    pub documents: HashMap<String, ConnectionState>,
}

enum WriterMsg {
    Update(UpdateOrigin),
    Flush(oneshot::Sender<()>),
    /// Persist what is queued, then exit
    Stop,
}

struct ConnectionSlot {
    state: ConnectionState,
    connection: Option<Box<dyn CollabConnection>>,
    /// Bumped for every opened connection; events of older ones are ignored
    generation: u64,
}

struct Session {
    doc: Arc<NoteDoc>,
    runtime: Handle,
    slot: Mutex<ConnectionSlot>,
    subscription: Mutex<Option<yrs::Subscription>>,
    writer_tx: Mutex<Option<mpsc::UnboundedSender<WriterMsg>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    fn state(&self) -> ConnectionState {
        lock(&self.slot).state
    }

    /// Stop observing the document and tell the writer to finish.
    ///
    /// Returns the writer task so the caller can wait for pending writes.
    fn shut_down(&self) -> Option<JoinHandle<()>> {
        lock(&self.subscription).take();
        if let Some(tx) = lock(&self.writer_tx).take() {
            let _ = tx.send(WriterMsg::Stop);
        }
        lock(&self.writer).take()
    }
}

struct Inner {
    documents: DocumentStore,
    snapshots: SnapshotStore,
    collab: CollabConfig,
    connector: Option<Arc<dyn CollabConnector>>,
    online: AtomicBool,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    /// Serializes connect/force_full_sync/close per document
    lifecycle: DocLocks,
}

/// Coordinates live documents with local persistence and the server.
///
/// Cloning is cheap and shares the engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    /// Create an engine. Without a connector the engine works local-only.
    pub fn new(
        documents: DocumentStore,
        snapshots: SnapshotStore,
        collab: CollabConfig,
        connector: Option<Arc<dyn CollabConnector>>,
    ) -> Self {
        let online = collab.start_online;
        Self {
            inner: Arc::new(Inner {
                documents,
                snapshots,
                collab,
                connector,
                online: AtomicBool::new(online),
                sessions: RwLock::new(HashMap::new()),
                lifecycle: DocLocks::new(),
            }),
        }
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.inner.documents
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.inner.snapshots
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    fn session(&self, document_id: &str) -> Option<Arc<Session>> {
        let sessions = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        sessions.get(document_id).cloned()
    }

    fn all_sessions(&self) -> Vec<(String, Arc<Session>)> {
        let sessions = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        sessions
            .iter()
            .map(|(id, s)| (id.clone(), Arc::clone(s)))
            .collect()
    }

    // ==================== Lifecycle ====================

    /// Open a document: load it locally (creating it if absent), start
    /// persisting its updates and, when online, start connecting.
    ///
    /// Returns as soon as the document is usable locally; the connection
    /// progresses in the background. Calling it for an open document
    /// returns the existing live document.
    ///
    /// Opening a document spawns its writer task, so it must be awaited
    /// inside a tokio runtime; otherwise [`NexusError::Runtime`] is returned
    /// and nothing is created.
    pub async fn connect(&self, document_id: &str) -> Result<Arc<NoteDoc>> {
        let _guard = self.inner.lifecycle.lock(document_id).await;

        if let Some(session) = self.session(document_id) {
            if self.is_online() && session.state() == ConnectionState::Disconnected {
                self.open_connection(document_id, &session);
            }
            return Ok(Arc::clone(&session.doc));
        }

        let runtime = Handle::try_current().map_err(|e| {
            NexusError::Runtime(format!("Cannot open {} outside a tokio runtime: {}", document_id, e))
        })?;

        let doc = Arc::new(NoteDoc::new());
        if !self.inner.documents.load_into(document_id, &doc).await? {
            self.inner
                .documents
                .create_document(document_id, DEFAULT_TITLE)
                .await?;
            log::info!("Created local document {}", document_id);
        }

        let session = self.start_session(document_id, Arc::clone(&doc), runtime)?;
        {
            let mut sessions = self
                .inner
                .sessions
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            sessions.insert(document_id.to_string(), Arc::clone(&session));
        }

        if self.is_online() {
            self.open_connection(document_id, &session);
        } else {
            log::debug!("Offline, opened {} locally only", document_id);
        }
        Ok(doc)
    }

    fn start_session(
        &self,
        document_id: &str,
        doc: Arc<NoteDoc>,
        runtime: Handle,
    ) -> Result<Arc<Session>> {
        let (tx, rx) = mpsc::unbounded_channel();

        let observer_tx = tx.clone();
        let subscription = doc.observe_updates(move |_update, origin| {
            if origin != UpdateOrigin::Storage {
                // The receiver only goes away once the session is shut down
                let _ = observer_tx.send(WriterMsg::Update(origin));
            }
        })?;

        let writer = DocumentWriter {
            document_id: document_id.to_string(),
            doc: Arc::clone(&doc),
            documents: self.inner.documents.clone(),
            snapshots: self.inner.snapshots.clone(),
            edits_since_snapshot: 0,
        };
        let handle = runtime.spawn(writer.run(rx));

        Ok(Arc::new(Session {
            doc,
            runtime,
            slot: Mutex::new(ConnectionSlot {
                state: ConnectionState::Disconnected,
                connection: None,
                generation: 0,
            }),
            subscription: Mutex::new(Some(subscription)),
            writer_tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(handle)),
        }))
    }

    /// Open a connection for a session that has none (or a dead one).
    ///
    /// Failures are logged; the document stays usable locally.
    fn open_connection(&self, document_id: &str, session: &Arc<Session>) {
        let Some(connector) = self.inner.connector.clone() else {
            log::debug!("No collaboration connector configured, {} stays local", document_id);
            return;
        };
        let Some(url) = self.inner.collab.url.clone() else {
            log::debug!("No collaboration URL configured, {} stays local", document_id);
            return;
        };

        let (generation, stale) = {
            let mut slot = lock(&session.slot);
            if slot.state != ConnectionState::Disconnected {
                return;
            }
            slot.generation += 1;
            slot.state = ConnectionState::Connecting;
            (slot.generation, slot.connection.take())
        };
        if let Some(stale) = stale {
            stale.destroy();
        }

        let params = ConnectionParams {
            url,
            document_name: document_id.to_string(),
            doc: Arc::clone(&session.doc),
            auth_token: self.inner.collab.auth_token.clone(),
        };
        let callback = self.event_callback(document_id, generation);

        log::info!("Connecting {} to {}", document_id, params.url);
        match connector.open(params, callback) {
            Ok(connection) => {
                let mut slot = lock(&session.slot);
                if slot.generation == generation {
                    slot.connection = Some(connection);
                } else {
                    drop(slot);
                    connection.destroy();
                }
            }
            Err(e) => {
                let mut slot = lock(&session.slot);
                if slot.generation == generation {
                    slot.state = ConnectionState::Disconnected;
                }
                log::warn!("Failed to open connection for {}: {}", document_id, e);
            }
        }
    }

    fn event_callback(&self, document_id: &str, generation: u64) -> ConnectionCallback {
        let engine = Arc::downgrade(&self.inner);
        let document_id = document_id.to_string();
        Arc::new(move |event| {
            if let Some(inner) = engine.upgrade() {
                handle_event(&inner, &document_id, generation, event);
            }
        })
    }

    /// Tear down the remote connection of a document. The live document
    /// stays open and keeps being persisted.
    pub fn disconnect(&self, document_id: &str) {
        if let Some(session) = self.session(document_id) {
            disconnect_session(document_id, &session);
        }
    }

    /// Connect one document, or every dirty document when `document_id` is
    /// `None`. Does nothing while offline.
    pub async fn sync_now(&self, document_id: Option<&str>) -> Result<()> {
        if !self.is_online() {
            log::debug!("Offline, skipping sync");
            return Ok(());
        }

        match document_id {
            Some(id) => {
                self.connect(id).await?;
            }
            None => {
                let dirty = self.inner.documents.dirty_documents().await?;
                log::debug!("Syncing {} dirty documents", dirty.len());
                for doc in dirty {
                    if let Err(e) = self.connect(&doc.id).await {
                        log::warn!("Failed to sync {}: {}", doc.id, e);
                    }
                }
            }
        }
        Ok(())
    }

    /// Switch between online and offline.
    ///
    /// Going online reconnects every live document without a connection and
    /// then syncs dirty documents. Going offline disconnects everything.
    pub async fn set_online(&self, online: bool) -> Result<()> {
        let was_online = self.inner.online.swap(online, Ordering::SeqCst);
        if was_online != online {
            log::info!("Network is now {}", if online { "online" } else { "offline" });
        }

        if online {
            for (id, session) in self.all_sessions() {
                self.open_connection(&id, &session);
            }
            self.sync_now(None).await
        } else {
            for (id, session) in self.all_sessions() {
                disconnect_session(&id, &session);
            }
            Ok(())
        }
    }

    /// Rebuild a document from its persisted state and reconnect.
    ///
    /// The current connection is closed and the live document is dropped.
    /// Updates already committed to it are persisted first; edits made
    /// through the old handle after this call are lost, so callers must
    /// switch to the returned document.
    pub async fn force_full_sync(&self, document_id: &str) -> Result<Arc<NoteDoc>> {
        {
            let _guard = self.inner.lifecycle.lock(document_id).await;
            self.remove_session(document_id).await;
        }
        log::info!("Rehydrating {} from local storage", document_id);
        self.connect(document_id).await
    }

    /// Disconnect a document and drop its live state.
    pub async fn close(&self, document_id: &str) -> bool {
        let _guard = self.inner.lifecycle.lock(document_id).await;
        self.remove_session(document_id).await
    }

    async fn remove_session(&self, document_id: &str) -> bool {
        let session = {
            let mut sessions = self
                .inner
                .sessions
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            sessions.remove(document_id)
        };
        let Some(session) = session else {
            return false;
        };

        disconnect_session(document_id, &session);
        if let Some(writer) = session.shut_down()
            && let Err(e) = writer.await
        {
            log::error!("Writer task for {} failed: {}", document_id, e);
        }
        true
    }

    /// Wait until every update committed so far has been persisted.
    pub async fn flush(&self, document_id: &str) -> Result<()> {
        let Some(session) = self.session(document_id) else {
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        let sent = lock(&session.writer_tx)
            .as_ref()
            .is_some_and(|writer| writer.send(WriterMsg::Flush(tx)).is_ok());
        if sent {
            rx.await.map_err(|_| {
                NexusError::Storage(format!("Writer for {} stopped before flushing", document_id))
            })?;
        }
        Ok(())
    }

    // ==================== Queries ====================

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            network: if self.is_online() {
                NetworkStatus::Online
            } else {
                NetworkStatus::Offline
            },
            documents: self
                .all_sessions()
                .into_iter()
                .map(|(id, session)| (id, session.state()))
                .collect(),
        }
    }

    pub fn connection_state(&self, document_id: &str) -> ConnectionState {
        self.session(document_id)
            .map(|s| s.state())
            .unwrap_or_default()
    }

    /// The live document, if open.
    pub fn live_document(&self, document_id: &str) -> Option<Arc<NoteDoc>> {
        self.session(document_id).map(|s| Arc::clone(&s.doc))
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("online", &self.is_online())
            .finish_non_exhaustive()
    }
}

fn disconnect_session(document_id: &str, session: &Session) {
    let connection = {
        let mut slot = lock(&session.slot);
        slot.generation += 1;
        slot.state = ConnectionState::Disconnected;
        slot.connection.take()
    };
    if let Some(connection) = connection {
        log::info!("Disconnecting {}", document_id);
        connection.disconnect();
        connection.destroy();
    }
}

fn handle_event(inner: &Arc<Inner>, document_id: &str, generation: u64, event: ConnectionEvent) {
    let session = {
        let sessions = inner.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(document_id).cloned()
    };
    let Some(session) = session else {
        return;
    };

    {
        let mut slot = lock(&session.slot);
        if slot.generation != generation {
            return;
        }
        slot.state = match event {
            ConnectionEvent::Connected | ConnectionEvent::Synced => ConnectionState::Connected,
            ConnectionEvent::Disconnected | ConnectionEvent::AuthenticationFailed => {
                ConnectionState::Disconnected
            }
        };
    }

    match event {
        ConnectionEvent::Connected => log::info!("Connected {}", document_id),
        ConnectionEvent::Disconnected => log::info!("Connection for {} closed", document_id),
        ConnectionEvent::AuthenticationFailed => {
            log::warn!("Authentication failed for {}, treating as disconnected", document_id)
        }
        ConnectionEvent::Synced => {
            let documents = inner.documents.clone();
            let document_id = document_id.to_string();
            session.runtime.spawn(async move {
                match documents.mark_synced(&document_id).await {
                    Ok(true) => log::debug!("{} synced with server", document_id),
                    Ok(false) => log::warn!("Synced document {} is not stored locally", document_id),
                    Err(e) => log::error!("Failed to mark {} as synced: {}", document_id, e),
                }
            });
        }
    }
}

// ==================== Writer task ====================

#[derive(Default)]
struct Pending {
    local: u32,
    remote: bool,
    flushes: Vec<oneshot::Sender<()>>,
    stop: bool,
}

impl Pending {
    fn push(&mut self, msg: WriterMsg) {
        match msg {
            WriterMsg::Update(UpdateOrigin::Local) => self.local += 1,
            WriterMsg::Update(UpdateOrigin::Remote) => self.remote = true,
            WriterMsg::Update(UpdateOrigin::Storage) => {}
            WriterMsg::Flush(tx) => self.flushes.push(tx),
            WriterMsg::Stop => self.stop = true,
        }
    }
}

/// Persists the updates of one live document, in commit order.
struct DocumentWriter {
    document_id: String,
    doc: Arc<NoteDoc>,
    documents: DocumentStore,
    snapshots: SnapshotStore,
    edits_since_snapshot: u32,
}

impl DocumentWriter {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<WriterMsg>) {
        while let Some(msg) = rx.recv().await {
            let mut pending = Pending::default();
            pending.push(msg);
            // Updates queued meanwhile are covered by a single save
            while let Ok(msg) = rx.try_recv() {
                pending.push(msg);
            }

            if let Err(e) = self.persist(pending.local, pending.remote).await {
                log::error!("Failed to persist {}: {}", self.document_id, e);
            }
            for flush in pending.flushes {
                let _ = flush.send(());
            }
            if pending.stop {
                break;
            }
        }
        log::debug!("Writer for {} stopped", self.document_id);
    }

    async fn persist(&mut self, local: u32, remote: bool) -> Result<()> {
        if local > 0 {
            self.documents
                .save_from_doc(&self.document_id, &self.doc, None)
                .await?;
            self.edits_since_snapshot = self.edits_since_snapshot.saturating_add(local);
            self.maybe_auto_snapshot().await?;
        } else if remote {
            self.documents
                .persist_remote_state(&self.document_id, &self.doc)
                .await?;
        }
        Ok(())
    }

    async fn maybe_auto_snapshot(&mut self) -> Result<()> {
        let edit_limit = self.snapshots.policy().auto_snapshot_edits;
        let by_edits = edit_limit > 0 && self.edits_since_snapshot >= edit_limit;
        if !by_edits && !self.snapshots.should_auto_snapshot(&self.document_id).await? {
            return Ok(());
        }

        if self
            .snapshots
            .create_snapshot(&self.document_id, &self.doc, SnapshotTrigger::Auto, None)
            .await?
            .is_some()
        {
            self.edits_since_snapshot = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SnapshotPolicy;
    use crate::crdt::MemoryStorage;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct MockConnector {
        opened: AtomicUsize,
        callbacks: Mutex<Vec<(String, ConnectionCallback)>>,
        closed: Arc<AtomicUsize>,
        fail: AtomicBool,
    }

    struct MockConnection {
        closed: Arc<AtomicUsize>,
    }

    impl CollabConnection for MockConnection {
        fn disconnect(&self) {}

        fn destroy(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CollabConnector for MockConnector {
        fn open(
            &self,
            params: ConnectionParams,
            on_event: ConnectionCallback,
        ) -> Result<Box<dyn CollabConnection>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(NexusError::Connection {
                    document_id: params.document_name,
                    message: "unreachable".to_string(),
                });
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.callbacks
                .lock()
                .unwrap()
                .push((params.document_name, on_event));
            Ok(Box::new(MockConnection {
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    impl MockConnector {
        fn emit(&self, document_id: &str, event: ConnectionEvent) {
            let callbacks = self.callbacks.lock().unwrap();
            let (_, callback) = callbacks
                .iter()
                .rev()
                .find(|(id, _)| id == document_id)
                .unwrap();
            callback(event);
        }
    }

    fn engine_with(online: bool, policy: SnapshotPolicy) -> (SyncEngine, Arc<MockConnector>) {
        let storage = Arc::new(MemoryStorage::new());
        let connector = Arc::new(MockConnector::default());
        let collab = CollabConfig {
            url: Some("ws://collab.test".to_string()),
            auth_token: Some("token".to_string()),
            start_online: online,
        };
        let engine = SyncEngine::new(
            DocumentStore::new(storage.clone()),
            SnapshotStore::new(storage, policy),
            collab,
            Some(connector.clone() as Arc<dyn CollabConnector>),
        );
        (engine, connector)
    }

    fn engine(online: bool) -> (SyncEngine, Arc<MockConnector>) {
        engine_with(online, SnapshotPolicy::default())
    }

    #[test]
    fn test_connect_outside_runtime_fails() {
        let (engine, _) = engine(false);
        let err = futures_lite::future::block_on(engine.connect("a")).unwrap_err();
        assert!(matches!(err, NexusError::Runtime(_)));
        assert!(engine.live_document("a").is_none());
        let stored = futures_lite::future::block_on(engine.documents().get_document("a")).unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn test_connect_offline_creates_locally() {
        let (engine, connector) = engine(false);
        let doc = engine.connect("a").await.unwrap();
        assert!(doc.is_empty());
        assert_eq!(connector.opened.load(Ordering::SeqCst), 0);
        assert_eq!(engine.connection_state("a"), ConnectionState::Disconnected);

        let record = engine.documents().get_document("a").await.unwrap().unwrap();
        assert_eq!(record.title, DEFAULT_TITLE);
        assert_eq!(engine.status().network, NetworkStatus::Offline);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (engine, connector) = engine(true);
        let first = engine.connect("a").await.unwrap();
        let second = engine.connect("a").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.opened.load(Ordering::SeqCst), 1);
        assert_eq!(engine.connection_state("a"), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn test_local_edits_are_persisted_dirty() {
        let (engine, _) = engine(false);
        let doc = engine.connect("a").await.unwrap();
        engine.documents().mark_synced("a").await.unwrap();

        doc.push_paragraph("typed offline");
        engine.flush("a").await.unwrap();

        let record = engine.documents().get_document("a").await.unwrap().unwrap();
        assert_eq!(record.plain_text, "typed offline");
        assert!(record.is_dirty);
    }

    #[tokio::test]
    async fn test_remote_updates_do_not_mark_dirty() {
        let (engine, _) = engine(false);
        let doc = engine.connect("a").await.unwrap();
        engine.documents().mark_synced("a").await.unwrap();

        let peer = NoteDoc::new();
        peer.push_paragraph("from server");
        doc.apply_update(&peer.encode_state_as_update(), UpdateOrigin::Remote)
            .unwrap();
        engine.flush("a").await.unwrap();

        let record = engine.documents().get_document("a").await.unwrap().unwrap();
        assert_eq!(record.plain_text, "from server");
        assert!(!record.is_dirty);
    }

    #[tokio::test]
    async fn test_connection_events_drive_state() {
        let (engine, connector) = engine(true);
        engine.connect("a").await.unwrap();

        connector.emit("a", ConnectionEvent::Connected);
        assert_eq!(engine.connection_state("a"), ConnectionState::Connected);

        connector.emit("a", ConnectionEvent::Synced);
        // mark_synced runs on the runtime
        for _ in 0..50 {
            let record = engine.documents().get_document("a").await.unwrap().unwrap();
            if !record.is_dirty {
                break;
            }
            tokio::task::yield_now().await;
        }
        let record = engine.documents().get_document("a").await.unwrap().unwrap();
        assert!(!record.is_dirty);
        assert!(record.synced_at.is_some());

        connector.emit("a", ConnectionEvent::AuthenticationFailed);
        assert_eq!(engine.connection_state("a"), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_events_from_stale_connection_are_ignored() {
        let (engine, connector) = engine(true);
        engine.connect("a").await.unwrap();
        let stale = connector.callbacks.lock().unwrap()[0].1.clone();

        engine.disconnect("a");
        engine.connect("a").await.unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), 2);

        stale(ConnectionEvent::Connected);
        assert_eq!(engine.connection_state("a"), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn test_set_online_toggles_connections() {
        let (engine, connector) = engine(false);
        engine.connect("a").await.unwrap();
        engine.connect("b").await.unwrap();

        engine.set_online(true).await.unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), 2);
        assert_eq!(engine.status().network, NetworkStatus::Online);

        engine.set_online(false).await.unwrap();
        assert_eq!(connector.closed.load(Ordering::SeqCst), 2);
        let status = engine.status();
        assert_eq!(status.network, NetworkStatus::Offline);
        assert!(
            status
                .documents
                .values()
                .all(|s| *s == ConnectionState::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_sync_now_connects_dirty_documents() {
        let (engine, connector) = engine(true);
        engine.documents().create_document("dirty", "D").await.unwrap();
        engine.documents().create_document("clean", "C").await.unwrap();
        engine.documents().mark_synced("clean").await.unwrap();

        engine.sync_now(None).await.unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), 1);
        assert!(engine.live_document("dirty").is_some());
        assert!(engine.live_document("clean").is_none());
    }

    #[tokio::test]
    async fn test_sync_now_offline_is_noop() {
        let (engine, connector) = engine(false);
        engine.documents().create_document("dirty", "D").await.unwrap();
        engine.sync_now(None).await.unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), 0);
        assert!(engine.live_document("dirty").is_none());
    }

    #[tokio::test]
    async fn test_open_failure_keeps_document_local() {
        let (engine, connector) = engine(true);
        connector.fail.store(true, Ordering::SeqCst);
        let doc = engine.connect("a").await.unwrap();
        doc.push_paragraph("still works");
        engine.flush("a").await.unwrap();

        assert_eq!(engine.connection_state("a"), ConnectionState::Disconnected);
        let record = engine.documents().get_document("a").await.unwrap().unwrap();
        assert_eq!(record.plain_text, "still works");
    }

    #[tokio::test]
    async fn test_force_full_sync_rehydrates() {
        let (engine, connector) = engine(true);
        let old = engine.connect("a").await.unwrap();
        old.push_paragraph("persisted");

        let fresh = engine.force_full_sync("a").await.unwrap();
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(fresh.plain_text(), "persisted");
        assert_eq!(connector.opened.load(Ordering::SeqCst), 2);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_drops_live_document() {
        let (engine, _) = engine(false);
        engine.connect("a").await.unwrap();
        assert!(engine.close("a").await);
        assert!(engine.live_document("a").is_none());
        assert!(!engine.close("a").await);
    }

    #[tokio::test]
    async fn test_edit_count_triggers_auto_snapshot() {
        let (engine, _) = engine_with(
            false,
            SnapshotPolicy {
                auto_snapshot_edits: 3,
                min_change_threshold: 0,
                ..Default::default()
            },
        );
        let doc = engine.connect("a").await.unwrap();

        // First edit: no snapshot exists yet, so one is due immediately
        doc.push_paragraph("one");
        engine.flush("a").await.unwrap();
        assert_eq!(engine.snapshots().get_snapshots("a").await.unwrap().len(), 1);

        doc.push_paragraph("two");
        engine.flush("a").await.unwrap();
        doc.push_paragraph("three");
        engine.flush("a").await.unwrap();
        assert_eq!(engine.snapshots().get_snapshots("a").await.unwrap().len(), 1);

        doc.push_paragraph("four");
        engine.flush("a").await.unwrap();
        let snapshots = engine.snapshots().get_snapshots("a").await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].trigger, SnapshotTrigger::Auto);
        assert_eq!(snapshots[0].plain_text, "one\ntwo\nthree\nfour");
    }
}
