//! Synchronization with the collaboration server and the snapshot API.
//!
//! # Architecture
//!
//! ```text
//!   Collaboration server            Snapshot HTTP API
//!          ↑↓                              ↑↓
//!   CollabConnection              SnapshotApi (HttpSnapshotApi)
//!          ↑↓                              ↑↓
//!      SyncEngine  ──────────────▶   SnapshotSync
//!          ↑↓                              ↑↓
//!   DocumentStore + SnapshotStore (LocalStorage)
//! ```
//!
//! - [`SyncEngine`] - live documents, connection lifecycle, online/offline
//! - [`SnapshotSync`] - push/pull of snapshot records
//! - [`CollabConnector`] / [`CollabConnection`] - transport seam for live sync
//! - [`SnapshotApi`] - transport seam for the snapshot API

use std::future::Future;
use std::pin::Pin;

/// Sync engine for live documents
pub mod engine;
#[cfg(feature = "http")]
mod http_api;
/// Snapshot push/pull protocol
pub mod snapshot_sync;

pub use engine::{
    CollabConnection, CollabConnector, ConnectionCallback, ConnectionEvent, ConnectionParams,
    ConnectionState, EngineStatus, NetworkStatus, SyncEngine,
};
#[cfg(feature = "http")]
pub use http_api::HttpSnapshotApi;
pub use snapshot_sync::{SnapshotApi, SnapshotDto, SnapshotSync, SnapshotSyncReport};

/// Boxed future returned by the transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
