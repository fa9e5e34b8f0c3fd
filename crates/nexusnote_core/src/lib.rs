#![doc = include_str!("../README.md")]

/// Configuration options
pub mod config;

/// CRDT documents, records and storage backends
pub mod crdt;

/// Line diffs and word statistics
pub mod diff;

/// Per-document async locks
pub mod doc_lock;

/// Error (common error types)
pub mod error;

/// Unified entry point wiring every service together
pub mod nexus;

/// Document and snapshot stores
pub mod store;

/// Live sync engine and snapshot sync
pub mod sync;

pub use config::Config;
pub use crdt::{DocumentSnapshot, LocalDocument, LocalStorage, MemoryStorage, NoteDoc, SnapshotTrigger};
pub use doc_lock::DocLocks;
pub use error::{NexusError, Result};
pub use nexus::NexusNote;
pub use store::{DocumentStore, SnapshotStore};
pub use sync::{SnapshotSync, SyncEngine};
