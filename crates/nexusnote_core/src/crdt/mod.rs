//! CRDT document model and local persistence.
//!
//! - [`NoteDoc`]: a note's rich-text Y.Doc with plain-text projection
//! - [`LocalStorage`]: record store for documents and snapshots
//! - [`MemoryStorage`] / `SqliteStorage`: storage backends

mod memory_storage;
mod note_doc;
#[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
mod sqlite_storage;
mod storage;
mod types;

pub use memory_storage::MemoryStorage;
pub use note_doc::{CONTENT_FRAGMENT_NAME, NoteDoc, PARAGRAPH_TAG};
#[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
pub use sqlite_storage::SqliteStorage;
pub use storage::{LocalStorage, StorageResult};
pub(crate) use types::now_millis;
pub use types::{DiffStats, DocumentSnapshot, LocalDocument, SnapshotTrigger, UpdateOrigin};
