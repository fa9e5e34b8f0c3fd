//! Storage abstraction for local persistence.
//!
//! This module defines the [`LocalStorage`] trait which abstracts over the
//! storage backends (SQLite, in-memory) holding note documents and their
//! snapshot timeline.

use super::types::{DocumentSnapshot, LocalDocument};
use crate::error::NexusError;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, NexusError>;

/// Trait for local storage backends.
///
/// # Storage Model
///
/// The storage holds two collections:
/// 1. **Documents**: one [`LocalDocument`] record per note, keyed by id
/// 2. **Snapshots**: [`DocumentSnapshot`] records keyed by id, with a
///    secondary index on `document_id`
///
/// Backends are plain record stores. Ordering of writes to the same
/// document is the caller's concern (see [`DocLocks`](crate::DocLocks)).
pub trait LocalStorage: Send + Sync {
    /// Load a document record.
    ///
    /// Returns `None` if the document doesn't exist.
    fn get_document(&self, id: &str) -> StorageResult<Option<LocalDocument>>;

    /// Insert or overwrite a document record.
    fn put_document(&self, doc: &LocalDocument) -> StorageResult<()>;

    /// Hard-delete a document record. Missing ids are not an error.
    fn delete_document(&self, id: &str) -> StorageResult<()>;

    /// List all document records, including soft-deleted ones.
    fn list_documents(&self) -> StorageResult<Vec<LocalDocument>>;

    /// Load a snapshot record.
    fn get_snapshot(&self, id: &str) -> StorageResult<Option<DocumentSnapshot>>;

    /// Insert or overwrite a snapshot record.
    fn put_snapshot(&self, snapshot: &DocumentSnapshot) -> StorageResult<()>;

    /// Delete a snapshot record. Missing ids are not an error.
    fn delete_snapshot(&self, id: &str) -> StorageResult<()>;

    /// All snapshots of a document, in unspecified order.
    fn snapshots_for_document(&self, document_id: &str) -> StorageResult<Vec<DocumentSnapshot>>;

    /// Delete every snapshot of a document.
    ///
    /// Returns the number of deleted snapshots.
    fn delete_snapshots_for_document(&self, document_id: &str) -> StorageResult<usize> {
        let snapshots = self.snapshots_for_document(document_id)?;
        for snapshot in &snapshots {
            self.delete_snapshot(&snapshot.id)?;
        }
        Ok(snapshots.len())
    }

    /// Delete several snapshots at once.
    fn delete_snapshots(&self, ids: &[String]) -> StorageResult<()> {
        // Default implementation: delete one by one (not atomic)
        // Storage backends should override this with proper transaction support
        for id in ids {
            self.delete_snapshot(id)?;
        }
        Ok(())
    }

    /// Remove a document together with its snapshots.
    fn purge_document(&self, id: &str) -> StorageResult<()> {
        self.delete_snapshots_for_document(id)?;
        self.delete_document(id)
    }
}
