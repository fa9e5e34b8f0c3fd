//! In-memory storage implementation.
//!
//! This provides a simple in-memory implementation of [`LocalStorage`]
//! for use in unit tests, development and ephemeral sessions.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use super::storage::{LocalStorage, StorageResult};
use super::types::{DocumentSnapshot, LocalDocument};

/// In-memory storage.
///
/// Records live in `HashMap`s guarded by `RwLock`s; data is lost when dropped.
/// Cloning shares the underlying maps.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    /// Documents (id -> record)
    documents: Arc<RwLock<HashMap<String, LocalDocument>>>,

    /// Snapshots (id -> record)
    snapshots: Arc<RwLock<HashMap<String, DocumentSnapshot>>>,

    /// Secondary index (document id -> snapshot ids)
    by_document: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl MemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn get_document(&self, id: &str) -> StorageResult<Option<LocalDocument>> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        Ok(documents.get(id).cloned())
    }

    fn put_document(&self, doc: &LocalDocument) -> StorageResult<()> {
        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        documents.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    fn delete_document(&self, id: &str) -> StorageResult<()> {
        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        documents.remove(id);
        Ok(())
    }

    fn list_documents(&self) -> StorageResult<Vec<LocalDocument>> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        Ok(documents.values().cloned().collect())
    }

    fn get_snapshot(&self, id: &str) -> StorageResult<Option<DocumentSnapshot>> {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        Ok(snapshots.get(id).cloned())
    }

    fn put_snapshot(&self, snapshot: &DocumentSnapshot) -> StorageResult<()> {
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        let mut index = self.by_document.write().unwrap_or_else(PoisonError::into_inner);

        // A snapshot id never moves between documents, but keep the index exact
        if let Some(previous) = snapshots.insert(snapshot.id.clone(), snapshot.clone())
            && previous.document_id != snapshot.document_id
            && let Some(ids) = index.get_mut(&previous.document_id)
        {
            ids.remove(&snapshot.id);
        }
        index
            .entry(snapshot.document_id.clone())
            .or_default()
            .insert(snapshot.id.clone());
        Ok(())
    }

    fn delete_snapshot(&self, id: &str) -> StorageResult<()> {
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        let mut index = self.by_document.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(removed) = snapshots.remove(id)
            && let Some(ids) = index.get_mut(&removed.document_id)
        {
            ids.remove(id);
            if ids.is_empty() {
                index.remove(&removed.document_id);
            }
        }
        Ok(())
    }

    fn snapshots_for_document(&self, document_id: &str) -> StorageResult<Vec<DocumentSnapshot>> {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        let index = self.by_document.read().unwrap_or_else(PoisonError::into_inner);

        Ok(index
            .get(document_id)
            .map(|ids| ids.iter().filter_map(|id| snapshots.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    fn delete_snapshots_for_document(&self, document_id: &str) -> StorageResult<usize> {
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        let mut index = self.by_document.write().unwrap_or_else(PoisonError::into_inner);

        let ids = index.remove(document_id).unwrap_or_default();
        for id in &ids {
            snapshots.remove(id);
        }
        Ok(ids.len())
    }
}
