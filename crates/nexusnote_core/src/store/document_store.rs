//! Local-first document persistence.
//!
//! `DocumentStore` keeps one [`LocalDocument`] record per note. The record
//! carries the full CRDT state plus values derived from it (state vector and
//! plain text) and the dirty/sync bookkeeping used by the sync engine.

use std::sync::Arc;

use crate::crdt::{LocalDocument, LocalStorage, NoteDoc, UpdateOrigin, now_millis};
use crate::doc_lock::DocLocks;
use crate::error::Result;

/// Title given to documents created without one.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Store for [`LocalDocument`] records.
///
/// Every mutation is a read-modify-write serialized per document id, and is
/// written through to the storage backend before the call returns.
///
/// # Example
///
/// ```ignore
/// use nexusnote_core::{DocumentStore, MemoryStorage, NoteDoc};
///
/// let store = DocumentStore::new(Arc::new(MemoryStorage::new()));
/// let doc = NoteDoc::new();
/// doc.push_paragraph("Groceries");
/// let record = store.save_from_doc("note-1", &doc, Some("Shopping")).await?;
/// assert!(record.is_dirty);
/// ```
#[derive(Clone)]
pub struct DocumentStore {
    storage: Arc<dyn LocalStorage>,
    locks: DocLocks,
}

/// Values derived from a document's CRDT state.
struct Encoded {
    state: Vec<u8>,
    state_vector: Vec<u8>,
    plain_text: String,
}

impl Encoded {
    fn from_doc(doc: &NoteDoc) -> Self {
        Self {
            state: doc.encode_state_as_update(),
            state_vector: doc.encode_state_vector(),
            plain_text: doc.plain_text(),
        }
    }

    fn write_to(self, record: &mut LocalDocument) {
        record.crdt_state = self.state;
        record.crdt_state_vector = self.state_vector;
        record.plain_text = self.plain_text;
    }
}

impl DocumentStore {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self {
            storage,
            locks: DocLocks::new(),
        }
    }

    /// Create a document record holding an empty CRDT document.
    ///
    /// An existing record with the same id is replaced.
    pub async fn create_document(&self, id: &str, title: &str) -> Result<LocalDocument> {
        let _guard = self.locks.lock(id).await;
        let now = now_millis();
        let mut record = LocalDocument {
            id: id.to_string(),
            title: title.to_string(),
            crdt_state: Vec::new(),
            crdt_state_vector: Vec::new(),
            plain_text: String::new(),
            created_at: now,
            updated_at: now,
            synced_at: None,
            is_dirty: true,
            is_deleted: false,
        };
        Encoded::from_doc(&NoteDoc::new()).write_to(&mut record);
        self.storage.put_document(&record)?;
        log::debug!("Created document {}", id);
        Ok(record)
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<LocalDocument>> {
        self.storage.get_document(id)
    }

    /// List documents, most recently updated first.
    pub async fn list_documents(&self, include_deleted: bool) -> Result<Vec<LocalDocument>> {
        let mut docs: Vec<_> = self
            .storage
            .list_documents()?
            .into_iter()
            .filter(|d| include_deleted || !d.is_deleted)
            .collect();
        docs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(docs)
    }

    /// Hydrate `doc` with the persisted state of `id`.
    ///
    /// The merge is tagged with the storage origin. Returns `false` if the
    /// document is not stored locally.
    pub async fn load_into(&self, id: &str, doc: &NoteDoc) -> Result<bool> {
        let Some(record) = self.storage.get_document(id)? else {
            return Ok(false);
        };
        if !record.crdt_state.is_empty() {
            doc.apply_update(&record.crdt_state, UpdateOrigin::Storage)?;
        }
        Ok(true)
    }

    /// Persist the live state of `doc` as a local edit.
    ///
    /// Marks the record dirty and creates it when missing. `created_at` and
    /// `synced_at` are preserved; `title` is only changed when given.
    pub async fn save_from_doc(
        &self,
        id: &str,
        doc: &NoteDoc,
        title: Option<&str>,
    ) -> Result<LocalDocument> {
        let _guard = self.locks.lock(id).await;
        // Encoded under the lock so a later writer never stores an older state
        let encoded = Encoded::from_doc(doc);
        let now = now_millis();

        let mut record = match self.storage.get_document(id)? {
            Some(existing) => existing,
            None => LocalDocument {
                id: id.to_string(),
                title: DEFAULT_TITLE.to_string(),
                crdt_state: Vec::new(),
                crdt_state_vector: Vec::new(),
                plain_text: String::new(),
                created_at: now,
                updated_at: now,
                synced_at: None,
                is_dirty: true,
                is_deleted: false,
            },
        };
        encoded.write_to(&mut record);
        if let Some(title) = title {
            record.title = title.to_string();
        }
        record.updated_at = now;
        record.is_dirty = true;

        self.storage.put_document(&record)?;
        Ok(record)
    }

    /// Persist the live state of `doc` after a remote update.
    ///
    /// Same as [`save_from_doc`](Self::save_from_doc) except that the
    /// dirty flag and `synced_at` are left as they are.
    pub async fn persist_remote_state(&self, id: &str, doc: &NoteDoc) -> Result<LocalDocument> {
        let _guard = self.locks.lock(id).await;
        let encoded = Encoded::from_doc(doc);
        let now = now_millis();

        let mut record = match self.storage.get_document(id)? {
            Some(existing) => existing,
            None => LocalDocument {
                id: id.to_string(),
                title: DEFAULT_TITLE.to_string(),
                crdt_state: Vec::new(),
                crdt_state_vector: Vec::new(),
                plain_text: String::new(),
                created_at: now,
                updated_at: now,
                synced_at: None,
                is_dirty: false,
                is_deleted: false,
            },
        };
        encoded.write_to(&mut record);
        record.updated_at = now;

        self.storage.put_document(&record)?;
        Ok(record)
    }

    /// Merge an out-of-band update into the stored state.
    ///
    /// Returns `None` if the document is not stored locally.
    pub async fn apply_update(&self, id: &str, update: &[u8]) -> Result<Option<LocalDocument>> {
        let _guard = self.locks.lock(id).await;
        let Some(mut record) = self.storage.get_document(id)? else {
            return Ok(None);
        };

        let doc = NoteDoc::from_state(&record.crdt_state)?;
        doc.apply_update(update, UpdateOrigin::Remote)?;
        Encoded::from_doc(&doc).write_to(&mut record);
        record.updated_at = now_millis();

        self.storage.put_document(&record)?;
        Ok(Some(record))
    }

    /// Minimal update bringing a peer with `remote_state_vector` up to date.
    pub async fn get_diff_update(
        &self,
        id: &str,
        remote_state_vector: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        let Some(record) = self.storage.get_document(id)? else {
            return Ok(None);
        };
        let doc = NoteDoc::from_state(&record.crdt_state)?;
        Ok(Some(doc.encode_diff(remote_state_vector)?))
    }

    /// Record a confirmed round trip with the server.
    pub async fn mark_synced(&self, id: &str) -> Result<bool> {
        let _guard = self.locks.lock(id).await;
        let Some(mut record) = self.storage.get_document(id)? else {
            return Ok(false);
        };
        record.synced_at = Some(now_millis());
        record.is_dirty = false;
        self.storage.put_document(&record)?;
        log::debug!("Marked document {} as synced", id);
        Ok(true)
    }

    /// Soft-delete a document.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let _guard = self.locks.lock(id).await;
        let Some(mut record) = self.storage.get_document(id)? else {
            return Ok(false);
        };
        record.is_deleted = true;
        record.updated_at = now_millis();
        self.storage.put_document(&record)?;
        Ok(true)
    }

    /// Hard-delete a document and all of its snapshots.
    pub async fn purge_document(&self, id: &str) -> Result<bool> {
        let _guard = self.locks.lock(id).await;
        if self.storage.get_document(id)?.is_none() {
            return Ok(false);
        }
        self.storage.purge_document(id)?;
        log::info!("Purged document {} and its snapshots", id);
        Ok(true)
    }

    /// Case-insensitive substring search over titles and plain text.
    ///
    /// Soft-deleted documents are excluded. Results are not ranked.
    pub async fn search_documents(&self, query: &str) -> Result<Vec<LocalDocument>> {
        let needle = query.to_lowercase();
        Ok(self
            .list_documents(false)
            .await?
            .into_iter()
            .filter(|d| {
                d.title.to_lowercase().contains(&needle)
                    || d.plain_text.to_lowercase().contains(&needle)
            })
            .collect())
    }

    /// Documents with local changes not yet confirmed by the server.
    pub async fn dirty_documents(&self) -> Result<Vec<LocalDocument>> {
        Ok(self
            .list_documents(false)
            .await?
            .into_iter()
            .filter(|d| d.is_dirty)
            .collect())
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore").finish_non_exhaustive()
    }
}
