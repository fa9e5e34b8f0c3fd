//! SQLite-backed storage implementation.
//!
//! This module provides a persistent storage backend using SQLite for note
//! documents and their snapshot timeline.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};

use super::storage::{LocalStorage, StorageResult};
use super::types::{DiffStats, DocumentSnapshot, LocalDocument, SnapshotTrigger};
use crate::error::NexusError;

const DOCUMENT_COLUMNS: &str = "id, title, crdt_state, crdt_state_vector, plain_text, \
     created_at, updated_at, synced_at, is_dirty, is_deleted";

const SNAPSHOT_COLUMNS: &str = "id, document_id, crdt_state, plain_text, timestamp, \
     trigger, summary, word_count, diff_added, diff_removed";

/// SQLite-backed storage.
///
/// # Thread Safety
///
/// The connection is wrapped in a `Mutex` for thread-safe access.
/// SQLite itself is used in serialized threading mode.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open or create a SQLite database at the given path.
    ///
    /// This will create the necessary tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or if schema
    /// initialization fails.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database for testing.
    ///
    /// Data is lost when the storage is dropped.
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                crdt_state BLOB NOT NULL,
                crdt_state_vector BLOB NOT NULL,
                plain_text TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                synced_at INTEGER,
                is_dirty INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0
            );

            -- Snapshots may outlive their document row (purge removes both)
            CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                crdt_state BLOB NOT NULL,
                plain_text TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                trigger TEXT NOT NULL,
                summary TEXT,
                word_count INTEGER NOT NULL,
                diff_added INTEGER,
                diff_removed INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_snapshots_document
                ON snapshots(document_id, timestamp);
            "#,
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage").finish_non_exhaustive()
    }
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<LocalDocument> {
    Ok(LocalDocument {
        id: row.get(0)?,
        title: row.get(1)?,
        crdt_state: row.get(2)?,
        crdt_state_vector: row.get(3)?,
        plain_text: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        synced_at: row.get(7)?,
        is_dirty: row.get(8)?,
        is_deleted: row.get(9)?,
    })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentSnapshot> {
    let trigger: String = row.get(5)?;
    let trigger = trigger
        .parse::<SnapshotTrigger>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into()))?;
    let word_count: i64 = row.get(7)?;
    let diff_added: Option<i64> = row.get(8)?;
    let diff_removed: Option<i64> = row.get(9)?;

    Ok(DocumentSnapshot {
        id: row.get(0)?,
        document_id: row.get(1)?,
        crdt_state: row.get(2)?,
        plain_text: row.get(3)?,
        timestamp: row.get(4)?,
        trigger,
        summary: row.get(6)?,
        word_count: word_count as usize,
        diff_from_previous: match (diff_added, diff_removed) {
            (Some(added), Some(removed)) => Some(DiffStats {
                added: added as usize,
                removed: removed as usize,
            }),
            _ => None,
        },
    })
}

impl LocalStorage for SqliteStorage {
    fn get_document(&self, id: &str) -> StorageResult<Option<LocalDocument>> {
        let conn = self.lock();
        let result = conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"),
            params![id],
            document_from_row,
        );

        match result {
            Ok(doc) => Ok(Some(doc)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(NexusError::Database(e)),
        }
    }

    fn put_document(&self, doc: &LocalDocument) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO documents ({DOCUMENT_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                doc.id,
                doc.title,
                doc.crdt_state,
                doc.crdt_state_vector,
                doc.plain_text,
                doc.created_at,
                doc.updated_at,
                doc.synced_at,
                doc.is_dirty,
                doc.is_deleted,
            ],
        )?;
        Ok(())
    }

    fn delete_document(&self, id: &str) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM documents WHERE id = ?", params![id])?;
        Ok(())
    }

    fn list_documents(&self) -> StorageResult<Vec<LocalDocument>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY updated_at DESC"
        ))?;
        let docs = stmt
            .query_map([], document_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(docs)
    }

    fn get_snapshot(&self, id: &str) -> StorageResult<Option<DocumentSnapshot>> {
        let conn = self.lock();
        let result = conn.query_row(
            &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = ?"),
            params![id],
            snapshot_from_row,
        );

        match result {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(NexusError::Database(e)),
        }
    }

    fn put_snapshot(&self, snapshot: &DocumentSnapshot) -> StorageResult<()> {
        let conn = self.lock();
        let diff = snapshot.diff_from_previous;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO snapshots ({SNAPSHOT_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                snapshot.id,
                snapshot.document_id,
                snapshot.crdt_state,
                snapshot.plain_text,
                snapshot.timestamp,
                snapshot.trigger.as_str(),
                snapshot.summary,
                snapshot.word_count as i64,
                diff.map(|d| d.added as i64),
                diff.map(|d| d.removed as i64),
            ],
        )?;
        Ok(())
    }

    fn delete_snapshot(&self, id: &str) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM snapshots WHERE id = ?", params![id])?;
        Ok(())
    }

    fn snapshots_for_document(&self, document_id: &str) -> StorageResult<Vec<DocumentSnapshot>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
             WHERE document_id = ?
             ORDER BY timestamp DESC"
        ))?;
        let snapshots = stmt
            .query_map(params![document_id], snapshot_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(snapshots)
    }

    fn delete_snapshots_for_document(&self, document_id: &str) -> StorageResult<usize> {
        let conn = self.lock();
        let deleted = conn.execute(
            "DELETE FROM snapshots WHERE document_id = ?",
            params![document_id],
        )?;
        Ok(deleted)
    }

    fn delete_snapshots(&self, ids: &[String]) -> StorageResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM snapshots WHERE id = ?")?;
            for id in ids {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn purge_document(&self, id: &str) -> StorageResult<()> {
        let mut conn = self.lock();

        // Either both the snapshots and the document go, or neither
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM snapshots WHERE document_id = ?", params![id])?;
        tx.execute("DELETE FROM documents WHERE id = ?", params![id])?;
        tx.commit()?;
        Ok(())
    }
}
