//! Core types for local-first persistence and the snapshot timeline.
//!
//! This module defines the records persisted by the local database
//! ([`LocalDocument`], [`DocumentSnapshot`]) and the tags that travel with
//! CRDT updates ([`UpdateOrigin`]).

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Current Unix time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A note as persisted in the local database.
///
/// `plain_text` and `crdt_state_vector` are always derived from `crdt_state`
/// when the record is written; they are never edited on their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct LocalDocument {
    /// Document ID (shared with the server)
    pub id: String,

    /// Display title
    pub title: String,

    /// Full CRDT state encoded as a v1 update
    pub crdt_state: Vec<u8>,

    /// Encoded state vector of `crdt_state`
    pub crdt_state_vector: Vec<u8>,

    /// Plain-text projection of the rich-text content
    pub plain_text: String,

    /// Unix timestamp of creation (milliseconds)
    pub created_at: i64,

    /// Unix timestamp of the last local write (milliseconds)
    pub updated_at: i64,

    /// Unix timestamp of the last confirmed round trip with the server.
    /// `None` until the document has been synced once.
    pub synced_at: Option<i64>,

    /// Set whenever local state changed since the last confirmed sync
    pub is_dirty: bool,

    /// Soft deletion tombstone
    pub is_deleted: bool,
}

impl LocalDocument {
    /// Whether the document was ever confirmed by the server.
    pub fn has_synced(&self) -> bool {
        self.synced_at.is_some()
    }
}

/// What caused a snapshot to be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SnapshotTrigger {
    /// Timer/edit-count gated capture
    Auto,
    /// Explicit user action
    Manual,
    /// Guard taken before an AI-driven edit
    AiEdit,
    /// Taken when a collaborator joins
    CollabJoin,
    /// Backup taken right before a restore
    Restore,
}

impl SnapshotTrigger {
    /// All triggers, in declaration order.
    pub const ALL: [SnapshotTrigger; 5] = [
        SnapshotTrigger::Auto,
        SnapshotTrigger::Manual,
        SnapshotTrigger::AiEdit,
        SnapshotTrigger::CollabJoin,
        SnapshotTrigger::Restore,
    ];

    /// Wire name of the trigger.
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotTrigger::Auto => "auto",
            SnapshotTrigger::Manual => "manual",
            SnapshotTrigger::AiEdit => "ai_edit",
            SnapshotTrigger::CollabJoin => "collab_join",
            SnapshotTrigger::Restore => "restore",
        }
    }
}

impl std::fmt::Display for SnapshotTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SnapshotTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(SnapshotTrigger::Auto),
            "manual" => Ok(SnapshotTrigger::Manual),
            "ai_edit" => Ok(SnapshotTrigger::AiEdit),
            "collab_join" => Ok(SnapshotTrigger::CollabJoin),
            "restore" => Ok(SnapshotTrigger::Restore),
            _ => Err(format!("Unknown snapshot trigger: {}", s)),
        }
    }
}

/// Word-level change counts between two plain-text projections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DiffStats {
    /// Distinct words present in the newer text only
    pub added: usize,
    /// Distinct words present in the older text only
    pub removed: usize,
}

/// An immutable point-in-time capture of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct DocumentSnapshot {
    /// Snapshot ID (UUID v4)
    pub id: String,

    /// Document this snapshot belongs to
    pub document_id: String,

    /// Full CRDT state encoded as a v1 update
    pub crdt_state: Vec<u8>,

    /// Plain-text projection at capture time
    pub plain_text: String,

    /// Unix timestamp (milliseconds). Strictly increasing per document.
    pub timestamp: i64,

    /// Why the snapshot was taken
    pub trigger: SnapshotTrigger,

    /// Optional human-readable summary
    pub summary: Option<String>,

    /// Word count of `plain_text`
    pub word_count: usize,

    /// Word-set diff against the preceding snapshot, fixed at creation
    pub diff_from_previous: Option<DiffStats>,
}

/// Origin of a CRDT update, used to distinguish local vs remote changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOrigin {
    /// Update originated from local user action
    Local,

    /// Update received through the collaboration connection
    Remote,

    /// Hydration from the local database
    Storage,
}

impl UpdateOrigin {
    /// Tag carried by yrs transactions.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateOrigin::Local => "local",
            UpdateOrigin::Remote => "remote",
            UpdateOrigin::Storage => "storage",
        }
    }
}

impl std::fmt::Display for UpdateOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UpdateOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(UpdateOrigin::Local),
            "remote" => Ok(UpdateOrigin::Remote),
            "storage" => Ok(UpdateOrigin::Storage),
            _ => Err(format!("Unknown update origin: {}", s)),
        }
    }
}

impl From<UpdateOrigin> for yrs::Origin {
    fn from(origin: UpdateOrigin) -> Self {
        yrs::Origin::from(origin.as_str())
    }
}

impl UpdateOrigin {
    /// Recover the origin tag of a yrs transaction.
    ///
    /// Transactions without an origin, or with a foreign one, are treated as local.
    pub fn from_yrs(origin: Option<&yrs::Origin>) -> Self {
        let Some(origin) = origin else {
            return UpdateOrigin::Local;
        };
        [UpdateOrigin::Remote, UpdateOrigin::Storage]
            .into_iter()
            .find(|candidate| *origin == yrs::Origin::from(*candidate))
            .unwrap_or(UpdateOrigin::Local)
    }
}
