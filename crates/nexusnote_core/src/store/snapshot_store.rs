//! Snapshot timeline: capture, restore, comparison and retention.
//!
//! Snapshots are immutable captures of a note's CRDT state. Per document
//! they are totally ordered by a strictly increasing millisecond timestamp,
//! and at most [`SnapshotPolicy::max_snapshots_per_doc`] of them are kept.
//!
//! # Example
//!
//! ```ignore
//! use nexusnote_core::{SnapshotStore, SnapshotTrigger};
//!
//! let snapshots = SnapshotStore::new(storage, SnapshotPolicy::default());
//! let backup = snapshots
//!     .create_snapshot("note-1", &live, SnapshotTrigger::AiEdit, Some("before rewrite".into()))
//!     .await?;
//!
//! // Later: roll back, keeping the current text as a "restore" snapshot
//! snapshots.restore_snapshot(&backup.unwrap().id, &live).await?;
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::config::SnapshotPolicy;
use crate::crdt::{
    DocumentSnapshot, LocalStorage, NoteDoc, SnapshotTrigger, UpdateOrigin, now_millis,
};
use crate::diff::{self, DiffLine, DiffSummary};
use crate::doc_lock::DocLocks;
use crate::error::Result;

/// Summary given to the backup taken before a restore.
pub const PRE_RESTORE_SUMMARY: &str = "pre-restore backup";

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ComparisonSide {
    /// Snapshot ID, `None` for the live document
    pub snapshot_id: Option<String>,
    pub timestamp: i64,
    pub plain_text: String,
    pub word_count: usize,
}

impl ComparisonSide {
    fn from_snapshot(snapshot: &DocumentSnapshot) -> Self {
        Self {
            snapshot_id: Some(snapshot.id.clone()),
            timestamp: snapshot.timestamp,
            plain_text: snapshot.plain_text.clone(),
            word_count: snapshot.word_count,
        }
    }
}

/// Line diff between two points of a timeline, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct SnapshotComparison {
    pub before: ComparisonSide,
    pub after: ComparisonSide,
    pub diff: Vec<DiffLine>,
    pub summary: DiffSummary,
}

impl SnapshotComparison {
    fn new(before: ComparisonSide, after: ComparisonSide) -> Self {
        let diff = diff::compute_diff(&before.plain_text, &after.plain_text);
        let summary = diff::summarize(&diff);
        Self {
            before,
            after,
            diff,
            summary,
        }
    }
}

/// Aggregate view of a document's timeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct TimelineStats {
    pub total: usize,
    pub by_trigger: HashMap<SnapshotTrigger, usize>,
    pub oldest: Option<i64>,
    pub newest: Option<i64>,
}

/// Store for [`DocumentSnapshot`] records.
#[derive(Clone)]
pub struct SnapshotStore {
    storage: Arc<dyn LocalStorage>,
    policy: SnapshotPolicy,
    locks: DocLocks,
}

/// Newest first; ids break timestamp ties so the order is stable.
fn sort_newest_first(snapshots: &mut [DocumentSnapshot]) {
    snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
}

impl SnapshotStore {
    pub fn new(storage: Arc<dyn LocalStorage>, policy: SnapshotPolicy) -> Self {
        Self {
            storage,
            policy,
            locks: DocLocks::new(),
        }
    }

    pub fn policy(&self) -> &SnapshotPolicy {
        &self.policy
    }

    /// Capture the current state of `doc`.
    ///
    /// For [`SnapshotTrigger::Auto`] nothing is created (and `None` returned)
    /// when the plain-text length moved by less than the minimum change
    /// threshold since the latest snapshot. Other triggers always create.
    pub async fn create_snapshot(
        &self,
        document_id: &str,
        doc: &NoteDoc,
        trigger: SnapshotTrigger,
        summary: Option<String>,
    ) -> Result<Option<DocumentSnapshot>> {
        let _guard = self.locks.lock(document_id).await;
        self.create_snapshot_locked(document_id, doc, trigger, summary)
    }

    /// Snapshot creation proper. The caller holds the document lock.
    fn create_snapshot_locked(
        &self,
        document_id: &str,
        doc: &NoteDoc,
        trigger: SnapshotTrigger,
        summary: Option<String>,
    ) -> Result<Option<DocumentSnapshot>> {
        let crdt_state = doc.encode_state_as_update();
        let plain_text = doc.plain_text();
        let latest = self.latest(document_id)?;

        if trigger == SnapshotTrigger::Auto {
            let previous_len = latest
                .as_ref()
                .map(|s| s.plain_text.chars().count())
                .unwrap_or(0);
            let delta = plain_text.chars().count().abs_diff(previous_len);
            if delta < self.policy.min_change_threshold {
                log::debug!(
                    "Skipping auto snapshot of {}: {} chars changed (threshold {})",
                    document_id,
                    delta,
                    self.policy.min_change_threshold
                );
                return Ok(None);
            }
        }

        let now = now_millis();
        let timestamp = match &latest {
            Some(latest) if latest.timestamp >= now => latest.timestamp + 1,
            _ => now,
        };

        let snapshot = DocumentSnapshot {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            word_count: diff::word_count(&plain_text),
            diff_from_previous: latest
                .as_ref()
                .map(|prev| diff::word_set_diff(&prev.plain_text, &plain_text)),
            crdt_state,
            plain_text,
            timestamp,
            trigger,
            summary,
        };
        self.storage.put_snapshot(&snapshot)?;
        log::info!(
            "Created {} snapshot {} for {}",
            trigger,
            snapshot.id,
            document_id
        );

        self.prune_locked(document_id)?;
        Ok(Some(snapshot))
    }

    fn latest(&self, document_id: &str) -> Result<Option<DocumentSnapshot>> {
        Ok(self
            .storage
            .snapshots_for_document(document_id)?
            .into_iter()
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id))))
    }

    /// All snapshots of a document, newest first.
    pub async fn get_snapshots(&self, document_id: &str) -> Result<Vec<DocumentSnapshot>> {
        let mut snapshots = self.storage.snapshots_for_document(document_id)?;
        sort_newest_first(&mut snapshots);
        Ok(snapshots)
    }

    pub async fn get_snapshot(&self, id: &str) -> Result<Option<DocumentSnapshot>> {
        self.storage.get_snapshot(id)
    }

    pub async fn get_latest_snapshot(&self, document_id: &str) -> Result<Option<DocumentSnapshot>> {
        self.latest(document_id)
    }

    /// Roll `live` back to the content of a snapshot.
    ///
    /// The current content is first captured as a `restore` snapshot; the
    /// live tree is then replaced with a structural copy of the snapshot's
    /// content under the local origin, so connected peers receive ordinary
    /// CRDT operations. Returns the backup snapshot, or `None` if
    /// `snapshot_id` is unknown.
    pub async fn restore_snapshot(
        &self,
        snapshot_id: &str,
        live: &NoteDoc,
    ) -> Result<Option<DocumentSnapshot>> {
        let Some(target) = self.storage.get_snapshot(snapshot_id)? else {
            return Ok(None);
        };
        let _guard = self.locks.lock(&target.document_id).await;

        let backup = self.create_snapshot_locked(
            &target.document_id,
            live,
            SnapshotTrigger::Restore,
            Some(PRE_RESTORE_SUMMARY.to_string()),
        )?;

        let restored = NoteDoc::from_state(&target.crdt_state)?;
        live.replace_content_from(&restored, UpdateOrigin::Local);

        log::info!(
            "Restored {} to snapshot {} ({})",
            target.document_id,
            target.id,
            target.trigger
        );
        Ok(backup)
    }

    /// Compare two snapshots, oldest as `before` whatever the argument order.
    pub async fn compare_snapshots(
        &self,
        id_a: &str,
        id_b: &str,
    ) -> Result<Option<SnapshotComparison>> {
        let (Some(a), Some(b)) = (
            self.storage.get_snapshot(id_a)?,
            self.storage.get_snapshot(id_b)?,
        ) else {
            return Ok(None);
        };
        let (before, after) = if (a.timestamp, &a.id) <= (b.timestamp, &b.id) {
            (a, b)
        } else {
            (b, a)
        };
        Ok(Some(SnapshotComparison::new(
            ComparisonSide::from_snapshot(&before),
            ComparisonSide::from_snapshot(&after),
        )))
    }

    /// Compare a snapshot with the live document.
    pub async fn compare_with_current(
        &self,
        snapshot_id: &str,
        live: &NoteDoc,
    ) -> Result<Option<SnapshotComparison>> {
        let Some(snapshot) = self.storage.get_snapshot(snapshot_id)? else {
            return Ok(None);
        };
        let plain_text = live.plain_text();
        let current = ComparisonSide {
            snapshot_id: None,
            timestamp: now_millis().max(snapshot.timestamp),
            word_count: diff::word_count(&plain_text),
            plain_text,
        };
        Ok(Some(SnapshotComparison::new(
            ComparisonSide::from_snapshot(&snapshot),
            current,
        )))
    }

    /// Whether enough time passed since the latest snapshot of any trigger.
    pub async fn should_auto_snapshot(&self, document_id: &str) -> Result<bool> {
        Ok(match self.latest(document_id)? {
            Some(latest) => now_millis() - latest.timestamp >= self.policy.auto_interval_ms(),
            None => true,
        })
    }

    /// Delete all but the newest snapshots of a document.
    ///
    /// Returns the number of deleted snapshots.
    pub async fn prune_snapshots(&self, document_id: &str) -> Result<usize> {
        let _guard = self.locks.lock(document_id).await;
        self.prune_locked(document_id)
    }

    fn prune_locked(&self, document_id: &str) -> Result<usize> {
        let mut snapshots = self.storage.snapshots_for_document(document_id)?;
        if snapshots.len() <= self.policy.max_snapshots_per_doc {
            return Ok(0);
        }
        sort_newest_first(&mut snapshots);
        let stale: Vec<String> = snapshots
            .split_off(self.policy.max_snapshots_per_doc)
            .into_iter()
            .map(|s| s.id)
            .collect();
        self.storage.delete_snapshots(&stale)?;
        log::debug!("Pruned {} snapshots of {}", stale.len(), document_id);
        Ok(stale.len())
    }

    pub async fn delete_snapshot(&self, id: &str) -> Result<bool> {
        let Some(snapshot) = self.storage.get_snapshot(id)? else {
            return Ok(false);
        };
        let _guard = self.locks.lock(&snapshot.document_id).await;
        self.storage.delete_snapshot(id)?;
        Ok(true)
    }

    /// Insert snapshots received from elsewhere, skipping ids already known.
    ///
    /// Snapshots that would fall outside the retention cap of their document
    /// are not written; the rest are inserted and the document is pruned.
    /// Returns the number of inserted snapshots, all of which are retained.
    pub async fn import_snapshots(&self, snapshots: Vec<DocumentSnapshot>) -> Result<usize> {
        let mut by_document: BTreeMap<String, Vec<DocumentSnapshot>> = BTreeMap::new();
        for snapshot in snapshots {
            by_document
                .entry(snapshot.document_id.clone())
                .or_default()
                .push(snapshot);
        }

        let mut inserted = 0;
        for (document_id, incoming) in by_document {
            let _guard = self.locks.lock(&document_id).await;
            let existing = self.storage.snapshots_for_document(&document_id)?;
            let mut known: HashSet<String> = existing.iter().map(|s| s.id.clone()).collect();

            let fresh: Vec<DocumentSnapshot> = incoming
                .into_iter()
                .filter(|s| known.insert(s.id.clone()))
                .collect();
            if fresh.is_empty() {
                continue;
            }

            let mut combined: Vec<&DocumentSnapshot> = existing.iter().chain(&fresh).collect();
            combined.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
            let retained: HashSet<&str> = combined
                .into_iter()
                .take(self.policy.max_snapshots_per_doc)
                .map(|s| s.id.as_str())
                .collect();

            let mut skipped = 0;
            for snapshot in &fresh {
                if retained.contains(snapshot.id.as_str()) {
                    self.storage.put_snapshot(snapshot)?;
                    inserted += 1;
                } else {
                    skipped += 1;
                }
            }
            if skipped > 0 {
                log::debug!(
                    "Skipped {} snapshots of {} older than the retained timeline",
                    skipped,
                    document_id
                );
            }
            self.prune_locked(&document_id)?;
        }
        Ok(inserted)
    }

    pub async fn get_timeline_stats(&self, document_id: &str) -> Result<TimelineStats> {
        let snapshots = self.storage.snapshots_for_document(document_id)?;
        let mut stats = TimelineStats {
            total: snapshots.len(),
            ..Default::default()
        };
        for snapshot in &snapshots {
            *stats.by_trigger.entry(snapshot.trigger).or_default() += 1;
            stats.oldest = Some(stats.oldest.map_or(snapshot.timestamp, |t| t.min(snapshot.timestamp)));
            stats.newest = Some(stats.newest.map_or(snapshot.timestamp, |t| t.max(snapshot.timestamp)));
        }
        Ok(stats)
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::{DiffStats, MemoryStorage};
    use futures_lite::future::block_on;

    fn store_with(policy: SnapshotPolicy) -> SnapshotStore {
        SnapshotStore::new(Arc::new(MemoryStorage::new()), policy)
    }

    fn store() -> SnapshotStore {
        store_with(SnapshotPolicy::default())
    }

    fn doc_with(text: &str) -> NoteDoc {
        let doc = NoteDoc::new();
        doc.set_plain_text(text);
        doc
    }

    #[test]
    fn test_manual_snapshot_always_created() {
        let store = store();
        let doc = doc_with("tiny");
        let snap = block_on(store.create_snapshot("a", &doc, SnapshotTrigger::Manual, None))
            .unwrap()
            .unwrap();
        assert_eq!(snap.plain_text, "tiny");
        assert_eq!(snap.word_count, 1);
        assert!(snap.diff_from_previous.is_none());

        let again = block_on(store.create_snapshot("a", &doc, SnapshotTrigger::Manual, None))
            .unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn test_auto_snapshot_threshold() {
        let store = store();
        let doc = doc_with(&"x".repeat(60));
        block_on(store.create_snapshot("a", &doc, SnapshotTrigger::Manual, None)).unwrap();

        doc.set_plain_text(&"x".repeat(109));
        let skipped = block_on(store.create_snapshot("a", &doc, SnapshotTrigger::Auto, None))
            .unwrap();
        assert!(skipped.is_none());
        assert_eq!(block_on(store.get_snapshots("a")).unwrap().len(), 1);

        doc.set_plain_text(&"x".repeat(110));
        let created = block_on(store.create_snapshot("a", &doc, SnapshotTrigger::Auto, None))
            .unwrap();
        assert!(created.is_some());
    }

    #[test]
    fn test_auto_snapshot_delta_counts_shrinking() {
        let store = store();
        let doc = doc_with(&"y".repeat(80));
        block_on(store.create_snapshot("a", &doc, SnapshotTrigger::Manual, None)).unwrap();

        doc.set_plain_text(&"y".repeat(20));
        let created = block_on(store.create_snapshot("a", &doc, SnapshotTrigger::Auto, None))
            .unwrap();
        assert!(created.is_some());
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let store = store();
        let doc = doc_with("same");
        for _ in 0..20 {
            block_on(store.create_snapshot("a", &doc, SnapshotTrigger::Manual, None)).unwrap();
        }
        let snapshots = block_on(store.get_snapshots("a")).unwrap();
        assert_eq!(snapshots.len(), 20);
        for pair in snapshots.windows(2) {
            assert!(pair[0].timestamp > pair[1].timestamp);
        }
    }

    #[test]
    fn test_diff_from_previous_uses_word_sets() {
        let store = store();
        let doc = doc_with("alpha beta gamma");
        block_on(store.create_snapshot("a", &doc, SnapshotTrigger::Manual, None)).unwrap();

        doc.set_plain_text("gamma beta alpha delta");
        let snap = block_on(store.create_snapshot("a", &doc, SnapshotTrigger::Manual, None))
            .unwrap()
            .unwrap();
        assert_eq!(
            snap.diff_from_previous,
            Some(DiffStats {
                added: 1,
                removed: 0
            })
        );
    }

    #[test]
    fn test_retention_cap_keeps_newest() {
        let store = store_with(SnapshotPolicy {
            max_snapshots_per_doc: 3,
            ..Default::default()
        });
        let doc = NoteDoc::new();
        let mut created = Vec::new();
        for i in 0..5 {
            doc.set_plain_text(&format!("version {i}"));
            let snap = block_on(store.create_snapshot("a", &doc, SnapshotTrigger::Manual, None))
                .unwrap()
                .unwrap();
            created.push(snap.id);
            assert!(block_on(store.get_snapshots("a")).unwrap().len() <= 3);
        }

        let kept: Vec<_> = block_on(store.get_snapshots("a"))
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        let expected: Vec<_> = created.iter().rev().take(3).cloned().collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn test_restore_takes_backup_first() {
        let store = store();
        let live = doc_with("original text");
        let original = block_on(store.create_snapshot("a", &live, SnapshotTrigger::Manual, None))
            .unwrap()
            .unwrap();

        live.set_plain_text("rewritten by an assistant");
        let backup = block_on(store.restore_snapshot(&original.id, &live))
            .unwrap()
            .unwrap();

        assert_eq!(backup.trigger, SnapshotTrigger::Restore);
        assert_eq!(backup.summary.as_deref(), Some(PRE_RESTORE_SUMMARY));
        assert_eq!(backup.plain_text, "rewritten by an assistant");
        assert_eq!(live.plain_text(), "original text");

        let latest = block_on(store.get_latest_snapshot("a")).unwrap().unwrap();
        assert_eq!(latest.id, backup.id);
    }

    #[test]
    fn test_restore_unknown_snapshot() {
        let store = store();
        let live = doc_with("keep me");
        assert!(block_on(store.restore_snapshot("missing", &live)).unwrap().is_none());
        assert_eq!(live.plain_text(), "keep me");
        assert!(block_on(store.get_snapshots("a")).unwrap().is_empty());
    }

    #[test]
    fn test_compare_orders_chronologically() {
        let store = store();
        let doc = doc_with("a\nb\nc");
        let first = block_on(store.create_snapshot("d", &doc, SnapshotTrigger::Manual, None))
            .unwrap()
            .unwrap();
        doc.set_plain_text("a\nx\nc");
        let second = block_on(store.create_snapshot("d", &doc, SnapshotTrigger::Manual, None))
            .unwrap()
            .unwrap();

        let forward = block_on(store.compare_snapshots(&first.id, &second.id))
            .unwrap()
            .unwrap();
        let backward = block_on(store.compare_snapshots(&second.id, &first.id))
            .unwrap()
            .unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward.before.snapshot_id.as_deref(), Some(first.id.as_str()));
        assert_eq!(forward.summary.added, 1);
        assert_eq!(forward.summary.removed, 1);

        assert!(block_on(store.compare_snapshots(&first.id, "missing")).unwrap().is_none());
    }

    #[test]
    fn test_compare_with_current() {
        let store = store();
        let doc = doc_with("draft");
        let snap = block_on(store.create_snapshot("d", &doc, SnapshotTrigger::Manual, None))
            .unwrap()
            .unwrap();
        doc.set_plain_text("draft\nmore");

        let cmp = block_on(store.compare_with_current(&snap.id, &doc))
            .unwrap()
            .unwrap();
        assert!(cmp.after.snapshot_id.is_none());
        assert_eq!(cmp.after.plain_text, "draft\nmore");
        assert_eq!(cmp.summary.added, 1);
        assert!(cmp.after.timestamp >= cmp.before.timestamp);
    }

    #[test]
    fn test_should_auto_snapshot() {
        let store = store();
        assert!(block_on(store.should_auto_snapshot("a")).unwrap());

        let doc = doc_with("text");
        block_on(store.create_snapshot("a", &doc, SnapshotTrigger::CollabJoin, None)).unwrap();
        assert!(!block_on(store.should_auto_snapshot("a")).unwrap());

        let eager = store_with(SnapshotPolicy {
            auto_interval_secs: 0,
            ..Default::default()
        });
        block_on(eager.create_snapshot("a", &doc, SnapshotTrigger::Manual, None)).unwrap();
        assert!(block_on(eager.should_auto_snapshot("a")).unwrap());
    }

    #[test]
    fn test_import_skips_known_ids_and_prunes() {
        let store = store_with(SnapshotPolicy {
            max_snapshots_per_doc: 2,
            ..Default::default()
        });
        let doc = doc_with("local");
        let local = block_on(store.create_snapshot("a", &doc, SnapshotTrigger::Manual, None))
            .unwrap()
            .unwrap();

        let mut older = local.clone();
        older.id = "remote-old".to_string();
        older.timestamp = local.timestamp - 10_000;
        let mut oldest = local.clone();
        oldest.id = "remote-oldest".to_string();
        oldest.timestamp = local.timestamp - 20_000;

        let inserted = block_on(store.import_snapshots(vec![local.clone(), older, oldest]))
            .unwrap();
        assert_eq!(inserted, 1);

        let ids: Vec<_> = block_on(store.get_snapshots("a"))
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![local.id, "remote-old".to_string()]);
    }

    #[test]
    fn test_import_into_full_timeline_skips_older_snapshots() {
        let store = store_with(SnapshotPolicy {
            max_snapshots_per_doc: 2,
            ..Default::default()
        });
        let first = block_on(store.create_snapshot("a", &doc_with("one"), SnapshotTrigger::Manual, None))
            .unwrap()
            .unwrap();
        block_on(store.create_snapshot("a", &doc_with("two"), SnapshotTrigger::Manual, None))
            .unwrap();

        let mut stale = first.clone();
        stale.id = "server-stale".to_string();
        stale.timestamp = first.timestamp - 60_000;

        for _ in 0..2 {
            let inserted = block_on(store.import_snapshots(vec![stale.clone()])).unwrap();
            assert_eq!(inserted, 0);
        }
        assert!(block_on(store.get_snapshot("server-stale")).unwrap().is_none());
        assert_eq!(block_on(store.get_snapshots("a")).unwrap().len(), 2);

        let mut newer = first.clone();
        newer.id = "server-new".to_string();
        newer.timestamp = first.timestamp + 60_000;
        assert_eq!(block_on(store.import_snapshots(vec![newer])).unwrap(), 1);

        let ids: Vec<_> = block_on(store.get_snapshots("a"))
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], "server-new");
        assert!(!ids.contains(&first.id));
    }

    #[test]
    fn test_timeline_stats() {
        let store = store();
        let doc = doc_with("t");
        block_on(store.create_snapshot("a", &doc, SnapshotTrigger::Manual, None)).unwrap();
        block_on(store.create_snapshot("a", &doc, SnapshotTrigger::AiEdit, None)).unwrap();
        block_on(store.create_snapshot("a", &doc, SnapshotTrigger::Manual, None)).unwrap();

        let stats = block_on(store.get_timeline_stats("a")).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_trigger.get(&SnapshotTrigger::Manual), Some(&2));
        assert_eq!(stats.by_trigger.get(&SnapshotTrigger::AiEdit), Some(&1));
        assert!(stats.oldest < stats.newest);

        let empty = block_on(store.get_timeline_stats("none")).unwrap();
        assert_eq!(empty, TimelineStats::default());
    }

    #[test]
    fn test_delete_snapshot() {
        let store = store();
        let doc = doc_with("t");
        let snap = block_on(store.create_snapshot("a", &doc, SnapshotTrigger::Manual, None))
            .unwrap()
            .unwrap();
        assert!(block_on(store.delete_snapshot(&snap.id)).unwrap());
        assert!(!block_on(store.delete_snapshot(&snap.id)).unwrap());
        assert!(block_on(store.get_snapshot(&snap.id)).unwrap().is_none());
    }
}
