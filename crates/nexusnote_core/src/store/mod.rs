//! Local stores built on top of [`LocalStorage`](crate::crdt::LocalStorage).

mod document_store;
mod snapshot_store;

pub use document_store::{DEFAULT_TITLE, DocumentStore};
pub use snapshot_store::{
    ComparisonSide, PRE_RESTORE_SUMMARY, SnapshotComparison, SnapshotStore, TimelineStats,
};
