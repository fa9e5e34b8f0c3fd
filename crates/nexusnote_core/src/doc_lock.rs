//! Per-document asynchronous write locks.
//!
//! Every read-modify-write of a document or its snapshot timeline goes
//! through [`DocLocks::lock`], so concurrent writers to the same id are
//! serialized while different ids proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Keyed async mutex.
///
/// Cloning shares the lock table.
#[derive(Debug, Clone, Default)]
pub struct DocLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Guard held for the duration of a document write.
pub struct DocLockGuard {
    _guard: OwnedMutexGuard<()>,
}

impl DocLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: &str) -> DocLockGuard {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries nobody holds or waits on are dropped here
            locks.retain(|key, m| key == id || Arc::strong_count(m) > 1);
            locks.entry(id.to_string()).or_default().clone()
        };
        DocLockGuard {
            _guard: mutex.lock_owned().await,
        }
    }

    /// Number of ids with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
