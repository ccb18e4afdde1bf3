//! TTL-based mutual exclusion for document ingestion.
//!
//! At most one ingestion job may run per document. Locks expire after a fixed
//! TTL so that a crashed worker cannot leave a document permanently stuck;
//! expiry silently permits a retry. The trait is the seam for a networked
//! lock store; the in-process table is the default implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors raised by the lock backend.
#[derive(Debug, Error)]
pub enum LockError {
    /// Underlying lock store could not be reached; callers should retry.
    ///
    /// The orchestrator must never treat this as "unlocked".
    #[error("lock store unavailable: {0}")]
    Unavailable(String),
}

/// Logical key under which a document's processing lock is stored.
pub fn lock_key(document_id: i64) -> String {
    format!("processing:{document_id}")
}

/// Mutual-exclusion primitive keyed by document id.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Create the lock and return `true` only if none is currently active.
    async fn try_acquire(&self, document_id: i64) -> Result<bool, LockError>;

    /// Drop the lock; idempotent, no-op if absent.
    async fn release(&self, document_id: i64) -> Result<(), LockError>;

    /// Whether an unexpired lock exists for the document.
    async fn is_locked(&self, document_id: i64) -> Result<bool, LockError>;
}

/// In-process lock table with deadline-based expiry.
pub struct InProcessLocks {
    entries: Mutex<HashMap<i64, Instant>>,
    ttl: Duration,
}

impl InProcessLocks {
    /// Build a lock table whose entries expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<i64, Instant>) -> T) -> T {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        entries.retain(|_, deadline| *deadline > now);
        f(&mut entries)
    }
}

#[async_trait]
impl LockService for InProcessLocks {
    async fn try_acquire(&self, document_id: i64) -> Result<bool, LockError> {
        let deadline = Instant::now() + self.ttl;
        let acquired = self.with_entries(|entries| {
            if entries.contains_key(&document_id) {
                false
            } else {
                entries.insert(document_id, deadline);
                true
            }
        });
        tracing::debug!(key = %lock_key(document_id), acquired, "Lock acquisition attempt");
        Ok(acquired)
    }

    async fn release(&self, document_id: i64) -> Result<(), LockError> {
        let removed = self.with_entries(|entries| entries.remove(&document_id).is_some());
        tracing::debug!(key = %lock_key(document_id), removed, "Lock released");
        Ok(())
    }

    async fn is_locked(&self, document_id: i64) -> Result<bool, LockError> {
        Ok(self.with_entries(|entries| entries.contains_key(&document_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let locks = InProcessLocks::new(Duration::from_secs(600));
        assert!(locks.try_acquire(42).await.unwrap());
        assert!(!locks.try_acquire(42).await.unwrap());
        assert!(locks.is_locked(42).await.unwrap());

        // a different document is unaffected
        assert!(locks.try_acquire(43).await.unwrap());
    }

    #[tokio::test]
    async fn release_is_idempotent_and_frees_the_slot() {
        let locks = InProcessLocks::new(Duration::from_secs(600));
        assert!(locks.try_acquire(7).await.unwrap());
        locks.release(7).await.unwrap();
        locks.release(7).await.unwrap();
        assert!(!locks.is_locked(7).await.unwrap());
        assert!(locks.try_acquire(7).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lock_permits_reacquisition() {
        let locks = InProcessLocks::new(Duration::from_millis(20));
        assert!(locks.try_acquire(9).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!locks.is_locked(9).await.unwrap());
        assert!(locks.try_acquire(9).await.unwrap());
    }

    #[test]
    fn lock_key_format_is_stable() {
        assert_eq!(lock_key(42), "processing:42");
    }
}
