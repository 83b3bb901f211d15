//! RAII guard for a per-key store lock

use std::fmt;
use std::time::Instant;

use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::domain::mindmap::MapKey;

/// Exclusive write access to one store key.
///
/// The lock is released when the guard is dropped.
pub struct KeyLockGuard {
    key: MapKey,
    store_id: Uuid,
    acquired_at: Instant,
    _held: OwnedMutexGuard<()>,
}

impl KeyLockGuard {
    pub(crate) fn new(key: MapKey, store_id: Uuid, held: OwnedMutexGuard<()>) -> Self {
        Self {
            key,
            store_id,
            acquired_at: Instant::now(),
            _held: held,
        }
    }

    pub fn key(&self) -> &MapKey {
        &self.key
    }

    pub(crate) fn store_id(&self) -> Uuid {
        self.store_id
    }

    /// How long the lock has been held
    pub fn held_for(&self) -> std::time::Duration {
        self.acquired_at.elapsed()
    }
}

impl fmt::Debug for KeyLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyLockGuard")
            .field("key", &self.key)
            .field("held_for", &self.held_for())
            .finish()
    }
}
