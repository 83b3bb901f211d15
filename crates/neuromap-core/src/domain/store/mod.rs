//! Concept map store
//!
//! The authoritative `(user, context) -> map` table. Writers take a per-key
//! lock for the whole of an operation and commit as the very last step, so a
//! failed or cancelled operation never leaves a partial map behind. Readers
//! never wait on key locks.

mod guard;

pub use guard::KeyLockGuard;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::domain::mindmap::{MapKey, NeuralMapStructure};
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct ConceptMapStore {
    id: Uuid,
    maps: RwLock<HashMap<MapKey, Arc<NeuralMapStructure>>>,
    locks: Mutex<HashMap<MapKey, Arc<tokio::sync::Mutex<()>>>>,
    lock_timeout: Duration,
}

impl Default for ConceptMapStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

impl ConceptMapStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            maps: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            lock_timeout: config.lock_timeout(),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub async fn get(&self, key: &MapKey) -> Option<Arc<NeuralMapStructure>> {
        self.maps.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &MapKey) -> bool {
        self.maps.read().await.contains_key(key)
    }

    /// Contexts with a stored map for `user_id`, sorted
    pub async fn contexts(&self, user_id: &str) -> Vec<String> {
        let mut contexts: Vec<String> = self
            .maps
            .read()
            .await
            .keys()
            .filter(|k| k.user_id == user_id)
            .map(|k| k.context.clone())
            .collect();
        contexts.sort();
        contexts
    }

    pub async fn len(&self) -> usize {
        self.maps.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.maps.read().await.is_empty()
    }

    /// Acquire the write lock for `key`, waiting at most the configured timeout
    pub async fn lock(&self, key: &MapKey) -> Result<KeyLockGuard> {
        self.lock_with_timeout(key, self.lock_timeout).await
    }

    pub async fn lock_with_timeout(&self, key: &MapKey, timeout: Duration) -> Result<KeyLockGuard> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            // Only the table references an idle key's mutex
            locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            locks.entry(key.clone()).or_default().clone()
        };

        debug!(key = %key, timeout_ms = timeout.as_millis(), "Attempting to acquire map lock");
        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(held) => Ok(KeyLockGuard::new(key.clone(), self.id, held)),
            Err(_) => Err(Error::LockTimeout(key.to_string())),
        }
    }

    /// Replace the map stored under the guard's key
    pub async fn commit(
        &self,
        guard: &KeyLockGuard,
        structure: NeuralMapStructure,
    ) -> Result<Arc<NeuralMapStructure>> {
        self.check_guard(guard)?;
        structure.validate_invariants()?;

        let structure = Arc::new(structure);
        let previous = self
            .maps
            .write()
            .await
            .insert(guard.key().clone(), structure.clone());
        info!(
            key = %guard.key(),
            map_id = %structure.id,
            replaced = previous.is_some(),
            "Committed mind map"
        );
        Ok(structure)
    }

    /// Lock `key` and store `structure` under it
    pub async fn put(
        &self,
        key: &MapKey,
        structure: NeuralMapStructure,
    ) -> Result<Arc<NeuralMapStructure>> {
        let guard = self.lock(key).await?;
        self.commit(&guard, structure).await
    }

    pub async fn remove(&self, guard: &KeyLockGuard) -> Result<Option<Arc<NeuralMapStructure>>> {
        self.check_guard(guard)?;
        Ok(self.maps.write().await.remove(guard.key()))
    }

    fn check_guard(&self, guard: &KeyLockGuard) -> Result<()> {
        if guard.store_id() != self.id {
            return Err(Error::computation(format!(
                "lock for '{}' was issued by a different store",
                guard.key()
            )));
        }
        Ok(())
    }
}
