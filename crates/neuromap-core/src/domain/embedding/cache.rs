//! LRU cache for concept embeddings
//!
//! Bounded by capacity, with an optional time-to-live. Misses within one
//! call are computed in a single batch, and concurrent misses on the same
//! key share one computation.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use lru::LruCache;
use tokio::sync::watch;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::{Error, Result};

struct CachedVector {
    vector: Vec<f32>,
    inserted_at: Instant,
}

/// Published once by the caller computing a key; closed without a value
/// when that computation fails or is dropped
type Pending = watch::Receiver<Option<Vec<f32>>>;

pub struct EmbeddingCache {
    entries: Mutex<LruCache<String, CachedVector>>,
    in_flight: Mutex<HashMap<String, Pending>>,
    ttl: Option<Duration>,
    stats: CacheStats,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("len", &self.len())
            .field("ttl", &self.ttl)
            .field("stats", &self.stats)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EmbeddingCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
            ttl,
            stats: CacheStats::default(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity, config.ttl())
    }

    /// Return one vector per key, in order. Keys not cached and not being
    /// computed by another caller are passed to `compute` together, which
    /// must return one vector per key it receives.
    ///
    /// Failures are not cached. A caller waiting on a computation that fails
    /// claims the key and computes it itself.
    pub async fn get_or_compute<F, Fut>(
        &self,
        keys: &[String],
        mut compute: F,
    ) -> Result<Vec<Vec<f32>>>
    where
        F: FnMut(Vec<String>) -> Fut,
        Fut: Future<Output = Result<Vec<Vec<f32>>>>,
    {
        let mut distinct: Vec<&str> = keys.iter().map(String::as_str).collect();
        distinct.sort_unstable();
        distinct.dedup();

        let mut resolved: HashMap<&str, Vec<f32>> = HashMap::with_capacity(distinct.len());
        let mut pending = distinct;
        let mut first_pass = true;

        while !pending.is_empty() {
            let mut owned: Vec<&str> = Vec::new();
            let mut publishers: Vec<watch::Sender<Option<Vec<f32>>>> = Vec::new();
            let mut waiting: Vec<(&str, Pending)> = Vec::new();
            {
                let mut in_flight = lock(&self.in_flight);
                for key in pending {
                    // Results are published under the in-flight lock
                    if let Some(vector) = self.lookup(key) {
                        if first_pass {
                            self.stats.record_hit();
                        }
                        resolved.insert(key, vector);
                        continue;
                    }
                    if first_pass {
                        self.stats.record_miss();
                    }
                    let live = in_flight
                        .get(key)
                        .filter(|rx| rx.has_changed().is_ok())
                        .cloned();
                    match live {
                        Some(rx) => waiting.push((key, rx)),
                        None => {
                            let (tx, rx) = watch::channel(None);
                            in_flight.insert(key.to_string(), rx);
                            owned.push(key);
                            publishers.push(tx);
                        }
                    }
                }
            }
            first_pass = false;

            if !owned.is_empty() {
                let computed = compute(owned.iter().map(|k| k.to_string()).collect()).await;
                let vectors = match computed {
                    Ok(vectors) if vectors.len() == owned.len() => vectors,
                    Ok(vectors) => {
                        self.abandon(&owned);
                        return Err(Error::computation(format!(
                            "expected {} embeddings, got {}",
                            owned.len(),
                            vectors.len()
                        )));
                    }
                    Err(e) => {
                        self.abandon(&owned);
                        return Err(e);
                    }
                };
                self.publish(&owned, &vectors, publishers);
                resolved.extend(owned.iter().copied().zip(vectors));
            }

            let shared = join_all(waiting.into_iter().map(|(key, mut rx)| async move {
                let value = match rx.wait_for(Option::is_some).await {
                    Ok(value) => (*value).clone(),
                    Err(_) => None,
                };
                (key, value)
            }))
            .await;

            let mut retry = Vec::new();
            for (key, value) in shared {
                match value {
                    Some(vector) => {
                        resolved.insert(key, vector);
                    }
                    None => {
                        debug!(key, "Shared embedding computation failed, retrying");
                        retry.push(key);
                    }
                }
            }
            pending = retry;
        }

        keys.iter()
            .map(|key| {
                resolved.get(key.as_str()).cloned().ok_or_else(|| {
                    Error::computation(format!("no embedding resolved for '{}'", key))
                })
            })
            .collect()
    }

    fn publish(
        &self,
        keys: &[&str],
        vectors: &[Vec<f32>],
        publishers: Vec<watch::Sender<Option<Vec<f32>>>>,
    ) {
        let mut in_flight = lock(&self.in_flight);
        let mut entries = lock(&self.entries);
        for ((key, vector), tx) in keys.iter().zip(vectors).zip(publishers) {
            entries.put(
                key.to_string(),
                CachedVector {
                    vector: vector.clone(),
                    inserted_at: Instant::now(),
                },
            );
            in_flight.remove(*key);
            tx.send_replace(Some(vector.clone()));
        }
    }

    /// Release claimed keys; dropping their senders wakes any waiters
    fn abandon(&self, keys: &[&str]) {
        let mut in_flight = lock(&self.in_flight);
        for key in keys {
            in_flight.remove(*key);
        }
    }

    fn lookup(&self, key: &str) -> Option<Vec<f32>> {
        let mut entries = lock(&self.entries);
        let expired = match entries.get(key) {
            Some(entry) => match self.ttl {
                Some(ttl) if entry.inserted_at.elapsed() >= ttl => true,
                _ => return Some(entry.vector.clone()),
            },
            None => return None,
        };
        if expired {
            entries.pop(key);
            debug!(key, "Embedding cache entry expired");
        }
        None
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.entries).contains(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        lock(&self.entries).cap().get()
    }

    /// Drop every cached vector
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }
}

/// Cache hit/miss counters
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl Clone for CacheStats {
    fn clone(&self) -> Self {
        Self {
            hits: AtomicUsize::new(self.hits.load(Ordering::Relaxed)),
            misses: AtomicUsize::new(self.misses.load(Ordering::Relaxed)),
        }
    }
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hit rate in 0.0-1.0
    pub fn hit_rate(&self) -> f32 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f32 / total as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    /// Fill every requested key with `value`
    async fn fill(cache: &EmbeddingCache, names: &[&str], value: f32) -> Result<Vec<Vec<f32>>> {
        cache
            .get_or_compute(&keys(names), |batch| async move {
                Ok(batch.iter().map(|_| vec![value]).collect::<Vec<_>>())
            })
            .await
    }

    #[tokio::test]
    async fn test_hit_skips_compute() {
        let cache = EmbeddingCache::new(16, None);
        let first = cache
            .get_or_compute(&keys(&["alpha"]), |_| async { Ok(vec![vec![1.0, 0.0]]) })
            .await
            .unwrap();
        let second = cache
            .get_or_compute(&keys(&["alpha"]), |_| async {
                Err(Error::computation("compute ran on a cache hit"))
            })
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
        assert!((cache.stats().hit_rate() - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_misses_are_computed_in_one_batch() {
        let cache = EmbeddingCache::new(16, None);
        fill(&cache, &["b"], 2.0).await.unwrap();

        let batches = Arc::new(Mutex::new(Vec::new()));
        let seen = batches.clone();
        let vectors = cache
            .get_or_compute(&keys(&["c", "a", "b", "a"]), move |batch| {
                seen.lock().unwrap().push(batch.clone());
                async move {
                    Ok(batch
                        .iter()
                        .map(|k| vec![k.len() as f32 * 10.0])
                        .collect::<Vec<_>>())
                }
            })
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![10.0], vec![10.0], vec![2.0], vec![10.0]]);
        assert_eq!(*batches.lock().unwrap(), vec![keys(&["a", "c"])]);
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_misses_compute_once() {
        let cache = Arc::new(EmbeddingCache::new(16, None));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_compute(&keys(&["shared"]), |batch| {
                            let calls = calls.clone();
                            async move {
                                calls.fetch_add(batch.len(), Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(20)).await;
                                Ok(vec![vec![0.5, 0.5]])
                            }
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), vec![vec![0.5, 0.5]]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        assert!(lock(&cache.in_flight).is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_batches_share_keys() {
        let cache = Arc::new(EmbeddingCache::new(16, None));
        let computed = Arc::new(Mutex::new(Vec::<String>::new()));

        let run = |names: &'static [&'static str]| {
            let cache = cache.clone();
            let computed = computed.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&keys(names), |batch| {
                        computed.lock().unwrap().extend(batch.iter().cloned());
                        async move {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(batch.iter().map(|_| vec![1.0]).collect::<Vec<_>>())
                        }
                    })
                    .await
            })
        };
        let (first, second) = tokio::join!(run(&["x", "y"]), run(&["y", "z"]));
        assert_eq!(first.unwrap().unwrap().len(), 2);
        assert_eq!(second.unwrap().unwrap().len(), 2);

        let mut computed = computed.lock().unwrap().clone();
        computed.sort();
        assert_eq!(computed, keys(&["x", "y", "z"]));
    }

    #[tokio::test]
    async fn test_waiter_recovers_from_failed_computation() {
        let cache = Arc::new(EmbeddingCache::new(16, None));

        let failing = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&keys(&["k"]), |_| async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err(Error::upstream("model offline"))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let recovered = fill(&cache, &["k"], 3.0).await.unwrap();

        assert!(failing.await.unwrap().is_err());
        assert_eq!(recovered, vec![vec![3.0]]);
        assert!(cache.contains("k"));
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = EmbeddingCache::new(16, None);
        let err = cache
            .get_or_compute(&keys(&["broken"]), |_| async { Err(Error::upstream("model offline")) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model offline"));
        assert!(!cache.contains("broken"));
        assert!(lock(&cache.in_flight).is_empty());

        let v = fill(&cache, &["broken"], 1.0).await.unwrap();
        assert_eq!(v, vec![vec![1.0]]);
    }

    #[tokio::test]
    async fn test_short_batch_is_rejected() {
        let cache = EmbeddingCache::new(16, None);
        let err = cache
            .get_or_compute(&keys(&["a", "b"]), |_| async { Ok(vec![vec![1.0]]) })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E400");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = EmbeddingCache::new(2, None);
        for key in ["a", "b", "c"] {
            fill(&cache, &[key], 1.0).await.unwrap();
        }
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[tokio::test]
    async fn test_expired_entries_count_as_misses() {
        let cache = EmbeddingCache::new(16, Some(Duration::from_millis(10)));
        fill(&cache, &["a"], 1.0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let v = fill(&cache, &["a"], 2.0).await.unwrap();
        assert_eq!(v, vec![vec![2.0]]);
        assert_eq!(cache.stats().misses(), 2);
    }

    #[tokio::test]
    async fn test_clear_and_zero_capacity() {
        let cache = EmbeddingCache::new(0, None);
        assert_eq!(cache.capacity(), 1);
        fill(&cache, &["a"], 1.0).await.unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}
