use crate::error::{DuplicateResult, SlyeRuntimeError};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, hash::Hash, num::NonZeroUsize, sync::Arc};
use tokio::sync::{Mutex, RwLock};

type Initializer<V> = Arc<RwLock<Option<Result<V, SlyeRuntimeError>>>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached values, `None` for unbounded.
    pub capacity: Option<usize>,
}

impl CacheConfig {
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
        }
    }
}

/// LRU value cache whose initialization is coalesced: concurrent lookups of a
/// missing key share a single initializer future.
///
/// Failed initializations are not cached, the next lookup tries again.
#[derive(Debug, Clone)]
pub struct CoalescingCache<K: Hash + Eq, V> {
    values: Arc<Mutex<LruCache<K, V>>>,
    initializers: Arc<RwLock<HashMap<K, Initializer<V>>>>,
    capacity: Option<usize>,
}

enum Slot<V> {
    Owner(tokio::sync::OwnedRwLockWriteGuard<Option<Result<V, SlyeRuntimeError>>>),
    Waiter(Initializer<V>),
}

impl<K, V> CoalescingCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(config: CacheConfig) -> Self {
        let values = match config.capacity.and_then(NonZeroUsize::new) {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self {
            values: Arc::new(Mutex::new(values)),
            initializers: Default::default(),
            capacity: config.capacity,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.values.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.lock().await.is_empty()
    }

    pub async fn num_initializers(&self) -> usize {
        self.initializers.read().await.len()
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.values.lock().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &K) -> bool {
        self.values.lock().await.contains(key)
    }

    pub async fn insert(&self, key: K, value: V) {
        self.values.lock().await.put(key, value);
    }

    pub async fn clear(&self) {
        // In progress initializers are left alone
        self.values.lock().await.clear();
    }

    pub async fn get_or_try_insert_with<F>(&self, key: K, init: F) -> Result<V, SlyeRuntimeError>
    where
        F: Future<Output = Result<V, SlyeRuntimeError>>,
    {
        let mut init = Some(init);
        loop {
            if let Some(value) = self.get(&key).await {
                return Ok(value);
            }

            match self.claim(&key).await {
                Slot::Owner(mut guard) => {
                    let Some(init) = init.take() else {
                        return Err(SlyeRuntimeError::InternalError(
                            "cache initializer polled twice".to_string(),
                        ));
                    };
                    let result = init.await;
                    if let Ok(value) = &result {
                        self.insert(key.clone(), value.clone()).await;
                    }
                    *guard = Some(result.duplicate());
                    // Waiters hold their own Arc of the initializer
                    self.initializers.write().await.remove(&key);
                    return result;
                }
                Slot::Waiter(initializer) => {
                    let result = initializer.read().await;
                    if let Some(result) = result.as_ref() {
                        return result.duplicate();
                    }
                    // The owner was dropped before finishing, try again
                    drop(result);
                    let mut initializers = self.initializers.write().await;
                    if initializers
                        .get(&key)
                        .is_some_and(|current| Arc::ptr_eq(current, &initializer))
                    {
                        initializers.remove(&key);
                    }
                }
            }
        }
    }

    /// Either register a new initializer for `key` (and hold its write lock)
    /// or return the one already in progress.
    async fn claim(&self, key: &K) -> Slot<V> {
        let mut initializers = self.initializers.write().await;
        if let Some(initializer) = initializers.get(key) {
            return Slot::Waiter(initializer.clone());
        }
        let initializer: Initializer<V> = Arc::new(RwLock::new(None));
        let guard = initializer.clone().write_owned().await;
        initializers.insert(key.clone(), initializer);
        Slot::Owner(guard)
    }
}
