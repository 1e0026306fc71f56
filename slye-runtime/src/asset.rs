use crate::cache::{CacheConfig, CoalescingCache};
use crate::error::SlyeRuntimeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

pub type AssetData = Arc<Vec<u8>>;

/// Fetches asset bytes on behalf of an owner (presentation uuid or module name).
#[async_trait]
pub trait AssetFetch: Send + Sync {
    async fn fetch(&self, owner: &str, key: &str) -> Result<Vec<u8>, SlyeRuntimeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub u32);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
struct AssetKeys {
    key2id: HashMap<String, AssetId>,
    id2key: HashMap<AssetId, String>,
    last_id: u32,
}

impl AssetKeys {
    fn next_id(&mut self) -> AssetId {
        let id = AssetId(self.last_id);
        self.last_id += 1;
        id
    }
}

/// Lazily fetched binary assets of one owner.
///
/// Keys map to small integer ids; data is fetched on first use and concurrent
/// reads of the same id share one fetch.
pub struct AssetStore {
    owner: String,
    fetcher: Arc<dyn AssetFetch>,
    keys: Mutex<AssetKeys>,
    allocated: Mutex<HashMap<AssetId, AssetData>>,
    data: CoalescingCache<AssetId, AssetData>,
}

impl fmt::Debug for AssetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetStore")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl AssetStore {
    pub fn new(owner: impl Into<String>, fetcher: Arc<dyn AssetFetch>, config: CacheConfig) -> Self {
        Self {
            owner: owner.into(),
            fetcher,
            keys: Default::default(),
            allocated: Default::default(),
            data: CoalescingCache::new(config),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Register `key` without fetching it. Loading the same key twice returns
    /// the same id.
    pub fn load(&self, key: &str) -> AssetId {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = keys.key2id.get(key) {
            return *id;
        }
        let id = keys.next_id();
        keys.key2id.insert(key.to_string(), id);
        keys.id2key.insert(id, key.to_string());
        id
    }

    pub fn key(&self, id: AssetId) -> Option<String> {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .id2key
            .get(&id)
            .cloned()
    }

    /// Register in-memory data under a fresh id that has no key.
    pub fn alloc(&self, bytes: Vec<u8>) -> AssetId {
        let id = self
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_id();
        self.allocated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(bytes));
        id
    }

    pub async fn get_data(&self, id: AssetId) -> Result<AssetData, SlyeRuntimeError> {
        let allocated = self
            .allocated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned();
        if let Some(data) = allocated {
            return Ok(data);
        }

        let key = self.key(id).ok_or_else(|| {
            SlyeRuntimeError::NotFound(format!("asset {id} of {}", self.owner))
        })?;
        let owner = self.owner.clone();
        let fetcher = self.fetcher.clone();
        self.data
            .get_or_try_insert_with(id, async move {
                log::debug!("Fetching asset `{key}` of `{owner}`");
                Ok(Arc::new(fetcher.fetch(&owner, &key).await?))
            })
            .await
    }

    /// Shorthand for `load` followed by `get_data`.
    pub async fn load_data(&self, key: &str) -> Result<AssetData, SlyeRuntimeError> {
        let id = self.load(key);
        self.get_data(id).await
    }
}

/// Fetcher that serves assets from memory, keyed by `(owner, key)`.
#[derive(Debug, Default, Clone)]
pub struct MemoryFetch {
    assets: HashMap<(String, String), Vec<u8>>,
}

impl MemoryFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, owner: &str, key: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.assets
            .insert((owner.to_string(), key.to_string()), bytes.into());
        self
    }
}

#[async_trait]
impl AssetFetch for MemoryFetch {
    async fn fetch(&self, owner: &str, key: &str) -> Result<Vec<u8>, SlyeRuntimeError> {
        self.assets
            .get(&(owner.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| SlyeRuntimeError::NotFound(format!("asset `{key}` of `{owner}`")))
    }
}
