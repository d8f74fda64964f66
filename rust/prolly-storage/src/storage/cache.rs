use std::{hash::Hash, sync::Arc};

use async_trait::async_trait;
use prolly_common::ConditionalSync;
use sieve_cache::SieveCache;
use tokio::sync::Mutex;

use super::StorageBackend;
use crate::ProllyStorageError;

/// Read-through cache in front of a [StorageBackend].
///
/// Every write lands in both the cache and the wrapped backend. Reads try
/// the cache first and remember whatever the backend returns. Blocks are
/// immutable once written, so nothing is ever invalidated; the [SieveCache]
/// only evicts to stay within its capacity.
#[derive(Clone)]
pub struct StorageCache<Backend>
where
    Backend: StorageBackend,
    Backend::Key: Eq + Clone + Hash,
    Backend::Value: Clone,
{
    inner: Backend,
    recent: Arc<Mutex<SieveCache<Backend::Key, Backend::Value>>>,
}

impl<Backend> StorageCache<Backend>
where
    Backend: StorageBackend,
    Backend::Key: Eq + Clone + Hash,
    Backend::Value: Clone,
{
    /// Front `backend` with a cache holding at most `capacity` blocks.
    /// A zero capacity is rejected.
    pub fn new(backend: Backend, capacity: usize) -> Result<Self, ProllyStorageError> {
        let recent = SieveCache::new(capacity).map_err(|error| {
            ProllyStorageError::StorageBackend(format!("Could not initialize cache: {error}"))
        })?;

        Ok(Self {
            inner: backend,
            recent: Arc::new(Mutex::new(recent)),
        })
    }

    /// The wrapped [StorageBackend]
    pub fn inner(&self) -> &Backend {
        &self.inner
    }

    async fn remember(&self, key: Backend::Key, value: Backend::Value) {
        self.recent.lock().await.insert(key, value);
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Backend> StorageBackend for StorageCache<Backend>
where
    Backend: StorageBackend + ConditionalSync,
    Backend::Key: Eq + Clone + Hash + ConditionalSync,
    Backend::Value: Clone + ConditionalSync,
{
    type Key = Backend::Key;
    type Value = Backend::Value;
    type Error = Backend::Error;

    async fn set(&self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error> {
        self.remember(key.clone(), value.clone()).await;
        self.inner.set(key, value).await
    }

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error> {
        let hit = self.recent.lock().await.get(key).cloned();
        if hit.is_some() {
            return Ok(hit);
        }

        let fetched = self.inner.get(key).await?;
        if let Some(value) = &fetched {
            self.remember(key.clone(), value.clone()).await;
        }
        Ok(fetched)
    }
}
