use std::{collections::HashMap, hash::Hash, sync::Arc};

use async_trait::async_trait;
use prolly_common::ConditionalSync;
use tokio::sync::RwLock;

use crate::ProllyStorageError;

use super::StorageBackend;

/// A trivial implementation of [StorageBackend] - backed by a [HashMap] - where
/// all values are kept in memory and never persisted.
///
/// Clones share the same map, so concurrent readers never block each other
/// and racing writes of identical content are harmless.
#[derive(Clone)]
pub struct MemoryStorageBackend<Key, Value>
where
    Key: Eq + Hash,
    Value: Clone,
{
    entries: Arc<RwLock<HashMap<Key, Value>>>,
}

impl<Key, Value> Default for MemoryStorageBackend<Key, Value>
where
    Key: Eq + Hash,
    Value: Clone,
{
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<Key, Value> MemoryStorageBackend<Key, Value>
where
    Key: Eq + Hash,
    Value: Clone,
{
    /// The number of values currently held
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether no values are held at all
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Key, Value> StorageBackend for MemoryStorageBackend<Key, Value>
where
    Key: Clone + Eq + Hash + ConditionalSync,
    Value: Clone + ConditionalSync,
{
    type Key = Key;
    type Value = Value;
    type Error = ProllyStorageError;

    async fn set(&self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error> {
        let mut entries = self.entries.write().await;
        entries.insert(key, value);
        Ok(())
    }

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }
}
