use async_trait::async_trait;
use prolly_common::ConditionalSync;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use super::StorageBackend;

#[derive(Default)]
struct Counters {
    reads: AtomicUsize,
    writes: AtomicUsize,
    bytes_read: AtomicUsize,
    bytes_written: AtomicUsize,
}

/// A point-in-time copy of the counters kept by a [MeasuredStorageBackend]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Measurements {
    /// Calls to `get`, including ones that found nothing
    pub reads: usize,
    /// Calls to `set`
    pub writes: usize,
    /// Total size of the blocks returned by `get`
    pub bytes_read: usize,
    /// Total size of the blocks passed to `set`
    pub bytes_written: usize,
}

/// Proxies a [StorageBackend] and counts the blocks (and bytes) that move
/// through it. Clones share their counters, so a clone handed to a
/// [crate::Storage] can be inspected through the original.
#[derive(Clone)]
pub struct MeasuredStorageBackend<Backend>
where
    Backend: StorageBackend,
{
    backend: Backend,
    counters: Arc<Counters>,
}

impl<Backend> MeasuredStorageBackend<Backend>
where
    Backend: StorageBackend,
{
    /// Start measuring traffic to `backend`
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            counters: Arc::default(),
        }
    }

    /// Number of reads since creation or the last [Self::reset]
    pub fn reads(&self) -> usize {
        self.counters.reads.load(Ordering::Relaxed)
    }

    /// Number of writes since creation or the last [Self::reset]
    pub fn writes(&self) -> usize {
        self.counters.writes.load(Ordering::Relaxed)
    }

    /// Every counter at once
    pub fn measurements(&self) -> Measurements {
        let counters = &self.counters;
        Measurements {
            reads: counters.reads.load(Ordering::Relaxed),
            writes: counters.writes.load(Ordering::Relaxed),
            bytes_read: counters.bytes_read.load(Ordering::Relaxed),
            bytes_written: counters.bytes_written.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        for counter in [
            &self.counters.reads,
            &self.counters.writes,
            &self.counters.bytes_read,
            &self.counters.bytes_written,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Backend> StorageBackend for MeasuredStorageBackend<Backend>
where
    Backend: StorageBackend + ConditionalSync,
    Backend::Value: AsRef<[u8]>,
{
    type Key = Backend::Key;
    type Value = Backend::Value;
    type Error = Backend::Error;

    async fn set(&self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error> {
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_written
            .fetch_add(value.as_ref().len(), Ordering::Relaxed);
        self.backend.set(key, value).await
    }

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error> {
        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        let value = self.backend.get(key).await?;
        if let Some(value) = &value {
            self.counters
                .bytes_read
                .fetch_add(value.as_ref().len(), Ordering::Relaxed);
        }
        Ok(value)
    }
}
