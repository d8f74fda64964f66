use anyhow::Result;
use prolly_common::Address;

use crate::{CborEncoder, MemoryStorageBackend, Storage};

#[cfg(not(target_arch = "wasm32"))]
use crate::FileSystemStorageBackend;

/// The in-memory [`Storage`] most tests build trees on
pub type MemoryStorage = Storage<CborEncoder, MemoryStorageBackend<Address, Vec<u8>>>;

/// Creates a fresh, empty [`MemoryStorage`]
pub fn make_memory_storage() -> MemoryStorage {
    Storage::new(CborEncoder, MemoryStorageBackend::default())
}

/// Creates a persisted [`StorageBackend`](crate::StorageBackend) rooted in a
/// temporary directory, for use in tests. The directory is removed when the
/// returned guard is dropped.
#[cfg(not(target_arch = "wasm32"))]
pub async fn make_target_storage()
-> Result<(FileSystemStorageBackend<Address, Vec<u8>>, tempfile::TempDir)> {
    let root = tempfile::tempdir()?;
    let storage = FileSystemStorageBackend::<Address, Vec<u8>>::new(root.path()).await?;
    Ok((storage, root))
}
