use async_trait::async_trait;
use prolly_common::{Address, ConditionalSync, HashAlgorithm};
use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;

use crate::{Encoder, ProllyStorageError, Storage, StorageBackend};

/// A [ContentAddressedStorage] is able to store and/or retrieve a value -
/// called a block - by a self-evident, deterministically derivable value: its
/// [Address].
///
/// Writes are idempotent: putting identical bytes twice yields the same
/// address and leaves the store unchanged. Reading an address that was never
/// written is not an error, it yields `None`.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ContentAddressedStorage: Clone + ConditionalSync + 'static {
    /// The [HashAlgorithm] that derives addresses in this store
    fn hash_algorithm(&self) -> HashAlgorithm;

    /// Retrieve the raw bytes stored at `address`
    async fn get(&self, address: &Address) -> Result<Option<Vec<u8>>, ProllyStorageError>;

    /// Store raw bytes and receive their address
    async fn put(&self, bytes: Vec<u8>) -> Result<Address, ProllyStorageError>;

    /// Retrieve and decode a block by its address
    async fn read<T>(&self, address: &Address) -> Result<Option<T>, ProllyStorageError>
    where
        T: DeserializeOwned + ConditionalSync;

    /// Encode and store a block, receiving its address
    async fn write<T>(&self, block: &T) -> Result<Address, ProllyStorageError>
    where
        T: Serialize + ConditionalSync;
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<E, Backend> ContentAddressedStorage for Storage<E, Backend>
where
    E: Encoder + ConditionalSync + 'static,
    Backend: StorageBackend<Key = Address, Value = Vec<u8>> + ConditionalSync + 'static,
{
    fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    async fn get(&self, address: &Address) -> Result<Option<Vec<u8>>, ProllyStorageError> {
        let Some(bytes) = self
            .backend
            .get(address)
            .await
            .map_err(Into::<ProllyStorageError>::into)?
        else {
            return Ok(None);
        };

        if self.verify_reads {
            let actual = self.hash_algorithm.digest(&bytes);
            if actual != *address {
                warn!("Block {} failed verification", address.abbreviate());
                return Err(ProllyStorageError::Verification(format!(
                    "Requested {address} but the stored bytes hash to {actual}"
                )));
            }
        }

        Ok(Some(bytes))
    }

    async fn put(&self, bytes: Vec<u8>) -> Result<Address, ProllyStorageError> {
        let address = self.hash_algorithm.digest(&bytes);
        self.backend
            .set(address, bytes)
            .await
            .map_err(Into::<ProllyStorageError>::into)?;
        Ok(address)
    }

    async fn read<T>(&self, address: &Address) -> Result<Option<T>, ProllyStorageError>
    where
        T: DeserializeOwned + ConditionalSync,
    {
        let Some(encoded_bytes) = self.get(address).await? else {
            return Ok(None);
        };

        Ok(Some(
            self.encoder
                .decode(&encoded_bytes)
                .await
                .map_err(Into::<ProllyStorageError>::into)?,
        ))
    }

    async fn write<T>(&self, block: &T) -> Result<Address, ProllyStorageError>
    where
        T: Serialize + ConditionalSync,
    {
        let encoded_bytes = self
            .encoder
            .encode(block)
            .await
            .map_err(Into::<ProllyStorageError>::into)?;
        self.put(encoded_bytes).await
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        CborEncoder, ContentAddressedStorage, MemoryStorageBackend, Storage, StorageBackend,
    };
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use prolly_common::{Address, HashAlgorithm};
    use serde::{Deserialize, Serialize};

    #[derive(PartialEq, Debug, Serialize, Deserialize)]
    struct TestBlock {
        pub value: u32,
    }

    fn make_storage() -> Storage<CborEncoder, MemoryStorageBackend<Address, Vec<u8>>> {
        Storage::new(CborEncoder, MemoryStorageBackend::default())
    }

    #[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
    async fn it_can_store_and_retrieve_blocks() -> Result<()> {
        let storage = make_storage();
        let block = TestBlock { value: 123 };

        let address = storage.write(&block).await?;
        let read_block: Option<TestBlock> = storage.read(&address).await?;

        assert_eq!(read_block, Some(block));
        Ok(())
    }

    #[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
    async fn it_addresses_raw_bytes_by_their_hash() -> Result<()> {
        let storage = make_storage().with_hash_algorithm(HashAlgorithm::Sha256);

        let address = storage.put(b"some bytes".to_vec()).await?;
        assert_eq!(address, HashAlgorithm::Sha256.digest(b"some bytes"));

        let again = storage.put(b"some bytes".to_vec()).await?;
        assert_eq!(again, address);
        assert_eq!(storage.backend.len().await, 1);

        assert_eq!(storage.get(&address).await?, Some(b"some bytes".to_vec()));
        Ok(())
    }

    #[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
    async fn it_reports_missing_blocks_as_absent() -> Result<()> {
        let storage = make_storage();
        let missing = HashAlgorithm::Blake3.digest(b"never written");

        assert_eq!(storage.get(&missing).await?, None);
        assert_eq!(storage.read::<TestBlock>(&missing).await?, None);
        Ok(())
    }

    #[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
    async fn it_detects_corrupted_blocks_when_verifying() -> Result<()> {
        let storage = make_storage().with_verified_reads();
        let address = storage.write(&TestBlock { value: 1 }).await?;

        storage.backend.set(address, vec![0xde, 0xad]).await?;

        let result = storage.read::<TestBlock>(&address).await;
        assert!(matches!(
            result,
            Err(crate::ProllyStorageError::Verification(_))
        ));
        Ok(())
    }
}
