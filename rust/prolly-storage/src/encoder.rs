use async_trait::async_trait;
use prolly_common::ConditionalSync;
use serde::{Serialize, de::DeserializeOwned};

use crate::ProllyStorageError;

mod cbor;
pub use cbor::*;

/// An [Encoder] converts blocks to and from the bytes that are stored and
/// hashed. Implementations must be deterministic: the same block always
/// encodes to the same bytes, otherwise identical content would not share an
/// address.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Encoder: Clone {
    /// The error type produced by this [Encoder]
    type Error: Into<ProllyStorageError>;

    /// Encode a serializable block into bytes
    async fn encode<T>(&self, block: &T) -> Result<Vec<u8>, Self::Error>
    where
        T: Serialize + ConditionalSync;

    /// Decode bytes into some deserializable type
    async fn decode<T>(&self, bytes: &[u8]) -> Result<T, Self::Error>
    where
        T: DeserializeOwned + ConditionalSync;
}
