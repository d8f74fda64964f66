use crate::ProllyStorageError;

use super::Encoder;
use async_trait::async_trait;
use prolly_common::ConditionalSync;
use serde::{Serialize, de::DeserializeOwned};

/// The default [`Encoder`]: blocks are written as IPLD-compatible (DAG-)CBOR,
/// which is canonical, so equal blocks always produce equal bytes
#[derive(Clone, Copy, Debug, Default)]
pub struct CborEncoder;

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl Encoder for CborEncoder {
    type Error = ProllyStorageError;

    async fn encode<T>(&self, block: &T) -> Result<Vec<u8>, Self::Error>
    where
        T: Serialize + ConditionalSync,
    {
        serde_ipld_dagcbor::to_vec(block)
            .map_err(|error| ProllyStorageError::EncodeFailed(format!("{error}")))
    }

    async fn decode<T>(&self, bytes: &[u8]) -> Result<T, Self::Error>
    where
        T: DeserializeOwned + ConditionalSync,
    {
        serde_ipld_dagcbor::from_slice::<T>(bytes)
            .map_err(|error| ProllyStorageError::DecodeFailed(format!("{error}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        #[serde(with = "serde_bytes")]
        payload: Vec<u8>,
        count: u32,
    }

    #[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
    async fn it_encodes_deterministically() -> Result<()> {
        let sample = Sample {
            payload: vec![0, 255, 7],
            count: 3,
        };

        let first = CborEncoder.encode(&sample).await?;
        let second = CborEncoder.encode(&sample).await?;
        assert_eq!(first, second);

        let decoded: Sample = CborEncoder.decode(&first).await?;
        assert_eq!(decoded, sample);
        Ok(())
    }

    #[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
    async fn it_reports_undecodable_bytes() -> Result<()> {
        let result = CborEncoder.decode::<Sample>(&[0xff, 0x00, 0x13]).await;
        assert!(matches!(result, Err(ProllyStorageError::DecodeFailed(_))));
        Ok(())
    }
}
