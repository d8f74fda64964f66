use std::{fmt, str::FromStr};

use base58::{FromBase58, ToBase58};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// The size of every [`Address`] in bytes. Both supported [`HashAlgorithm`]s
/// produce 256-bit digests.
pub const ADDRESS_SIZE: usize = 32;

/// Errors produced when interpreting external input as an [`Address`]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    /// The input was not valid base58
    #[error("Address is not valid base58: {0}")]
    Encoding(String),

    /// The decoded input had the wrong length
    #[error("Address must be {ADDRESS_SIZE} bytes, found {0}")]
    Length(usize),
}

/// A content address: the digest of a block's encoded bytes.
///
/// Addresses are opaque, compared by byte equality and rendered as base58
/// (prefixed with `#`) for display. They serialize as a single byte string
/// so that they stay compact inside encoded nodes.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// The raw digest bytes
    pub fn bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Interpret a slice as an [`Address`], failing if it is not exactly
    /// [`ADDRESS_SIZE`] bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        let digest: [u8; ADDRESS_SIZE] = bytes
            .try_into()
            .map_err(|_| AddressError::Length(bytes.len()))?;
        Ok(Self(digest))
    }

    /// A short form suitable for log lines
    pub fn abbreviate(&self) -> String {
        format!("#{}...", self.0[0..6].to_base58())
    }
}

impl From<[u8; ADDRESS_SIZE]> for Address {
    fn from(value: [u8; ADDRESS_SIZE]) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0.to_base58())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let encoded = value.strip_prefix('#').unwrap_or(value);
        let bytes = encoded
            .from_base58()
            .map_err(|error| AddressError::Encoding(format!("{error:?}")))?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = serde_bytes::ByteBuf::deserialize(deserializer)?;
        Address::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// The hash functions that may be used to derive an [`Address`] from bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// BLAKE3 with its default 256-bit output
    #[default]
    Blake3,
    /// SHA-256
    Sha256,
}

impl HashAlgorithm {
    /// Hash `bytes`, producing their [`Address`]
    pub fn digest(&self, bytes: &[u8]) -> Address {
        match self {
            HashAlgorithm::Blake3 => Address(*blake3::hash(bytes).as_bytes()),
            HashAlgorithm::Sha256 => sha256_address(&Sha256::digest(bytes)),
        }
    }

    /// Hash the concatenation of `parts` without allocating it
    pub fn digest_parts(&self, parts: &[&[u8]]) -> Address {
        match self {
            HashAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                for part in parts {
                    hasher.update(part);
                }
                Address(*hasher.finalize().as_bytes())
            }
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                for part in parts {
                    hasher.update(part);
                }
                sha256_address(&hasher.finalize())
            }
        }
    }

    /// The name used for this algorithm in configuration
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Blake3 => "blake3",
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

fn sha256_address(digest: &[u8]) -> Address {
    let mut bytes = [0u8; ADDRESS_SIZE];
    bytes.copy_from_slice(digest);
    Address(bytes)
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_derives_addresses_from_content() {
        let first = HashAlgorithm::Blake3.digest(b"hello world");
        let second = HashAlgorithm::Blake3.digest(b"hello world");
        let other = HashAlgorithm::Sha256.digest(b"hello world");

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first.bytes(), blake3::hash(b"hello world").as_bytes());
    }

    #[test]
    fn it_hashes_parts_like_their_concatenation() {
        for algorithm in [HashAlgorithm::Blake3, HashAlgorithm::Sha256] {
            assert_eq!(
                algorithm.digest_parts(&[
                    b"hello".as_slice(),
                    b" ".as_slice(),
                    b"world".as_slice(),
                ]),
                algorithm.digest(b"hello world")
            );
        }
    }

    #[test]
    fn it_round_trips_addresses_through_base58() {
        let address = HashAlgorithm::Sha256.digest(b"block");
        let rendered = address.to_string();

        assert!(rendered.starts_with('#'));
        assert_eq!(rendered.parse::<Address>(), Ok(address));
    }

    #[test]
    fn it_rejects_addresses_of_the_wrong_length() {
        let short = [1u8, 2, 3].to_base58();

        assert_eq!(short.parse::<Address>(), Err(AddressError::Length(3)));
        assert!(matches!(
            "#not-base58!".parse::<Address>(),
            Err(AddressError::Encoding(_))
        ));
    }

    #[test]
    fn it_names_hash_algorithms_in_configuration() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&HashAlgorithm::Sha256)?, "\"sha256\"");
        assert_eq!(
            serde_json::from_str::<HashAlgorithm>("\"blake3\"")?,
            HashAlgorithm::Blake3
        );
        Ok(())
    }
}
