use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug)]
pub enum ProllyStorageError {
    /// An error that occurs during block encoding
    #[error("Failed to encode a block: {0}")]
    EncodeFailed(String),

    /// An error that occurs during block decoding
    #[error("Failed to decode a block: {0}")]
    DecodeFailed(String),

    /// An error that occurs when working with a storage backend
    #[error("Storage backend error: {0}")]
    StorageBackend(String),

    /// Bytes read from a backend did not hash to the address they were
    /// requested by
    #[error("Block failed verification: {0}")]
    Verification(String),
}
