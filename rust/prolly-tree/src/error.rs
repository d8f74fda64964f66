use prolly_storage::ProllyStorageError;
use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug)]
pub enum ProllyTreeError {
    /// There was an attempt to access the tree in an incorrect way
    #[error("Incorrect tree access: {0}")]
    IncorrectTreeAccess(String),

    /// A node would violate the tree's structural invariants if written
    #[error("Invalid tree construction: {0}")]
    InvalidConstruction(String),

    /// There was a problem when accessing storage
    #[error("Storage error: {0}")]
    Storage(ProllyStorageError),

    /// A required block is missing from storage
    #[error("Block not found in storage: {0}")]
    MissingBlock(String),

    /// The tree did not match the expected shape
    #[error("Tree did not match expected shape: {0}")]
    UnexpectedTreeShape(String),

    /// A [`TreeConfig`](crate::TreeConfig) was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<ProllyStorageError> for ProllyTreeError {
    fn from(value: ProllyStorageError) -> Self {
        ProllyTreeError::Storage(value)
    }
}
