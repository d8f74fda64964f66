#![warn(missing_docs)]

//! This crate contains a generalized API for constructing content addressed
//! storage from different backends and encoding schemes.
//!
//! In order to use it, first select or implement an [Encoder], and then select
//! or implement a [StorageBackend]. When you have selected these things, you
//! can construct a [Storage]:
//!
//! ```rust
//! use prolly_common::{Address, HashAlgorithm};
//! use prolly_storage::{CborEncoder, MemoryStorageBackend, Storage};
//!
//! // Blocks are keyed by their content address and stored as raw bytes
//! let backend = MemoryStorageBackend::<Address, Vec<u8>>::default();
//!
//! // Combine an encoder and a backend into a Storage instance that derives
//! // addresses with SHA-256 rather than the default BLAKE3
//! let storage = Storage::new(CborEncoder, backend).with_hash_algorithm(HashAlgorithm::Sha256);
//! ```
//!
//! The prepared `storage` implements [ContentAddressedStorage], which is what
//! the tree crate consumes.

mod encoder;
pub use encoder::*;

mod error;
pub use error::*;

mod storage;
pub use storage::*;

#[cfg(any(test, feature = "helpers"))]
mod helpers;
#[cfg(any(test, feature = "helpers"))]
pub use helpers::*;
