#![warn(missing_docs)]

//! This crate provides an ordered key-value store implemented as a Prolly
//! Tree on top of a content-addressed block store. Node boundaries are
//! derived from the keys themselves, so the same entries produce the same
//! blocks regardless of the order in which they were written. Versions of a
//! tree therefore share most of their blocks, which makes diffing and
//! three-way merging cheap.
//!
//! In order to use it, first construct a [`prolly_storage::Storage`] and then
//! initialize a [`Tree`] with it:
//!
//! ```rust
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use prolly_common::Address;
//! use prolly_storage::{CborEncoder, MemoryStorageBackend, Storage};
//! use prolly_tree::Tree;
//!
//! let storage = Storage::new(CborEncoder, MemoryStorageBackend::<Address, Vec<u8>>::default());
//!
//! // Trees are immutable: every write returns a new tree
//! let empty = Tree::create(storage);
//! let tree = empty.put(vec![1, 2, 3], vec![4, 5, 6]).await?.tree;
//!
//! assert_eq!(tree.get(&[1, 2, 3]).await?, Some(vec![4, 5, 6]));
//! assert!(empty.is_empty());
//!
//! // The root address identifies this exact set of entries
//! println!("{:?}", tree.hash());
//! # Ok(())
//! # }
//! ```

mod boundary;
pub use boundary::*;

mod block;
pub use block::*;

mod chunker;
pub use chunker::*;

mod config;
pub use config::*;

mod cursor;
pub use cursor::*;

mod entry;
pub use entry::*;

mod error;
pub use error::*;

mod manager;
pub use manager::*;

mod merge;
pub use merge::*;

mod node;
pub use node::*;

mod reference;
pub use reference::*;

mod traversal;
pub use traversal::*;

mod tree;
pub use tree::*;

mod value;
pub use value::*;

/// Structural differences between trees, used to find the entries that
/// changed from one version to another without visiting shared subtrees.
pub mod differential;
pub use differential::*;
