#![warn(missing_docs)]

//! This crate constitutes a library of light weight helpers that are shared
//! by the storage and tree crates: cross-target `Send`/`Sync` bounds and the
//! content [`Address`] type together with the [`HashAlgorithm`]s able to
//! produce one.

mod sync;
pub use sync::*;

mod hash;
pub use hash::*;

/// Deterministic data generators for benches and tests
#[cfg(any(test, feature = "helpers"))]
pub mod helpers;
