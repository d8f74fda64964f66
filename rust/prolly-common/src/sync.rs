//! Bounds that let the same async code compile for native targets, where
//! storage handles are shared across threads, and for `wasm32`, where futures
//! are never `Send`.
//!
//! Natively [`ConditionalSend`] means `Send` and [`ConditionalSync`] means
//! `Send + Sync`. On `wasm32` both are satisfied by every type.

#[cfg(not(target_arch = "wasm32"))]
mod bounds {
    /// `Send` on native targets.
    pub trait ConditionalSend: Send {}
    impl<T: Send> ConditionalSend for T {}

    /// `Send + Sync` on native targets.
    pub trait ConditionalSync: Send + Sync {}
    impl<T: Send + Sync> ConditionalSync for T {}
}

#[cfg(target_arch = "wasm32")]
mod bounds {
    /// No bound on `wasm32`.
    pub trait ConditionalSend {}
    impl<T> ConditionalSend for T {}

    /// No bound on `wasm32`.
    pub trait ConditionalSync {}
    impl<T> ConditionalSync for T {}
}

pub use bounds::*;
