use serde::{Deserialize, Serialize};

use crate::ValueRef;

/// A key/value pair as stored in a segment (leaf) node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// The key, ordered byte-wise
    #[serde(with = "serde_bytes")]
    pub key: Vec<u8>,
    /// The value, either inline or as a list of chunk addresses
    pub value: ValueRef,
}

impl Entry {
    /// Create a new [`Entry`]
    pub fn new(key: Vec<u8>, value: ValueRef) -> Self {
        Entry { key, value }
    }
}
