use std::fmt::Display;

use prolly_common::Address;
use serde::{Deserialize, Serialize};

/// A branch's pointer to one child: the child's address and the largest key
/// reachable through it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(with = "serde_bytes")]
    upper_bound: Vec<u8>,
    address: Address,
}

impl Reference {
    /// Create a new [`Reference`]
    pub fn new(upper_bound: Vec<u8>, address: Address) -> Self {
        Self {
            upper_bound,
            address,
        }
    }

    /// The largest key in the referenced subtree
    pub fn upper_bound(&self) -> &[u8] {
        &self.upper_bound
    }

    /// The address of the referenced node's block
    pub fn address(&self) -> &Address {
        &self.address
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address)
    }
}
