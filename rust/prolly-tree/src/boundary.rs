use prolly_common::HashAlgorithm;
use serde::{Deserialize, Serialize};

use crate::ProllyTreeError;

/// Decides whether an entry closes the node it belongs to.
///
/// The decision depends only on the entry's key, the level it sits at and
/// the hash algorithm, so the same keys produce the same node boundaries no
/// matter in which order they were inserted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BoundaryChecker {
    /// Hash `level || key`, read the first eight digest bytes as a
    /// little-endian integer and compare its low `bits` bits with `pattern`.
    /// A boundary occurs on average once every `2^bits` entries.
    ProllyV1 {
        /// Number of low bits compared
        bits: u32,
        /// The value those bits must equal
        pattern: u64,
    },
}

impl BoundaryChecker {
    /// The widest mask that may be configured
    pub const MAX_BITS: u32 = 32;

    /// A checker whose expected chunk length is the power of two closest to
    /// (and not above) `target_fanout`
    pub fn for_fanout(target_fanout: usize) -> Self {
        let bits = target_fanout.max(1).ilog2().min(Self::MAX_BITS);
        BoundaryChecker::ProllyV1 { bits, pattern: 0 }
    }

    /// Whether the entry with `key` at `level` ends its node
    pub fn is_boundary(&self, hash_algorithm: HashAlgorithm, level: u32, key: &[u8]) -> bool {
        match self {
            BoundaryChecker::ProllyV1 { bits, pattern } => {
                let level = level.to_le_bytes();
                let digest = hash_algorithm.digest_parts(&[level.as_slice(), key]);
                let mut prefix = [0u8; 8];
                prefix.copy_from_slice(&digest.bytes()[..8]);
                let mask = (1u64 << bits) - 1;
                (u64::from_le_bytes(prefix) & mask) == *pattern
            }
        }
    }

    /// Reject masks that are too wide or patterns that can never match
    pub fn validate(&self) -> Result<(), ProllyTreeError> {
        match self {
            BoundaryChecker::ProllyV1 { bits, pattern } => {
                if *bits > Self::MAX_BITS {
                    return Err(ProllyTreeError::InvalidConfiguration(format!(
                        "Boundary bits must be at most {}, got {bits}",
                        Self::MAX_BITS
                    )));
                }
                if *pattern >= 1u64 << bits {
                    return Err(ProllyTreeError::InvalidConfiguration(format!(
                        "Boundary pattern {pattern} does not fit in {bits} bits"
                    )));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_tunes_the_mask_to_the_fanout() {
        assert_eq!(
            BoundaryChecker::for_fanout(32),
            BoundaryChecker::ProllyV1 {
                bits: 5,
                pattern: 0
            }
        );
        assert_eq!(
            BoundaryChecker::for_fanout(48),
            BoundaryChecker::ProllyV1 {
                bits: 5,
                pattern: 0
            }
        );
        assert_eq!(
            BoundaryChecker::for_fanout(2),
            BoundaryChecker::ProllyV1 {
                bits: 1,
                pattern: 0
            }
        );
    }

    #[test]
    fn it_treats_every_key_as_a_boundary_with_an_empty_mask() {
        let checker = BoundaryChecker::ProllyV1 {
            bits: 0,
            pattern: 0,
        };
        for key in [b"a".as_slice(), b"b", b"zzz"] {
            assert!(checker.is_boundary(HashAlgorithm::Blake3, 0, key));
        }
    }

    #[test]
    fn it_splits_keys_between_complementary_patterns() {
        let zero = BoundaryChecker::ProllyV1 {
            bits: 1,
            pattern: 0,
        };
        let one = BoundaryChecker::ProllyV1 {
            bits: 1,
            pattern: 1,
        };
        for index in 0..64u32 {
            let key = format!("key{index}");
            assert_ne!(
                zero.is_boundary(HashAlgorithm::Blake3, 0, key.as_bytes()),
                one.is_boundary(HashAlgorithm::Blake3, 0, key.as_bytes())
            );
        }
    }

    #[test]
    fn it_produces_boundaries_at_roughly_the_expected_rate() {
        let checker = BoundaryChecker::for_fanout(16);
        let boundaries = (0..4096u32)
            .filter(|index| checker.is_boundary(HashAlgorithm::Sha256, 0, &index.to_be_bytes()))
            .count();

        // Expect 256; allow a wide margin
        assert!((128..512).contains(&boundaries), "{boundaries}");
    }

    #[test]
    fn it_rejects_patterns_wider_than_the_mask() {
        let checker = BoundaryChecker::ProllyV1 {
            bits: 2,
            pattern: 4,
        };
        assert!(checker.validate().is_err());
        assert!(
            BoundaryChecker::ProllyV1 {
                bits: 33,
                pattern: 0
            }
            .validate()
            .is_err()
        );
    }
}
