use prolly_common::HashAlgorithm;
use serde::{Deserialize, Serialize};

use crate::{BoundaryChecker, ProllyTreeError};

/// Default number of entries per node the chunker aims for
pub const DEFAULT_TARGET_FANOUT: usize = 32;

/// Default lower bound on entries in any non-root node
pub const DEFAULT_MIN_FANOUT: usize = 8;

/// Everything that determines the shape of a tree. Two trees only share
/// structure (and can only be merged) when their configurations are equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeConfig {
    /// The hash function used for block addresses, boundary detection and
    /// value chunk addresses
    pub hash_algorithm: HashAlgorithm,
    /// Node sizing and boundary detection
    pub tree_definition: TreeDefinition,
    /// How large values are split out of leaves
    pub value_chunking: ValueChunking,
}

/// Parameters that decide how entries are grouped into nodes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeDefinition {
    /// The fanout the boundary checker is tuned for. No node ever holds more
    /// than twice this many entries.
    pub target_fanout: usize,
    /// Minimum entries in a non-root leaf. Branches use at least two.
    pub min_fanout: usize,
    /// Decides which entries end a node
    pub boundary_checker: BoundaryChecker,
}

impl Default for TreeDefinition {
    fn default() -> Self {
        Self {
            target_fanout: DEFAULT_TARGET_FANOUT,
            min_fanout: DEFAULT_MIN_FANOUT,
            boundary_checker: BoundaryChecker::for_fanout(DEFAULT_TARGET_FANOUT),
        }
    }
}

impl TreeDefinition {
    /// The largest number of entries a node may hold
    pub fn max_fanout(&self) -> usize {
        self.target_fanout * 2
    }

    /// The smallest number of entries a non-root node at `level` may hold
    pub fn min_fanout_at(&self, level: u32) -> usize {
        if level == 0 {
            self.min_fanout
        } else {
            self.min_fanout.max(2)
        }
    }
}

/// The algorithm used to cut large values into chunks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkingStrategy {
    /// Gear rolling hash; cut points follow content, so an edit in the
    /// middle of a value only changes nearby chunks
    #[default]
    ContentDefined,
    /// Cut every `avg_chunk_size` bytes
    Fixed,
}

/// Parameters for splitting values that are too large to be stored inline
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueChunking {
    /// How cut points are chosen
    pub chunking_strategy: ChunkingStrategy,
    /// No chunk (except a value's last) is smaller than this
    pub min_chunk_size: usize,
    /// The chunk size content-defined chunking aims for
    pub avg_chunk_size: usize,
    /// No chunk is larger than this
    pub max_chunk_size: usize,
    /// Values up to this many bytes are stored directly in their leaf
    pub max_inline_value_size: usize,
}

impl Default for ValueChunking {
    fn default() -> Self {
        Self {
            chunking_strategy: ChunkingStrategy::ContentDefined,
            min_chunk_size: 4 * 1024,
            avg_chunk_size: 16 * 1024,
            max_chunk_size: 64 * 1024,
            max_inline_value_size: 1024,
        }
    }
}

impl TreeConfig {
    /// Use `hash_algorithm` for addresses and boundaries
    pub fn with_hash_algorithm(mut self, hash_algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = hash_algorithm;
        self
    }

    /// Size nodes around `target_fanout` entries, never fewer than
    /// `min_fanout` outside the root. The boundary checker is retuned to the
    /// new target.
    pub fn with_fanout(mut self, target_fanout: usize, min_fanout: usize) -> Self {
        self.tree_definition = TreeDefinition {
            target_fanout,
            min_fanout,
            boundary_checker: BoundaryChecker::for_fanout(target_fanout),
        };
        self
    }

    /// Replace the boundary checker, keeping fanout limits
    pub fn with_boundary_checker(mut self, boundary_checker: BoundaryChecker) -> Self {
        self.tree_definition.boundary_checker = boundary_checker;
        self
    }

    /// Replace the value chunking parameters
    pub fn with_value_chunking(mut self, value_chunking: ValueChunking) -> Self {
        self.value_chunking = value_chunking;
        self
    }

    /// Reject configurations that cannot produce a valid tree
    pub fn validate(&self) -> Result<(), ProllyTreeError> {
        let definition = &self.tree_definition;
        if definition.target_fanout < 2 {
            return Err(ProllyTreeError::InvalidConfiguration(format!(
                "targetFanout must be at least 2, got {}",
                definition.target_fanout
            )));
        }
        if definition.min_fanout == 0 || definition.min_fanout > definition.target_fanout {
            return Err(ProllyTreeError::InvalidConfiguration(format!(
                "minFanout must be between 1 and targetFanout ({}), got {}",
                definition.target_fanout, definition.min_fanout
            )));
        }
        definition.boundary_checker.validate()?;

        let chunking = &self.value_chunking;
        if chunking.min_chunk_size == 0
            || chunking.min_chunk_size > chunking.avg_chunk_size
            || chunking.avg_chunk_size > chunking.max_chunk_size
        {
            return Err(ProllyTreeError::InvalidConfiguration(format!(
                "Chunk sizes must satisfy 0 < min ({}) <= avg ({}) <= max ({})",
                chunking.min_chunk_size, chunking.avg_chunk_size, chunking.max_chunk_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_accepts_the_default_configuration() -> Result<()> {
        let config = TreeConfig::default();
        config.validate()?;

        assert_eq!(config.tree_definition.target_fanout, 32);
        assert_eq!(config.tree_definition.max_fanout(), 64);
        assert_eq!(config.tree_definition.min_fanout_at(0), 8);
        Ok(())
    }

    #[test]
    fn it_rejects_impossible_fanouts() {
        for (target, min) in [(1, 1), (4, 0), (4, 5)] {
            let config = TreeConfig::default().with_fanout(target, min);
            assert!(matches!(
                config.validate(),
                Err(ProllyTreeError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn it_keeps_branches_at_least_binary() {
        let config = TreeConfig::default().with_fanout(2, 1);
        assert_eq!(config.tree_definition.min_fanout_at(0), 1);
        assert_eq!(config.tree_definition.min_fanout_at(3), 2);
    }

    #[test]
    fn it_rejects_unordered_chunk_sizes() {
        let config = TreeConfig::default().with_value_chunking(ValueChunking {
            min_chunk_size: 64,
            avg_chunk_size: 32,
            ..ValueChunking::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn it_round_trips_through_json() -> Result<()> {
        let config = TreeConfig::default()
            .with_hash_algorithm(HashAlgorithm::Sha256)
            .with_fanout(16, 4);
        let json = serde_json::to_string(&config)?;

        assert!(json.contains("\"hashAlgorithm\":\"sha256\""));
        assert!(json.contains("\"targetFanout\":16"));
        assert_eq!(serde_json::from_str::<TreeConfig>(&json)?, config);
        Ok(())
    }
}
