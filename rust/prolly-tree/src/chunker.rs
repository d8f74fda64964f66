use nonempty::NonEmpty;
use prolly_common::HashAlgorithm;

use crate::{Block, Entry, Node, ProllyTreeError, Reference, TreeDefinition};

/// Something that can be grouped into the nodes of one tree level: leaf
/// [`Entry`]s at level 0 and branch [`Reference`]s above.
pub trait Chunkable: Sized {
    /// The key the boundary checker hashes for this item
    fn boundary_key(&self) -> &[u8];

    /// Wrap a group of items in a block at `level`
    fn into_block(level: u32, items: NonEmpty<Self>) -> Block;

    /// Take the items back out of a node that holds this kind of item
    fn from_node(node: Node) -> Result<Vec<Self>, ProllyTreeError>;
}

impl Chunkable for Entry {
    fn boundary_key(&self) -> &[u8] {
        &self.key
    }

    fn into_block(_level: u32, items: NonEmpty<Self>) -> Block {
        Block::segment(items)
    }

    fn from_node(node: Node) -> Result<Vec<Self>, ProllyTreeError> {
        Ok(node.into_entries()?.into())
    }
}

impl Chunkable for Reference {
    fn boundary_key(&self) -> &[u8] {
        self.upper_bound()
    }

    fn into_block(level: u32, items: NonEmpty<Self>) -> Block {
        Block::branch(level, items)
    }

    fn from_node(node: Node) -> Result<Vec<Self>, ProllyTreeError> {
        Ok(node.into_references()?.into())
    }
}

/// The result of grouping one level's items
#[derive(Debug)]
pub struct Chunks<T> {
    /// Groups in key order; every group is non-empty
    pub groups: Vec<Vec<T>>,
    /// Whether the last group was closed by a boundary or by the size cap.
    /// When it was not, items to its right could still extend it.
    pub settled: bool,
}

impl<T> Chunks<T> {
    /// Number of groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether there are no groups at all
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Partitions an ordered sequence into node-sized groups
#[derive(Clone, Copy, Debug)]
pub struct Chunker<'a> {
    definition: &'a TreeDefinition,
    hash_algorithm: HashAlgorithm,
}

impl<'a> Chunker<'a> {
    /// Create a new [`Chunker`]
    pub fn new(definition: &'a TreeDefinition, hash_algorithm: HashAlgorithm) -> Self {
        Self {
            definition,
            hash_algorithm,
        }
    }

    /// Whether the item keyed by `key` closes its node at `level`
    pub fn is_boundary(&self, level: u32, key: &[u8]) -> bool {
        self.definition
            .boundary_checker
            .is_boundary(self.hash_algorithm, level, key)
    }

    /// Group `items` (which must be in ascending key order) for `level`.
    ///
    /// A group closes after an item that is a boundary once it holds at
    /// least the level minimum, or unconditionally at the maximum fanout. A
    /// trailing group below the minimum is folded into its predecessor, and
    /// the two are split in halves if that would exceed the maximum.
    pub fn chunk<T: Chunkable>(&self, level: u32, items: Vec<T>) -> Chunks<T> {
        let minimum = self.definition.min_fanout_at(level);
        let maximum = self.definition.max_fanout();

        let mut groups: Vec<Vec<T>> = Vec::new();
        let mut current: Vec<T> = Vec::new();

        for item in items {
            let closes =
                current.len() + 1 >= minimum && self.is_boundary(level, item.boundary_key());
            current.push(item);

            if closes || current.len() >= maximum {
                groups.push(std::mem::take(&mut current));
            }
        }

        if current.is_empty() {
            return Chunks {
                groups,
                settled: true,
            };
        }

        if current.len() < minimum
            && let Some(mut previous) = groups.pop()
        {
            previous.append(&mut current);
            if previous.len() > maximum {
                let right = previous.split_off(previous.len() / 2);
                groups.push(previous);
                groups.push(right);
            } else {
                groups.push(previous);
            }
        } else {
            groups.push(current);
        }

        Chunks {
            groups,
            settled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoundaryChecker, TreeConfig, ValueRef};
    use pretty_assertions::assert_eq;

    fn entries(count: usize) -> Vec<Entry> {
        (0..count)
            .map(|index| {
                Entry::new(
                    format!("key{index:05}").into_bytes(),
                    ValueRef::Inline(vec![index as u8]),
                )
            })
            .collect()
    }

    fn sizes<T>(chunks: &Chunks<T>) -> Vec<usize> {
        chunks.groups.iter().map(Vec::len).collect()
    }

    #[test]
    fn it_yields_no_groups_for_no_items() {
        let config = TreeConfig::default();
        let chunker = Chunker::new(&config.tree_definition, config.hash_algorithm);
        let chunks = chunker.chunk::<Entry>(0, vec![]);

        assert!(chunks.is_empty());
        assert!(chunks.settled);
    }

    #[test]
    fn it_closes_every_group_when_every_key_is_a_boundary() {
        let config = TreeConfig::default()
            .with_fanout(4, 2)
            .with_boundary_checker(BoundaryChecker::ProllyV1 {
                bits: 0,
                pattern: 0,
            });
        let chunker = Chunker::new(&config.tree_definition, config.hash_algorithm);
        let chunks = chunker.chunk(0, entries(7));

        // Pairs, with the odd one out folded into the last pair
        assert_eq!(sizes(&chunks), vec![2, 2, 3]);
        assert!(!chunks.settled);

        let chunks = chunker.chunk(0, entries(6));
        assert_eq!(sizes(&chunks), vec![2, 2, 2]);
        assert!(chunks.settled);
    }

    #[test]
    fn it_force_closes_groups_at_the_maximum_fanout() {
        // A 32 bit pattern practically never matches
        let config = TreeConfig::default()
            .with_fanout(4, 1)
            .with_boundary_checker(BoundaryChecker::ProllyV1 {
                bits: 32,
                pattern: u32::MAX as u64,
            });
        let chunker = Chunker::new(&config.tree_definition, config.hash_algorithm);
        let chunks = chunker.chunk(0, entries(24));

        assert_eq!(sizes(&chunks), vec![8, 8, 8]);
        assert!(chunks.settled);
    }

    #[test]
    fn it_splits_an_oversized_trailing_merge_in_halves() {
        let config = TreeConfig::default()
            .with_fanout(2, 2)
            .with_boundary_checker(BoundaryChecker::ProllyV1 {
                bits: 32,
                pattern: u32::MAX as u64,
            });
        let chunker = Chunker::new(&config.tree_definition, config.hash_algorithm);
        let chunks = chunker.chunk(0, entries(5));

        // 4 (forced) + 1 would be 5 > 4, so the five are split 2 / 3
        assert_eq!(sizes(&chunks), vec![2, 3]);
    }

    #[test]
    fn it_keeps_every_group_within_bounds() {
        let config = TreeConfig::default().with_fanout(8, 3);
        let chunker = Chunker::new(&config.tree_definition, config.hash_algorithm);
        let chunks = chunker.chunk(0, entries(1000));

        assert_eq!(chunks.groups.iter().map(Vec::len).sum::<usize>(), 1000);
        for group in &chunks.groups {
            assert!((3..=16).contains(&group.len()), "{}", group.len());
        }
    }

    #[test]
    fn it_salts_boundaries_with_the_level() {
        let config = TreeConfig::default().with_fanout(4, 1);
        let chunker = Chunker::new(&config.tree_definition, config.hash_algorithm);
        let keys = entries(256);
        let differing = keys
            .iter()
            .filter(|entry| {
                chunker.is_boundary(0, &entry.key) != chunker.is_boundary(1, &entry.key)
            })
            .count();

        assert!(differing > 0);
    }
}
