use nonempty::NonEmpty;
use prolly_common::Address;

use crate::{Block, Entry, ProllyTreeError, Reference};

/// Primary representation of tree nodes.
///
/// A [`Node`] pairs a decoded [`Block`] with the [`Reference`] that points
/// at it. Branches store their children as [`Reference`]s, and segments (leaf
/// nodes) store their key/value [`Entry`]s inline.
#[derive(Clone, Debug)]
pub struct Node {
    block: Block,
    /// A [`Reference`] that points to this [`Node`]s own [`Block`]
    reference: Reference,
}

impl Node {
    /// Pair a block with the address it was stored at
    pub fn new(block: Block, address: Address) -> Self {
        let reference = Reference::new(block.upper_bound().to_vec(), address);
        Node { block, reference }
    }

    /// Whether this node is a branch.
    pub fn is_branch(&self) -> bool {
        self.block.is_branch()
    }

    /// Whether this node is a segment.
    pub fn is_segment(&self) -> bool {
        self.block.is_segment()
    }

    /// Height of this node above the leaves
    pub fn level(&self) -> u32 {
        self.block.level()
    }

    /// Number of entries or children
    pub fn len(&self) -> usize {
        self.block.len()
    }

    /// Always false; nodes are never empty
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The [`Block`] this node was decoded from
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Returns a [`Reference`] for this node.
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// The content address of this node's block
    pub fn address(&self) -> &Address {
        self.reference.address()
    }

    /// The largest key in this node's subtree
    pub fn upper_bound(&self) -> &[u8] {
        self.reference.upper_bound()
    }

    /// Get children data as [`Reference`]s.
    ///
    /// The result is an error if this [`Node`] is a segment.
    pub fn references(&self) -> Result<&NonEmpty<Reference>, ProllyTreeError> {
        self.block.references()
    }

    /// Get children data as [`Entry`]s.
    ///
    /// The result is an error if this [`Node`] is a branch.
    pub fn entries(&self) -> Result<&NonEmpty<Entry>, ProllyTreeError> {
        self.block.entries()
    }

    /// Return all [`Entry`]s from this [`Node`].
    ///
    /// The result is an error if this is not a segment [`Node`].
    pub fn into_entries(self) -> Result<NonEmpty<Entry>, ProllyTreeError> {
        self.block.into_entries()
    }

    /// Return all child [`Reference`]s from this [`Node`].
    ///
    /// The result is an error if this is not a branch [`Node`].
    pub fn into_references(self) -> Result<NonEmpty<Reference>, ProllyTreeError> {
        self.block.into_references()
    }

    /// Index of the child whose subtree may contain `key`: the first child
    /// whose upper bound is `>= key`. `None` when `key` is beyond every child.
    pub fn child_index(&self, key: &[u8]) -> Result<Option<usize>, ProllyTreeError> {
        let references = self.references()?;
        let index = references
            .iter()
            .position(|reference| reference.upper_bound() >= key);
        Ok(index)
    }

    /// Binary search this segment for `key`. `Ok(index)` on a match,
    /// `Err(index)` with the insertion point otherwise.
    pub fn search(&self, key: &[u8]) -> Result<Result<usize, usize>, ProllyTreeError> {
        let entries = self.entries()?;
        let (head, tail) = (&entries.head, &entries.tail);
        Ok(match head.key.as_slice().cmp(key) {
            std::cmp::Ordering::Equal => Ok(0),
            std::cmp::Ordering::Greater => Err(0),
            std::cmp::Ordering::Less => {
                match tail.binary_search_by(|entry| entry.key.as_slice().cmp(key)) {
                    Ok(index) => Ok(index + 1),
                    Err(index) => Err(index + 1),
                }
            }
        })
    }

    /// The entry stored under `key` in this segment, if any
    pub fn entry(&self, key: &[u8]) -> Result<Option<&Entry>, ProllyTreeError> {
        let entries = self.entries()?;
        Ok(match self.search(key)? {
            Ok(index) => entries.get(index),
            Err(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValueRef;
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    fn segment(keys: &[&str]) -> Result<Node> {
        let entries = keys
            .iter()
            .map(|key| Entry::new(key.as_bytes().to_vec(), ValueRef::Inline(vec![1])))
            .collect();
        let entries = NonEmpty::from_vec(entries).ok_or_else(|| anyhow::anyhow!("empty"))?;
        Ok(Node::new(Block::segment(entries), Address::default()))
    }

    #[test]
    fn it_searches_segments() -> Result<()> {
        let node = segment(&["b", "d", "f"])?;

        assert_eq!(node.search(b"a")?, Err(0));
        assert_eq!(node.search(b"b")?, Ok(0));
        assert_eq!(node.search(b"c")?, Err(1));
        assert_eq!(node.search(b"f")?, Ok(2));
        assert_eq!(node.search(b"g")?, Err(3));
        assert!(node.entry(b"d")?.is_some());
        assert!(node.entry(b"e")?.is_none());
        assert_eq!(node.upper_bound(), b"f");
        Ok(())
    }

    #[test]
    fn it_routes_keys_to_children() -> Result<()> {
        let references = NonEmpty::from((
            Reference::new(b"f".to_vec(), Address::default()),
            vec![Reference::new(b"m".to_vec(), Address::default())],
        ));
        let node = Node::new(Block::branch(1, references), Address::default());

        assert_eq!(node.child_index(b"a")?, Some(0));
        assert_eq!(node.child_index(b"f")?, Some(0));
        assert_eq!(node.child_index(b"g")?, Some(1));
        assert_eq!(node.child_index(b"n")?, None);
        assert!(node.search(b"a").is_err());
        Ok(())
    }
}
