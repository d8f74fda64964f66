use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};

use crate::{Entry, ProllyTreeError, Reference};

/// The serializable construct representing a [`Node`](crate::Node).
/// A [`Block`] is what is written to content-addressed storage, and it is
/// used to hydrate and store nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    /// A leaf: key/value entries in ascending key order
    Segment(NonEmpty<Entry>),
    /// An internal node: one reference per child, in ascending bound order
    Branch {
        /// Height above the leaves; always at least 1
        level: u32,
        /// The children of this branch
        references: NonEmpty<Reference>,
    },
}

impl Block {
    /// Create a new segment-type block.
    pub fn segment(entries: NonEmpty<Entry>) -> Self {
        Block::Segment(entries)
    }

    /// Create a new branch-type block.
    pub fn branch(level: u32, references: NonEmpty<Reference>) -> Self {
        Block::Branch { level, references }
    }

    /// Whether this block is a branch.
    pub fn is_branch(&self) -> bool {
        matches!(self, Block::Branch { .. })
    }

    /// Whether this block is a segment.
    pub fn is_segment(&self) -> bool {
        !self.is_branch()
    }

    /// Height of this block above the leaves
    pub fn level(&self) -> u32 {
        match self {
            Block::Segment(_) => 0,
            Block::Branch { level, .. } => *level,
        }
    }

    /// Number of entries (for a segment) or children (for a branch)
    pub fn len(&self) -> usize {
        match self {
            Block::Segment(entries) => entries.len(),
            Block::Branch { references, .. } => references.len(),
        }
    }

    /// Always false; blocks are never empty
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Get the upper bound that this block represents.
    pub fn upper_bound(&self) -> &[u8] {
        match self {
            Block::Segment(entries) => &entries.last().key,
            Block::Branch { references, .. } => references.last().upper_bound(),
        }
    }

    /// Get children data as [`Reference`]s.
    ///
    /// The result is an error if this block is a segment.
    pub fn references(&self) -> Result<&NonEmpty<Reference>, ProllyTreeError> {
        match self {
            Block::Branch { references, .. } => Ok(references),
            Block::Segment(_) => Err(ProllyTreeError::IncorrectTreeAccess(
                "Cannot read references from a segment".into(),
            )),
        }
    }

    /// Takes children data as [`Reference`]s.
    ///
    /// The result is an error if this block is a segment.
    pub fn into_references(self) -> Result<NonEmpty<Reference>, ProllyTreeError> {
        match self {
            Block::Branch { references, .. } => Ok(references),
            Block::Segment(_) => Err(ProllyTreeError::IncorrectTreeAccess(
                "Cannot take references from a segment".into(),
            )),
        }
    }

    /// Get children data as [`Entry`]s.
    ///
    /// The result is an error if this block is a branch
    pub fn entries(&self) -> Result<&NonEmpty<Entry>, ProllyTreeError> {
        match self {
            Block::Segment(entries) => Ok(entries),
            Block::Branch { .. } => Err(ProllyTreeError::IncorrectTreeAccess(
                "Cannot read entries from a branch".into(),
            )),
        }
    }

    /// Take children data as [`Entry`]s.
    ///
    /// The result is an error if this block is a branch
    pub fn into_entries(self) -> Result<NonEmpty<Entry>, ProllyTreeError> {
        match self {
            Block::Segment(entries) => Ok(entries),
            Block::Branch { .. } => Err(ProllyTreeError::IncorrectTreeAccess(
                "Cannot take entries from a branch".into(),
            )),
        }
    }

    /// Check the ordering invariants that every persisted block upholds:
    /// strictly ascending keys (or bounds) and a branch level of at least 1.
    pub fn validate(&self) -> Result<(), ProllyTreeError> {
        let ascending = match self {
            Block::Segment(entries) => {
                is_strictly_ascending(entries.iter().map(|entry| &entry.key[..]))
            }
            Block::Branch { level, references } => {
                if *level == 0 {
                    return Err(ProllyTreeError::InvalidConstruction(
                        "Branch cannot be at level 0".into(),
                    ));
                }
                is_strictly_ascending(references.iter().map(|reference| reference.upper_bound()))
            }
        };

        if !ascending {
            return Err(ProllyTreeError::InvalidConstruction(format!(
                "Keys at level {} are not strictly ascending",
                self.level()
            )));
        }

        Ok(())
    }
}

fn is_strictly_ascending<'a>(mut keys: impl Iterator<Item = &'a [u8]>) -> bool {
    let Some(mut previous) = keys.next() else {
        return true;
    };
    for key in keys {
        if key <= previous {
            return false;
        }
        previous = key;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValueRef;
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use prolly_common::{Address, HashAlgorithm};
    use prolly_storage::{CborEncoder, Encoder};

    fn entry(key: &str, value: &str) -> Entry {
        Entry::new(
            key.as_bytes().to_vec(),
            ValueRef::Inline(value.as_bytes().to_vec()),
        )
    }

    #[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
    async fn it_round_trips_both_variants_through_the_codec() -> Result<()> {
        let segment = Block::segment(
            NonEmpty::from_vec(vec![entry("a", "1"), entry("b\u{0}", "\u{ff}")])
                .ok_or_else(|| anyhow::anyhow!("empty"))?,
        );
        let branch = Block::branch(
            3,
            NonEmpty::from_vec(vec![
                Reference::new(b"m".to_vec(), HashAlgorithm::Blake3.digest(b"left")),
                Reference::new(b"z".to_vec(), HashAlgorithm::Blake3.digest(b"right")),
            ])
            .ok_or_else(|| anyhow::anyhow!("empty"))?,
        );

        for block in [segment, branch] {
            let bytes = CborEncoder.encode(&block).await?;
            let decoded: Block = CborEncoder.decode(&bytes).await?;
            assert_eq!(decoded, block);
        }
        Ok(())
    }

    #[test]
    fn it_reports_level_and_bound() {
        let branch = Block::branch(
            2,
            NonEmpty::from((
                Reference::new(b"c".to_vec(), Address::default()),
                vec![Reference::new(b"k".to_vec(), Address::default())],
            )),
        );
        assert_eq!(branch.level(), 2);
        assert_eq!(branch.upper_bound(), b"k");
        assert_eq!(branch.len(), 2);
        assert!(branch.entries().is_err());
    }

    #[test]
    fn it_rejects_unordered_or_misplaced_blocks() {
        let unordered = Block::segment(NonEmpty::from((entry("b", "1"), vec![entry("a", "2")])));
        assert!(matches!(
            unordered.validate(),
            Err(ProllyTreeError::InvalidConstruction(_))
        ));

        let duplicate = Block::segment(NonEmpty::from((entry("a", "1"), vec![entry("a", "2")])));
        assert!(duplicate.validate().is_err());

        let grounded = Block::branch(
            0,
            NonEmpty::singleton(Reference::new(b"a".to_vec(), Address::default())),
        );
        assert!(grounded.validate().is_err());
    }
}
