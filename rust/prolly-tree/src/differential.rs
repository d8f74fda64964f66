//! Structural differences between two trees.
//!
//! Trees built with the same configuration share every subtree whose entries
//! are identical, and a shared subtree has the same address in both trees.
//! [`TreeDifference`] walks both trees top down and discards such subtrees
//! without loading them, so the cost of a diff is proportional to the size of
//! the change rather than the size of the trees.
//!
//! ```text
//! // Changes that turn `before` into `after`
//! let changes = after.differentiate(&before);
//! ```

use std::cmp::Ordering;

use async_stream::try_stream;
use futures_core::Stream;
use futures_util::StreamExt;
use prolly_storage::ContentAddressedStorage;

use crate::{Entry, Node, NodeManager, ProllyTreeError, Reference};

/// Represents a change between two versions of a tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    /// The entry is present in the newer version only
    Add(Entry),
    /// The entry is present in the older version only
    Remove(Entry),
}

/// Represents a differential stream of changes in the key-value store.
pub trait Differential: Stream<Item = Result<Change, ProllyTreeError>> {}

impl<T> Differential for T where T: Stream<Item = Result<Change, ProllyTreeError>> {}

/// Either a loaded node or a reference that has not been read from storage
/// yet. References remember their level so that branches can be told apart
/// from segments without a read.
#[derive(Clone, Debug)]
enum SparseTreeNode {
    Node(Node),
    Ref { reference: Reference, level: u32 },
}

impl SparseTreeNode {
    fn upper_bound(&self) -> &[u8] {
        match self {
            SparseTreeNode::Node(node) => node.upper_bound(),
            SparseTreeNode::Ref { reference, .. } => reference.upper_bound(),
        }
    }

    fn address(&self) -> &prolly_common::Address {
        match self {
            SparseTreeNode::Node(node) => node.address(),
            SparseTreeNode::Ref { reference, .. } => reference.address(),
        }
    }

    fn level(&self) -> u32 {
        match self {
            SparseTreeNode::Node(node) => node.level(),
            SparseTreeNode::Ref { level, .. } => *level,
        }
    }

    async fn ensure_loaded<Storage>(
        self,
        manager: &NodeManager<Storage>,
    ) -> Result<Node, ProllyTreeError>
    where
        Storage: ContentAddressedStorage,
    {
        match self {
            SparseTreeNode::Node(node) => Ok(node),
            SparseTreeNode::Ref { reference, .. } => manager.get_node(&reference).await,
        }
    }
}

/// A lazily loaded cut through a tree: a list of subtrees, ordered by upper
/// bound, whose entries together are the entries still under comparison.
struct SparseTree<'a, Storage> {
    manager: &'a NodeManager<Storage>,
    nodes: Vec<SparseTreeNode>,
}

impl<'a, Storage> SparseTree<'a, Storage>
where
    Storage: ContentAddressedStorage,
{
    fn new(manager: &'a NodeManager<Storage>, root: Option<&Node>) -> Self {
        Self {
            manager,
            nodes: root
                .map(|root| vec![SparseTreeNode::Node(root.clone())])
                .unwrap_or_default(),
        }
    }

    fn highest_level(&self) -> u32 {
        self.nodes.iter().map(SparseTreeNode::level).max().unwrap_or(0)
    }

    /// Replace every branch at `level` with references to its children.
    /// Returns whether anything was replaced.
    async fn expand(&mut self, level: u32) -> Result<bool, ProllyTreeError> {
        if level == 0 {
            return Ok(false);
        }

        let mut expanded = false;
        let mut offset = 0;

        while offset < self.nodes.len() {
            if self.nodes[offset].level() != level {
                offset += 1;
                continue;
            }

            let node = self.nodes[offset].clone().ensure_loaded(self.manager).await?;
            let children: Vec<SparseTreeNode> = node
                .references()?
                .iter()
                .map(|reference| SparseTreeNode::Ref {
                    reference: reference.clone(),
                    level: level - 1,
                })
                .collect();

            let count = children.len();
            self.nodes.splice(offset..offset + 1, children);
            offset += count;
            expanded = true;
        }

        Ok(expanded)
    }

    /// Drop every subtree that appears, with the same address, in both
    /// lists. Both lists stay sorted.
    fn prune(&mut self, other: &mut Self) {
        let left = std::mem::take(&mut self.nodes);
        let right = std::mem::take(&mut other.nodes);

        let mut left = left.into_iter().peekable();
        let mut right = right.into_iter().peekable();

        loop {
            let ordering = match (left.peek(), right.peek()) {
                (Some(left_node), Some(right_node)) => {
                    match left_node.upper_bound().cmp(right_node.upper_bound()) {
                        Ordering::Equal if left_node.address() == right_node.address() => None,
                        ordering => Some(ordering),
                    }
                }
                _ => break,
            };

            match ordering {
                // Shared subtree
                None => {
                    left.next();
                    right.next();
                }
                Some(Ordering::Less) => self.nodes.extend(left.next()),
                Some(Ordering::Greater) => other.nodes.extend(right.next()),
                Some(Ordering::Equal) => {
                    self.nodes.extend(left.next());
                    other.nodes.extend(right.next());
                }
            }
        }

        self.nodes.extend(left);
        other.nodes.extend(right);
    }

    fn stream(&self) -> impl Stream<Item = Result<Entry, ProllyTreeError>> + '_ {
        try_stream! {
            for sparse_node in &self.nodes {
                let node = sparse_node.clone().ensure_loaded(self.manager).await?;
                for entry in node.into_entries()? {
                    yield entry;
                }
            }
        }
    }
}

/// The leaves in which two trees differ.
pub struct TreeDifference<'a, Storage> {
    source: SparseTree<'a, Storage>,
    target: SparseTree<'a, Storage>,
}

impl<'a, Storage> TreeDifference<'a, Storage>
where
    Storage: ContentAddressedStorage,
{
    /// Walk `source` and `target` down to the segments that are not shared
    /// between them.
    pub async fn compute(
        source_manager: &'a NodeManager<Storage>,
        source_root: Option<&Node>,
        target_manager: &'a NodeManager<Storage>,
        target_root: Option<&Node>,
    ) -> Result<Self, ProllyTreeError> {
        let mut source = SparseTree::new(source_manager, source_root);
        let mut target = SparseTree::new(target_manager, target_root);

        // Always expand the tallest remaining level so that both sides are
        // compared at the same height wherever possible
        loop {
            source.prune(&mut target);

            let level = source.highest_level().max(target.highest_level());
            let expanded_source = source.expand(level).await?;
            let expanded_target = target.expand(level).await?;

            if !expanded_source && !expanded_target {
                break;
            }
        }

        Ok(Self { source, target })
    }

    /// Stream the entry-level changes that turn `source` into `target`. A
    /// changed value is reported as a removal followed by an addition.
    pub fn changes(&self) -> impl Differential + '_ {
        let source_stream = self.source.stream();
        let target_stream = self.target.stream();

        try_stream! {
            futures_util::pin_mut!(source_stream);
            futures_util::pin_mut!(target_stream);

            let mut source_next = source_stream.next().await.transpose()?;
            let mut target_next = target_stream.next().await.transpose()?;

            loop {
                match (source_next.take(), target_next.take()) {
                    (None, None) => break,
                    (Some(source_entry), None) => {
                        yield Change::Remove(source_entry);
                        source_next = source_stream.next().await.transpose()?;
                    }
                    (None, Some(target_entry)) => {
                        yield Change::Add(target_entry);
                        target_next = target_stream.next().await.transpose()?;
                    }
                    (Some(source_entry), Some(target_entry)) => {
                        match source_entry.key.cmp(&target_entry.key) {
                            Ordering::Less => {
                                yield Change::Remove(source_entry);
                                target_next = Some(target_entry);
                                source_next = source_stream.next().await.transpose()?;
                            }
                            Ordering::Greater => {
                                yield Change::Add(target_entry);
                                source_next = Some(source_entry);
                                target_next = target_stream.next().await.transpose()?;
                            }
                            Ordering::Equal => {
                                if source_entry.value != target_entry.value {
                                    yield Change::Remove(source_entry);
                                    yield Change::Add(target_entry);
                                }
                                source_next = source_stream.next().await.transpose()?;
                                target_next = target_stream.next().await.transpose()?;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Number of segments left in the source after pruning
    pub fn source_segments(&self) -> usize {
        self.source.nodes.len()
    }

    /// Number of segments left in the target after pruning
    pub fn target_segments(&self) -> usize {
        self.target.nodes.len()
    }
}
