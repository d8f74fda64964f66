//! Visiting every node reachable from a tree's root.
//!
//! ```no_run
//! use prolly_storage::make_memory_storage;
//! use prolly_tree::{Traversable, TraversalOrder, Tree, TreeNodes};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tree = Tree::create(make_memory_storage())
//!     .put(b"key".to_vec(), b"value".to_vec())
//!     .await?
//!     .tree;
//!
//! // Collect all node addresses, e.g. to find blocks that must be retained
//! let addresses = tree.traverse(TraversalOrder::DepthFirst).into_hash_set().await?;
//! println!("Tree contains {} nodes", addresses.len());
//! # Ok(())
//! # }
//! ```

use std::collections::{HashSet, VecDeque};

use async_stream::try_stream;
use futures_core::Stream;
use prolly_common::Address;
use prolly_storage::ContentAddressedStorage;

use crate::{Node, ProllyTreeError, Tree};

/// Traversal order for tree iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalOrder {
    /// Visit children before siblings
    #[default]
    DepthFirst,
    /// Visit all nodes at each level before going deeper
    BreadthFirst,
}

impl TraversalOrder {
    /// Create a new traversal queue for this order.
    pub fn queue<T>(self) -> TraversalQueue<T> {
        TraversalQueue {
            order: self,
            items: VecDeque::new(),
        }
    }
}

/// A queue that hands out items in a [`TraversalOrder`].
#[derive(Debug, Clone)]
pub struct TraversalQueue<T> {
    order: TraversalOrder,
    items: VecDeque<T>,
}

impl<T> TraversalQueue<T> {
    /// Remove and return the next item according to traversal order.
    pub fn dequeue(&mut self) -> Option<T> {
        match self.order {
            TraversalOrder::DepthFirst => self.items.pop_back(),
            TraversalOrder::BreadthFirst => self.items.pop_front(),
        }
    }

    /// Add siblings so that the first of them is dequeued first
    pub fn enqueue<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: DoubleEndedIterator,
    {
        match self.order {
            TraversalOrder::DepthFirst => self.items.extend(items.into_iter().rev()),
            TraversalOrder::BreadthFirst => self.items.extend(items),
        }
    }
}

/// Anything whose nodes can be walked one by one
pub trait Traversable {
    /// Returns a stream over every node, loading each lazily as it is visited
    fn traverse(
        &self,
        order: TraversalOrder,
    ) -> impl Stream<Item = Result<Node, ProllyTreeError>>;
}

impl<Storage> Traversable for Tree<Storage>
where
    Storage: ContentAddressedStorage,
{
    fn traverse(
        &self,
        order: TraversalOrder,
    ) -> impl Stream<Item = Result<Node, ProllyTreeError>> {
        let root = self.root().cloned();
        let manager = self.manager();

        try_stream! {
            if let Some(root) = root {
                let mut queue = order.queue();
                if root.is_branch() {
                    queue.enqueue(root.references()?.iter().cloned());
                }
                yield root;

                while let Some(reference) = queue.dequeue() {
                    let node = manager.get_node(&reference).await?;
                    if node.is_branch() {
                        queue.enqueue(node.references()?.iter().cloned());
                    }
                    yield node;
                }
            }
        }
    }
}

/// Extension methods for streams of nodes
pub trait TreeNodes: Stream<Item = Result<Node, ProllyTreeError>> {
    /// Collects the address of every node. The first error (typically a
    /// [`ProllyTreeError::MissingBlock`]) ends the walk and is returned.
    fn into_hash_set(
        self,
    ) -> impl std::future::Future<Output = Result<HashSet<Address>, ProllyTreeError>>;
}

impl<S> TreeNodes for S
where
    S: Stream<Item = Result<Node, ProllyTreeError>>,
{
    fn into_hash_set(
        self,
    ) -> impl std::future::Future<Output = Result<HashSet<Address>, ProllyTreeError>> {
        use futures_util::TryStreamExt;
        self.try_fold(HashSet::new(), |mut addresses, node| async move {
            addresses.insert(*node.address());
            Ok::<_, ProllyTreeError>(addresses)
        })
    }
}
