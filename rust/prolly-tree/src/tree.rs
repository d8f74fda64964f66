use std::{
    collections::BTreeMap,
    ops::{Bound, RangeBounds},
};

use async_stream::try_stream;
use futures::executor::block_on;
use futures_core::Stream;
use futures_util::StreamExt;
use prolly_common::Address;
use prolly_storage::ContentAddressedStorage;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::{
    Block, Chunkable, ConflictResolver, Cursor, Differential, Entry, Node, NodeManager,
    ProllyTreeError, Reference, ScanIter, SyncCursor, TreeConfig, TreeDifference,
};

/// Everything needed to reopen a tree: its root address, its height and the
/// configuration it was built with. Callers persist this (for example as a
/// commit pointer) next to the blocks in storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeManifest {
    /// Address of the root block, `None` for an empty tree
    pub root: Option<Address>,
    /// Number of levels; 0 for an empty tree
    pub height: u32,
    /// The configuration the tree was built with
    pub config: TreeConfig,
}

/// The outcome of [`Tree::put`]
#[derive(Clone, Debug)]
pub struct Put<Storage> {
    /// The tree after the put
    pub tree: Tree<Storage>,
    /// False when the key already held an identical value; `tree` is then
    /// the original tree
    pub changed: bool,
}

/// Summary of a successful [`Tree::verify`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Number of levels
    pub height: u32,
    /// Number of reachable nodes
    pub nodes: usize,
    /// Number of reachable segments
    pub leaves: usize,
    /// Number of key/value entries
    pub entries: usize,
}

/// An immutable, ordered key-value map stored as a Prolly Tree in
/// content-addressed storage.
///
/// Every modification returns a new [`Tree`] that shares all untouched blocks
/// with the tree it was derived from; the original stays valid and
/// unchanged. Cloning a tree is cheap.
#[derive(Clone, Debug)]
pub struct Tree<Storage> {
    manager: NodeManager<Storage>,
    root: Option<Node>,
    height: u32,
}

impl<Storage> Tree<Storage>
where
    Storage: ContentAddressedStorage,
{
    /// Creates a new, empty [`Tree`] with the default configuration. No block
    /// is written until the first entry is put.
    pub fn create(storage: Storage) -> Self {
        Self::assemble(NodeManager::for_storage(storage), None)
    }

    /// Creates a new, empty [`Tree`] with a custom configuration
    pub fn with_config(storage: Storage, config: TreeConfig) -> Result<Self, ProllyTreeError> {
        Ok(Self::assemble(NodeManager::new(storage, config)?, None))
    }

    /// Hydrate a [`Tree`] with the default configuration from the address of
    /// its root block.
    pub async fn from_hash(address: &Address, storage: Storage) -> Result<Self, ProllyTreeError> {
        let manager = NodeManager::for_storage(storage);
        let root = manager.load(address).await?;
        Ok(Self::assemble(manager, Some(root)))
    }

    /// Reopen a tree from a [`TreeManifest`]
    pub async fn from_manifest(
        storage: Storage,
        manifest: TreeManifest,
    ) -> Result<Self, ProllyTreeError> {
        let manager = NodeManager::new(storage, manifest.config)?;
        let root = match manifest.root {
            Some(address) => Some(manager.load(&address).await?),
            None => None,
        };
        let tree = Self::assemble(manager, root);

        if tree.height != manifest.height {
            return Err(ProllyTreeError::UnexpectedTreeShape(format!(
                "Manifest records height {} but the root implies {}",
                manifest.height, tree.height
            )));
        }

        Ok(tree)
    }

    /// Create a new [`Tree`] from a [`BTreeMap`] with the default
    /// configuration.
    ///
    /// A more efficient method than iteratively adding values.
    pub async fn from_collection(
        collection: BTreeMap<Vec<u8>, Vec<u8>>,
        storage: Storage,
    ) -> Result<Self, ProllyTreeError> {
        Self::build(NodeManager::for_storage(storage), collection).await
    }

    /// Create a new [`Tree`] from a [`BTreeMap`] with a custom configuration
    pub async fn from_collection_with_config(
        collection: BTreeMap<Vec<u8>, Vec<u8>>,
        storage: Storage,
        config: TreeConfig,
    ) -> Result<Self, ProllyTreeError> {
        Self::build(NodeManager::new(storage, config)?, collection).await
    }

    /// Create a new [`Tree`] from key/value pairs in any order. Where a key
    /// repeats, the last pair wins.
    pub async fn from_entries<I>(entries: I, storage: Storage) -> Result<Self, ProllyTreeError>
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    {
        Self::from_collection(entries.into_iter().collect(), storage).await
    }

    #[instrument(skip_all, fields(entries = collection.len()))]
    async fn build(
        manager: NodeManager<Storage>,
        collection: BTreeMap<Vec<u8>, Vec<u8>>,
    ) -> Result<Self, ProllyTreeError> {
        let mut entries = Vec::with_capacity(collection.len());
        for (key, value) in collection {
            let value = manager.store_value(value).await?;
            entries.push(Entry::new(key, value));
        }

        let root = finish_root(&manager, 0, entries, Vec::new()).await?;
        Ok(Self::assemble(manager, root))
    }

    fn assemble(manager: NodeManager<Storage>, root: Option<Node>) -> Self {
        let height = root.as_ref().map_or(0, |root| root.level() + 1);
        Self {
            manager,
            root,
            height,
        }
    }

    fn with_root(&self, root: Option<Node>) -> Self {
        Self::assemble(self.manager.clone(), root)
    }

    /// The [`NodeManager`] that reads and writes this tree's blocks
    pub fn manager(&self) -> &NodeManager<Storage> {
        &self.manager
    }

    /// The [`ContentAddressedStorage`] used by this tree.
    pub fn storage(&self) -> &Storage {
        self.manager.storage()
    }

    /// The configuration this tree is built with
    pub fn config(&self) -> &TreeConfig {
        self.manager.config()
    }

    /// Returns the [`Node`] representing the root of this tree.
    ///
    /// Returns `None` if the tree is empty.
    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    /// Returns the [`Address`] of the root of this tree.
    ///
    /// Returns `None` if the tree is empty.
    pub fn hash(&self) -> Option<&Address> {
        self.root().map(|root| root.address())
    }

    /// Number of levels; 0 for an empty tree, 1 when the root is a segment
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the tree holds no entries
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// A [`TreeManifest`] from which this tree can be reopened
    pub fn manifest(&self) -> TreeManifest {
        TreeManifest {
            root: self.hash().copied(),
            height: self.height,
            config: self.config().clone(),
        }
    }

    /// Walk from the root towards the segment that holds (or, when `insert`
    /// is set, should hold) `key`, recording the branches passed on the way.
    async fn descend(
        &self,
        key: &[u8],
        insert: bool,
    ) -> Result<Option<(Vec<(Node, usize)>, Node)>, ProllyTreeError> {
        let Some(mut node) = self.root.clone() else {
            return Ok(None);
        };
        let mut path = Vec::with_capacity(self.height as usize);

        while node.is_branch() {
            let index = match node.child_index(key)? {
                Some(index) => index,
                None if insert => node.len() - 1,
                None => return Ok(None),
            };
            let reference = node.references()?.get(index).cloned().ok_or_else(|| {
                ProllyTreeError::UnexpectedTreeShape(format!(
                    "Branch {} has no child at {index}",
                    node.address()
                ))
            })?;
            let child = self.manager.get_node(&reference).await?;
            path.push((node, index));
            node = child;
        }

        Ok(Some((path, node)))
    }

    /// Retrieves the value associated with `key` from the tree.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ProllyTreeError> {
        let Some((_, leaf)) = self.descend(key, false).await? else {
            return Ok(None);
        };

        match leaf.entry(key)? {
            Some(entry) => Ok(Some(self.manager.load_value(&entry.value).await?)),
            None => Ok(None),
        }
    }

    /// Sets a `key`/`value` pair, returning the resulting tree
    #[instrument(skip(self, value))]
    pub async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<Put<Storage>, ProllyTreeError> {
        let Some((path, leaf)) = self.descend(&key, true).await? else {
            let value = self.manager.store_value(value).await?;
            let entries = vec![Entry::new(key, value)];
            let root = finish_root(&self.manager, 0, entries, Vec::new()).await?;
            return Ok(Put {
                tree: self.with_root(root),
                changed: true,
            });
        };

        let position = leaf.search(&key)?;
        let mut entries: Vec<Entry> = leaf.into_entries()?.into();

        match position {
            Ok(index) => {
                if entries[index].value == self.manager.value_ref(&value) {
                    trace!("Key already holds this value");
                    return Ok(Put {
                        tree: self.clone(),
                        changed: false,
                    });
                }
                entries[index].value = self.manager.store_value(value).await?;
            }
            Err(index) => {
                let value = self.manager.store_value(value).await?;
                entries.insert(index, Entry::new(key, value));
            }
        }

        Ok(Put {
            tree: self.rebuild(path, entries).await?,
            changed: true,
        })
    }

    /// Remove the `key`/`value` pair associated with `key` (if it is present),
    /// returning the resulting tree
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &[u8]) -> Result<Self, ProllyTreeError> {
        let Some((path, leaf)) = self.descend(key, false).await? else {
            return Ok(self.clone());
        };
        let Ok(index) = leaf.search(key)? else {
            return Ok(self.clone());
        };

        let mut entries: Vec<Entry> = leaf.into_entries()?.into();
        entries.remove(index);

        self.rebuild(path, entries).await
    }

    /// Replace the segment at the end of `path` with `entries` and repair
    /// every level above it.
    async fn rebuild(
        &self,
        mut path: Vec<(Node, usize)>,
        entries: Vec<Entry>,
    ) -> Result<Self, ProllyTreeError> {
        let Some((parent, index)) = path.pop() else {
            let root = finish_root(&self.manager, 0, entries, Vec::new()).await?;
            return Ok(self.with_root(root));
        };

        let (mut references, mut written) = self.repair(0, &parent, index, entries, &[]).await?;
        let mut level = 1;

        while let Some((ancestor, index)) = path.pop() {
            (references, written) = self
                .repair(level, &ancestor, index, references, &written)
                .await?;
            level += 1;
        }

        let root = finish_root(&self.manager, level, references, written).await?;
        Ok(self.with_root(root))
    }

    /// Re-chunk the replacement `items` for the child at `index` of `parent`
    /// and return the parent's new list of references along with the nodes
    /// written for it. `children` are the nodes `items` were just written
    /// as, if any.
    ///
    /// When the last group is not closed by a boundary, following siblings
    /// are absorbed until it is, so node boundaries stay where a fresh build
    /// would put them. A node that would fall below the minimum fanout is
    /// merged with its left sibling once no right sibling remains.
    async fn repair<T>(
        &self,
        level: u32,
        parent: &Node,
        index: usize,
        mut items: Vec<T>,
        children: &[Node],
    ) -> Result<(Vec<Reference>, Vec<Node>), ProllyTreeError>
    where
        T: Chunkable,
    {
        let chunker = self.manager.chunker();
        let minimum = self.config().tree_definition.min_fanout_at(level);
        let siblings = parent.references()?;
        let sibling = |index: usize| {
            siblings.get(index).ok_or_else(|| {
                ProllyTreeError::UnexpectedTreeShape(format!(
                    "Branch {} has no child at {index}",
                    parent.address()
                ))
            })
        };

        let mut start = index;
        let mut end = index + 1;

        let groups = loop {
            let chunks = chunker.chunk(level, items);
            let count: usize = chunks.groups.iter().map(Vec::len).sum();

            if !chunks.settled && end < siblings.len() {
                let right = self.manager.get_node(sibling(end)?).await?;
                items = chunks.groups.into_iter().flatten().collect();
                items.extend(T::from_node(right)?);
                end += 1;
                trace!("Absorbed the right sibling at level {level}");
                continue;
            }

            if count > 0 && count < minimum && start > 0 {
                start -= 1;
                let left = self.manager.get_node(sibling(start)?).await?;
                items = T::from_node(left)?;
                items.extend(chunks.groups.into_iter().flatten());
                debug!("Merged an underfull node at level {level} into its left sibling");
                continue;
            }

            break chunks.groups;
        };

        if groups.len() > end - start {
            debug!(
                "Split {} node(s) into {} at level {level}",
                end - start,
                groups.len()
            );
        }

        let nodes = self.manager.write_level(level, groups, children).await?;

        let mut references: Vec<Reference> = siblings.iter().take(start).cloned().collect();
        references.extend(nodes.iter().map(|node| node.reference().clone()));
        references.extend(siblings.iter().skip(end).cloned());

        Ok((references, nodes))
    }

    /// A [`Cursor`] positioned at the first entry
    pub async fn cursor(&self) -> Result<Cursor<Storage>, ProllyTreeError> {
        let mut cursor = Cursor::new(self.manager.clone(), self.root.clone());
        cursor.first().await?;
        Ok(cursor)
    }

    /// A [`Cursor`] positioned at the first entry whose key is `>= key`
    pub async fn cursor_at(&self, key: &[u8]) -> Result<Cursor<Storage>, ProllyTreeError> {
        let mut cursor = Cursor::new(self.manager.clone(), self.root.clone());
        cursor.seek(key).await?;
        Ok(cursor)
    }

    /// Returns an async stream over the entries from `start` up to and
    /// including `end` (or to the last entry when `end` is `None`).
    pub fn scan<'a>(
        &'a self,
        start: &[u8],
        end: Option<&[u8]>,
    ) -> impl Stream<Item = Result<(Vec<u8>, Vec<u8>), ProllyTreeError>> + use<'a, Storage> {
        let range = (
            Bound::Included(start.to_vec()),
            end.map_or(Bound::Unbounded, |end| Bound::Included(end.to_vec())),
        );
        self.stream_range(range)
    }

    /// Returns an async stream over all entries.
    pub fn stream(
        &self,
    ) -> impl Stream<Item = Result<(Vec<u8>, Vec<u8>), ProllyTreeError>> + '_ {
        self.stream_range(..)
    }

    /// Returns an async stream over entries with keys within the provided range.
    pub fn stream_range<'a, R>(
        &'a self,
        range: R,
    ) -> impl Stream<Item = Result<(Vec<u8>, Vec<u8>), ProllyTreeError>> + 'a
    where
        R: RangeBounds<Vec<u8>> + 'a,
    {
        try_stream! {
            let mut cursor = Cursor::new(self.manager.clone(), self.root.clone());
            match range.start_bound() {
                Bound::Included(start) | Bound::Excluded(start) => cursor.seek(start).await?,
                Bound::Unbounded => cursor.first().await?,
            }
            if let Bound::Excluded(start) = range.start_bound()
                && cursor.key() == Some(start.as_slice())
            {
                cursor.next().await?;
            }

            while let Some((key, value)) = cursor
                .current()
                .map(|(key, value)| (key.to_vec(), value.to_vec()))
            {
                let within = match range.end_bound() {
                    Bound::Included(end) => key <= *end,
                    Bound::Excluded(end) => key < *end,
                    Bound::Unbounded => true,
                };
                if !within {
                    break;
                }

                yield (key, value);
                cursor.next().await?;
            }
        }
    }

    /// Returns a difference between this and the other tree. Applying the
    /// returned differential onto `other` produces this tree.
    pub fn differentiate<'a>(&'a self, other: &'a Self) -> impl Differential + 'a {
        try_stream! {
            let difference = TreeDifference::compute(
                other.manager(),
                other.root(),
                self.manager(),
                self.root(),
            )
            .await?;
            let changes = difference.changes();
            futures_util::pin_mut!(changes);

            while let Some(change) = changes.next().await {
                yield change?;
            }
        }
    }

    /// Three-way merge of this tree (local) with `remote`, given their
    /// common `ancestor`. See [`merge`](crate::merge).
    pub async fn merge<Resolver>(
        &self,
        remote: &Self,
        ancestor: &Self,
        resolver: &Resolver,
    ) -> Result<Self, ProllyTreeError>
    where
        Resolver: ConflictResolver + ?Sized,
    {
        crate::merge(self, remote, ancestor, resolver).await
    }

    /// Number of entries, counted by visiting every segment
    pub async fn len(&self) -> Result<usize, ProllyTreeError> {
        let Some(root) = &self.root else {
            return Ok(0);
        };

        let mut count = 0;
        let mut pending = vec![root.clone()];
        while let Some(node) = pending.pop() {
            if node.is_segment() {
                count += node.len();
            } else {
                pending.extend(self.manager.children(&node).await?);
            }
        }

        Ok(count)
    }

    /// Walk every reachable node and check the structural invariants: key
    /// order within and across nodes, parent bounds that match their
    /// children, consistent levels and fanout limits.
    #[instrument(skip(self))]
    pub async fn verify(&self) -> Result<TreeStats, ProllyTreeError> {
        let mut stats = TreeStats {
            height: self.height,
            ..TreeStats::default()
        };
        let Some(root) = &self.root else {
            return Ok(stats);
        };

        if root.level() + 1 != self.height {
            return Err(ProllyTreeError::UnexpectedTreeShape(format!(
                "Height {} does not match root level {}",
                self.height,
                root.level()
            )));
        }
        if root.is_branch() && root.len() < 2 {
            return Err(ProllyTreeError::UnexpectedTreeShape(
                "Branch root has a single child".into(),
            ));
        }

        let definition = &self.config().tree_definition;
        let mut pending: Vec<(Node, Option<Vec<u8>>, bool)> = vec![(root.clone(), None, true)];

        while let Some((node, lower, is_root)) = pending.pop() {
            node.block().validate()?;
            stats.nodes += 1;

            if node.len() > definition.max_fanout() {
                return Err(ProllyTreeError::UnexpectedTreeShape(format!(
                    "{} holds {} items, more than {}",
                    node.address(),
                    node.len(),
                    definition.max_fanout()
                )));
            }
            if !is_root && node.len() < definition.min_fanout_at(node.level()) {
                return Err(ProllyTreeError::UnexpectedTreeShape(format!(
                    "{} holds {} items, fewer than {}",
                    node.address(),
                    node.len(),
                    definition.min_fanout_at(node.level())
                )));
            }

            let first = match node.block() {
                Block::Segment(entries) => entries.first().key.as_slice(),
                Block::Branch { references, .. } => references.first().upper_bound(),
            };
            if let Some(lower) = &lower
                && first <= lower.as_slice()
            {
                return Err(ProllyTreeError::UnexpectedTreeShape(format!(
                    "{} holds keys that belong to its left sibling",
                    node.address()
                )));
            }

            if node.is_segment() {
                stats.leaves += 1;
                stats.entries += node.len();
                continue;
            }

            let mut lower = lower;
            for (reference, child) in node
                .references()?
                .iter()
                .zip(self.manager.children(&node).await?)
            {
                if child.level() + 1 != node.level() {
                    return Err(ProllyTreeError::UnexpectedTreeShape(format!(
                        "{} at level {} is a child of a node at level {}",
                        child.address(),
                        child.level(),
                        node.level()
                    )));
                }
                if child.upper_bound() != reference.upper_bound() {
                    return Err(ProllyTreeError::UnexpectedTreeShape(format!(
                        "Bound recorded for {} does not match its largest key",
                        child.address()
                    )));
                }

                pending.push((child, lower.clone(), false));
                lower = Some(reference.upper_bound().to_vec());
            }
        }

        Ok(stats)
    }

    /// Blocking variant of [`Tree::get`]
    pub fn get_sync(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ProllyTreeError> {
        block_on(self.get(key))
    }

    /// Blocking variant of [`Tree::put`]
    pub fn put_sync(&self, key: Vec<u8>, value: Vec<u8>) -> Result<Put<Storage>, ProllyTreeError> {
        block_on(self.put(key, value))
    }

    /// Blocking variant of [`Tree::delete`]
    pub fn delete_sync(&self, key: &[u8]) -> Result<Self, ProllyTreeError> {
        block_on(self.delete(key))
    }

    /// Blocking variant of [`Tree::cursor`]
    pub fn cursor_sync(&self) -> Result<SyncCursor<Storage>, ProllyTreeError> {
        block_on(self.cursor()).map(SyncCursor::new)
    }

    /// Blocking variant of [`Tree::scan`]
    pub fn scan_sync(&self, start: &[u8], end: Option<&[u8]>) -> ScanIter<Storage> {
        ScanIter::new(
            Cursor::new(self.manager.clone(), self.root.clone()),
            start.to_vec(),
            end.map(<[u8]>::to_vec),
        )
    }

    /// Blocking variant of [`Tree::merge`]
    pub fn merge_sync<Resolver>(
        &self,
        remote: &Self,
        ancestor: &Self,
        resolver: &Resolver,
    ) -> Result<Self, ProllyTreeError>
    where
        Resolver: ConflictResolver + ?Sized,
    {
        block_on(self.merge(remote, ancestor, resolver))
    }
}

/// Chunk the items of the topmost repaired level and keep adding levels
/// until a single root remains. A branch root with one child is replaced by
/// that child.
async fn finish_root<Storage, T>(
    manager: &NodeManager<Storage>,
    level: u32,
    items: Vec<T>,
    children: Vec<Node>,
) -> Result<Option<Node>, ProllyTreeError>
where
    Storage: ContentAddressedStorage,
    T: Chunkable,
{
    let chunker = manager.chunker();
    let chunks = chunker.chunk(level, items);
    let mut nodes = manager.write_level(level, chunks.groups, &children).await?;
    let mut level = level;

    while nodes.len() > 1 {
        level += 1;
        let references: Vec<Reference> =
            nodes.iter().map(|node| node.reference().clone()).collect();
        let chunks = chunker.chunk(level, references);
        debug!(
            "Promoted {} nodes under {} new node(s) at level {level}",
            nodes.len(),
            chunks.len()
        );
        nodes = manager.write_level(level, chunks.groups, &nodes).await?;
    }

    let Some(mut root) = nodes.pop() else {
        debug!("Tree is now empty");
        return Ok(None);
    };

    while root.is_branch() && root.len() == 1 {
        let child = manager.get_node(root.references()?.first()).await?;
        debug!("Collapsed a single-child root at level {}", root.level());
        root = child;
    }

    Ok(Some(root))
}
