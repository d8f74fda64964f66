use futures::executor::block_on;
use prolly_common::Address;
use prolly_storage::ContentAddressedStorage;

use crate::{Node, NodeManager, ProllyTreeError};

/// An ordered, forward-only position within a tree.
///
/// The cursor keeps one `(node, index)` frame per level from the root down to
/// the current leaf, loading nodes on demand. Once it moves past the last
/// entry it stays exhausted: [`Cursor::current`] keeps returning `None`.
#[derive(Clone, Debug)]
pub struct Cursor<Storage> {
    manager: NodeManager<Storage>,
    root: Option<Node>,
    stack: Vec<(Node, usize)>,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl<Storage> Cursor<Storage>
where
    Storage: ContentAddressedStorage,
{
    pub(crate) fn new(manager: NodeManager<Storage>, root: Option<Node>) -> Self {
        Self {
            manager,
            root,
            stack: Vec::new(),
            current: None,
        }
    }

    /// The entry under the cursor, or `None` when the cursor is exhausted
    pub fn current(&self) -> Option<(&[u8], &[u8])> {
        self.current
            .as_ref()
            .map(|(key, value)| (key.as_slice(), value.as_slice()))
    }

    /// The key under the cursor
    pub fn key(&self) -> Option<&[u8]> {
        self.current().map(|(key, _)| key)
    }

    /// The value under the cursor
    pub fn value(&self) -> Option<&[u8]> {
        self.current().map(|(_, value)| value)
    }

    /// Position the cursor at the first entry whose key is `>= key`
    pub async fn seek(&mut self, key: &[u8]) -> Result<(), ProllyTreeError> {
        self.stack.clear();
        self.current = None;

        let Some(mut node) = self.root.clone() else {
            return Ok(());
        };

        while node.is_branch() {
            let Some(index) = node.child_index(key)? else {
                return Ok(());
            };
            let child = self.manager.load(&child_address(&node, index)?).await?;
            self.stack.push((node, index));
            node = child;
        }

        let index = match node.search(key)? {
            Ok(index) | Err(index) => index,
        };
        if index >= node.len() {
            self.stack.clear();
            return Ok(());
        }

        self.stack.push((node, index));
        self.load_current().await
    }

    /// Position the cursor at the smallest entry of the tree
    pub async fn first(&mut self) -> Result<(), ProllyTreeError> {
        self.seek(&[]).await
    }

    /// Advance to the next entry in key order. A failure leaves the cursor
    /// exhausted.
    pub async fn next(&mut self) -> Result<(), ProllyTreeError> {
        let advanced = self.advance().await;
        if advanced.is_err() {
            self.stack.clear();
            self.current = None;
        }
        advanced
    }

    async fn advance(&mut self) -> Result<(), ProllyTreeError> {
        if self.current.is_none() {
            return Ok(());
        }

        if let Some((leaf, index)) = self.stack.last_mut()
            && *index + 1 < leaf.len()
        {
            *index += 1;
            return self.load_current().await;
        }
        self.stack.pop();

        loop {
            let Some((branch, index)) = self.stack.last_mut() else {
                self.current = None;
                return Ok(());
            };

            if *index + 1 < branch.len() {
                *index += 1;
                let address = child_address(branch, *index)?;
                let child = self.manager.load(&address).await?;
                self.descend_leftmost(child).await?;
                return self.load_current().await;
            }

            self.stack.pop();
        }
    }

    async fn descend_leftmost(&mut self, mut node: Node) -> Result<(), ProllyTreeError> {
        while node.is_branch() {
            let child = self.manager.load(&child_address(&node, 0)?).await?;
            self.stack.push((node, 0));
            node = child;
        }
        self.stack.push((node, 0));
        Ok(())
    }

    async fn load_current(&mut self) -> Result<(), ProllyTreeError> {
        let Some((leaf, index)) = self.stack.last() else {
            self.current = None;
            return Ok(());
        };
        let entry = leaf.entries()?.get(*index).ok_or_else(|| {
            ProllyTreeError::UnexpectedTreeShape(format!(
                "Cursor index {index} is outside of {}",
                leaf.address()
            ))
        })?;
        let key = entry.key.clone();
        let value = self.manager.load_value(&entry.value).await?;

        self.current = Some((key, value));
        Ok(())
    }
}

fn child_address(branch: &Node, index: usize) -> Result<Address, ProllyTreeError> {
    branch
        .references()?
        .get(index)
        .map(|reference| *reference.address())
        .ok_or_else(|| {
            ProllyTreeError::UnexpectedTreeShape(format!(
                "Branch {} has no child at {index}",
                branch.address()
            ))
        })
}

/// A [`Cursor`] that blocks the calling thread on every step. Meant for
/// storage that does not depend on an async reactor (memory, cache, measured
/// backends).
#[derive(Clone, Debug)]
pub struct SyncCursor<Storage> {
    inner: Cursor<Storage>,
}

impl<Storage> SyncCursor<Storage>
where
    Storage: ContentAddressedStorage,
{
    pub(crate) fn new(inner: Cursor<Storage>) -> Self {
        Self { inner }
    }

    /// See [`Cursor::current`]
    pub fn current(&self) -> Option<(&[u8], &[u8])> {
        self.inner.current()
    }

    /// See [`Cursor::seek`]
    pub fn seek(&mut self, key: &[u8]) -> Result<(), ProllyTreeError> {
        block_on(self.inner.seek(key))
    }

    /// See [`Cursor::first`]
    pub fn first(&mut self) -> Result<(), ProllyTreeError> {
        block_on(self.inner.first())
    }

    /// See [`Cursor::next`]
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<(), ProllyTreeError> {
        block_on(self.inner.next())
    }
}

/// A blocking iterator over the entries between two keys (both inclusive)
pub struct ScanIter<Storage> {
    cursor: Cursor<Storage>,
    start: Vec<u8>,
    end: Option<Vec<u8>>,
    started: bool,
    done: bool,
}

impl<Storage> ScanIter<Storage>
where
    Storage: ContentAddressedStorage,
{
    pub(crate) fn new(cursor: Cursor<Storage>, start: Vec<u8>, end: Option<Vec<u8>>) -> Self {
        Self {
            cursor,
            start,
            end,
            started: false,
            done: false,
        }
    }
}

impl<Storage> Iterator for ScanIter<Storage>
where
    Storage: ContentAddressedStorage,
{
    type Item = Result<(Vec<u8>, Vec<u8>), ProllyTreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let step = if self.started {
            block_on(self.cursor.next())
        } else {
            self.started = true;
            block_on(self.cursor.seek(&self.start))
        };
        if let Err(error) = step {
            self.done = true;
            return Some(Err(error));
        }

        let Some((key, value)) = self.cursor.current() else {
            self.done = true;
            return None;
        };
        if let Some(end) = &self.end
            && key > end.as_slice()
        {
            self.done = true;
            return None;
        }

        Some(Ok((key.to_vec(), value.to_vec())))
    }
}
