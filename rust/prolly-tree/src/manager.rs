use nonempty::NonEmpty;
use prolly_common::Address;
use prolly_storage::ContentAddressedStorage;
use tracing::trace;

use crate::{
    Block, Chunkable, Chunker, Node, ProllyTreeError, Reference, TreeConfig, ValueChunker,
    ValueRef,
};

/// Reads and writes the nodes (and chunked values) of trees that share one
/// [`TreeConfig`].
///
/// Every block is checked before it is written: keys must ascend, and each
/// branch reference must name a child one level down whose largest key is
/// the reference's bound. A bug in the tree algorithms therefore surfaces as
/// [`ProllyTreeError::InvalidConstruction`] rather than as a corrupt tree.
#[derive(Clone, Debug)]
pub struct NodeManager<Storage> {
    storage: Storage,
    config: TreeConfig,
}

impl<Storage> NodeManager<Storage>
where
    Storage: ContentAddressedStorage,
{
    /// Create a new [`NodeManager`]. Fails when the configuration is invalid
    /// or names a different hash algorithm than the one `storage` addresses
    /// blocks with.
    pub fn new(storage: Storage, config: TreeConfig) -> Result<Self, ProllyTreeError> {
        config.validate()?;

        if storage.hash_algorithm() != config.hash_algorithm {
            return Err(ProllyTreeError::InvalidConfiguration(format!(
                "Tree uses {} but its storage addresses blocks with {}",
                config.hash_algorithm,
                storage.hash_algorithm()
            )));
        }

        Ok(Self { storage, config })
    }

    /// A manager with the default configuration, adjusted to the hash
    /// algorithm `storage` addresses blocks with
    pub fn for_storage(storage: Storage) -> Self {
        let config = TreeConfig::default().with_hash_algorithm(storage.hash_algorithm());
        Self { storage, config }
    }

    /// The [`ContentAddressedStorage`] nodes are kept in
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// The configuration shared by every tree this manager serves
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// A [`Chunker`] for this manager's configuration
    pub fn chunker(&self) -> Chunker<'_> {
        Chunker::new(&self.config.tree_definition, self.config.hash_algorithm)
    }

    /// Hydrates a [`Node`] given the address of its block.
    pub async fn load(&self, address: &Address) -> Result<Node, ProllyTreeError> {
        let Some(block) = self.storage.read::<Block>(address).await? else {
            return Err(ProllyTreeError::MissingBlock(format!("{address}")));
        };

        Ok(Node::new(block, *address))
    }

    /// Hydrates the [`Node`] a [`Reference`] points at.
    pub async fn get_node(&self, reference: &Reference) -> Result<Node, ProllyTreeError> {
        self.load(reference.address()).await
    }

    /// Validate and persist a block
    pub async fn put_node(&self, block: Block) -> Result<Node, ProllyTreeError> {
        block.validate()?;
        let address = self.storage.write(&block).await?;
        trace!(
            "Wrote {} at level {} with {} items",
            address.abbreviate(),
            block.level(),
            block.len()
        );

        Ok(Node::new(block, address))
    }

    /// Persist one node per group at `level`.
    ///
    /// `children` holds nodes the caller has in hand (usually the ones just
    /// written a level below). Branch references to any other node are
    /// checked against a freshly loaded copy.
    pub async fn write_level<T>(
        &self,
        level: u32,
        groups: Vec<Vec<T>>,
        children: &[Node],
    ) -> Result<Vec<Node>, ProllyTreeError>
    where
        T: Chunkable,
    {
        let mut nodes = Vec::with_capacity(groups.len());

        for group in groups {
            let items = NonEmpty::from_vec(group).ok_or_else(|| {
                ProllyTreeError::InvalidConstruction("Cannot write a node with no items".into())
            })?;
            let block = T::into_block(level, items);
            self.check_children(&block, children).await?;
            nodes.push(self.put_node(block).await?);
        }

        Ok(nodes)
    }

    async fn check_children(&self, block: &Block, known: &[Node]) -> Result<(), ProllyTreeError> {
        let Block::Branch { level, references } = block else {
            return Ok(());
        };

        for reference in references.iter() {
            let loaded;
            let child = match known
                .iter()
                .find(|node| node.address() == reference.address())
            {
                Some(node) => node,
                None => {
                    loaded = self.get_node(reference).await?;
                    &loaded
                }
            };

            if child.level() + 1 != *level {
                return Err(ProllyTreeError::InvalidConstruction(format!(
                    "Branch at level {level} cannot reference {} at level {}",
                    reference.address(),
                    child.level()
                )));
            }
            if child.upper_bound() != reference.upper_bound() {
                return Err(ProllyTreeError::InvalidConstruction(format!(
                    "Reference to {} does not carry its child's largest key",
                    reference.address()
                )));
            }
        }

        Ok(())
    }

    /// Load every child of a branch in order
    pub async fn children(&self, node: &Node) -> Result<Vec<Node>, ProllyTreeError> {
        let mut children = Vec::with_capacity(node.len());
        for reference in node.references()? {
            children.push(self.get_node(reference).await?);
        }
        Ok(children)
    }

    /// The [`ValueRef`] that storing `bytes` would produce, without writing
    /// anything.
    pub fn value_ref(&self, bytes: &[u8]) -> ValueRef {
        let chunker = ValueChunker::new(&self.config.value_chunking);
        if chunker.is_inline(bytes) {
            return ValueRef::Inline(bytes.to_vec());
        }

        let chunks = chunker
            .cut(bytes)
            .into_iter()
            .map(|range| self.config.hash_algorithm.digest(&bytes[range]))
            .collect();

        ValueRef::Chunked {
            chunks,
            length: bytes.len() as u64,
        }
    }

    /// Store a value, splitting it into chunks when it is too large to stay
    /// inline in its leaf.
    pub async fn store_value(&self, bytes: Vec<u8>) -> Result<ValueRef, ProllyTreeError> {
        let chunker = ValueChunker::new(&self.config.value_chunking);
        if chunker.is_inline(&bytes) {
            return Ok(ValueRef::Inline(bytes));
        }

        let ranges = chunker.cut(&bytes);
        let mut chunks = Vec::with_capacity(ranges.len());
        for range in ranges {
            chunks.push(self.storage.put(bytes[range].to_vec()).await?);
        }
        trace!("Stored a {} byte value in {} chunks", bytes.len(), chunks.len());

        Ok(ValueRef::Chunked {
            chunks,
            length: bytes.len() as u64,
        })
    }

    /// Resolve a [`ValueRef`] to the bytes it stands for
    pub async fn load_value(&self, value: &ValueRef) -> Result<Vec<u8>, ProllyTreeError> {
        match value {
            ValueRef::Inline(bytes) => Ok(bytes.clone()),
            ValueRef::Chunked { chunks, length } => {
                // The recorded length is only trusted once the chunks agree with it
                let mut bytes = Vec::new();
                for address in chunks {
                    let Some(chunk) = self.storage.get(address).await? else {
                        return Err(ProllyTreeError::MissingBlock(format!("{address}")));
                    };
                    bytes.extend_from_slice(&chunk);
                }

                if bytes.len() as u64 != *length {
                    return Err(ProllyTreeError::UnexpectedTreeShape(format!(
                        "Chunked value should be {length} bytes but its chunks hold {}",
                        bytes.len()
                    )));
                }

                Ok(bytes)
            }
        }
    }
}
