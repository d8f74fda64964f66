use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use prolly_common::ConditionalSync;
use prolly_storage::ContentAddressedStorage;
use tracing::{debug, instrument, trace};

use crate::{Change, NodeManager, ProllyTreeError, Tree, TreeDifference, ValueRef};

/// Decides the outcome for a key that both sides of a merge changed in
/// different ways. `None` for any side means the key is absent there;
/// resolving to `None` deletes the key from the merged tree.
///
/// Resolution is async so that a resolver may consult storage (or anything
/// else) before deciding. Plain closures and functions with the matching
/// signature are resolvers too.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ConflictResolver: ConditionalSync {
    /// Resolve the conflicting versions of `key`
    async fn resolve(
        &self,
        key: &[u8],
        ancestor: Option<&[u8]>,
        local: Option<&[u8]>,
        remote: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>, ProllyTreeError>;
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<F> ConflictResolver for F
where
    F: Fn(&[u8], Option<&[u8]>, Option<&[u8]>, Option<&[u8]>) -> Option<Vec<u8>> + ConditionalSync,
{
    async fn resolve(
        &self,
        key: &[u8],
        ancestor: Option<&[u8]>,
        local: Option<&[u8]>,
        remote: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>, ProllyTreeError> {
        Ok(self(key, ancestor, local, remote))
    }
}

/// Keeps the local version of every conflicting key
#[derive(Clone, Copy, Debug, Default)]
pub struct PreferLocal;

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ConflictResolver for PreferLocal {
    async fn resolve(
        &self,
        _key: &[u8],
        _ancestor: Option<&[u8]>,
        local: Option<&[u8]>,
        _remote: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>, ProllyTreeError> {
        Ok(local.map(<[u8]>::to_vec))
    }
}

/// Keeps the remote version of every conflicting key
#[derive(Clone, Copy, Debug, Default)]
pub struct PreferRemote;

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ConflictResolver for PreferRemote {
    async fn resolve(
        &self,
        _key: &[u8],
        _ancestor: Option<&[u8]>,
        _local: Option<&[u8]>,
        remote: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>, ProllyTreeError> {
        Ok(remote.map(<[u8]>::to_vec))
    }
}

/// Keeps the value whose BLAKE3 hash is larger; a deletion loses to any
/// value. Replicas that merge the same histories converge no matter which
/// side is considered local.
#[derive(Clone, Copy, Debug, Default)]
pub struct HighestHash;

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ConflictResolver for HighestHash {
    async fn resolve(
        &self,
        _key: &[u8],
        _ancestor: Option<&[u8]>,
        local: Option<&[u8]>,
        remote: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>, ProllyTreeError> {
        Ok(match (local, remote) {
            (Some(local), Some(remote)) => {
                if blake3::hash(remote).as_bytes() > blake3::hash(local).as_bytes() {
                    Some(remote.to_vec())
                } else {
                    Some(local.to_vec())
                }
            }
            (Some(value), None) | (None, Some(value)) => Some(value.to_vec()),
            (None, None) => None,
        })
    }
}

/// Per key: the ancestor's value and the value after the change
type Edits = BTreeMap<Vec<u8>, (Option<ValueRef>, Option<ValueRef>)>;

async fn edits_since<Storage>(
    ancestor: &Tree<Storage>,
    tree: &Tree<Storage>,
) -> Result<Edits, ProllyTreeError>
where
    Storage: ContentAddressedStorage,
{
    let difference = TreeDifference::compute(
        ancestor.manager(),
        ancestor.root(),
        tree.manager(),
        tree.root(),
    )
    .await?;

    let mut edits = Edits::new();
    let changes = difference.changes();
    futures_util::pin_mut!(changes);

    while let Some(change) = changes.next().await {
        match change? {
            Change::Remove(entry) => edits.entry(entry.key).or_default().0 = Some(entry.value),
            Change::Add(entry) => edits.entry(entry.key).or_default().1 = Some(entry.value),
        }
    }

    Ok(edits)
}

async fn load_optional<Storage>(
    manager: &NodeManager<Storage>,
    value: Option<&ValueRef>,
) -> Result<Option<Vec<u8>>, ProllyTreeError>
where
    Storage: ContentAddressedStorage,
{
    match value {
        Some(value) => Ok(Some(manager.load_value(value).await?)),
        None => Ok(None),
    }
}

/// Three-way merge of `local` and `remote` given their common `ancestor`.
///
/// Keys changed on only one side take that side's version, keys changed on
/// both sides to the same version take it, and every other key changed on
/// both sides is decided by `resolver`. The result is built on top of
/// `local`; none of the inputs are modified.
#[instrument(skip_all)]
pub async fn merge<Storage, Resolver>(
    local: &Tree<Storage>,
    remote: &Tree<Storage>,
    ancestor: &Tree<Storage>,
    resolver: &Resolver,
) -> Result<Tree<Storage>, ProllyTreeError>
where
    Storage: ContentAddressedStorage,
    Resolver: ConflictResolver + ?Sized,
{
    if local.config() != remote.config() || local.config() != ancestor.config() {
        return Err(ProllyTreeError::InvalidConfiguration(
            "Only trees with identical configurations can be merged".into(),
        ));
    }

    let local_edits = edits_since(ancestor, local).await?;
    let remote_edits = edits_since(ancestor, remote).await?;
    debug!(
        "Merging {} local and {} remote edits",
        local_edits.len(),
        remote_edits.len()
    );

    let mut merged = local.clone();

    for (key, (ancestor_value, remote_value)) in remote_edits {
        let local_value = match local_edits.get(&key) {
            Some((_, local_value)) => local_value.clone(),
            None => ancestor_value.clone(),
        };

        if local_value == remote_value {
            continue;
        }

        let outcome = if local_value == ancestor_value {
            trace!("Taking the remote version of a key");
            load_optional(remote.manager(), remote_value.as_ref()).await?
        } else {
            let ancestor_bytes = load_optional(ancestor.manager(), ancestor_value.as_ref()).await?;
            let local_bytes = load_optional(local.manager(), local_value.as_ref()).await?;
            let remote_bytes = load_optional(remote.manager(), remote_value.as_ref()).await?;
            debug!("Resolving a conflicting key");

            let resolved = resolver
                .resolve(
                    &key,
                    ancestor_bytes.as_deref(),
                    local_bytes.as_deref(),
                    remote_bytes.as_deref(),
                )
                .await?;
            if resolved == local_bytes {
                continue;
            }
            resolved
        };

        merged = match outcome {
            Some(value) => merged.put(key, value).await?.tree,
            None => merged.delete(&key).await?,
        };
    }

    Ok(merged)
}
