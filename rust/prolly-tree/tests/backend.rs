use anyhow::Result;
use pretty_assertions::assert_eq;
use prolly_common::Address;
use prolly_storage::{
    CborEncoder, MeasuredStorageBackend, MemoryStorageBackend, Storage, StorageCache,
};
use prolly_tree::{Tree, TreeConfig};
use rand::{Rng, SeedableRng, rngs::StdRng};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen_test::wasm_bindgen_test;
#[cfg(target_arch = "wasm32")]
wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_dedicated_worker);

fn random_entries(count: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut rng = StdRng::seed_from_u64(1024);
    (0..count)
        .map(|_| {
            let key: [u8; 32] = rng.r#gen();
            let mut value = vec![0u8; rng.gen_range(1..1024)];
            rng.fill(value.as_mut_slice());
            (key.to_vec(), value)
        })
        .collect()
}

#[cfg(not(target_arch = "wasm32"))]
#[test_log::test(tokio::test)]
async fn it_persists_trees_to_the_file_system() -> Result<()> {
    let (backend, _tempdir) = prolly_storage::make_target_storage().await?;
    let storage = Storage::new(CborEncoder, backend);
    let entries = random_entries(256);

    let mut tree = Tree::create(storage.clone());
    for (key, value) in &entries {
        tree = tree.put(key.clone(), value.clone()).await?.tree;
    }

    let hash = *tree.hash().expect("Tree has a root");
    let reopened = Tree::from_hash(&hash, storage).await?;

    for (key, value) in &entries {
        assert_eq!(reopened.get(key).await?.as_ref(), Some(value));
    }
    assert_eq!(reopened.verify().await?.entries, entries.len());
    Ok(())
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
#[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
async fn it_serves_repeated_reads_from_a_cache() -> Result<()> {
    let measured = MeasuredStorageBackend::new(MemoryStorageBackend::<Address, Vec<u8>>::default());
    let storage = Storage::new(CborEncoder, StorageCache::new(measured.clone(), 1024)?);
    let config = TreeConfig::default().with_fanout(8, 2);
    let entries = random_entries(200);

    let tree = Tree::from_collection_with_config(
        entries.iter().cloned().collect(),
        storage.clone(),
        config,
    )
    .await?;
    assert!(measured.writes() > 0);

    // Every block was remembered when it was written
    measured.reset();
    for (key, value) in &entries {
        assert_eq!(tree.get(key).await?.as_ref(), Some(value));
    }
    assert_eq!(measured.reads(), 0);
    Ok(())
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test)]
#[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
async fn it_counts_the_blocks_a_lookup_touches() -> Result<()> {
    let measured = MeasuredStorageBackend::new(MemoryStorageBackend::<Address, Vec<u8>>::default());
    let storage = Storage::new(CborEncoder, measured.clone());
    let config = TreeConfig::default().with_fanout(8, 2);
    let entries = random_entries(500);

    let tree = Tree::from_collection_with_config(
        entries.iter().cloned().collect(),
        storage.clone(),
        config,
    )
    .await?;

    measured.reset();
    let (key, value) = &entries[42];
    assert_eq!(tree.get(key).await?.as_ref(), Some(value));

    // The root is already loaded; one read for every level below it
    assert_eq!(measured.reads(), tree.height() as usize - 1);
    assert_eq!(measured.writes(), 0);
    Ok(())
}
