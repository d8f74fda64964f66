use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use prolly_common::helpers::BenchData;
use prolly_storage::make_memory_storage;
use prolly_tree::Tree;

const BENCH_SEED: u64 = 42;

fn bench_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("delete");
    let mut data = BenchData::new(BENCH_SEED);

    for size in [10, 100, 1000, 10000] {
        let keys = data.random_buffers::<16>(size);
        let values = data.random_buffers::<32>(size);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let tree = runtime.block_on(async {
            let entries = keys
                .iter()
                .zip(values.iter())
                .map(|(key, value)| (key.to_vec(), value.to_vec()));
            Tree::from_entries(entries, make_memory_storage())
                .await
                .unwrap()
        });

        // Every iteration removes half of the keys from the same version
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let keys = &keys;
            b.to_async(tokio::runtime::Runtime::new().unwrap())
                .iter_batched(
                    || tree.clone(),
                    |mut tree| async move {
                        for key in keys.iter().take(size / 2) {
                            tree = tree.delete(key).await.unwrap();
                        }
                        tree
                    },
                    BatchSize::SmallInput,
                );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_delete);
criterion_main!(benches);
