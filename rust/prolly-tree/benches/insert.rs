use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use prolly_common::helpers::BenchData;
use prolly_storage::make_memory_storage;
use prolly_tree::Tree;

const BENCH_SEED: u64 = 42;

fn insert_all(c: &mut Criterion, name: &str, sequential: bool) {
    let mut group = c.benchmark_group(name);
    let mut data = BenchData::new(BENCH_SEED);

    for size in [10, 100, 1000, 10000] {
        let keys = if sequential {
            data.sequential_buffers::<16>(size)
        } else {
            data.random_buffers::<16>(size)
        };
        let values = data.random_buffers::<32>(size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.to_async(tokio::runtime::Runtime::new().unwrap())
                .iter(|| async {
                    let mut tree = Tree::create(make_memory_storage());
                    for (key, value) in keys.iter().zip(values.iter()) {
                        tree = tree.put(key.to_vec(), value.to_vec()).await.unwrap().tree;
                    }
                    tree
                });
        });
    }

    group.finish();
}

fn bench_insert_sequential(c: &mut Criterion) {
    insert_all(c, "insert_sequential", true);
}

fn bench_insert_random(c: &mut Criterion) {
    insert_all(c, "insert_random", false);
}

fn bench_bulk_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_build");
    let mut data = BenchData::new(BENCH_SEED);

    for size in [10, 100, 1000, 10000] {
        let keys = data.random_buffers::<16>(size);
        let values = data.random_buffers::<32>(size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.to_async(tokio::runtime::Runtime::new().unwrap())
                .iter(|| async {
                    let entries = keys
                        .iter()
                        .zip(values.iter())
                        .map(|(key, value)| (key.to_vec(), value.to_vec()));
                    Tree::from_entries(entries, make_memory_storage())
                        .await
                        .unwrap()
                });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_sequential,
    bench_insert_random,
    bench_bulk_build
);
criterion_main!(benches);
