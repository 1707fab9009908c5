use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use unlearn_core::enclave::SecurePool;
use unlearn_core::hash;
use unlearn_core::storage::SampleStore;
use unlearn_core::train::{fit, TrainConfig};
use unlearn_core::unlearn;

fn synthetic(rows: usize, cols: usize, seed: u64) -> (Vec<f32>, Vec<f32>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let features: Vec<f32> = (0..rows * cols).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let labels: Vec<f32> = (0..rows)
        .map(|r| if features[r * cols] > 0.0 { 1.0 } else { 0.0 })
        .collect();
    (features, labels)
}

fn bench_unlearning(c: &mut Criterion) {
    let cols = 32;

    // The contract under test: removal cost stays flat while full
    // retraining grows with the row count.
    for rows in [1_000usize, 10_000] {
        let (features, labels) = synthetic(rows, cols, 7);
        let mut store = SampleStore::new();
        store.load(&features, &labels, rows, cols).unwrap();
        let (model, _) = fit(&store, &TrainConfig::default()).unwrap();

        c.bench_function(&format!("retrain_{rows}x{cols}"), |b| {
            b.iter(|| fit(&store, &TrainConfig::default()).unwrap())
        });

        c.bench_function(&format!("unlearn_one_of_{rows}x{cols}"), |b| {
            b.iter_batched(
                || {
                    let mut store = SampleStore::new();
                    store.load(&features, &labels, rows, cols).unwrap();
                    let mut pool = SecurePool::new(1 << 30);
                    pool.charge(store.total_bytes()).unwrap();
                    let id = store.ids()[rows / 2];
                    (model.clone(), store, pool, id)
                },
                |(mut model, mut store, mut pool, id)| {
                    unlearn::remove(&mut model, &mut store, &mut pool, id).unwrap()
                },
                BatchSize::LargeInput,
            )
        });
    }

    let row: Vec<f32> = (0..cols).map(|i| i as f32 * 0.1).collect();
    c.bench_function("hash_sample_32", |b| {
        b.iter(|| hash::sample_id(&row, &[1.0]).unwrap())
    });
}

criterion_group!(benches, bench_unlearning);
criterion_main!(benches);
