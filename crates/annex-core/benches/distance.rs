//! Benchmarks for distance kernels and the flat scan.

use annex_core::{
    inner_product, l2_distance_squared, BitsetView, Config, Dataset, FlatIndex, IndexNode, Version,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn generate_vectors(dims: usize) -> (Vec<f32>, Vec<f32>) {
    let a: Vec<f32> = (0..dims).map(|i| (i as f32) * 0.1).collect();
    let b: Vec<f32> = (0..dims).map(|i| (i as f32) * 0.2 + 0.5).collect();
    (a, b)
}

fn bench_l2(c: &mut Criterion) {
    let mut group = c.benchmark_group("l2_distance_squared");

    for dims in [128, 256, 512, 768, 1024, 1536].iter() {
        let (a, b) = generate_vectors(*dims);
        group.bench_with_input(BenchmarkId::from_parameter(dims), dims, |bencher, _| {
            bencher.iter(|| l2_distance_squared(black_box(&a), black_box(&b)))
        });
    }

    group.finish();
}

fn bench_inner_product(c: &mut Criterion) {
    let mut group = c.benchmark_group("inner_product");

    for dims in [128, 256, 512, 768, 1024, 1536].iter() {
        let (a, b) = generate_vectors(*dims);
        group.bench_with_input(BenchmarkId::from_parameter(dims), dims, |bencher, _| {
            bencher.iter(|| inner_product(black_box(&a), black_box(&b)))
        });
    }

    group.finish();
}

fn bench_flat_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_search");
    let dim = 128;

    for rows in [1_000usize, 10_000].iter() {
        let data: Vec<f32> = (0..rows * dim).map(|i| ((i * 31) % 97) as f32 / 97.0).collect();
        let base = Dataset::new(*rows, dim, data.as_slice()).unwrap();
        let cfg = Config::new().set("metric_type", "L2").set("topk", 10);

        let mut index = FlatIndex::new(Version::current());
        index.build(&base, &cfg).unwrap();
        let query = Dataset::new(1, dim, &data[..dim]).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(rows), rows, |bencher, _| {
            bencher.iter(|| {
                index
                    .search(black_box(&query), &cfg, BitsetView::empty())
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_l2, bench_inner_product, bench_flat_search);
criterion_main!(benches);
