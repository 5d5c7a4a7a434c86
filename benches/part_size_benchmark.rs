//! Part-size calculator benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tus_s3_store::part_size::{calc_optimal_part_size, DEFAULT_PREFERRED_PART_SIZE};

fn benchmark_calc_optimal_part_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("calc_optimal_part_size");

    let sizes = [
        1024u64,
        DEFAULT_PREFERRED_PART_SIZE,
        DEFAULT_PREFERRED_PART_SIZE * 1_000,
        DEFAULT_PREFERRED_PART_SIZE * 10_000 + 1,
        5_000_000_000_000,
    ];

    for size in sizes {
        group.bench_with_input(format!("{}_bytes", size), &size, |b, &size| {
            b.iter(|| black_box(calc_optimal_part_size(black_box(size), DEFAULT_PREFERRED_PART_SIZE)));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_calc_optimal_part_size);
criterion_main!(benches);
