//! Stream splitter benchmarks

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use futures::stream;
use tokio::sync::mpsc;
use tus_s3_store::splitter::split_stream;

fn benchmark_split_stream(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("split_stream");

    for total_size in [1024 * 1024u64, 16 * 1024 * 1024, 64 * 1024 * 1024] {
        group.throughput(Throughput::Bytes(total_size));
        group.bench_with_input(format!("{}_bytes", total_size), &total_size, |b, &total_size| {
            b.to_async(&runtime).iter(|| async {
                let chunk = Bytes::from(vec![0u8; 64 * 1024]);
                let chunk_count = total_size / chunk.len() as u64;
                let input = Box::pin(stream::iter(
                    (0..chunk_count).map(move |_| Ok(chunk.clone())),
                ));
                let (tx, mut rx) = mpsc::channel(8);
                let consumer = tokio::spawn(async move { while rx.recv().await.is_some() {} });

                let result = split_stream(input, 8 * 1024 * 1024, dir.path(), tx).await;
                let _ = consumer.await;
                black_box(result.ok());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_split_stream);
criterion_main!(benches);
