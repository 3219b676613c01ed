//! Benchmarks for pipeline execution.

use assetflow::core::FileRecord;
use assetflow::stages::{HtmlSplitter, Stage};
use assetflow::stream::{collect_records, fork, from_records};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::StreamExt;
use tokio::runtime::Runtime;

fn documents(count: usize) -> Vec<FileRecord> {
    (0..count)
        .map(|i| {
            FileRecord::source(
                format!("pages/page-{i}.html"),
                format!(
                    "<html><head><style>.p{i} {{ color: red; }}</style></head>\
                     <body><h1>Page {i}</h1><script>console.log({i});</script></body></html>"
                ),
            )
        })
        .collect()
}

fn split_rejoin_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("split_rejoin");
    for count in [10, 100, 1000] {
        let input = documents(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| {
                rt.block_on(async {
                    let splitter = HtmlSplitter::new();
                    let split = splitter.split().apply(from_records(input.clone()));
                    let out = collect_records(splitter.rejoin().apply(split)).await.unwrap();
                    black_box(out)
                })
            });
        });
    }
    group.finish();
}

fn fork_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let input = documents(500);
    c.bench_function("fork_4_ways", |b| {
        b.iter(|| {
            rt.block_on(async {
                let forks = fork(from_records(input.clone()), 4, 16);
                let drained = futures::future::join_all(forks.into_iter().map(|f| f.count())).await;
                black_box(drained)
            })
        });
    });
}

criterion_group!(benches, split_rejoin_benchmark, fork_benchmark);
criterion_main!(benches);
