//! Skiplist throughput under increasing key-space size (§8 "Concurrent
//! skiplist stress" informs these shapes, run here single-threaded for a
//! clean baseline).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ppdb_storage::mvcc::Version;
use ppdb_storage::skiplist::SkipList;
use std::sync::Arc;

fn populated(size: usize) -> SkipList {
    let list = SkipList::new();
    for i in 0..size {
        let key = format!("key{i:08}").into_bytes();
        list.install(&key, move |_| {
            Ok(Arc::new(Version::new(1, Some(b"v".to_vec()), None)))
        })
        .unwrap();
    }
    list
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("skiplist_insert");
    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let list = SkipList::new();
                for i in 0..size {
                    let key = format!("key{i:08}").into_bytes();
                    list.install(&key, |_| {
                        Ok(Arc::new(Version::new(1, Some(b"v".to_vec()), None)))
                    })
                    .unwrap();
                }
                black_box(list.len());
            });
        });
    }
    group.finish();
}

fn bench_get_existing(c: &mut Criterion) {
    let mut group = c.benchmark_group("skiplist_get_existing");
    for size in [100, 1_000, 10_000].iter() {
        let list = populated(*size);
        let probe = format!("key{:08}", size / 2).into_bytes();
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(list.get(&probe)));
        });
    }
    group.finish();
}

fn bench_range_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("skiplist_range_scan");
    for size in [100, 1_000, 10_000].iter() {
        let list = populated(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut count = 0usize;
                list.range_scan(b"", None, |_, _| {
                    count += 1;
                    true
                });
                black_box(count);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_get_existing, bench_range_scan);
criterion_main!(benches);
