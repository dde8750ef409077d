//! WAL append throughput with and without per-record fsync (§8 "Segment
//! rotation" budget: bytes written should track record size plus header
//! overhead regardless of `sync_write`).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ppdb_storage::wal::{Record, Wal};
use tempfile::TempDir;

fn bench_append(c: &mut Criterion, sync_write: bool, label: &str) {
    let dir = TempDir::new().unwrap();
    let wal = Wal::open(dir.path(), 16 * 1024 * 1024, sync_write).unwrap();
    let mut txn_id = 0u64;

    c.bench_function(label, |b| {
        b.iter(|| {
            txn_id += 1;
            wal.append(&Record::Put {
                txn_id,
                table: "bench".into(),
                key: format!("key{txn_id}").into_bytes(),
                value: b"value".to_vec(),
            })
            .unwrap();
            wal.append(&Record::CommitMarker {
                txn_id,
                commit_ts: txn_id,
            })
            .unwrap();
            black_box(txn_id);
        });
    });
}

fn bench_append_buffered(c: &mut Criterion) {
    bench_append(c, false, "wal_append_buffered");
}

fn bench_append_synced(c: &mut Criterion) {
    bench_append(c, true, "wal_append_synced");
}

criterion_group!(benches, bench_append_buffered, bench_append_synced);
criterion_main!(benches);
