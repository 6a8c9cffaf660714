use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::io::Write;
use tempfile::TempDir;

use pixastore::DiskLruCache;

fn write_entry(cache: &DiskLruCache, key: &str, data: &[u8]) {
    let mut editor = cache.edit(key).unwrap().unwrap();
    let mut writer = editor.writer(0).unwrap();
    writer.write_all(data).unwrap();
    drop(writer);
    editor.commit().unwrap();
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("commit_1kb", |b| {
        let dir = TempDir::new().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1, u64::MAX, u64::MAX).unwrap();
        let data = vec![b'x'; 1024];

        let mut counter = 0u64;
        b.iter(|| {
            let key = format!("key{}", counter % 128);
            write_entry(&cache, &key, &data);
            counter += 1;
        });
    });

    group.finish();
}

fn bench_snapshot_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_1kb", |b| {
        let dir = TempDir::new().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1, u64::MAX, u64::MAX).unwrap();
        let data = vec![b'x'; 1024];
        for i in 0..128 {
            write_entry(&cache, &format!("key{}", i), &data);
        }

        let mut counter = 0usize;
        b.iter(|| {
            let key = format!("key{}", counter % 128);
            let mut snapshot = cache.get(&key).unwrap().unwrap();
            black_box(snapshot.read_to_vec(0).unwrap());
            counter += 1;
        });
    });

    group.finish();
}

criterion_group!(benches, bench_commit, bench_snapshot_read);
criterion_main!(benches);
