//! Benchmark for the entry codec and the in-memory service path
//!
//! Artifacts are typically between a few KiB and tens of MiB.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use redis_build_cache::cache::{codec, MemoryPool, RedisBuildCacheService};
use redis_build_cache::{BuildCacheService, CacheKey};

const SIZES: [usize; 3] = [4 * 1024, 256 * 1024, 4 * 1024 * 1024];

fn artifact(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 31 % 251) as u8).collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    for size in SIZES {
        let raw = artifact(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encode", size), &raw, |b, raw| {
            b.iter(|| codec::encode(black_box(raw)));
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    for size in SIZES {
        let stored = codec::encode(&artifact(size));
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("decode", size), &stored, |b, stored| {
            b.iter(|| codec::decode(black_box(stored.as_bytes())));
        });
    }

    group.finish();
}

fn bench_service_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("service");
    let service = RedisBuildCacheService::new(MemoryPool::default(), 60);
    let key = CacheKey::new("bench");
    let body = Bytes::from(artifact(256 * 1024));

    group.throughput(Throughput::Bytes(body.len() as u64));
    group.bench_function("store_then_load", |b| {
        b.iter(|| {
            let _ = service.store(&key, &mut body.clone());
            let mut sink: Vec<u8> = Vec::with_capacity(body.len());
            let _ = service.load(&key, &mut sink);
            black_box(sink);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_service_round_trip);
criterion_main!(benches);
