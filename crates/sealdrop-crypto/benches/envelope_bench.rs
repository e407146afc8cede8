//! Envelope benchmarks: key wrapping and per-chunk block encryption.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sealdrop_crypto::{KeyPair, SessionKey, decrypt_block, encrypt_block, unwrap, wrap};
use std::hint::black_box;

fn bench_wrap(c: &mut Criterion) {
    let pair = KeyPair::generate();
    let key = SessionKey::generate();
    let wrapped = wrap(&key, &pair.public).unwrap();

    c.bench_function("wrap_session_key", |b| {
        b.iter(|| wrap(black_box(&key), black_box(&pair.public)).unwrap())
    });
    c.bench_function("unwrap_session_key", |b| {
        b.iter(|| unwrap(black_box(&wrapped), black_box(&pair.private)).unwrap())
    });
}

fn bench_blocks(c: &mut Criterion) {
    let key = SessionKey::generate();
    let mut group = c.benchmark_group("block_encryption");

    for size in [1024usize, 16 * 1024, 256 * 1024] {
        let data = vec![0x5Au8; size];
        let block = encrypt_block(&key, &data).unwrap();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encrypt", size), &data, |b, data| {
            b.iter(|| encrypt_block(black_box(&key), black_box(data)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("decrypt", size), &block, |b, block| {
            b.iter(|| decrypt_block(black_box(&key), black_box(block)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_wrap, bench_blocks);
criterion_main!(benches);
