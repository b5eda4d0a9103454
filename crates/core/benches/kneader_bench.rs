//! Benchmark for the kneading pipeline

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use kneader_core::{Difficulty, Kneader, SearchRequest, pack_int};

fn bench_hash(c: &mut Criterion) {
    let kneader = Kneader::new();
    let mut buf = Vec::with_capacity(24);

    c.bench_function("kneader_digest", |b| {
        let mut nonce: u64 = 123_456_789;
        b.iter(|| {
            nonce = nonce.wrapping_add(1);
            kneader.digest(black_box(7), black_box(nonce), &mut buf)
        })
    });
}

fn bench_pack(c: &mut Criterion) {
    c.bench_function("pack_int", |b| {
        b.iter(|| pack_int(black_box(864_197_523)))
    });
}

fn bench_batch(c: &mut Criterion) {
    let kneader = Kneader::new();
    // Unsatisfiable in practice: every batch scans all 1024 nonces.
    let request = SearchRequest::new(7, Difficulty::new(8, "0123456789abcdef").unwrap());

    c.bench_function("kneader_batch_1024", |b| {
        b.iter(|| kneader.search_batch(&request, black_box(0), 1024))
    });
}

criterion_group!(benches, bench_hash, bench_pack, bench_batch);
criterion_main!(benches);
