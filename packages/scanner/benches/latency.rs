//! Latency benchmarks for the per-transaction hot path
//!
//! Decoding and filtering run for every transaction of every tick, so they
//! should stay far below the request interval.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tickscan_scanner::client::Transaction;
use tickscan_scanner::decoder::decode_payouts;
use tickscan_scanner::filter::TransactionFilter;

fn payout_hex(count: usize) -> String {
    let mut raw = vec![0u8; 16];
    for i in 0..count {
        raw.extend_from_slice(&[0x80 | (i as u8 & 0x7f); 32]);
    }
    for i in 0..count {
        raw.extend_from_slice(&(1_000 + i as u64).to_le_bytes());
    }
    hex::encode(raw)
}

/// Benchmark payload decoding for a typical and a large batch
fn bench_decode_payouts(c: &mut Criterion) {
    let small = payout_hex(3);
    let large = payout_hex(25);

    c.bench_function("decode_payouts_3", |b| {
        b.iter(|| black_box(decode_payouts(black_box(&small))))
    });
    c.bench_function("decode_payouts_25", |b| {
        b.iter(|| black_box(decode_payouts(black_box(&large))))
    });
}

/// Benchmark malformed payload rejection
fn bench_decode_garbage(c: &mut Criterion) {
    let garbage = "ff".repeat(512);

    c.bench_function("decode_payouts_garbage", |b| {
        b.iter(|| black_box(decode_payouts(black_box(&garbage))))
    });
}

/// Benchmark the destination and input-type filter
fn bench_filter(c: &mut Criterion) {
    let filter = TransactionFilter::new(Some("EAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAVWRF".to_string()));
    let tx = Transaction {
        dest_id: Some("EAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAVWRF".to_string()),
        input_type: Some(1),
        input_hex: Some(payout_hex(3)),
        ..Default::default()
    };

    c.bench_function("filter_transaction", |b| {
        b.iter(|| black_box(filter.select(black_box(&tx))))
    });
}

criterion_group!(benches, bench_decode_payouts, bench_decode_garbage, bench_filter);

criterion_main!(benches);
