#![allow(missing_docs, unreachable_pub)]
mod utils;

use criterion::{Criterion, criterion_group, criterion_main};
use rand::{SeedableRng, prelude::SliceRandom, rngs::StdRng};
use signet_mdbx_dispatch::WriteFlags;
use std::hint::black_box;
use utils::*;

// GET

fn bench_get_rand(c: &mut Criterion) {
    let n = 100u32;
    let (_dir, env) = setup_bench_db(n);
    let txn = env.begin_ro_txn().unwrap();
    let db = txn.open_db(None).unwrap();

    let mut keys: Vec<String> = (0..n).map(get_key).collect();
    keys.shuffle(&mut StdRng::from_seed(Default::default()));

    c.bench_function("transaction::get::rand", |b| {
        b.iter(|| {
            let mut i = 0usize;
            for key in &keys {
                i += txn.get(db, key).unwrap().map_or(0, |v| v.len());
            }
            black_box(i);
        })
    });
}

// SCAN

fn bench_scan(c: &mut Criterion) {
    let n = 1000u32;
    let (_dir, env) = setup_bench_db(n);
    let txn = env.begin_ro_txn().unwrap();
    let db = txn.open_db(None).unwrap();

    c.bench_function("transaction::scan::100", |b| {
        b.iter(|| {
            let mut page = txn.scan(db, None, 100).unwrap();
            let mut count = page.entries.len();
            while let Some(next) = page.next {
                page = txn.scan_resume(db, &next, 100).unwrap();
                count += page.entries.len();
            }
            black_box(count);
        })
    });
}

// PUT

fn bench_put_rand(c: &mut Criterion) {
    let n = 100u32;
    let (_dir, env) = setup_bench_db(0);

    let mut items: Vec<(String, String)> = (0..n).map(|n| (get_key(n), get_data(n))).collect();
    items.shuffle(&mut StdRng::from_seed(Default::default()));

    c.bench_function("transaction::put::rand", |b| {
        b.iter_batched(
            || {
                let txn = env.begin_rw_txn().unwrap();
                let db = txn.open_db(None).unwrap();
                (txn, db)
            },
            |(txn, db)| {
                for (key, data) in &items {
                    txn.put(db, key, data, WriteFlags::empty()).unwrap();
                }
            },
            criterion::BatchSize::PerIteration,
        )
    });
}

// CREATE

fn bench_tx_create_ro(c: &mut Criterion) {
    let (_dir, env) = setup_bench_db(0);

    c.bench_function("transaction::create::ro", |b| {
        b.iter(|| black_box(env.begin_ro_txn().unwrap()))
    });
}

fn bench_tx_create_rw(c: &mut Criterion) {
    let (_dir, env) = setup_bench_db(0);

    c.bench_function("transaction::create::rw", |b| {
        b.iter(|| black_box(env.begin_rw_txn().unwrap()))
    });
}

fn bench_tx_commit_rw(c: &mut Criterion) {
    let (_dir, env) = setup_bench_db(0);

    c.bench_function("transaction::commit::rw", |b| {
        b.iter_batched(
            || {
                let txn = env.begin_rw_txn().unwrap();
                let db = txn.open_db(None).unwrap();
                txn.put(db, b"key", b"data", WriteFlags::empty()).unwrap();
                txn
            },
            |mut txn| black_box(txn.commit().unwrap()),
            criterion::BatchSize::PerIteration,
        )
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = bench_get_rand, bench_scan, bench_put_rand,
              bench_tx_create_ro, bench_tx_create_rw, bench_tx_commit_rw
}
criterion_main!(benches);
