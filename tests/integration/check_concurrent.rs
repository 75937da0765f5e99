#![allow(missing_docs)]

mod common;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use hashcheck::{
    primitives::{io::MemFileIo, pager::StrategyKind},
    storage::hash::{HashIndex, HashIndexOptions},
    verify::HashChecker,
    CheckOptions,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use common::{init_tracing, tid};

const ROWS: u32 = 4_000;

fn live_index(cache_pages: usize) -> HashIndex {
    init_tracing();
    let options = HashIndexOptions {
        page_size: 512,
        cache_pages,
        initial_buckets: 1,
        fill_factor: 8,
        verify_checksums: true,
    };
    HashIndex::create_with_io("live", Arc::new(MemFileIo::new()), options).expect("create index")
}

#[test]
fn checker_passes_while_writer_splits() {
    let index = live_index(256);
    let done = AtomicBool::new(false);
    let runs = AtomicU64::new(0);

    thread::scope(|scope| {
        scope.spawn(|| {
            let mut rng = ChaCha8Rng::seed_from_u64(7);
            for n in 0..ROWS {
                let key: u64 = rng.gen();
                index.insert_key(&key.to_le_bytes(), tid(n)).expect("insert");
            }
            done.store(true, Ordering::Release);
        });

        for strategy in [StrategyKind::BulkRead, StrategyKind::Normal] {
            let index = &index;
            let done = &done;
            let runs = &runs;
            scope.spawn(move || {
                let relation = index.relation();
                let options = CheckOptions {
                    strategy,
                    ..CheckOptions::default()
                };
                loop {
                    let finished = done.load(Ordering::Acquire);
                    let stats = HashChecker::new(&relation)
                        .with_options(options.clone())
                        .run()
                        .unwrap_or_else(|err| panic!("check failed under load: {err}"));
                    assert_eq!(stats.buckets_checked, stats.max_bucket as u64 + 1);
                    runs.fetch_add(1, Ordering::Relaxed);
                    if finished {
                        break;
                    }
                }
            });
        }
    });

    assert!(runs.load(Ordering::Relaxed) > 0);
    let meta = index.meta().expect("meta");
    assert!(meta.max_bucket > 64);

    let stats = HashChecker::new(&index.relation())
        .with_options(CheckOptions {
            verify_bucket_ownership: true,
            ..CheckOptions::default()
        })
        .run()
        .expect("final check");
    assert_eq!(stats.entries_scanned, ROWS as u64);
    assert_eq!(stats.max_bucket, meta.max_bucket);
    assert_eq!(index.pool().pinned_frames(), 0);
}

#[test]
fn small_cache_survives_concurrent_checks() {
    let index = live_index(12);
    for n in 0..1_500u32 {
        index
            .insert_key(format!("k{n}").as_bytes(), tid(n))
            .expect("insert");
    }

    thread::scope(|scope| {
        for _ in 0..3 {
            scope.spawn(|| {
                let relation = index.relation();
                for _ in 0..5 {
                    let stats = HashChecker::new(&relation).run().expect("check");
                    assert_eq!(stats.entries_scanned, 1_500);
                }
            });
        }
    });
    assert_eq!(index.pool().pinned_frames(), 0);
    assert!(index.pool().stats().evictions > 0);
}
