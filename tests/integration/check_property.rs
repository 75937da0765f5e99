#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use hashcheck::{
    primitives::io::MemFileIo,
    storage::hash::HashIndex,
    types::PageId,
    verify::HashChecker,
    CheckOptions,
};
use proptest::prelude::*;

use common::{init_tracing, small_options, tid};

#[derive(Debug, Clone)]
enum Op {
    Insert(u32),
    Split,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        9 => any::<u32>().prop_map(Op::Insert),
        1 => Just(Op::Split),
    ]
}

fn build(initial_buckets: u32, fill_factor: u16, ops: &[Op]) -> (HashIndex, u64) {
    init_tracing();
    let index = HashIndex::create_with_io(
        "prop",
        Arc::new(MemFileIo::new()),
        small_options(initial_buckets, fill_factor),
    )
    .expect("create index");
    let mut inserted = 0u64;
    for (n, op) in ops.iter().enumerate() {
        match op {
            Op::Insert(hash) => {
                index.insert(*hash, tid(n as u32)).expect("insert");
                inserted += 1;
            }
            Op::Split => {
                index.expand().expect("split");
            }
        }
    }
    (index, inserted)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn any_build_sequence_checks_clean(
        initial_buckets in 1u32..=8,
        fill_factor in prop_oneof![Just(4u16), Just(16u16), Just(1000u16)],
        ops in prop::collection::vec(arb_op(), 0..400),
    ) {
        let (index, inserted) = build(initial_buckets, fill_factor, &ops);
        let meta = index.meta().expect("meta");
        let relation = index.relation();
        let mut primaries = Vec::new();
        let stats = HashChecker::new(&relation)
            .with_options(CheckOptions { verify_bucket_ownership: true, ..CheckOptions::default() })
            .on_page(|visit| {
                if visit.page == meta.bucket_to_page(visit.bucket) {
                    primaries.push(visit.bucket);
                }
            })
            .run();
        let stats = match stats {
            Ok(stats) => stats,
            Err(err) => return Err(TestCaseError::fail(format!("check failed: {err}"))),
        };
        prop_assert_eq!(primaries, (0..=meta.max_bucket).collect::<Vec<_>>());
        prop_assert_eq!(stats.entries_scanned, inserted);
        prop_assert_eq!(stats.buckets_checked, meta.bucket_count());
        prop_assert_eq!(
            stats.primary_pages + stats.overflow_pages + 1,
            index.pool().page_count() - unused_pages(&index)
        );
    }

    #[test]
    fn damaged_page_never_panics_or_leaks(
        ops in prop::collection::vec(arb_op(), 1..200),
        page_pick in any::<prop::sample::Index>(),
        byte_pick in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let (index, _) = build(2, 8, &ops);
        let page = PageId(page_pick.index(index.pool().page_count() as usize) as u64);
        {
            let mut guard = index.pool().write_page(page).expect("write page");
            let data = guard.data_mut();
            let at = byte_pick.index(data.len());
            data[at] ^= flip;
        }
        let outcome = HashChecker::new(&index.relation()).run();
        prop_assert_eq!(index.pool().pinned_frames(), 0);
        if let Err(err) = outcome {
            prop_assert!(!err.to_string().is_empty());
        }
    }
}

/// Pages allocated for split points whose buckets do not exist yet.
fn unused_pages(index: &HashIndex) -> u64 {
    let meta = index.meta().expect("meta");
    let total_slots = 1u64 << meta.ovfl_point;
    total_slots - meta.bucket_count()
}
