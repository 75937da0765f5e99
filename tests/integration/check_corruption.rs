#![allow(missing_docs)]

mod common;

use hashcheck::{
    storage::hash::{HashIndex, HashPageKind, HASH_METAPAGE, HASH_PAGE_ID},
    types::{PageId, StorageError},
    verify::{CheckReport, CorruptionKind, HashChecker, PageVisit},
    CheckError, CheckOptions,
};

use common::{fill_bucket, mem_index, patch_opaque, patch_page, retag, PER_PAGE};

const PAGE_SIZE: u64 = 512;

fn check_with_visits(index: &HashIndex) -> (Vec<PageVisit>, CheckError) {
    let relation = index.relation();
    let mut seen = Vec::new();
    let err = HashChecker::new(&relation)
        .on_page(|visit| seen.push(*visit))
        .run()
        .expect_err("check must fail");
    assert_eq!(index.pool().pinned_frames(), 0, "check leaked a pin");
    (seen, err)
}

fn check_err(index: &HashIndex) -> CheckError {
    check_with_visits(index).1
}

/// Index with `max_bucket = 2` whose bucket 1 owns one overflow page.
fn three_buckets_with_overflow() -> HashIndex {
    let (_io, index) = mem_index(2);
    fill_bucket(&index, 1, 1, PER_PAGE + 4);
    fill_bucket(&index, 0, 1, 6);
    assert_eq!(index.expand().expect("split"), 2);
    assert_eq!(index.meta().expect("meta").max_bucket, 2);
    index
}

#[test]
fn retagged_overflow_page_stops_before_later_buckets() {
    let index = three_buckets_with_overflow();
    let chain = index.bucket_pages(1).expect("chain");
    assert_eq!(chain.len(), 2);
    let overflow = chain[1];
    retag(&index, overflow, HashPageKind::Bucket);

    let (seen, err) = check_with_visits(&index);
    assert_eq!(
        err.corruption(),
        Some(&CorruptionKind::UnexpectedPageType {
            page: overflow,
            expected: HashPageKind::Overflow,
            actual: HashPageKind::Bucket,
        })
    );
    assert_eq!(err.page(), Some(overflow));
    let buckets: Vec<u32> = seen.iter().map(|v| v.bucket).collect();
    assert_eq!(buckets, vec![0, 1]);
    assert_eq!(seen[1].page, chain[0]);
    assert!(seen.iter().all(|v| v.page != overflow));

    let relation = index.relation();
    let report = CheckReport::new(&relation, &Err(err));
    assert!(!report.success);
    let json = serde_json::to_value(&report).expect("serialize report");
    assert_eq!(json["corruption"]["kind"], "unexpected_page_type");
    assert_eq!(json["corruption"]["page"], overflow.0);
}

#[test]
fn retagged_primary_page_is_reported() {
    let (_io, index) = mem_index(2);
    retag(&index, PageId(2), HashPageKind::Overflow);
    match check_err(&index).corruption() {
        Some(CorruptionKind::UnexpectedPageType {
            page,
            expected,
            actual,
        }) => {
            assert_eq!(*page, PageId(2));
            assert_eq!(*expected, HashPageKind::Bucket);
            assert_eq!(*actual, HashPageKind::Overflow);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn undefined_tag_bits_are_reported() {
    let (_io, index) = mem_index(2);
    patch_opaque(&index, PageId(1), |opaque| opaque.flags = 0x0003);
    assert_eq!(
        check_err(&index).corruption(),
        Some(&CorruptionKind::UnexpectedPageType {
            page: PageId(1),
            expected: HashPageKind::Bucket,
            actual: HashPageKind::Invalid(3),
        })
    );
}

#[test]
fn chain_looping_back_to_primary_is_a_cycle() {
    let (_io, index) = mem_index(2);
    fill_bucket(&index, 0, 1, PER_PAGE * 2 + 1);
    let chain = index.bucket_pages(0).expect("chain");
    assert_eq!(chain.len(), 3);
    patch_opaque(&index, chain[2], |opaque| opaque.next = Some(chain[0]));

    let (seen, err) = check_with_visits(&index);
    assert_eq!(
        err.corruption(),
        Some(&CorruptionKind::ChainCycle {
            bucket: 0,
            page: chain[2],
            next: chain[0],
        })
    );
    assert_eq!(seen.len(), 3);
}

#[test]
fn overflow_page_pointing_at_itself_is_a_cycle() {
    let (_io, index) = mem_index(2);
    fill_bucket(&index, 1, 1, PER_PAGE + 1);
    let chain = index.bucket_pages(1).expect("chain");
    patch_opaque(&index, chain[1], |opaque| opaque.next = Some(chain[1]));
    assert!(matches!(
        check_err(&index).corruption(),
        Some(CorruptionKind::ChainCycle { bucket: 1, .. })
    ));
}

#[test]
fn loop_into_middle_of_chain_is_a_cycle() {
    let (_io, index) = mem_index(2);
    fill_bucket(&index, 0, 1, PER_PAGE * 3 + 1);
    let chain = index.bucket_pages(0).expect("chain");
    assert_eq!(chain.len(), 4);
    patch_opaque(&index, chain[3], |opaque| opaque.next = Some(chain[1]));

    let (seen, err) = check_with_visits(&index);
    assert_eq!(
        err.corruption(),
        Some(&CorruptionKind::ChainCycle {
            bucket: 0,
            page: chain[3],
            next: chain[1],
        })
    );
    let visited: Vec<PageId> = seen.iter().map(|v| v.page).collect();
    assert_eq!(visited, chain);
    assert!((seen.len() as u64) < index.pool().page_count());
}

#[test]
fn overflow_page_shared_between_chains() {
    let (_io, index) = mem_index(2);
    fill_bucket(&index, 1, 1, PER_PAGE + 4);
    fill_bucket(&index, 0, 1, 3);
    let theirs = index.bucket_pages(1).expect("chain");
    assert_eq!(theirs.len(), 2);
    let primary = index.bucket_pages(0).expect("chain")[0];
    patch_opaque(&index, primary, |opaque| opaque.next = Some(theirs[1]));

    let relation = index.relation();
    let mut seen = Vec::new();
    HashChecker::new(&relation)
        .on_page(|visit| seen.push((visit.bucket, visit.page)))
        .run()
        .expect("linkage alone is not checked");
    assert_eq!(
        seen,
        vec![(0, primary), (0, theirs[1]), (1, theirs[0]), (1, theirs[1])]
    );

    let err = HashChecker::new(&relation)
        .with_options(CheckOptions {
            verify_bucket_ownership: true,
            ..CheckOptions::default()
        })
        .run()
        .expect_err("foreign page is reported");
    assert_eq!(
        err.corruption(),
        Some(&CorruptionKind::ForeignChainPage {
            bucket: 0,
            page: theirs[1],
            owner: 1,
        })
    );
    assert_eq!(err.page(), Some(theirs[1]));
    assert_eq!(index.pool().pinned_frames(), 0);
}

#[test]
fn zeroed_overflow_page_is_reported() {
    let (_io, index) = mem_index(2);
    fill_bucket(&index, 0, 1, PER_PAGE + 1);
    let overflow = index.bucket_pages(0).expect("chain")[1];
    patch_page(&index, overflow, |data| data.fill(0));
    assert_eq!(
        check_err(&index).corruption(),
        Some(&CorruptionKind::UnexpectedZeroPage { page: overflow })
    );
}

#[test]
fn foreign_special_region_is_reported() {
    let (_io, index) = mem_index(2);
    patch_opaque(&index, PageId(2), |opaque| opaque.page_id = HASH_PAGE_ID ^ 0x00FF);
    assert!(matches!(
        check_err(&index).corruption(),
        Some(CorruptionKind::CorruptedPage { page: PageId(2), .. })
    ));

    let (_io, index) = mem_index(2);
    patch_page(&index, PageId(1), |data| {
        data[16..18].copy_from_slice(&(PAGE_SIZE as u16 - 32).to_be_bytes())
    });
    assert!(matches!(
        check_err(&index).corruption(),
        Some(CorruptionKind::CorruptedPage { page: PageId(1), .. })
    ));
}

#[test]
fn undecodable_entry_is_reported_with_its_slot() {
    let (_io, index) = mem_index(2);
    fill_bucket(&index, 1, 1, 5);
    patch_page(&index, PageId(2), |data| {
        let slot = 24 + 2 * 4;
        data[slot + 2..slot + 4].copy_from_slice(&0u16.to_be_bytes());
    });
    assert_eq!(
        check_err(&index).corruption(),
        Some(&CorruptionKind::UnreadableEntry {
            page: PageId(2),
            offset: 3,
            reason: "empty line pointer",
        })
    );
}

#[test]
fn entry_size_disagreeing_with_slot_is_reported() {
    let (_io, index) = mem_index(2);
    fill_bucket(&index, 0, 1, 2);
    patch_page(&index, PageId(1), |data| {
        let body = u16::from_be_bytes([data[24], data[25]]) as usize;
        data[body + 6..body + 8].copy_from_slice(&16u16.to_be_bytes());
    });
    assert!(matches!(
        check_err(&index).corruption(),
        Some(CorruptionKind::UnreadableEntry {
            page: PageId(1),
            offset: 1,
            ..
        })
    ));
}

#[test]
fn bad_metapage_identity_is_reported() {
    let (_io, index) = mem_index(2);
    patch_page(&index, HASH_METAPAGE, |data| {
        data[24..28].copy_from_slice(&0xDEAD_BEEFu32.to_be_bytes())
    });
    let (seen, err) = check_with_visits(&index);
    assert!(seen.is_empty());
    assert_eq!(
        err.corruption(),
        Some(&CorruptionKind::NotHashIndex {
            page: HASH_METAPAGE,
            magic: 0xDEAD_BEEF,
        })
    );

    let (_io, index) = mem_index(2);
    patch_page(&index, HASH_METAPAGE, |data| {
        data[28..32].copy_from_slice(&3u32.to_be_bytes())
    });
    assert_eq!(
        check_err(&index).corruption(),
        Some(&CorruptionKind::WrongVersion {
            page: HASH_METAPAGE,
            found: 3,
            expected: 4,
        })
    );

    let (_io, index) = mem_index(2);
    retag(&index, HASH_METAPAGE, HashPageKind::Bitmap);
    assert!(matches!(
        check_err(&index).corruption(),
        Some(CorruptionKind::UnexpectedPageType {
            expected: HashPageKind::Meta,
            actual: HashPageKind::Bitmap,
            ..
        })
    ));
}

#[test]
fn next_pointer_past_end_of_relation_is_an_io_failure() {
    let (_io, index) = mem_index(2);
    patch_opaque(&index, PageId(1), |opaque| opaque.next = Some(PageId(999)));
    match check_err(&index) {
        CheckError::Io {
            page,
            source: StorageError::PageOutOfRange { page_count, .. },
            ..
        } => {
            assert_eq!(page, PageId(999));
            assert_eq!(page_count, 3);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn unreadable_page_is_an_io_failure() {
    let (io, index) = mem_index(2);
    fill_bucket(&index, 1, 1, PER_PAGE + 2);
    index.flush().expect("flush");
    index.pool().invalidate_clean();
    let overflow = index.bucket_pages(1).expect("chain")[1];
    index.pool().invalidate_clean();
    io.fail_reads(overflow.0 * PAGE_SIZE + 100..overflow.0 * PAGE_SIZE + 101);

    let (seen, err) = check_with_visits(&index);
    match &err {
        CheckError::Io {
            page,
            source: StorageError::Io(_),
            ..
        } => assert_eq!(*page, overflow),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(seen.last().map(|v| v.bucket), Some(1));
    assert!(err.corruption().is_none());

    io.clear_faults();
    HashChecker::new(&index.relation()).run().expect("fault cleared");
}

#[test]
fn torn_page_fails_its_checksum() {
    let (io, index) = mem_index(2);
    fill_bucket(&index, 0, 1, 3);
    index.flush().expect("flush");
    index.pool().invalidate_clean();
    {
        use hashcheck::primitives::io::FileIo;
        let at = PAGE_SIZE + 300;
        let mut byte = [0u8; 1];
        io.read_at(at, &mut byte).expect("read byte");
        byte[0] ^= 0x5A;
        io.write_at(at, &byte).expect("write byte");
    }
    match check_err(&index) {
        CheckError::Io {
            page,
            source: StorageError::ChecksumMismatch { .. },
            ..
        } => assert_eq!(page, PageId(1)),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn misplaced_entry_needs_the_ownership_option() {
    let (_io, index) = mem_index(2);
    fill_bucket(&index, 0, 1, 3);
    patch_page(&index, PageId(1), |data| {
        let body = u16::from_be_bytes([data[28], data[29]]) as usize;
        data[body + 8..body + 12].copy_from_slice(&7u32.to_be_bytes());
    });
    let relation = index.relation();
    HashChecker::new(&relation).run().expect("structure is fine");

    let err = HashChecker::new(&relation)
        .with_options(CheckOptions {
            verify_bucket_ownership: true,
            ..CheckOptions::default()
        })
        .run()
        .expect_err("ownership check fails");
    assert_eq!(
        err.corruption(),
        Some(&CorruptionKind::MisplacedEntry {
            page: PageId(1),
            offset: 2,
            bucket: 0,
            expected_bucket: 1,
            hash_key: 7,
        })
    );
    assert_eq!(index.pool().pinned_frames(), 0);
}
