#![allow(dead_code)]

use std::sync::{Arc, Once};

use hashcheck::primitives::io::MemFileIo;
use hashcheck::storage::hash::{HashIndex, HashIndexOptions, HashOpaque, HashPageKind, HeapTid};
use hashcheck::types::PageId;

/// Entries an empty 512-byte page holds.
pub const PER_PAGE: u32 = 29;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn small_options(initial_buckets: u32, fill_factor: u16) -> HashIndexOptions {
    HashIndexOptions {
        page_size: 512,
        cache_pages: 32,
        initial_buckets,
        fill_factor,
        verify_checksums: true,
    }
}

/// In-memory index that never splits on its own.
pub fn mem_index(initial_buckets: u32) -> (Arc<MemFileIo>, HashIndex) {
    init_tracing();
    let io = Arc::new(MemFileIo::new());
    let index = HashIndex::create_with_io("idx", io.clone(), small_options(initial_buckets, 1000))
        .expect("create index");
    (io, index)
}

pub fn tid(n: u32) -> HeapTid {
    HeapTid {
        page: n / 64,
        offset: (n % 64) as u16 + 1,
    }
}

/// Inserts `count` entries whose hashes land in `bucket` while the index has
/// `2^bits` buckets.
pub fn fill_bucket(index: &HashIndex, bucket: u32, bits: u32, count: u32) {
    for n in 0..count {
        let hash = (n << bits) | bucket;
        index.insert(hash, tid(n)).expect("insert");
    }
}

/// Applies `f` to the cached image of `page`.
pub fn patch_page(index: &HashIndex, page: PageId, f: impl FnOnce(&mut [u8])) {
    let mut guard = index.pool().write_page(page).expect("write page");
    f(guard.data_mut());
}

/// Rewrites the opaque trailer of `page`.
pub fn patch_opaque(index: &HashIndex, page: PageId, f: impl FnOnce(&mut HashOpaque)) {
    patch_page(index, page, |data| {
        let mut opaque = HashOpaque::decode(data).expect("decode opaque");
        f(&mut opaque);
        opaque.encode(data).expect("encode opaque");
    });
}

pub fn retag(index: &HashIndex, page: PageId, kind: HashPageKind) {
    patch_opaque(index, page, |opaque| {
        opaque.flags = (opaque.flags & !0x000F) | kind.flag_bits();
    });
}
