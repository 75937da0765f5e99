use std::ops::Range;

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

use crate::types::page::{read_u16, read_u32};

/// Encoded size of an index tuple.
pub const INDEX_TUPLE_LEN: usize = 12;
/// Bits of `info` holding the tuple size.
pub const INFO_SIZE_MASK: u16 = 0x1FFF;

const TID_PAGE: Range<usize> = 0..4;
const TID_OFFSET: Range<usize> = 4..6;
const INFO: Range<usize> = 6..8;
const HASH_KEY: Range<usize> = 8..12;

/// Location of the heap row an index entry points at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct HeapTid {
    /// Heap page number.
    pub page: u32,
    /// Line pointer on the heap page.
    pub offset: u16,
}

/// One hash index entry: a heap pointer plus the key's hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexTuple {
    /// Heap row the entry refers to.
    pub tid: HeapTid,
    /// Hash of the indexed key.
    pub hash_key: u32,
}

impl IndexTuple {
    /// Entry for key hash `hash_key` pointing at `tid`.
    pub fn new(hash_key: u32, tid: HeapTid) -> Self {
        Self { tid, hash_key }
    }

    /// On-page bytes, with `info` holding the tuple size.
    pub fn encode(&self) -> [u8; INDEX_TUPLE_LEN] {
        let mut buf = [0u8; INDEX_TUPLE_LEN];
        buf[TID_PAGE].copy_from_slice(&self.tid.page.to_be_bytes());
        buf[TID_OFFSET].copy_from_slice(&self.tid.offset.to_be_bytes());
        buf[INFO].copy_from_slice(&(INDEX_TUPLE_LEN as u16).to_be_bytes());
        buf[HASH_KEY].copy_from_slice(&self.hash_key.to_be_bytes());
        buf
    }

    /// Decodes a tuple body of exactly `bytes.len()` bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, &'static str> {
        if bytes.len() < INDEX_TUPLE_LEN {
            return Err("tuple shorter than its header");
        }
        let size = read_u16(bytes, INFO) & INFO_SIZE_MASK;
        if size as usize != bytes.len() {
            return Err("tuple size disagrees with line pointer length");
        }
        Ok(Self {
            tid: HeapTid {
                page: read_u32(bytes, TID_PAGE),
                offset: read_u16(bytes, TID_OFFSET),
            },
            hash_key: read_u32(bytes, HASH_KEY),
        })
    }
}

/// Hash of an arbitrary key, folded to the 32 bits an index tuple stores.
pub fn hash_key_bytes(key: &[u8]) -> u32 {
    let wide = xxh64(key, 0);
    (wide >> 32) as u32 ^ wide as u32
}
