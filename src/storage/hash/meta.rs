use std::fmt;
use std::ops::Range;

use crate::primitives::io::FileIo;
use crate::types::page::{read_u16, read_u32, read_u64, PageHeader, PAGE_HDR_LEN};
use crate::types::{PageId, Result, StorageError};

use super::page::{init_hash_page, HashPageKind};

/// Page number of the metapage.
pub const HASH_METAPAGE: PageId = PageId(0);
/// Magic number identifying a hash index metapage.
pub const HASH_MAGIC: u32 = 0x0644_0640;
/// Metapage format version written by this crate.
pub const HASH_VERSION: u32 = 4;
/// Number of split points the spares array can describe.
pub const HASH_MAX_SPLITPOINTS: usize = 32;

const META_MAGIC: Range<usize> = PAGE_HDR_LEN..PAGE_HDR_LEN + 4;
const META_VERSION: Range<usize> = PAGE_HDR_LEN + 4..PAGE_HDR_LEN + 8;
const META_NTUPLES: Range<usize> = PAGE_HDR_LEN + 8..PAGE_HDR_LEN + 16;
const META_FFACTOR: Range<usize> = PAGE_HDR_LEN + 16..PAGE_HDR_LEN + 18;
const META_BSIZE: Range<usize> = PAGE_HDR_LEN + 18..PAGE_HDR_LEN + 20;
const META_MAX_BUCKET: Range<usize> = PAGE_HDR_LEN + 20..PAGE_HDR_LEN + 24;
const META_HIGH_MASK: Range<usize> = PAGE_HDR_LEN + 24..PAGE_HDR_LEN + 28;
const META_LOW_MASK: Range<usize> = PAGE_HDR_LEN + 28..PAGE_HDR_LEN + 32;
const META_OVFL_POINT: Range<usize> = PAGE_HDR_LEN + 32..PAGE_HDR_LEN + 36;
const META_SPARES: usize = PAGE_HDR_LEN + 36;
const META_END: usize = META_SPARES + HASH_MAX_SPLITPOINTS * 4;

/// Index-wide metadata held in page 0.
///
/// `spares[i]` counts the overflow pages allocated up to and including split
/// point `i`; together with the bucket number it fixes where every bucket's
/// primary page lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashMeta {
    /// Must equal [`HASH_MAGIC`].
    pub magic: u32,
    /// Must equal [`HASH_VERSION`].
    pub version: u32,
    /// Number of entries in the index.
    pub ntuples: u64,
    /// Target entries per bucket before a split.
    pub ffactor: u16,
    /// Page size the index was built with.
    pub bsize: u16,
    /// Highest bucket number in use.
    pub max_bucket: u32,
    /// Mask selecting a bucket in the current doubling.
    pub high_mask: u32,
    /// Mask selecting a bucket in the previous doubling.
    pub low_mask: u32,
    /// Split point currently receiving overflow pages.
    pub ovfl_point: u32,
    /// Cumulative overflow page counts per split point.
    pub spares: [u32; HASH_MAX_SPLITPOINTS],
}

impl HashMeta {
    /// Metadata for a new index with `buckets` primary pages.
    ///
    /// `buckets` must be a power of two; bucket pages occupy pages `1..=buckets`.
    pub fn new(buckets: u32, ffactor: u16, page_size: usize) -> Result<Self> {
        if buckets == 0 || !buckets.is_power_of_two() {
            return Err(StorageError::Invalid("initial bucket count must be a power of two"));
        }
        if ffactor == 0 {
            return Err(StorageError::Invalid("fill factor must be positive"));
        }
        Ok(Self {
            magic: HASH_MAGIC,
            version: HASH_VERSION,
            ntuples: 0,
            ffactor,
            bsize: page_size.min(u16::MAX as usize) as u16,
            max_bucket: buckets - 1,
            high_mask: (buckets << 1) - 1,
            low_mask: buckets - 1,
            ovfl_point: spare_index(buckets as u64),
            spares: [0; HASH_MAX_SPLITPOINTS],
        })
    }

    /// Reads the metadata fields of a metapage image without validating them.
    pub fn decode(page: &[u8]) -> Result<Self> {
        if page.len() < META_END {
            return Err(StorageError::Corruption("page too small for hash metapage"));
        }
        let mut spares = [0u32; HASH_MAX_SPLITPOINTS];
        for (i, spare) in spares.iter_mut().enumerate() {
            let start = META_SPARES + i * 4;
            *spare = read_u32(page, start..start + 4);
        }
        Ok(Self {
            magic: read_u32(page, META_MAGIC),
            version: read_u32(page, META_VERSION),
            ntuples: read_u64(page, META_NTUPLES),
            ffactor: read_u16(page, META_FFACTOR),
            bsize: read_u16(page, META_BSIZE),
            max_bucket: read_u32(page, META_MAX_BUCKET),
            high_mask: read_u32(page, META_HIGH_MASK),
            low_mask: read_u32(page, META_LOW_MASK),
            ovfl_point: read_u32(page, META_OVFL_POINT),
            spares,
        })
    }

    /// Formats `page` as the metapage and stores these fields.
    pub fn init_page(&self, page: &mut [u8]) -> Result<()> {
        init_hash_page(page, HASH_METAPAGE, HashPageKind::Meta, 0, None)?;
        let mut header = PageHeader::decode(page)?;
        header.lower = META_END as u16;
        header.encode(page);
        self.store(page);
        Ok(())
    }

    /// Overwrites the metadata fields of an initialised metapage.
    pub fn store(&self, page: &mut [u8]) {
        page[META_MAGIC].copy_from_slice(&self.magic.to_be_bytes());
        page[META_VERSION].copy_from_slice(&self.version.to_be_bytes());
        page[META_NTUPLES].copy_from_slice(&self.ntuples.to_be_bytes());
        page[META_FFACTOR].copy_from_slice(&self.ffactor.to_be_bytes());
        page[META_BSIZE].copy_from_slice(&self.bsize.to_be_bytes());
        page[META_MAX_BUCKET].copy_from_slice(&self.max_bucket.to_be_bytes());
        page[META_HIGH_MASK].copy_from_slice(&self.high_mask.to_be_bytes());
        page[META_LOW_MASK].copy_from_slice(&self.low_mask.to_be_bytes());
        page[META_OVFL_POINT].copy_from_slice(&self.ovfl_point.to_be_bytes());
        for (i, spare) in self.spares.iter().enumerate() {
            let start = META_SPARES + i * 4;
            page[start..start + 4].copy_from_slice(&spare.to_be_bytes());
        }
    }

    /// Primary page of `bucket`.
    pub fn bucket_to_page(&self, bucket: u32) -> PageId {
        let bucket = bucket as u64;
        let overflow = if bucket > 0 {
            let splitpoint = spare_index(bucket + 1) as usize - 1;
            self.spares[splitpoint] as u64
        } else {
            0
        };
        PageId(bucket + 1 + overflow)
    }

    /// Bucket that owns entries with hash `hash_key` under these masks.
    pub fn hash_to_bucket(&self, hash_key: u32) -> u32 {
        let bucket = hash_key & self.high_mask;
        if bucket > self.max_bucket {
            bucket & self.low_mask
        } else {
            bucket
        }
    }

    /// Number of buckets in use.
    pub fn bucket_count(&self) -> u64 {
        self.max_bucket as u64 + 1
    }
}

impl fmt::Display for HashMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "magic: {:#010x}", self.magic)?;
        writeln!(f, "version: {}", self.version)?;
        writeln!(f, "ntuples: {}", self.ntuples)?;
        writeln!(f, "ffactor: {}", self.ffactor)?;
        writeln!(f, "max_bucket: {}", self.max_bucket)?;
        writeln!(f, "high_mask: {:#x}", self.high_mask)?;
        writeln!(f, "low_mask: {:#x}", self.low_mask)?;
        write!(f, "ovfl_point: {}", self.ovfl_point)
    }
}

/// Page size recorded in the metapage behind `io`, read straight from the
/// file. `None` when the file does not start with a hash metapage.
pub(crate) fn stored_page_size(io: &dyn FileIo) -> Result<Option<u32>> {
    if io.len()? < META_END as u64 {
        return Ok(None);
    }
    let mut head = [0u8; META_END];
    io.read_at(0, &mut head)?;
    let meta = HashMeta::decode(&head)?;
    if meta.magic != HASH_MAGIC || meta.bsize == 0 {
        return Ok(None);
    }
    Ok(Some(meta.bsize as u32))
}

/// Split point that holds bucket `num_buckets - 1`: `ceil(log2(num_buckets))`.
pub fn spare_index(num_buckets: u64) -> u32 {
    if num_buckets <= 1 {
        0
    } else {
        64 - (num_buckets - 1).leading_zeros()
    }
}
