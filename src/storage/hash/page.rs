//! Hash page layout.
//!
//! A hash page is a generic slotted page whose special region holds a 24-byte
//! opaque trailer linking it into its bucket chain:
//!
//! ```text
//! prev:u64 | next:u64 | bucket:u32 | flags:u16 | page_id:u16
//! ```

use std::fmt;
use std::ops::Range;

use serde::Serialize;

use crate::types::page::{init_page, read_u16, read_u32, read_u64, PageHeader};
use crate::types::{PageId, Result, StorageError};

/// Size of the opaque trailer.
pub const HASH_OPAQUE_LEN: usize = 24;
/// Identifies the special region as belonging to a hash index.
pub const HASH_PAGE_ID: u16 = 0xFF80;
/// Bits of `flags` holding the page type.
pub const PAGE_TYPE_MASK: u16 = 0x000F;

const PREV: Range<usize> = 0..8;
const NEXT: Range<usize> = 8..16;
const BUCKET: Range<usize> = 16..20;
const FLAGS: Range<usize> = 20..22;
const PAGE_ID: Range<usize> = 22..24;

/// Structural role of a hash page, as declared by its type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HashPageKind {
    /// Allocated but not in use.
    Unused,
    /// A chain page past the bucket's primary page.
    Overflow,
    /// The primary page of a bucket.
    Bucket,
    /// Free-space bitmap page.
    Bitmap,
    /// The metapage.
    Meta,
    /// A tag value this format does not define.
    Invalid(u16),
}

impl HashPageKind {
    /// Decodes the type bits of an opaque `flags` word.
    pub fn from_flags(flags: u16) -> Self {
        match flags & PAGE_TYPE_MASK {
            0 => Self::Unused,
            1 => Self::Overflow,
            2 => Self::Bucket,
            4 => Self::Bitmap,
            8 => Self::Meta,
            other => Self::Invalid(other),
        }
    }

    /// Type bits for this kind.
    pub fn flag_bits(self) -> u16 {
        match self {
            Self::Unused => 0,
            Self::Overflow => 1,
            Self::Bucket => 2,
            Self::Bitmap => 4,
            Self::Meta => 8,
            Self::Invalid(bits) => bits & PAGE_TYPE_MASK,
        }
    }
}

impl fmt::Display for HashPageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unused => f.write_str("unused"),
            Self::Overflow => f.write_str("overflow"),
            Self::Bucket => f.write_str("bucket"),
            Self::Bitmap => f.write_str("bitmap"),
            Self::Meta => f.write_str("meta"),
            Self::Invalid(bits) => write!(f, "invalid({bits:#x})"),
        }
    }
}

/// Decoded opaque trailer of a hash page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashOpaque {
    /// Previous page in the bucket chain.
    pub prev: Option<PageId>,
    /// Next page in the bucket chain.
    pub next: Option<PageId>,
    /// Bucket the page belongs to.
    pub bucket: u32,
    /// Page type and status bits.
    pub flags: u16,
    /// Must equal [`HASH_PAGE_ID`].
    pub page_id: u16,
}

impl HashOpaque {
    /// Opaque trailer for a freshly initialised page of `kind`.
    pub fn new(kind: HashPageKind, bucket: u32, prev: Option<PageId>) -> Self {
        Self {
            prev,
            next: None,
            bucket,
            flags: kind.flag_bits(),
            page_id: HASH_PAGE_ID,
        }
    }

    /// Declared page type.
    pub fn kind(&self) -> HashPageKind {
        HashPageKind::from_flags(self.flags)
    }

    /// Reads the trailer from the last [`HASH_OPAQUE_LEN`] bytes of `page`.
    pub fn decode(page: &[u8]) -> Result<Self> {
        let range = opaque_range(page.len())?;
        let raw = &page[range];
        Ok(Self {
            prev: PageId::from_raw(read_u64(raw, PREV)),
            next: PageId::from_raw(read_u64(raw, NEXT)),
            bucket: read_u32(raw, BUCKET),
            flags: read_u16(raw, FLAGS),
            page_id: read_u16(raw, PAGE_ID),
        })
    }

    /// Writes the trailer into the last [`HASH_OPAQUE_LEN`] bytes of `page`.
    pub fn encode(&self, page: &mut [u8]) -> Result<()> {
        let range = opaque_range(page.len())?;
        let raw = &mut page[range];
        raw[PREV].copy_from_slice(&PageId::to_raw(self.prev).to_be_bytes());
        raw[NEXT].copy_from_slice(&PageId::to_raw(self.next).to_be_bytes());
        raw[BUCKET].copy_from_slice(&self.bucket.to_be_bytes());
        raw[FLAGS].copy_from_slice(&self.flags.to_be_bytes());
        raw[PAGE_ID].copy_from_slice(&self.page_id.to_be_bytes());
        Ok(())
    }
}

/// Offset at which the special region of a well-formed hash page starts.
pub fn expected_special(page_size: usize) -> usize {
    page_size - HASH_OPAQUE_LEN
}

fn opaque_range(page_size: usize) -> Result<Range<usize>> {
    if page_size < HASH_OPAQUE_LEN {
        return Err(StorageError::Corruption("page too small for hash opaque"));
    }
    Ok(page_size - HASH_OPAQUE_LEN..page_size)
}

/// Formats `page` as an empty hash page of `kind`.
pub fn init_hash_page(
    page: &mut [u8],
    page_no: PageId,
    kind: HashPageKind,
    bucket: u32,
    prev: Option<PageId>,
) -> Result<()> {
    init_page(page, page_no, HASH_OPAQUE_LEN)?;
    HashOpaque::new(kind, bucket, prev).encode(page)
}

/// Rewrites the next pointer of an initialised hash page.
pub fn set_next(page: &mut [u8], next: Option<PageId>) -> Result<()> {
    let mut opaque = HashOpaque::decode(page)?;
    opaque.next = next;
    opaque.encode(page)
}

/// Number of fixed-size items of `item_len` bytes an empty page can hold.
pub fn page_capacity(page_size: usize, item_len: usize) -> usize {
    let usable = page_size.saturating_sub(crate::types::page::PAGE_HDR_LEN + HASH_OPAQUE_LEN);
    usable / (item_len + crate::types::page::ITEM_ID_LEN)
}

/// Header and opaque of a page, for display.
pub fn describe(page: &[u8]) -> Result<(PageHeader, HashOpaque)> {
    Ok((PageHeader::decode(page)?, HashOpaque::decode(page)?))
}
