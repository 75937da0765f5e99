//! Generic slotted page layout.
//!
//! Every page starts with a fixed 24-byte header, followed by an array of
//! line pointers growing upward from the header. Item bodies grow downward
//! from `upper`, and an access-method specific "special" region occupies the
//! tail of the page:
//!
//! ```text
//! | header | line pointers ... -> |   free   | <- ... items | special |
//! 0        24                   lower      upper          special   page_size
//! ```
//!
//! All integers are big-endian. A page whose every byte is zero is a "new"
//! page: allocated but never initialized.

use std::ops::Range;

use super::checksum::page_crc32;
use super::{PageId, Result, StorageError};

/// Size of the fixed page header in bytes.
pub const PAGE_HDR_LEN: usize = 24;
/// Size of a single line pointer in bytes.
pub const ITEM_ID_LEN: usize = 4;
/// Offset number of the first line pointer on a page.
pub const FIRST_OFFSET: u16 = 1;
/// Page layout version written by this crate.
pub const PAGE_LAYOUT_VERSION: u16 = 1;

const PAGE_NO: Range<usize> = 0..8;
const PAGE_CRC: Range<usize> = 8..12;
const LOWER: Range<usize> = 12..14;
const UPPER: Range<usize> = 14..16;
const SPECIAL: Range<usize> = 16..18;
const VERSION: Range<usize> = 18..20;

/// Decoded page header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageHeader {
    /// Block number the page was written for.
    pub page_no: u64,
    /// CRC32 of the page image, stamped when the page is written out.
    pub crc32: u32,
    /// End of the line pointer array.
    pub lower: u16,
    /// Start of item storage.
    pub upper: u16,
    /// Start of the special region.
    pub special: u16,
    /// Layout version.
    pub version: u16,
}

impl PageHeader {
    /// Reads the header from the front of `page`.
    pub fn decode(page: &[u8]) -> Result<Self> {
        if page.len() < PAGE_HDR_LEN {
            return Err(StorageError::Corruption("page shorter than header"));
        }
        Ok(Self {
            page_no: read_u64(page, PAGE_NO),
            crc32: read_u32(page, PAGE_CRC),
            lower: read_u16(page, LOWER),
            upper: read_u16(page, UPPER),
            special: read_u16(page, SPECIAL),
            version: read_u16(page, VERSION),
        })
    }

    /// Writes the header to the front of `page`. The reserved bytes are left
    /// untouched.
    pub fn encode(&self, page: &mut [u8]) {
        page[PAGE_NO].copy_from_slice(&self.page_no.to_be_bytes());
        page[PAGE_CRC].copy_from_slice(&self.crc32.to_be_bytes());
        page[LOWER].copy_from_slice(&self.lower.to_be_bytes());
        page[UPPER].copy_from_slice(&self.upper.to_be_bytes());
        page[SPECIAL].copy_from_slice(&self.special.to_be_bytes());
        page[VERSION].copy_from_slice(&self.version.to_be_bytes());
    }

    /// Highest offset number in use; zero when the page holds no items.
    pub fn max_offset(&self) -> u16 {
        let lower = self.lower as usize;
        if lower <= PAGE_HDR_LEN {
            return 0;
        }
        ((lower - PAGE_HDR_LEN) / ITEM_ID_LEN) as u16
    }

    /// Bytes available for one more item plus its line pointer.
    pub fn free_space(&self) -> usize {
        (self.upper as usize).saturating_sub(self.lower as usize)
    }

    /// Checks the header pointers against each other and the page size.
    ///
    /// Returns a short reason on failure so callers can attach their own
    /// page context.
    pub fn check_bounds(&self, page_size: usize) -> std::result::Result<(), &'static str> {
        let lower = self.lower as usize;
        let upper = self.upper as usize;
        let special = self.special as usize;
        if self.version != PAGE_LAYOUT_VERSION {
            return Err("unsupported page layout version");
        }
        if lower < PAGE_HDR_LEN {
            return Err("line pointer array starts inside the header");
        }
        if (lower - PAGE_HDR_LEN) % ITEM_ID_LEN != 0 {
            return Err("line pointer array is not a whole number of entries");
        }
        if lower > upper {
            return Err("line pointer array overlaps item storage");
        }
        if upper > special || special > page_size {
            return Err("item storage overlaps the special region");
        }
        Ok(())
    }
}

/// Location and length of one item on a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ItemId {
    /// Byte offset of the item body.
    pub offset: u16,
    /// Length of the item body.
    pub len: u16,
}

/// Reads line pointer `offset_no` (1-based) without validating it.
///
/// Returns `None` when the pointer itself would lie outside the page.
pub fn item_id(page: &[u8], offset_no: u16) -> Option<ItemId> {
    if offset_no < FIRST_OFFSET {
        return None;
    }
    let start = PAGE_HDR_LEN + (offset_no as usize - 1) * ITEM_ID_LEN;
    let end = start + ITEM_ID_LEN;
    if end > page.len() {
        return None;
    }
    Some(ItemId {
        offset: read_u16(page, start..start + 2),
        len: read_u16(page, start + 2..end),
    })
}

/// True if the page has never been initialized.
pub fn is_new(page: &[u8]) -> bool {
    page.iter().all(|&b| b == 0)
}

/// Zeroes `page` and writes a fresh header reserving `special_len` bytes at
/// the tail.
pub fn init_page(page: &mut [u8], page_no: PageId, special_len: usize) -> Result<()> {
    let page_size = page.len();
    if page_size > u16::MAX as usize + 1 || special_len + PAGE_HDR_LEN > page_size {
        return Err(StorageError::Invalid("page size cannot hold header and special region"));
    }
    page.fill(0);
    let special = (page_size - special_len) as u16;
    PageHeader {
        page_no: page_no.0,
        crc32: 0,
        lower: PAGE_HDR_LEN as u16,
        upper: special,
        special,
        version: PAGE_LAYOUT_VERSION,
    }
    .encode(page);
    Ok(())
}

/// Appends an item, returning its offset number, or `None` when the page has
/// no room for it.
pub fn add_item(page: &mut [u8], item: &[u8]) -> Result<Option<u16>> {
    let mut header = PageHeader::decode(page)?;
    if header.free_space() < item.len() + ITEM_ID_LEN {
        return Ok(None);
    }
    let upper = header.upper as usize - item.len();
    let slot = header.lower as usize;
    page[upper..upper + item.len()].copy_from_slice(item);
    page[slot..slot + 2].copy_from_slice(&(upper as u16).to_be_bytes());
    page[slot + 2..slot + ITEM_ID_LEN].copy_from_slice(&(item.len() as u16).to_be_bytes());
    header.lower += ITEM_ID_LEN as u16;
    header.upper = upper as u16;
    header.encode(page);
    Ok(Some(header.max_offset()))
}

/// Removes every item while keeping the special region intact.
pub fn clear_items(page: &mut [u8]) -> Result<()> {
    let mut header = PageHeader::decode(page)?;
    let special = header.special as usize;
    if special > page.len() || special < PAGE_HDR_LEN {
        return Err(StorageError::Corruption("special offset outside page"));
    }
    page[PAGE_HDR_LEN..special].fill(0);
    header.lower = PAGE_HDR_LEN as u16;
    header.upper = header.special;
    header.encode(page);
    Ok(())
}

/// Stamps the page checksum in place. New pages are left all-zero.
pub fn stamp_checksum(page: &mut [u8]) {
    if is_new(page) {
        return;
    }
    let page_no = read_u64(page, PAGE_NO);
    let crc = page_crc32(page_no, page, PAGE_CRC);
    page[PAGE_CRC].copy_from_slice(&crc.to_be_bytes());
}

/// Verifies the page number and checksum of a page image read for `expected`.
pub fn verify_image(page: &[u8], expected: PageId) -> Result<()> {
    if is_new(page) {
        return Ok(());
    }
    let header = PageHeader::decode(page)?;
    if header.page_no != expected.0 {
        return Err(StorageError::Corruption("page number mismatch"));
    }
    let computed = page_crc32(header.page_no, page, PAGE_CRC);
    if computed != header.crc32 {
        return Err(StorageError::ChecksumMismatch {
            page: expected,
            stored: header.crc32,
            computed,
        });
    }
    Ok(())
}

pub(crate) fn read_u16(buf: &[u8], range: Range<usize>) -> u16 {
    let mut bytes = [0u8; 2];
    bytes.copy_from_slice(&buf[range]);
    u16::from_be_bytes(bytes)
}

pub(crate) fn read_u32(buf: &[u8], range: Range<usize>) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[range]);
    u32::from_be_bytes(bytes)
}

pub(crate) fn read_u64(buf: &[u8], range: Range<usize>) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[range]);
    u64::from_be_bytes(bytes)
}
