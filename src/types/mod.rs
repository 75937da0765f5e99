//! Value types shared by the storage engine and the checker.

/// Page checksums.
pub mod checksum;
pub mod page;

use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;

/// Identifies a page by its block number within a relation file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PageId(pub u64);

impl PageId {
    /// Marker stored on disk for "no page".
    pub const INVALID_RAW: u64 = u64::MAX;

    /// Decodes an on-disk page pointer, mapping the invalid marker to `None`.
    pub fn from_raw(raw: u64) -> Option<Self> {
        if raw == Self::INVALID_RAW {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Encodes an optional page pointer for storage.
    pub fn to_raw(page: Option<Self>) -> u64 {
        page.map_or(Self::INVALID_RAW, |p| p.0)
    }

    /// Byte offset of this page in a file of `page_size` pages.
    pub fn offset(self, page_size: usize) -> Option<u64> {
        self.0.checked_mul(page_size as u64)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised by the I/O, buffer and page layers.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying file operation failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// Stored bytes are inconsistent with the page format.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// A caller supplied an argument the operation cannot honor.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// The requested page lies beyond the end of the relation.
    #[error("page {page} is beyond the end of the relation ({page_count} pages)")]
    PageOutOfRange {
        /// Requested page.
        page: PageId,
        /// Number of pages in the relation when the request was made.
        page_count: u64,
    },
    /// The page checksum stored in the header does not match its contents.
    #[error("page {page} failed checksum verification (stored {stored:#010x}, computed {computed:#010x})")]
    ChecksumMismatch {
        /// Page that failed verification.
        page: PageId,
        /// Checksum found in the page header.
        stored: u32,
        /// Checksum computed over the page image.
        computed: u32,
    },
}

/// Result alias for storage-layer operations.
pub type Result<T> = std::result::Result<T, StorageError>;
