use serde::Serialize;
use thiserror::Error;

use crate::storage::hash::HashPageKind;
use crate::storage::AccessMethod;
use crate::types::{PageId, StorageError};

/// Why a check stopped.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The storage layer could not deliver a page.
    #[error("could not read page {page} of index \"{index}\": {source}")]
    Io {
        /// Index being checked.
        index: String,
        /// Page that was requested.
        page: PageId,
        /// Underlying storage failure.
        #[source]
        source: StorageError,
    },
    /// A structural invariant does not hold.
    #[error(transparent)]
    Corruption(#[from] Corruption),
    /// The relation is not of the organization the checker handles.
    #[error("\"{index}\" is not a {expected} index (access method {actual})")]
    WrongAccessMethod {
        /// Relation that was passed in.
        index: String,
        /// Access method the checker handles.
        expected: AccessMethod,
        /// Access method of the relation.
        actual: AccessMethod,
    },
    /// No checker is registered for the relation's organization.
    #[error("no checker is registered for {access_method} index \"{index}\"")]
    NotCheckable {
        /// Relation that was passed in.
        index: String,
        /// Its access method.
        access_method: AccessMethod,
    },
}

impl CheckError {
    /// The corruption payload, if this is a corruption failure.
    pub fn corruption(&self) -> Option<&CorruptionKind> {
        match self {
            CheckError::Corruption(corruption) => Some(&corruption.kind),
            _ => None,
        }
    }

    /// Page the failure was detected on, when there is one.
    pub fn page(&self) -> Option<PageId> {
        match self {
            CheckError::Io { page, .. } => Some(*page),
            CheckError::Corruption(corruption) => Some(corruption.kind.page()),
            _ => None,
        }
    }
}

/// Structural damage found in a named index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Error)]
#[error("index \"{index}\" is corrupted: {kind}")]
pub struct Corruption {
    /// Index the damage was found in.
    pub index: String,
    /// What was found and where.
    pub kind: CorruptionKind,
}

/// Kinds of structural damage, each carrying its location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorruptionKind {
    /// A page declares a different role than the traversal expects.
    #[error("unexpected page type at page {page}: expected {expected}, found {actual}")]
    UnexpectedPageType {
        /// Offending page.
        page: PageId,
        /// Role the traversal needed.
        expected: HashPageKind,
        /// Role the page declares.
        actual: HashPageKind,
    },
    /// A page reachable from the index structure was never initialised.
    #[error("page {page} is unexpectedly all zeroes")]
    UnexpectedZeroPage {
        /// Offending page.
        page: PageId,
    },
    /// The page header or special region is malformed.
    #[error("page {page} is corrupted: {reason}")]
    CorruptedPage {
        /// Offending page.
        page: PageId,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// The metapage magic does not identify a hash index.
    #[error("page {page} is not a hash index metapage (magic {magic:#010x})")]
    NotHashIndex {
        /// The metapage.
        page: PageId,
        /// Magic number found.
        magic: u32,
    },
    /// The metapage was written by an incompatible format version.
    #[error("hash index has wrong version {found}, expected {expected}")]
    WrongVersion {
        /// The metapage.
        page: PageId,
        /// Version found.
        found: u32,
        /// Version this checker understands.
        expected: u32,
    },
    /// A slot or the entry it points at cannot be decoded.
    #[error("unreadable entry at page {page} offset {offset}: {reason}")]
    UnreadableEntry {
        /// Page holding the slot.
        page: PageId,
        /// Slot offset number.
        offset: u16,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// A next pointer leads back into the chain already walked.
    #[error("bucket {bucket} chain cycles: page {page} links back to page {next}")]
    ChainCycle {
        /// Bucket being walked.
        bucket: u32,
        /// Page holding the offending pointer.
        page: PageId,
        /// Already visited page it points at.
        next: PageId,
    },
    /// A chain page records a different bucket than the chain it was
    /// reached from.
    #[error("page {page} in the chain of bucket {bucket} belongs to bucket {owner}")]
    ForeignChainPage {
        /// Bucket being walked.
        bucket: u32,
        /// Page reached through the chain.
        page: PageId,
        /// Bucket recorded in the page's opaque region.
        owner: u32,
    },
    /// An entry's hash maps to a different bucket than the one holding it.
    #[error(
        "entry at page {page} offset {offset} has hash {hash_key:#010x} of bucket {expected_bucket} but is stored in bucket {bucket}"
    )]
    MisplacedEntry {
        /// Page holding the entry.
        page: PageId,
        /// Slot offset number.
        offset: u16,
        /// Bucket whose chain holds the entry.
        bucket: u32,
        /// Bucket the hash maps to.
        expected_bucket: u32,
        /// Stored hash.
        hash_key: u32,
    },
}

impl CorruptionKind {
    /// Page the damage was detected on.
    pub fn page(&self) -> PageId {
        match self {
            CorruptionKind::UnexpectedPageType { page, .. }
            | CorruptionKind::UnexpectedZeroPage { page }
            | CorruptionKind::CorruptedPage { page, .. }
            | CorruptionKind::NotHashIndex { page, .. }
            | CorruptionKind::WrongVersion { page, .. }
            | CorruptionKind::UnreadableEntry { page, .. }
            | CorruptionKind::ChainCycle { page, .. }
            | CorruptionKind::ForeignChainPage { page, .. }
            | CorruptionKind::MisplacedEntry { page, .. } => *page,
        }
    }
}
