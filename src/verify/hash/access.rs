use crate::primitives::pager::{AccessStrategy, BufferPool, PageReadGuard};
use crate::storage::hash::{
    expected_special, HashMeta, HashOpaque, HashPageKind, HASH_MAGIC, HASH_PAGE_ID, HASH_VERSION,
};
use crate::storage::Relation;
use crate::types::page::{is_new, PageHeader};
use crate::types::PageId;

use crate::verify::{CheckError, CheckOptions, Corruption, CorruptionKind};

/// Read-only page access for one check run.
///
/// Every page comes back pinned and share-latched; dropping the guard
/// releases it, so early returns on any error path cannot leak a latch.
pub(crate) struct PageAccessor<'a> {
    index: &'a str,
    pool: &'a BufferPool,
    strategy: AccessStrategy,
}

impl<'a> PageAccessor<'a> {
    pub fn new(relation: &'a Relation, options: &CheckOptions) -> Self {
        Self {
            index: relation.name(),
            pool: relation.pool(),
            strategy: AccessStrategy::from_kind(options.strategy, options.bulk_read_ring_pages),
        }
    }

    pub fn acquire(&self, page: PageId) -> Result<PageReadGuard<'a>, CheckError> {
        self.pool
            .read_page_with(page, &self.strategy)
            .map_err(|source| CheckError::Io {
                index: self.index.to_string(),
                page,
                source,
            })
    }

    /// Pages allocated in the relation right now.
    pub fn page_count(&self) -> u64 {
        self.pool.page_count()
    }

    pub fn corruption(&self, kind: CorruptionKind) -> CheckError {
        tracing::warn!(target: "hashcheck::verify", index = self.index, %kind, "hashcheck.corruption");
        CheckError::Corruption(Corruption {
            index: self.index.to_string(),
            kind,
        })
    }

    /// Confirms `page` is a hash page of role `expected` before any of its
    /// content is interpreted, and returns its decoded opaque trailer.
    pub fn validate(
        &self,
        page: &PageReadGuard<'_>,
        expected: HashPageKind,
    ) -> Result<HashOpaque, CheckError> {
        let id = page.id();
        let data = page.data();
        if is_new(data) {
            return Err(self.corruption(CorruptionKind::UnexpectedZeroPage { page: id }));
        }
        let corrupted = |reason| self.corruption(CorruptionKind::CorruptedPage { page: id, reason });
        let header = PageHeader::decode(data).map_err(|_| corrupted("page shorter than header"))?;
        if header.special as usize != expected_special(data.len()) {
            return Err(corrupted("special region has the wrong size"));
        }
        let opaque = HashOpaque::decode(data).map_err(|_| corrupted("page too small for special region"))?;
        if opaque.page_id != HASH_PAGE_ID {
            return Err(corrupted("special region does not belong to a hash index"));
        }
        let actual = opaque.kind();
        if actual != expected {
            return Err(self.corruption(CorruptionKind::UnexpectedPageType {
                page: id,
                expected,
                actual,
            }));
        }
        if expected == HashPageKind::Meta {
            let meta = HashMeta::decode(data).map_err(|_| corrupted("page too small for metapage"))?;
            if meta.magic != HASH_MAGIC {
                return Err(self.corruption(CorruptionKind::NotHashIndex {
                    page: id,
                    magic: meta.magic,
                }));
            }
            if meta.version != HASH_VERSION {
                return Err(self.corruption(CorruptionKind::WrongVersion {
                    page: id,
                    found: meta.version,
                    expected: HASH_VERSION,
                }));
            }
        }
        Ok(opaque)
    }
}
