use rustc_hash::FxHashSet;

use crate::primitives::pager::PageReadGuard;
use crate::storage::hash::{HashMeta, HashOpaque, HashPageKind};
use crate::types::PageId;
use crate::verify::{CheckError, CorruptionKind};

use super::access::PageAccessor;
use super::entries::EntryScanner;
use super::{CheckStats, PageObserver, PageVisit};

/// Walks one bucket chain at a time, primary page first.
pub(crate) struct ChainWalker<'c, 'a> {
    pub accessor: &'c PageAccessor<'a>,
    pub meta: &'c HashMeta,
    pub verify_ownership: bool,
    pub stats: &'c mut CheckStats,
    pub observer: &'c mut Option<PageObserver<'a>>,
}

impl<'a> ChainWalker<'_, 'a> {
    /// Visits every page of `bucket`'s chain in next-pointer order.
    ///
    /// A successor is acquired and validated before its predecessor is
    /// released, so at most two pages are held at any time. Every page taken
    /// is distinct and lies inside the relation, so the visited set alone
    /// bounds the walk.
    pub fn walk(&mut self, bucket: u32, start: PageId, expected: HashPageKind) -> Result<(), CheckError> {
        let mut visited = FxHashSet::default();
        let mut current = self.accessor.acquire(start)?;
        let mut opaque = self.accessor.validate(&current, expected)?;
        self.check_owner(bucket, current.id(), &opaque)?;
        visited.insert(start);
        let mut kind = expected;
        loop {
            let next = opaque.next;
            self.scan(bucket, &current, kind)?;
            let Some(next) = next else {
                return Ok(());
            };
            if visited.contains(&next) {
                return Err(self.accessor.corruption(CorruptionKind::ChainCycle {
                    bucket,
                    page: current.id(),
                    next,
                }));
            }
            let successor = self.accessor.acquire(next)?;
            opaque = self.accessor.validate(&successor, HashPageKind::Overflow)?;
            self.check_owner(bucket, next, &opaque)?;
            visited.insert(next);
            kind = HashPageKind::Overflow;
            current = successor;
        }
    }

    /// With ownership checks on, a chain page must record the bucket whose
    /// chain reached it.
    fn check_owner(&self, bucket: u32, page: PageId, opaque: &HashOpaque) -> Result<(), CheckError> {
        if !self.verify_ownership || opaque.bucket == bucket {
            return Ok(());
        }
        Err(self.accessor.corruption(CorruptionKind::ForeignChainPage {
            bucket,
            page,
            owner: opaque.bucket,
        }))
    }

    fn scan(&mut self, bucket: u32, page: &PageReadGuard<'_>, kind: HashPageKind) -> Result<(), CheckError> {
        let mut entries = 0u32;
        for entry in EntryScanner::new(page.id(), page.data()) {
            let entry = entry.map_err(|bad| {
                self.accessor.corruption(CorruptionKind::UnreadableEntry {
                    page: bad.page,
                    offset: bad.offset,
                    reason: bad.reason,
                })
            })?;
            if self.verify_ownership {
                let expected_bucket = self.meta.hash_to_bucket(entry.tuple.hash_key);
                if expected_bucket != bucket {
                    return Err(self.accessor.corruption(CorruptionKind::MisplacedEntry {
                        page: page.id(),
                        offset: entry.offset,
                        bucket,
                        expected_bucket,
                        hash_key: entry.tuple.hash_key,
                    }));
                }
            }
            entries += 1;
        }
        self.stats.entries_scanned += entries as u64;
        match kind {
            HashPageKind::Overflow => self.stats.overflow_pages += 1,
            _ => self.stats.primary_pages += 1,
        }
        tracing::trace!(
            target: "hashcheck::verify",
            bucket,
            page = page.id().0,
            %kind,
            entries,
            "hashcheck.page"
        );
        if let Some(observer) = self.observer.as_mut() {
            observer(&PageVisit {
                bucket,
                page: page.id(),
                kind,
                entries,
            });
        }
        Ok(())
    }
}
