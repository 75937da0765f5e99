//! Structural checker for hash indexes.
//!
//! The checker reads the metapage once, then walks the chain of every bucket
//! from 0 to `max_bucket`, confirming each page's declared role before
//! reading anything else from it and decoding every entry it holds. It only
//! ever takes page share latches, one or two at a time, so writers keep
//! working on the index while it runs. Buckets created after the metapage was
//! read are not visited.
//!
//! The first problem found ends the run.

mod access;
mod chain;
mod entries;
mod meta;

use serde::Serialize;

use crate::storage::hash::HashPageKind;
use crate::storage::{AccessMethod, Relation};
use crate::types::PageId;

use super::registry::IndexCheck;
use super::{CheckError, CheckOptions};

use access::PageAccessor;
use chain::ChainWalker;
pub use entries::ScannedEntry;

/// Counters from a completed check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CheckStats {
    /// `max_bucket` as read from the metapage.
    pub max_bucket: u32,
    /// Buckets whose chains were walked.
    pub buckets_checked: u64,
    /// Bucket primary pages visited.
    pub primary_pages: u64,
    /// Overflow pages visited.
    pub overflow_pages: u64,
    /// Entries decoded.
    pub entries_scanned: u64,
}

/// A page the checker finished scanning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageVisit {
    /// Bucket whose chain the page belongs to.
    pub bucket: u32,
    /// The page.
    pub page: PageId,
    /// Role the page was validated as.
    pub kind: HashPageKind,
    /// Entries decoded from it.
    pub entries: u32,
}

/// Callback told about every page the checker scans.
pub type PageObserver<'a> = Box<dyn FnMut(&PageVisit) + 'a>;

/// A single check run over one hash index.
pub struct HashChecker<'a> {
    index: &'a Relation,
    options: CheckOptions,
    observer: Option<PageObserver<'a>>,
}

impl<'a> HashChecker<'a> {
    /// Check of `index` with default options.
    pub fn new(index: &'a Relation) -> Self {
        Self {
            index,
            options: CheckOptions::default(),
            observer: None,
        }
    }

    /// Replaces the run's options.
    pub fn with_options(mut self, options: CheckOptions) -> Self {
        self.options = options;
        self
    }

    /// Calls `observer` after each page is scanned, in visiting order.
    pub fn on_page(mut self, observer: impl FnMut(&PageVisit) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Walks every bucket, stopping at the first problem found.
    pub fn run(mut self) -> Result<CheckStats, CheckError> {
        let accessor = PageAccessor::new(self.index, &self.options);
        let meta = meta::read_meta(&accessor)?;
        tracing::info!(
            target: "hashcheck::verify",
            index = self.index.name(),
            max_bucket = meta.max_bucket,
            pages = accessor.page_count(),
            "hashcheck.start"
        );
        let mut stats = CheckStats {
            max_bucket: meta.max_bucket,
            ..CheckStats::default()
        };
        let mut walker = ChainWalker {
            accessor: &accessor,
            meta: &meta,
            verify_ownership: self.options.verify_bucket_ownership,
            stats: &mut stats,
            observer: &mut self.observer,
        };
        for bucket in 0..=meta.max_bucket {
            let start = meta.bucket_to_page(bucket);
            tracing::debug!(target: "hashcheck::verify", bucket, page = start.0, "hashcheck.bucket");
            walker.walk(bucket, start, HashPageKind::Bucket)?;
            walker.stats.buckets_checked += 1;
        }
        tracing::info!(
            target: "hashcheck::verify",
            index = self.index.name(),
            buckets = stats.buckets_checked,
            overflow_pages = stats.overflow_pages,
            entries = stats.entries_scanned,
            "hashcheck.done"
        );
        Ok(stats)
    }
}

/// Checks the structure of hash index `index`.
///
/// `heap` is accepted so every index checker has the same shape; the hash
/// checker does not consult it.
pub fn check_hash_index(index: &Relation, _heap: Option<&Relation>) -> Result<(), CheckError> {
    HashChecker::new(index).run().map(|_| ())
}

/// Registry entry for hash indexes.
pub struct HashIndexCheck;

impl IndexCheck for HashIndexCheck {
    fn access_method(&self) -> AccessMethod {
        AccessMethod::Hash
    }

    fn check(
        &self,
        index: &Relation,
        _heap: Option<&Relation>,
        options: &CheckOptions,
    ) -> Result<CheckStats, CheckError> {
        HashChecker::new(index).with_options(options.clone()).run()
    }
}
