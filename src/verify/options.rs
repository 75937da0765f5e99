use crate::primitives::pager::{StrategyKind, DEFAULT_BULK_READ_RING};

/// Tunables for a check run.
#[derive(Clone, Debug)]
pub struct CheckOptions {
    /// How page misses are placed in the buffer pool.
    pub strategy: StrategyKind,
    /// Ring size when `strategy` is [`StrategyKind::BulkRead`].
    pub bulk_read_ring_pages: usize,
    /// Also require every chain page to record the bucket being walked, and
    /// every entry's hash to map to that bucket using the masks read from the
    /// metapage at the start of the run.
    pub verify_bucket_ownership: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::BulkRead,
            bulk_read_ring_pages: DEFAULT_BULK_READ_RING,
            verify_bucket_ownership: false,
        }
    }
}
