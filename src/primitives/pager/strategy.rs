use std::collections::VecDeque;

use parking_lot::Mutex;

/// Default ring size for bulk reads, in pages.
pub const DEFAULT_BULK_READ_RING: usize = 32;

/// How a reader wants its page misses to be placed in the pool.
///
/// `Normal` uses the shared clock replacement. `BulkRead` confines a long
/// sequential scan to a small ring of frames that it recycles, so one pass
/// over a large relation does not push hot pages of other users out of the
/// cache.
#[derive(Debug)]
pub struct AccessStrategy {
    kind: StrategyKind,
    ring: Mutex<Ring>,
}

/// Selects the replacement behaviour of an [`AccessStrategy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StrategyKind {
    /// Shared clock replacement.
    Normal,
    /// Recycled private ring of frames.
    #[default]
    BulkRead,
}

#[derive(Debug, Default)]
struct Ring {
    capacity: usize,
    frames: VecDeque<usize>,
}

impl AccessStrategy {
    /// Strategy that competes for frames like any other reader.
    pub fn normal() -> Self {
        Self {
            kind: StrategyKind::Normal,
            ring: Mutex::new(Ring::default()),
        }
    }

    /// Strategy that recycles at most `ring_pages` frames.
    pub fn bulk_read(ring_pages: usize) -> Self {
        Self {
            kind: StrategyKind::BulkRead,
            ring: Mutex::new(Ring {
                capacity: ring_pages.max(1),
                frames: VecDeque::with_capacity(ring_pages.max(1)),
            }),
        }
    }

    /// Builds the strategy named by `kind`.
    pub fn from_kind(kind: StrategyKind, ring_pages: usize) -> Self {
        match kind {
            StrategyKind::Normal => Self::normal(),
            StrategyKind::BulkRead => Self::bulk_read(ring_pages),
        }
    }

    /// Replacement behaviour of this strategy.
    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub(crate) fn is_bulk(&self) -> bool {
        self.kind == StrategyKind::BulkRead
    }

    /// Next ring frame to recycle, if the ring is full. The caller decides
    /// whether the frame is still reusable.
    pub(crate) fn next_victim(&self) -> Option<usize> {
        let mut ring = self.ring.lock();
        if ring.frames.len() < ring.capacity {
            return None;
        }
        ring.frames.pop_front()
    }

    /// Records that `idx` now holds a page loaded through this strategy.
    pub(crate) fn remember(&self, idx: usize) {
        let mut ring = self.ring.lock();
        if ring.frames.contains(&idx) {
            return;
        }
        if ring.frames.len() >= ring.capacity {
            ring.frames.pop_front();
        }
        ring.frames.push_back(idx);
    }

    /// Number of frames currently tracked by the ring.
    pub fn ring_len(&self) -> usize {
        self.ring.lock().frames.len()
    }
}
