use parking_lot::RwLock;
use std::sync::Arc;

use crate::types::PageId;

/// One slot of the buffer pool.
///
/// Bookkeeping fields are only touched under the pool's inner mutex; the page
/// image itself is guarded by `buf`.
pub struct Frame {
    pub id: Option<PageId>,
    pub buf: Arc<RwLock<Box<[u8]>>>,
    pub reference: bool,
    pub dirty: bool,
    pub pin_count: u32,
}

impl Frame {
    pub fn new(page_size: usize) -> Self {
        Self {
            id: None,
            buf: Arc::new(RwLock::new(vec![0u8; page_size].into_boxed_slice())),
            reference: false,
            dirty: false,
            pin_count: 0,
        }
    }

    /// A frame can be handed to another page only when nobody holds it.
    pub fn is_evictable(&self) -> bool {
        self.pin_count == 0
    }

    pub fn reset(&mut self) {
        self.id = None;
        self.reference = false;
        self.dirty = false;
        self.pin_count = 0;
    }
}
