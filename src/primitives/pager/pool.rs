use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, Mutex, RawRwLock, RwLock};
use rustc_hash::FxHashMap;
use serde::Serialize;

use super::frame::Frame;
use super::strategy::AccessStrategy;
use crate::primitives::io::FileIo;
use crate::types::page::{stamp_checksum, verify_image};
use crate::types::{PageId, Result, StorageError};

/// Smallest page size the pool accepts.
pub const MIN_PAGE_SIZE: u32 = 256;
/// Largest page size the pool accepts; item offsets are 16-bit.
pub const MAX_PAGE_SIZE: u32 = 32 * 1024;

/// Configuration for a [`BufferPool`].
#[derive(Clone, Debug)]
pub struct PoolOptions {
    /// Size of every page in bytes.
    pub page_size: u32,
    /// Number of frames kept in memory.
    pub cache_pages: usize,
    /// Verify page number and CRC when a page is read from disk.
    pub verify_checksums: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            page_size: 8192,
            cache_pages: 128,
            verify_checksums: true,
        }
    }
}

/// Counters describing pool activity since it was opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Requests satisfied from a cached frame.
    pub hits: u64,
    /// Requests that had to read the page from disk.
    pub misses: u64,
    /// Frames handed over from one page to another.
    pub evictions: u64,
    /// Misses served by recycling a frame from a bulk-read ring.
    pub ring_reuses: u64,
    /// Dirty pages written back.
    pub writebacks: u64,
}

struct PoolInner {
    frames: Vec<Frame>,
    page_table: FxHashMap<PageId, usize>,
    hand: usize,
    stats: PoolStats,
}

type ReadLatch = ArcRwLockReadGuard<RawRwLock, Box<[u8]>>;
type WriteLatch = ArcRwLockWriteGuard<RawRwLock, Box<[u8]>>;

/// Shared page cache in front of a relation file.
///
/// A page is handed out pinned and latched: the pin keeps its frame from
/// being recycled and the latch (shared for readers, exclusive for writers)
/// guards the bytes. Guards release the latch first and the pin second when
/// dropped. Pinning happens under the pool mutex, but waiting for a latch
/// happens outside it, so a thread blocked on a busy page never stalls
/// unrelated requests.
pub struct BufferPool {
    io: Arc<dyn FileIo>,
    page_size: usize,
    verify_checksums: bool,
    page_count: AtomicU64,
    extend: Mutex<()>,
    inner: Mutex<PoolInner>,
}

impl BufferPool {
    /// Opens a pool over `io`, deriving the page count from the file length.
    pub fn open(io: Arc<dyn FileIo>, options: PoolOptions) -> Result<Self> {
        if options.page_size < MIN_PAGE_SIZE
            || options.page_size > MAX_PAGE_SIZE
            || options.page_size % 8 != 0
        {
            return Err(StorageError::Invalid(
                "page size must be a multiple of 8 between 256 and 32768",
            ));
        }
        if options.cache_pages < 4 {
            return Err(StorageError::Invalid("cache must hold at least 4 pages"));
        }
        let page_size = options.page_size as usize;
        let len = io.len()?;
        if len % page_size as u64 != 0 {
            return Err(StorageError::Corruption(
                "relation length is not a multiple of the page size",
            ));
        }
        let frames = (0..options.cache_pages)
            .map(|_| Frame::new(page_size))
            .collect();
        tracing::debug!(
            target: "hashcheck::pager",
            page_size,
            cache_pages = options.cache_pages,
            pages = len / page_size as u64,
            "pool.open"
        );
        Ok(Self {
            io,
            page_size,
            verify_checksums: options.verify_checksums,
            page_count: AtomicU64::new(len / page_size as u64),
            extend: Mutex::new(()),
            inner: Mutex::new(PoolInner {
                frames,
                page_table: FxHashMap::default(),
                hand: 0,
                stats: PoolStats::default(),
            }),
        })
    }

    /// Page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages currently allocated in the relation.
    pub fn page_count(&self) -> u64 {
        self.page_count.load(Ordering::Acquire)
    }

    /// Snapshot of the activity counters.
    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats
    }

    /// Number of frames currently pinned by some guard.
    pub fn pinned_frames(&self) -> usize {
        self.inner
            .lock()
            .frames
            .iter()
            .filter(|frame| frame.pin_count > 0)
            .count()
    }

    /// Pins and share-latches `id` using the shared replacement policy.
    pub fn read_page(&self, id: PageId) -> Result<PageReadGuard<'_>> {
        let (frame_idx, buf) = self.pin(id, None)?;
        let latch = buf.read_arc();
        Ok(PageReadGuard {
            id,
            pool: self,
            frame_idx,
            latch: Some(latch),
        })
    }

    /// Pins and share-latches `id`, placing a miss according to `strategy`.
    pub fn read_page_with(
        &self,
        id: PageId,
        strategy: &AccessStrategy,
    ) -> Result<PageReadGuard<'_>> {
        let (frame_idx, buf) = self.pin(id, Some(strategy))?;
        let latch = buf.read_arc();
        Ok(PageReadGuard {
            id,
            pool: self,
            frame_idx,
            latch: Some(latch),
        })
    }

    /// Pins and exclusively latches `id`. The page is marked dirty when the
    /// guard is dropped.
    pub fn write_page(&self, id: PageId) -> Result<PageWriteGuard<'_>> {
        let (frame_idx, buf) = self.pin(id, None)?;
        let latch = buf.write_arc();
        Ok(PageWriteGuard {
            id,
            pool: self,
            frame_idx,
            latch: Some(latch),
        })
    }

    /// Extends the relation by `count` zeroed pages and returns the first.
    pub fn allocate(&self, count: u64) -> Result<PageId> {
        if count == 0 {
            return Err(StorageError::Invalid("cannot allocate zero pages"));
        }
        let _extend = self.extend.lock();
        let first = self.page_count();
        let new_count = first
            .checked_add(count)
            .ok_or(StorageError::Invalid("page count overflow"))?;
        let len = new_count
            .checked_mul(self.page_size as u64)
            .ok_or(StorageError::Invalid("relation length overflow"))?;
        self.io.set_len(len)?;
        self.page_count.store(new_count, Ordering::Release);
        tracing::debug!(
            target: "hashcheck::pager",
            first = first,
            count,
            "pool.allocate"
        );
        Ok(PageId(first))
    }

    /// Writes every dirty page back to the file.
    pub fn flush(&self) -> Result<()> {
        let pending: Vec<(usize, PageId, Arc<RwLock<Box<[u8]>>>)> = {
            let mut inner = self.inner.lock();
            inner
                .frames
                .iter_mut()
                .enumerate()
                .filter_map(|(idx, frame)| {
                    let id = frame.id?;
                    if !frame.dirty {
                        return None;
                    }
                    frame.dirty = false;
                    frame.pin_count += 1;
                    Some((idx, id, frame.buf.clone()))
                })
                .collect()
        };
        let mut result = Ok(());
        let mut written = 0u64;
        for (idx, id, buf) in &pending {
            if result.is_ok() {
                let image = buf.read();
                result = self.write_out(*id, &image);
                if result.is_ok() {
                    written += 1;
                }
            }
            if result.is_err() {
                self.inner.lock().frames[*idx].dirty = true;
            }
        }
        let mut inner = self.inner.lock();
        for (idx, _, _) in &pending {
            let frame = &mut inner.frames[*idx];
            frame.pin_count = frame.pin_count.saturating_sub(1);
        }
        inner.stats.writebacks += written;
        drop(inner);
        tracing::debug!(target: "hashcheck::pager", pages = written, "pool.flush");
        result
    }

    /// Flushes dirty pages and syncs the file.
    pub fn sync(&self) -> Result<()> {
        self.flush()?;
        self.io.sync_all()
    }

    /// Forgets every clean, unpinned page so the next access rereads it.
    pub fn invalidate_clean(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut dropped = Vec::new();
        for frame in inner.frames.iter_mut() {
            if let Some(id) = frame.id {
                if frame.is_evictable() && !frame.dirty {
                    dropped.push(id);
                    frame.reset();
                }
            }
        }
        for id in &dropped {
            inner.page_table.remove(id);
        }
        dropped.len()
    }

    fn pin(
        &self,
        id: PageId,
        strategy: Option<&AccessStrategy>,
    ) -> Result<(usize, Arc<RwLock<Box<[u8]>>>)> {
        let page_count = self.page_count();
        if id.0 >= page_count {
            return Err(StorageError::PageOutOfRange {
                page: id,
                page_count,
            });
        }
        let bulk = strategy.filter(|s| s.is_bulk());
        let mut inner = self.inner.lock();
        if let Some(&idx) = inner.page_table.get(&id) {
            inner.stats.hits += 1;
            let frame = &mut inner.frames[idx];
            frame.pin_count += 1;
            if bulk.is_none() {
                frame.reference = true;
            }
            return Ok((idx, frame.buf.clone()));
        }
        inner.stats.misses += 1;
        let idx = self.victim(&mut inner, bulk)?;
        self.load(&mut inner, idx, id)?;
        inner.page_table.insert(id, idx);
        let frame = &mut inner.frames[idx];
        frame.pin_count = 1;
        frame.reference = bulk.is_none();
        if let Some(strategy) = bulk {
            strategy.remember(idx);
        }
        Ok((idx, frame.buf.clone()))
    }

    fn victim(&self, inner: &mut PoolInner, bulk: Option<&AccessStrategy>) -> Result<usize> {
        if let Some(strategy) = bulk {
            if let Some(idx) = strategy.next_victim() {
                let frame = &inner.frames[idx];
                if frame.is_evictable() && !frame.reference {
                    self.evict(inner, idx)?;
                    inner.stats.ring_reuses += 1;
                    return Ok(idx);
                }
            }
        }
        if let Some(idx) = inner
            .frames
            .iter()
            .position(|frame| frame.id.is_none() && frame.is_evictable())
        {
            return Ok(idx);
        }
        let n = inner.frames.len();
        for _ in 0..2 * n {
            let idx = inner.hand;
            inner.hand = (inner.hand + 1) % n;
            let frame = &mut inner.frames[idx];
            if !frame.is_evictable() {
                continue;
            }
            if frame.reference {
                frame.reference = false;
                continue;
            }
            self.evict(inner, idx)?;
            return Ok(idx);
        }
        Err(StorageError::Invalid("no unpinned buffer frame available"))
    }

    fn evict(&self, inner: &mut PoolInner, idx: usize) -> Result<()> {
        let Some(old) = inner.frames[idx].id else {
            return Ok(());
        };
        if inner.frames[idx].dirty {
            let buf = inner.frames[idx].buf.clone();
            let image = buf.read();
            self.write_out(old, &image)?;
            inner.stats.writebacks += 1;
        }
        inner.page_table.remove(&old);
        inner.frames[idx].reset();
        inner.stats.evictions += 1;
        tracing::trace!(target: "hashcheck::pager", page = old.0, frame = idx, "pool.evict");
        Ok(())
    }

    fn load(&self, inner: &mut PoolInner, idx: usize, id: PageId) -> Result<()> {
        let buf = inner.frames[idx].buf.clone();
        let result = {
            let mut image = buf.write();
            self.read_into(id, &mut image)
        };
        match result {
            Ok(()) => {
                inner.frames[idx].id = Some(id);
                Ok(())
            }
            Err(err) => {
                inner.frames[idx].reset();
                tracing::debug!(target: "hashcheck::pager", page = id.0, error = %err, "pool.load_failed");
                Err(err)
            }
        }
    }

    fn read_into(&self, id: PageId, image: &mut [u8]) -> Result<()> {
        let offset = id
            .offset(self.page_size)
            .ok_or(StorageError::Invalid("page offset overflow"))?;
        self.io.read_at(offset, image)?;
        if self.verify_checksums {
            verify_image(image, id)?;
        }
        Ok(())
    }

    fn write_out(&self, id: PageId, image: &[u8]) -> Result<()> {
        let offset = id
            .offset(self.page_size)
            .ok_or(StorageError::Invalid("page offset overflow"))?;
        let mut copy = image.to_vec();
        stamp_checksum(&mut copy);
        self.io.write_at(offset, &copy)
    }

    fn unpin(&self, frame_idx: usize, dirtied: bool) {
        let mut inner = self.inner.lock();
        if let Some(frame) = inner.frames.get_mut(frame_idx) {
            frame.pin_count = frame.pin_count.saturating_sub(1);
            if dirtied {
                frame.dirty = true;
            }
        }
    }
}

/// Shared access to a pinned page.
pub struct PageReadGuard<'a> {
    id: PageId,
    pool: &'a BufferPool,
    frame_idx: usize,
    latch: Option<ReadLatch>,
}

impl PageReadGuard<'_> {
    /// Page this guard refers to.
    pub fn id(&self) -> PageId {
        self.id
    }

    /// The page image.
    pub fn data(&self) -> &[u8] {
        match &self.latch {
            Some(latch) => latch,
            None => &[],
        }
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        drop(self.latch.take());
        self.pool.unpin(self.frame_idx, false);
    }
}

/// Exclusive access to a pinned page.
pub struct PageWriteGuard<'a> {
    id: PageId,
    pool: &'a BufferPool,
    frame_idx: usize,
    latch: Option<WriteLatch>,
}

impl PageWriteGuard<'_> {
    /// Page this guard refers to.
    pub fn id(&self) -> PageId {
        self.id
    }

    /// The page image.
    pub fn data(&self) -> &[u8] {
        match &self.latch {
            Some(latch) => latch,
            None => &[],
        }
    }

    /// The page image, mutably.
    pub fn data_mut(&mut self) -> &mut [u8] {
        match &mut self.latch {
            Some(latch) => latch,
            None => &mut [],
        }
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        drop(self.latch.take());
        self.pool.unpin(self.frame_idx, true);
    }
}
