use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::{smallvec, SmallVec};

use crate::primitives::io::{FileIo, StdFileIo};
use crate::primitives::pager::{BufferPool, PoolOptions};
use crate::storage::relation::{AccessMethod, Relation};
use crate::types::page::{add_item, clear_items, item_id, PageHeader, FIRST_OFFSET};
use crate::types::{PageId, Result, StorageError};

use super::meta::{spare_index, stored_page_size, HashMeta, HASH_MAX_SPLITPOINTS, HASH_METAPAGE};
use super::page::{init_hash_page, page_capacity, set_next, HashOpaque, HashPageKind};
use super::tuple::{hash_key_bytes, HeapTid, IndexTuple, INDEX_TUPLE_LEN};

/// Pages of one bucket chain; most chains fit inline.
type ChainPages = SmallVec<[PageId; 8]>;

/// Options for creating or opening a [`HashIndex`].
#[derive(Clone, Debug)]
pub struct HashIndexOptions {
    /// Page size in bytes; ignored when opening an existing index.
    pub page_size: u32,
    /// Buffer pool size in pages.
    pub cache_pages: usize,
    /// Buckets created up front, rounded up to a power of two.
    pub initial_buckets: u32,
    /// Average entries per bucket that triggers a split.
    pub fill_factor: u16,
    /// Verify page checksums when reading from disk.
    pub verify_checksums: bool,
}

impl Default for HashIndexOptions {
    fn default() -> Self {
        let pool = PoolOptions::default();
        Self {
            page_size: pool.page_size,
            cache_pages: pool.cache_pages,
            initial_buckets: 2,
            fill_factor: 375,
            verify_checksums: pool.verify_checksums,
        }
    }
}

impl HashIndexOptions {
    fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            page_size: self.page_size,
            cache_pages: self.cache_pages,
            verify_checksums: self.verify_checksums,
        }
    }
}

/// A linear hash index stored in one relation file.
///
/// Writers are serialized by an internal latch. Each write step locks a
/// single page at a time, and new structure is initialised before anything
/// points at it, so readers walking bucket chains concurrently always see
/// well-formed pages: an overflow page is formatted before its predecessor
/// links to it, and a split publishes the new `max_bucket` only after both
/// halves have been rewritten.
pub struct HashIndex {
    name: String,
    pool: Arc<BufferPool>,
    writer: Mutex<()>,
}

impl HashIndex {
    /// Creates a new index file at `path`.
    pub fn create(path: impl AsRef<Path>, options: HashIndexOptions) -> Result<Self> {
        let path = path.as_ref();
        let io = StdFileIo::open(path)?;
        if !io.is_empty()? {
            return Err(StorageError::Invalid("index file already exists"));
        }
        Self::create_with_io(relation_name(path), Arc::new(io), options)
    }

    /// Opens an existing index file at `path`.
    pub fn open(path: impl AsRef<Path>, options: HashIndexOptions) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StorageError::Invalid("index file does not exist"));
        }
        let io = StdFileIo::open(path)?;
        Self::open_with_io(relation_name(path), Arc::new(io), options)
    }

    /// Builds a new index on an empty file.
    pub fn create_with_io(
        name: impl Into<String>,
        io: Arc<dyn FileIo>,
        options: HashIndexOptions,
    ) -> Result<Self> {
        let buckets = options
            .initial_buckets
            .max(1)
            .checked_next_power_of_two()
            .ok_or(StorageError::Invalid("too many initial buckets"))?;
        let pool = Arc::new(BufferPool::open(io, options.pool_options())?);
        if pool.page_count() != 0 {
            return Err(StorageError::Invalid("index file already exists"));
        }
        if page_capacity(pool.page_size(), INDEX_TUPLE_LEN) == 0 {
            return Err(StorageError::Invalid("page size too small for index entries"));
        }
        let meta = HashMeta::new(buckets, options.fill_factor, pool.page_size())?;
        let meta_page = pool.allocate(1 + buckets as u64)?;
        debug_assert_eq!(meta_page, HASH_METAPAGE);
        for bucket in 0..buckets {
            let id = meta.bucket_to_page(bucket);
            let mut page = pool.write_page(id)?;
            init_hash_page(page.data_mut(), id, HashPageKind::Bucket, bucket, None)?;
        }
        {
            let mut page = pool.write_page(HASH_METAPAGE)?;
            meta.init_page(page.data_mut())?;
        }
        pool.sync()?;
        let name = name.into();
        tracing::info!(
            target: "hashcheck::storage",
            index = %name,
            buckets,
            page_size = pool.page_size(),
            "hash.create"
        );
        Ok(Self {
            name,
            pool,
            writer: Mutex::new(()),
        })
    }

    /// Opens an index on an existing file, using the page size recorded in
    /// its metapage when there is a readable one.
    pub fn open_with_io(
        name: impl Into<String>,
        io: Arc<dyn FileIo>,
        options: HashIndexOptions,
    ) -> Result<Self> {
        let mut pool_options = options.pool_options();
        if let Some(page_size) = stored_page_size(io.as_ref())? {
            pool_options.page_size = page_size;
        }
        let pool = Arc::new(BufferPool::open(io, pool_options)?);
        if pool.page_count() == 0 {
            return Err(StorageError::Corruption("index file has no metapage"));
        }
        Ok(Self {
            name: name.into(),
            pool,
            writer: Mutex::new(()),
        })
    }

    /// Name of the index relation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Buffer pool caching this index.
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Relation handle for checking this index.
    pub fn relation(&self) -> Relation {
        Relation::new(self.name.clone(), AccessMethod::Hash, Arc::clone(&self.pool))
    }

    /// Current metapage contents.
    pub fn meta(&self) -> Result<HashMeta> {
        let page = self.pool.read_page(HASH_METAPAGE)?;
        HashMeta::decode(page.data())
    }

    /// Pages of `bucket`'s chain, primary page first.
    pub fn bucket_pages(&self, bucket: u32) -> Result<Vec<PageId>> {
        let meta = self.meta()?;
        if bucket > meta.max_bucket {
            return Err(StorageError::Invalid("bucket does not exist"));
        }
        Ok(self.chain_pages(meta.bucket_to_page(bucket))?.into_vec())
    }

    /// Adds an entry for a key whose hash is `hash_key`.
    pub fn insert(&self, hash_key: u32, tid: HeapTid) -> Result<()> {
        let _writer = self.writer.lock();
        let meta = self.meta()?;
        let bucket = meta.hash_to_bucket(hash_key);
        let tail = self.chain_tail(meta.bucket_to_page(bucket))?;
        self.append(bucket, tail, &IndexTuple::new(hash_key, tid))?;
        let meta = self.update_meta(|meta| meta.ntuples += 1)?;
        if meta.ntuples > meta.ffactor as u64 * meta.bucket_count() {
            self.split(meta)?;
        }
        Ok(())
    }

    /// Hashes `key` and adds an entry for it, returning the hash.
    pub fn insert_key(&self, key: &[u8], tid: HeapTid) -> Result<u32> {
        let hash_key = hash_key_bytes(key);
        self.insert(hash_key, tid)?;
        Ok(hash_key)
    }

    /// Splits the next bucket regardless of load, returning the new bucket.
    pub fn expand(&self) -> Result<u32> {
        let _writer = self.writer.lock();
        let meta = self.meta()?;
        self.split(meta)
    }

    /// Writes dirty pages and syncs the file.
    pub fn flush(&self) -> Result<()> {
        self.pool.sync()
    }

    fn update_meta(&self, f: impl FnOnce(&mut HashMeta)) -> Result<HashMeta> {
        let mut page = self.pool.write_page(HASH_METAPAGE)?;
        let mut meta = HashMeta::decode(page.data())?;
        f(&mut meta);
        meta.store(page.data_mut());
        Ok(meta)
    }

    fn chain_pages(&self, start: PageId) -> Result<ChainPages> {
        let mut pages: ChainPages = smallvec![start];
        let mut current = start;
        loop {
            let next = {
                let page = self.pool.read_page(current)?;
                HashOpaque::decode(page.data())?.next
            };
            let Some(next) = next else {
                return Ok(pages);
            };
            if pages.len() as u64 >= self.pool.page_count() {
                return Err(StorageError::Corruption("bucket chain does not terminate"));
            }
            pages.push(next);
            current = next;
        }
    }

    fn chain_tail(&self, start: PageId) -> Result<PageId> {
        let pages = self.chain_pages(start)?;
        Ok(pages.last().copied().unwrap_or(start))
    }

    /// Stores `tuple` on `tail`, or on a new overflow page linked after it.
    /// Returns the chain's tail afterwards.
    fn append(&self, bucket: u32, tail: PageId, tuple: &IndexTuple) -> Result<PageId> {
        let bytes = tuple.encode();
        {
            let mut page = self.pool.write_page(tail)?;
            if add_item(page.data_mut(), &bytes)?.is_some() {
                return Ok(tail);
            }
        }
        let overflow = self.add_overflow_page(bucket, tail)?;
        let mut page = self.pool.write_page(overflow)?;
        add_item(page.data_mut(), &bytes)?
            .ok_or(StorageError::Invalid("entry does not fit on an empty page"))?;
        Ok(overflow)
    }

    fn add_overflow_page(&self, bucket: u32, tail: PageId) -> Result<PageId> {
        let overflow = {
            let mut page = self.pool.write_page(HASH_METAPAGE)?;
            let mut meta = HashMeta::decode(page.data())?;
            let splitpoint = meta.ovfl_point as usize;
            if splitpoint >= HASH_MAX_SPLITPOINTS {
                return Err(StorageError::Corruption("metapage split point out of range"));
            }
            let overflow = self.pool.allocate(1)?;
            meta.spares[splitpoint] += 1;
            meta.store(page.data_mut());
            overflow
        };
        {
            let mut page = self.pool.write_page(overflow)?;
            init_hash_page(
                page.data_mut(),
                overflow,
                HashPageKind::Overflow,
                bucket,
                Some(tail),
            )?;
        }
        {
            let mut page = self.pool.write_page(tail)?;
            set_next(page.data_mut(), Some(overflow))?;
        }
        tracing::debug!(
            target: "hashcheck::storage",
            bucket,
            page = overflow.0,
            prev = tail.0,
            "hash.overflow_added"
        );
        Ok(overflow)
    }

    /// Allocates the primary pages of the next split point in one block.
    fn add_splitpoint(&self) -> Result<()> {
        let mut page = self.pool.write_page(HASH_METAPAGE)?;
        let mut meta = HashMeta::decode(page.data())?;
        let splitpoint = meta.ovfl_point as usize + 1;
        if splitpoint >= HASH_MAX_SPLITPOINTS {
            return Err(StorageError::Invalid("hash index cannot grow past its last split point"));
        }
        let group = 1u64 << (splitpoint - 1);
        let first = self.pool.allocate(group)?;
        meta.spares[splitpoint] = meta.spares[splitpoint - 1];
        meta.ovfl_point = splitpoint as u32;
        if first != meta.bucket_to_page(meta.max_bucket + 1) {
            return Err(StorageError::Corruption("bucket group allocation misaligned"));
        }
        meta.store(page.data_mut());
        tracing::debug!(
            target: "hashcheck::storage",
            splitpoint,
            first = first.0,
            pages = group,
            "hash.splitpoint_added"
        );
        Ok(())
    }

    fn split(&self, meta: HashMeta) -> Result<u32> {
        let new_bucket = meta
            .max_bucket
            .checked_add(1)
            .ok_or(StorageError::Invalid("bucket number overflow"))?;
        let old_bucket = new_bucket & meta.low_mask;
        if spare_index(new_bucket as u64 + 1) > meta.ovfl_point {
            self.add_splitpoint()?;
        }

        let mut target = self.meta()?;
        target.max_bucket = new_bucket;
        if new_bucket > target.high_mask {
            target.low_mask = target.high_mask;
            target.high_mask = new_bucket | target.low_mask;
        }
        let old_chain = self.chain_pages(target.bucket_to_page(old_bucket))?;
        let new_start = target.bucket_to_page(new_bucket);

        let mut keep = Vec::new();
        let mut moved = Vec::new();
        for id in &old_chain {
            let page = self.pool.read_page(*id)?;
            for tuple in page_tuples(page.data())? {
                if target.hash_to_bucket(tuple.hash_key) == new_bucket {
                    moved.push(tuple);
                } else {
                    keep.push(tuple);
                }
            }
        }

        {
            let mut page = self.pool.write_page(new_start)?;
            init_hash_page(page.data_mut(), new_start, HashPageKind::Bucket, new_bucket, None)?;
        }
        let mut tail = new_start;
        for tuple in &moved {
            tail = self.append(new_bucket, tail, tuple)?;
        }

        let mut remaining = keep.iter().peekable();
        for id in &old_chain {
            let mut page = self.pool.write_page(*id)?;
            clear_items(page.data_mut())?;
            while let Some(tuple) = remaining.peek() {
                if add_item(page.data_mut(), &tuple.encode())?.is_none() {
                    break;
                }
                remaining.next();
            }
        }
        if remaining.peek().is_some() {
            return Err(StorageError::Corruption("split could not rehouse bucket entries"));
        }

        self.update_meta(|meta| {
            meta.max_bucket = target.max_bucket;
            meta.high_mask = target.high_mask;
            meta.low_mask = target.low_mask;
        })?;
        tracing::debug!(
            target: "hashcheck::storage",
            old_bucket,
            new_bucket,
            moved = moved.len(),
            kept = keep.len(),
            "hash.split"
        );
        Ok(new_bucket)
    }
}

fn page_tuples(page: &[u8]) -> Result<Vec<IndexTuple>> {
    let header = PageHeader::decode(page)?;
    (FIRST_OFFSET..=header.max_offset())
        .map(|offset| {
            let item = item_id(page, offset)
                .ok_or(StorageError::Corruption("line pointer outside page"))?;
            let start = item.offset as usize;
            let body = page
                .get(start..start + item.len as usize)
                .ok_or(StorageError::Corruption("item extends past page end"))?;
            IndexTuple::decode(body).map_err(StorageError::Corruption)
        })
        .collect()
}

fn relation_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "hash_index".to_string())
}
