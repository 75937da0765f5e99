//! Linear hash index storage.
//!
//! Page 0 is the metapage. Bucket `b`'s primary page sits at a position fixed
//! by `b` and the metapage's `spares` array, and further entries spill into
//! overflow pages linked from it. The index doubles one bucket at a time by
//! splitting bucket `b & low_mask` into `b`.

mod index;
mod meta;
mod page;
mod tuple;

pub use index::{HashIndex, HashIndexOptions};
pub use meta::{
    spare_index, HashMeta, HASH_MAGIC, HASH_MAX_SPLITPOINTS, HASH_METAPAGE, HASH_VERSION,
};
pub use page::{
    describe, expected_special, init_hash_page, page_capacity, set_next, HashOpaque,
    HashPageKind, HASH_OPAQUE_LEN, HASH_PAGE_ID, PAGE_TYPE_MASK,
};
pub use tuple::{hash_key_bytes, HeapTid, IndexTuple, INDEX_TUPLE_LEN, INFO_SIZE_MASK};
