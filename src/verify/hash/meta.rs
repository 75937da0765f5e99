use crate::storage::hash::{HashMeta, HashPageKind, HASH_METAPAGE};

use super::access::PageAccessor;
use crate::verify::{CheckError, CorruptionKind};

/// Copies the metapage out and releases it.
pub(crate) fn read_meta(accessor: &PageAccessor<'_>) -> Result<HashMeta, CheckError> {
    let page = accessor.acquire(HASH_METAPAGE)?;
    accessor.validate(&page, HashPageKind::Meta)?;
    HashMeta::decode(page.data()).map_err(|_| {
        accessor.corruption(CorruptionKind::CorruptedPage {
            page: HASH_METAPAGE,
            reason: "page too small for metapage",
        })
    })
}
