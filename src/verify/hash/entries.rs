use crate::storage::hash::IndexTuple;
use crate::types::page::{item_id, PageHeader, FIRST_OFFSET};
use crate::types::PageId;

/// An entry decoded from a page slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScannedEntry {
    /// Slot offset number.
    pub offset: u16,
    /// Decoded tuple.
    pub tuple: IndexTuple,
}

/// A slot that could not be decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BadSlot {
    pub page: PageId,
    pub offset: u16,
    pub reason: &'static str,
}

/// Decodes the entries of one page in slot order.
///
/// Yields `FIRST_OFFSET..=max_offset`, then stops. After the first bad slot
/// it yields nothing more.
pub(crate) struct EntryScanner<'p> {
    page: PageId,
    data: &'p [u8],
    header: Result<PageHeader, &'static str>,
    next: u16,
    done: bool,
}

impl<'p> EntryScanner<'p> {
    pub fn new(page: PageId, data: &'p [u8]) -> Self {
        let header = PageHeader::decode(data)
            .map_err(|_| "page shorter than header")
            .and_then(|header| header.check_bounds(data.len()).map(|()| header));
        Self {
            page,
            data,
            header,
            next: FIRST_OFFSET,
            done: false,
        }
    }

    fn bad(&mut self, offset: u16, reason: &'static str) -> Option<Result<ScannedEntry, BadSlot>> {
        self.done = true;
        Some(Err(BadSlot {
            page: self.page,
            offset,
            reason,
        }))
    }
}

impl Iterator for EntryScanner<'_> {
    type Item = Result<ScannedEntry, BadSlot>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let header = match self.header {
            Ok(header) => header,
            Err(reason) => return self.bad(FIRST_OFFSET, reason),
        };
        let offset = self.next;
        if offset > header.max_offset() {
            self.done = true;
            return None;
        }
        self.next += 1;
        let Some(item) = item_id(self.data, offset) else {
            return self.bad(offset, "line pointer outside page");
        };
        if item.len == 0 {
            return self.bad(offset, "empty line pointer");
        }
        let start = item.offset as usize;
        let end = start + item.len as usize;
        if start < header.upper as usize || end > header.special as usize {
            return self.bad(offset, "tuple extent outside item storage");
        }
        match IndexTuple::decode(&self.data[start..end]) {
            Ok(tuple) => Some(Ok(ScannedEntry { offset, tuple })),
            Err(reason) => self.bad(offset, reason),
        }
    }
}
