#![forbid(unsafe_code)]

/// Incremental 32-bit checksum.
pub trait Checksum {
    /// Starts over.
    fn reset(&mut self);
    /// Feeds `bytes` in.
    fn update(&mut self, bytes: &[u8]);
    /// Checksum of everything fed since the last reset.
    fn finalize(&self) -> u32;
}

/// CRC-32 (IEEE) backed by `crc32fast`.
pub struct Crc32Fast {
    inner: crc32fast::Hasher,
}

impl Default for Crc32Fast {
    fn default() -> Self {
        Self {
            inner: crc32fast::Hasher::new(),
        }
    }
}

impl Checksum for Crc32Fast {
    fn reset(&mut self) {
        self.inner.reset();
    }

    fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    fn finalize(&self) -> u32 {
        self.inner.clone().finalize()
    }
}

/// CRC of a page image whose checksum field occupies `crc_field`.
///
/// The field itself is hashed as zeros so the stored value does not feed
/// back into the computation. The page number is mixed in so a page written
/// to the wrong block fails verification.
pub fn page_crc32(page_no: u64, page: &[u8], crc_field: std::ops::Range<usize>) -> u32 {
    let mut hasher = Crc32Fast::default();
    hasher.update(&page_no.to_be_bytes());
    hasher.update(&page[..crc_field.start]);
    hasher.update(&[0u8; 4][..crc_field.len().min(4)]);
    hasher.update(&page[crc_field.end..]);
    hasher.finalize()
}
