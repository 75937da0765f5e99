//! Low-level primitives the storage layer is built on.

/// Positioned file I/O.
///
/// File-backed and in-memory implementations of the [`io::FileIo`] trait.
pub mod io;

/// Buffer pool.
///
/// Caches pages in memory, hands them out pinned and latched, and writes
/// dirty pages back with a checksum.
pub mod pager;
