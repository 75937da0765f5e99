//! Relations and the on-disk formats the checker audits.

/// Hash index pages, metapage and writer.
///
/// Everything needed to build, grow and read a linear hash index file.
pub mod hash;

mod relation;

/// Relation handles shared by writers and checkers.
pub use relation::{AccessMethod, Relation};
