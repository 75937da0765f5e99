//! Online structural checking for paged hash indexes.
//!
//! The crate carries a small storage stack (positioned file I/O, a buffer
//! pool with page latches, and a linear hash index format with a
//! single-writer builder) and a checker that audits a live index while
//! writers keep using it.

#![warn(missing_docs)]

pub mod primitives;
pub mod storage;
pub mod types;
pub mod verify;

pub use verify::{check_hash_index, CheckError, CheckOptions, CheckStats, CheckerRegistry};
