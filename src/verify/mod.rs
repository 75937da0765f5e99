//! Online structural checks for index relations.

mod error;
mod options;
mod registry;

/// Hash index checker.
///
/// Bucket-by-bucket chain walk with page role, chain shape and entry checks.
pub mod hash;

use serde::Serialize;

use crate::primitives::pager::PoolStats;
use crate::storage::Relation;

/// Error types raised by checks.
pub use error::{CheckError, Corruption, CorruptionKind};
/// Check tunables.
pub use options::CheckOptions;
/// Access-method dispatch.
pub use registry::{CheckerRegistry, IndexCheck};
/// Hash checker entry points.
pub use hash::{check_hash_index, CheckStats, HashChecker, HashIndexCheck, PageVisit};

/// Outcome of a check in a form suitable for printing or JSON output.
#[derive(Clone, Debug, Serialize)]
pub struct CheckReport {
    /// Checked relation.
    pub index: String,
    /// Whether the check completed without finding a problem.
    pub success: bool,
    /// Counters, present when the check completed.
    pub stats: Option<CheckStats>,
    /// Damage found, if the check stopped on corruption.
    pub corruption: Option<CorruptionKind>,
    /// Message of whatever stopped the check.
    pub error: Option<String>,
    /// Buffer pool activity during the check.
    pub pool: PoolStats,
}

impl CheckReport {
    /// Summarizes `outcome` of checking `index`.
    pub fn new(index: &Relation, outcome: &Result<CheckStats, CheckError>) -> Self {
        let pool = index.pool().stats();
        match outcome {
            Ok(stats) => Self {
                index: index.name().to_string(),
                success: true,
                stats: Some(*stats),
                corruption: None,
                error: None,
                pool,
            },
            Err(err) => Self {
                index: index.name().to_string(),
                success: false,
                stats: None,
                corruption: err.corruption().cloned(),
                error: Some(err.to_string()),
                pool,
            },
        }
    }
}
