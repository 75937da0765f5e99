use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::primitives::pager::BufferPool;

/// On-disk organization of a relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMethod {
    /// Unordered table storage.
    Heap,
    /// Linear hash index.
    Hash,
    /// B-tree index.
    BTree,
    /// Generalized inverted index.
    Gin,
    /// Generalized search tree.
    Gist,
}

impl fmt::Display for AccessMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Heap => "heap",
            Self::Hash => "hash",
            Self::BTree => "btree",
            Self::Gin => "gin",
            Self::Gist => "gist",
        })
    }
}

/// Open handle on a relation: its name, organization and page cache.
///
/// Holding a `Relation` keeps the underlying pool alive, so the file cannot
/// be closed out from under a check in progress.
#[derive(Clone)]
pub struct Relation {
    name: String,
    access_method: AccessMethod,
    pool: Arc<BufferPool>,
}

impl Relation {
    /// Wraps `pool` as relation `name`.
    pub fn new(name: impl Into<String>, access_method: AccessMethod, pool: Arc<BufferPool>) -> Self {
        Self {
            name: name.into(),
            access_method,
            pool,
        }
    }

    /// Relation name used in reports and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How the relation is organized.
    pub fn access_method(&self) -> AccessMethod {
        self.access_method
    }

    /// Page cache the relation is read through.
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("access_method", &self.access_method)
            .field("pages", &self.pool.page_count())
            .finish()
    }
}
