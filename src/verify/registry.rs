use rustc_hash::FxHashMap;

use crate::storage::{AccessMethod, Relation};

use super::hash::{CheckStats, HashIndexCheck};
use super::{CheckError, CheckOptions};

/// A structural checker for one index organization.
pub trait IndexCheck: Send + Sync {
    /// Organization this checker understands.
    fn access_method(&self) -> AccessMethod;

    /// Confirms `index` can be handed to [`IndexCheck::check`].
    fn checkable(&self, index: &Relation) -> Result<(), CheckError> {
        if index.access_method() != self.access_method() {
            return Err(CheckError::WrongAccessMethod {
                index: index.name().to_string(),
                expected: self.access_method(),
                actual: index.access_method(),
            });
        }
        Ok(())
    }

    /// Audits `index`. `heap` is the table the index belongs to, for
    /// checkers that cross-reference it.
    fn check(
        &self,
        index: &Relation,
        heap: Option<&Relation>,
        options: &CheckOptions,
    ) -> Result<CheckStats, CheckError>;
}

/// Maps access methods to their checkers.
pub struct CheckerRegistry {
    checkers: FxHashMap<AccessMethod, Box<dyn IndexCheck>>,
}

impl Default for CheckerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CheckerRegistry {
    /// Registry with no checkers.
    pub fn empty() -> Self {
        Self {
            checkers: FxHashMap::default(),
        }
    }

    /// Registry with every checker this crate ships.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(HashIndexCheck));
        registry
    }

    /// Adds `checker`, returning any checker it replaces.
    pub fn register(&mut self, checker: Box<dyn IndexCheck>) -> Option<Box<dyn IndexCheck>> {
        self.checkers.insert(checker.access_method(), checker)
    }

    /// Checker registered for `access_method`.
    pub fn lookup(&self, access_method: AccessMethod) -> Option<&dyn IndexCheck> {
        self.checkers.get(&access_method).map(|checker| checker.as_ref())
    }

    /// Dispatches `index` to the checker for its access method.
    pub fn check_index(
        &self,
        index: &Relation,
        heap: Option<&Relation>,
        options: &CheckOptions,
    ) -> Result<CheckStats, CheckError> {
        let checker = self
            .lookup(index.access_method())
            .ok_or_else(|| CheckError::NotCheckable {
                index: index.name().to_string(),
                access_method: index.access_method(),
            })?;
        checker.checkable(index)?;
        checker.check(index, heap, options)
    }
}
