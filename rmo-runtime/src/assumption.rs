//!
//! Every method table and every constant table carries an [`InvalidationToken`].
//!
//! A lookup records one [`Assumption`] per table it inspected; the lookup result stays
//! usable for as long as all of them are still valid.
//!

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A monotonic version counter guarding one table.
#[derive(Debug, Default)]
pub struct InvalidationToken {
    version: Arc<AtomicU64>,
}

impl InvalidationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a snapshot of the current version.
    ///
    /// Must be taken before reading the guarded table.
    pub fn assumption(&self) -> Assumption {
        Assumption {
            version: Some(Arc::clone(&self.version)),
            observed: self.version.load(Ordering::Acquire),
        }
    }

    /// Invalidate every assumption taken so far.
    ///
    /// Must be called after the guarded table was changed.
    pub fn invalidate(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

/// A handle that becomes invalid once its table changes.
#[derive(Debug, Clone)]
pub struct Assumption {
    version: Option<Arc<AtomicU64>>,
    observed: u64,
}

impl Assumption {
    /// An assumption that never holds, used for thread-dependent results.
    pub fn never_valid() -> Self {
        Self {
            version: None,
            observed: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        match &self.version {
            Some(version) => version.load(Ordering::Acquire) == self.observed,
            None => false,
        }
    }

    /// Whether this is the never-valid assumption.
    pub fn is_never_valid(&self) -> bool {
        self.version.is_none()
    }
}

/// Whether a whole set of assumptions still holds.
pub fn all_valid(assumptions: &[Assumption]) -> bool {
    assumptions.iter().all(Assumption::is_valid)
}
