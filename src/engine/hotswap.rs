//! Atomically replaceable active rule set.
//!
//! This is the single piece of shared mutable state in the engine: the handle
//! to the rule set currently governing transformation. Installation replaces
//! the whole `Arc<RuleSet>` behind a short write lock; readers clone the `Arc`
//! and run the frame against that snapshot. An in-flight frame therefore sees
//! either the entirely-old or the entirely-new set — never a mixture — and a
//! superseded set stays alive until its last reader drops it.
//!
//! The rule set itself is immutable. There is deliberately no operation that
//! edits the installed collection in place.

use crate::RuleSet;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub(crate) struct ActiveRuleSet {
    current: RwLock<Option<Arc<RuleSet>>>,
    next_version: AtomicU64,
}

impl ActiveRuleSet {
    pub fn empty() -> Self {
        ActiveRuleSet { current: RwLock::new(None), next_version: AtomicU64::new(1) }
    }

    /// Snapshot the currently installed set, if any.
    pub fn load(&self) -> Option<Arc<RuleSet>> {
        self.current.read().clone()
    }

    pub fn is_installed(&self) -> bool {
        self.current.read().is_some()
    }

    /// Stamp a version on `ruleset` and publish it as one atomic swap.
    pub fn install(&self, mut ruleset: RuleSet) -> Arc<RuleSet> {
        ruleset.version = self.next_version.fetch_add(1, Ordering::Relaxed);
        let installed = Arc::new(ruleset);
        *self.current.write() = Some(Arc::clone(&installed));
        installed
    }
}
