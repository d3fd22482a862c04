use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use crate::patterns::Pattern;

/// Shared, atomically readable set of active patterns. The store mirrors
/// this set (invariant: they agree between transactions); writers update
/// the in-memory side only after the paired store transaction committed.
#[derive(Clone, Default)]
pub struct PatternRegistry {
    inner: Arc<RwLock<BTreeSet<Pattern>>>,
}

impl PatternRegistry {
    pub fn new(patterns: impl IntoIterator<Item = Pattern>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(patterns.into_iter().collect())),
        }
    }

    pub fn snapshot(&self) -> BTreeSet<Pattern> {
        self.inner.read().expect("pattern registry poisoned").clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("pattern registry poisoned").is_empty()
    }

    pub fn insert_many(&self, patterns: impl IntoIterator<Item = Pattern>) {
        let mut guard = self.inner.write().expect("pattern registry poisoned");
        guard.extend(patterns);
    }

    pub fn remove(&self, pattern: &Pattern) -> bool {
        let mut guard = self.inner.write().expect("pattern registry poisoned");
        guard.remove(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_detached() {
        let registry = PatternRegistry::new([Pattern::Any]);
        let snapshot = registry.snapshot();

        registry.remove(&Pattern::Any);

        assert!(snapshot.contains(&Pattern::Any));
        assert!(registry.is_empty());
    }

    #[test]
    fn insert_many_is_idempotent() {
        let registry = PatternRegistry::new([]);
        registry.insert_many([Pattern::Any]);
        registry.insert_many([Pattern::Any]);

        assert_eq!(registry.snapshot().len(), 1);
    }
}
