//! Pooled backing resources with round-robin assignment.
//!
//! A pool is a fixed-length, ordered list of shared backing resources (for
//! example storage accounts backing VM disks). Caller-supplied existing
//! resources come first, newly synthesized stamps fill the remainder, and
//! per-instance consumers are assigned entries cyclically.

use crate::stamp::ResourceStamp;

/// One slot of a [`Pool`].
#[derive(Clone, Debug, PartialEq)]
pub enum PoolEntry {
    /// A caller-supplied existing resource, known only by name. Existing
    /// resources are opaque references and are never (re-)synthesized.
    Existing(String),

    /// A newly synthesized resource that the pool owner must emit.
    New(ResourceStamp),
}

impl PoolEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::Existing(name) => name,
            Self::New(stamp) => &stamp.name,
        }
    }
}

/// Ordered, fixed-length list of backing resources.
#[derive(Debug)]
pub struct Pool {
    entries: Vec<PoolEntry>,
}

impl Pool {
    /// Builds a pool of `count` entries: the first `existing.len()` are the
    /// caller-supplied names (in order), the remainder are synthesized via
    /// `synthesize`, which receives the 0-based index among the *new*
    /// entries.
    ///
    /// `existing.len() > count` is a settings inconsistency that validation
    /// rules out; the extra names are ignored here.
    pub fn build(
        count: usize,
        existing: &[String],
        synthesize: impl Fn(usize) -> ResourceStamp,
    ) -> Self {
        let mut entries = Vec::with_capacity(count);
        entries.extend(
            existing
                .iter()
                .take(count)
                .cloned()
                .map(PoolEntry::Existing),
        );
        let new_count = count - entries.len();
        entries.extend((0..new_count).map(|index| PoolEntry::New(synthesize(index))));
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The pool entry assigned to the 0-based `instance`, i.e. entry
    /// `instance % len`. Every consumer belonging to one instance (its OS
    /// disk and all of its data disks alike) resolves to this same entry.
    ///
    /// Returns [`None`] for an empty pool, which validated settings rule out.
    pub fn assign(&self, instance: usize) -> Option<&PoolEntry> {
        if self.entries.is_empty() {
            return None;
        }
        self.entries.get(instance % self.entries.len())
    }

    /// The stamps of all newly synthesized entries, in pool order.
    pub fn new_stamps(&self) -> impl Iterator<Item = &ResourceStamp> {
        self.entries.iter().filter_map(|entry| match entry {
            PoolEntry::New(stamp) => Some(stamp),
            PoolEntry::Existing(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(index: usize) -> ResourceStamp {
        ResourceStamp {
            kind: "Microsoft.Storage/storageAccounts".to_owned(),
            name: format!("new{index}"),
            resource_group_name: "rg".to_owned(),
            location: "westus".to_owned(),
            properties: serde_json::json!({}),
        }
    }

    #[test]
    fn existing_entries_come_first() {
        let pool = Pool::build(4, &["A".to_owned(), "B".to_owned()], account);
        assert_eq!(pool.len(), 4);
        assert_eq!(pool.new_stamps().count(), 2);

        let names = (0..4)
            .map(|i| pool.assign(i).expect("non-empty pool").name().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, ["A", "B", "new0", "new1"]);
    }

    #[test]
    fn round_robin_wraps_around() {
        let pool = Pool::build(4, &["A".to_owned(), "B".to_owned()], account);
        let names = (0..8)
            .map(|i| pool.assign(i).expect("non-empty pool").name().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, ["A", "B", "new0", "new1", "A", "B", "new0", "new1"]);
    }

    #[test]
    fn all_new_when_no_existing() {
        let pool = Pool::build(2, &[], account);
        assert_eq!(pool.new_stamps().count(), 2);
        assert_eq!(pool.assign(0).expect("non-empty pool").name(), "new0");
    }

    #[test]
    fn surplus_existing_names_are_ignored() {
        let pool = Pool::build(1, &["A".to_owned(), "B".to_owned()], account);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.new_stamps().count(), 0);
        assert_eq!(pool.assign(5).expect("non-empty pool").name(), "A");
    }

    #[test]
    fn empty_pool_assigns_nothing() {
        let pool = Pool::build(0, &[], account);
        assert!(pool.is_empty());
        assert_eq!(pool.assign(0), None);
    }
}
