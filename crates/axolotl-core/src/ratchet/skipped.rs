//! Bounded cache of message keys derived ahead of delivery.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Bounded FIFO map from message position to message key.
///
/// Keys are derived when a message arrives ahead of its predecessors and
/// held here until the predecessors show up. The bound is supplied on every
/// insert, so a stored cache follows the limit currently configured: inserting
/// into a full cache evicts the oldest entries, after which those messages can
/// no longer be decrypted.
///
/// # Invariants
///
/// - After an insert, `len() <= capacity` for the capacity passed
/// - Entries are in insertion order, oldest first
/// - A key is removed the moment it is taken, so each key decrypts once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedKeyCache<K, V> {
    entries: VecDeque<(K, V)>,
}

impl<K, V> Default for SkippedKeyCache<K, V> {
    fn default() -> Self {
        Self { entries: VecDeque::new() }
    }
}

impl<K: PartialEq, V> SkippedKeyCache<K, V> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key, keeping at most `capacity` entries. Returns the newest
    /// evicted entry, if any.
    pub fn insert(&mut self, key: K, value: V, capacity: usize) -> Option<(K, V)> {
        if capacity == 0 {
            self.entries.clear();
            return Some((key, value));
        }

        let mut evicted = None;
        while self.entries.len() >= capacity {
            evicted = self.entries.pop_front();
        }
        self.entries.push_back((key, value));

        debug_assert!(self.entries.len() <= capacity);
        evicted
    }

    /// Remove and return the value for `key`.
    pub fn take(&mut self, key: &K) -> Option<V> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        self.entries.remove(position).map(|(_, value)| value)
    }

    /// Whether `key` is cached.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Drop every entry whose key fails `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        self.entries.retain(|(k, _)| keep(k));
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn evicts_oldest_first() {
        let mut cache = SkippedKeyCache::new();
        assert_eq!(cache.insert(1u32, "a", 2), None);
        assert_eq!(cache.insert(2, "b", 2), None);
        assert_eq!(cache.insert(3, "c", 2), Some((1, "a")));

        assert!(!cache.contains(&1));
        assert_eq!(cache.take(&2), Some("b"));
        assert_eq!(cache.take(&2), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut cache = SkippedKeyCache::new();
        assert_eq!(cache.insert(7u32, (), 0), Some((7, ())));
        assert!(cache.is_empty());
    }

    #[test]
    fn lowered_capacity_applies_on_next_insert() {
        let mut cache = SkippedKeyCache::new();
        for i in 0..6u32 {
            cache.insert(i, i, 10);
        }

        assert_eq!(cache.insert(6, 6, 3), Some((3, 3)));
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&3));
        assert!(cache.contains(&4));
        assert!(cache.contains(&6));
    }

    #[test]
    fn retain_filters_entries() {
        let mut cache = SkippedKeyCache::new();
        for i in 0..6u32 {
            cache.insert(i, i * 10, 10);
        }
        cache.retain(|k| k % 2 == 0);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.take(&4), Some(40));
        assert_eq!(cache.take(&3), None);
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_capacity(capacity in 0usize..16, keys in prop::collection::vec(any::<u16>(), 0..64)) {
            let mut cache = SkippedKeyCache::new();
            for key in &keys {
                cache.insert(*key, (), capacity);
                // PROPERTY: bound holds after every insertion
                prop_assert!(cache.len() <= capacity);
            }
        }

        #[test]
        fn prop_keeps_most_recent(keys in prop::collection::vec(any::<u32>(), 1..64)) {
            let capacity = 8;
            let mut cache = SkippedKeyCache::new();
            for (index, key) in keys.iter().enumerate() {
                cache.insert(*key, index, capacity);
            }

            // PROPERTY: the last inserted entry is always retrievable
            let last = keys[keys.len() - 1];
            prop_assert!(cache.contains(&last));
        }
    }
}
