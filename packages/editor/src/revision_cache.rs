//! Bounded cache of revision views keyed by sequence number.
//!
//! Least recently used entries are evicted first. Pinned entries are never
//! evicted and do not count against the capacity.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    last_used: u64,
    pinned: bool,
}

#[derive(Debug, Clone)]
pub struct RevisionCache<V> {
    entries: BTreeMap<u64, Entry<V>>,
    capacity: usize,
    tick: u64,
}

impl<V> RevisionCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity: capacity.max(1),
            tick: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, seq: u64) -> bool {
        self.entries.contains_key(&seq)
    }

    fn touch(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up `seq` and mark it as recently used.
    pub fn get(&mut self, seq: u64) -> Option<&V> {
        let tick = self.touch();
        let entry = self.entries.get_mut(&seq)?;
        entry.last_used = tick;
        Some(&entry.value)
    }

    /// Look up `seq` without affecting eviction order.
    pub fn peek(&self, seq: u64) -> Option<&V> {
        self.entries.get(&seq).map(|e| &e.value)
    }

    /// Newest entry at or before `seq`.
    pub fn closest_at_or_before(&mut self, seq: u64) -> Option<(u64, &V)> {
        let tick = self.touch();
        let (found, entry) = self.entries.range_mut(..=seq).next_back()?;
        entry.last_used = tick;
        Some((*found, &entry.value))
    }

    pub fn insert(&mut self, seq: u64, value: V) {
        let tick = self.touch();
        let pinned = self.entries.get(&seq).map(|e| e.pinned).unwrap_or(false);
        self.entries.insert(
            seq,
            Entry {
                value,
                last_used: tick,
                pinned,
            },
        );
        self.evict();
    }

    /// Keep `seq` regardless of capacity. Returns false if it is not cached.
    pub fn pin(&mut self, seq: u64) -> bool {
        match self.entries.get_mut(&seq) {
            Some(entry) => {
                entry.pinned = true;
                true
            }
            None => false,
        }
    }

    pub fn unpin(&mut self, seq: u64) {
        if let Some(entry) = self.entries.get_mut(&seq) {
            entry.pinned = false;
        }
        self.evict();
    }

    fn evict(&mut self) {
        loop {
            let unpinned = self.entries.values().filter(|e| !e.pinned).count();
            if unpinned <= self.capacity {
                return;
            }
            let victim = self
                .entries
                .iter()
                .filter(|(_, e)| !e.pinned)
                .min_by_key(|(_, e)| e.last_used)
                .map(|(seq, _)| *seq);
            match victim {
                Some(seq) => {
                    self.entries.remove(&seq);
                }
                None => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = RevisionCache::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        assert_eq!(cache.get(1), Some(&"a"));
        cache.insert(3, "c");

        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_peek_does_not_refresh() {
        let mut cache = RevisionCache::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        assert_eq!(cache.peek(1), Some(&"a"));
        cache.insert(3, "c");
        assert!(!cache.contains(1));
    }

    #[test]
    fn test_pinned_entries_survive() {
        let mut cache = RevisionCache::new(1);
        cache.insert(5, "base");
        assert!(cache.pin(5));
        cache.insert(6, "x");
        cache.insert(7, "y");
        assert!(cache.contains(5));
        assert!(cache.contains(7));
        assert!(!cache.contains(6));

        cache.unpin(5);
        assert_eq!(cache.len(), 1);
        assert!(!cache.pin(42));
    }

    #[test]
    fn test_closest_at_or_before() {
        let mut cache = RevisionCache::new(4);
        cache.insert(0, "genesis");
        cache.insert(10, "ten");
        assert_eq!(cache.closest_at_or_before(9), Some((0, &"genesis")));
        assert_eq!(cache.closest_at_or_before(10), Some((10, &"ten")));
        assert_eq!(cache.closest_at_or_before(99), Some((10, &"ten")));
    }
}
