//! Insertion-ordered, frequency-counted key dictionaries for categorical and
//! text attributes.

use std::collections::HashMap;
use std::hash::Hash;

/// Maps keys to dense indices in first-seen order and counts occurrences.
///
/// Index `i` is stable for the lifetime of the dictionary, so dense centroid
/// vectors and histograms can be indexed by it directly.
#[derive(Debug, Clone)]
pub struct KeyDictionary<K> {
    keys: Vec<K>,
    index: HashMap<K, usize>,
    counts: Vec<usize>,
}

impl<K> Default for KeyDictionary<K> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            index: HashMap::new(),
            counts: Vec::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> KeyDictionary<K> {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the index of `key`, inserting it if unseen, and count one occurrence.
    pub fn intern(&mut self, key: K) -> usize {
        if let Some(&idx) = self.index.get(&key) {
            self.counts[idx] += 1;
            return idx;
        }
        let idx = self.keys.len();
        self.index.insert(key.clone(), idx);
        self.keys.push(key);
        self.counts.push(1);
        idx
    }

    /// Index of `key`, if present.
    pub fn get(&self, key: &K) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Key stored at `idx`.
    pub fn key(&self, idx: usize) -> &K {
        &self.keys[idx]
    }

    /// Number of times the key at `idx` was interned.
    pub fn count(&self, idx: usize) -> usize {
        self.counts[idx]
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if no key has been interned.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in index order.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_keeps_first_seen_order() {
        let mut dict = KeyDictionary::new();
        assert_eq!(dict.intern("b".to_string()), 0);
        assert_eq!(dict.intern("a".to_string()), 1);
        assert_eq!(dict.intern("b".to_string()), 0);

        assert_eq!(dict.len(), 2);
        assert_eq!(dict.key(1), "a");
        assert_eq!(dict.count(0), 2);
        assert_eq!(dict.count(1), 1);
        assert_eq!(dict.get(&"c".to_string()), None);
    }
}
