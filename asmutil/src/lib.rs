//! Small generic containers shared by the `mc`, `elfobj` and `rvasm` crates.
//!
//! None of this is RISC-V specific: it is the "ordered map" and byte-order
//! plumbing the other crates in the workspace build on.

use std::collections::HashMap;
use std::hash::Hash;

pub type Endian = byteorder::LittleEndian;

/// A map that remembers insertion order.
///
/// `SymbolTracker`, the `.strtab` builder and the ELF symbol table all need
/// both keyed lookup *and* stable iteration order (symbol indices and
/// `.strtab` offsets are tied to the order names were first seen in), which
/// a plain `HashMap` can't give you.
#[derive(Clone, Debug)]
pub struct OrderedMap<K, V> {
    entries: Vec<(K, V)>,
    index: HashMap<K, usize>,
}

impl<K: Eq + Hash + Clone, V> OrderedMap<K, V> {
    pub fn new() -> Self {
        OrderedMap {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Inserts `key -> value` only if `key` is not already present.
    /// Returns `true` if the insertion happened.
    pub fn insert_if_absent(&mut self, key: K, value: V) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        true
    }

    /// Inserts `key -> value`, overwriting any existing value for `key`.
    /// Returns `true` if this was a fresh key.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if let Some(&i) = self.index.get(&key) {
            self.entries[i].1 = value;
            false
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
            true
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        match self.index.get(key) {
            Some(&i) => Some(&mut self.entries[i].1),
            None => None,
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Position of `key` in insertion order, usable as a table index.
    pub fn index_of(&self, key: &K) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }
}

impl<K: Eq + Hash + Clone, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::OrderedMap;

    #[test]
    fn preserves_insertion_order_under_permuted_lookups() {
        let mut map = OrderedMap::new();
        map.insert_if_absent("b", 2);
        map.insert_if_absent("a", 1);
        map.insert_if_absent("c", 3);

        let keys: Vec<_> = map.keys().copied().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(map.index_of(&"a"), Some(1));
    }

    #[test]
    fn insert_if_absent_is_idempotent() {
        let mut map = OrderedMap::new();
        assert!(map.insert_if_absent("x", 1));
        assert!(!map.insert_if_absent("x", 2));
        assert_eq!(map.get(&"x"), Some(&1));
        assert_eq!(map.len(), 1);
    }
}
