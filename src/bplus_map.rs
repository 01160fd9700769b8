//! A single-valued ordered map on top of [`BPlusTree`].

use core::borrow::Borrow;
use core::cmp::Ordering;
use core::fmt;
use core::iter::FusedIterator;
use core::mem;
use core::ops::Index;

use crate::bplus_tree::{self, BPlusTree, Dump};
use crate::config::{ConfigError, TreeConfig};
use crate::raw::InvariantViolation;

/// The record a [`BPlusMap`] stores: a key and its value, ordered by key alone.
#[derive(Clone)]
pub struct KeyValue<K, V> {
    /// Orders the record.
    pub key: K,
    /// Carried along; never compared.
    pub value: V,
}

impl<K: PartialEq, V> PartialEq for KeyValue<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<K: Eq, V> Eq for KeyValue<K, V> {}

impl<K: Ord, V> PartialOrd for KeyValue<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, V> Ord for KeyValue<K, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl<K, V> Borrow<K> for KeyValue<K, V> {
    fn borrow(&self) -> &K {
        &self.key
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for KeyValue<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {:?}", self.key, self.value)
    }
}

/// An ordered map with one value per key, stored as [`KeyValue`] records in a
/// [`BPlusTree`].
///
/// Values must be `Clone` because internal nodes keep separator copies of whole
/// records.
///
/// # Examples
///
/// ```
/// use bplus_tree::BPlusMap;
///
/// let mut stock = BPlusMap::new();
/// *stock.get_or_default("apples") += 3;
/// *stock.get_or_default("pears") += 1;
/// *stock.get_or_default("apples") += 2;
///
/// assert_eq!(stock.get(&"apples"), Some(&5));
/// assert_eq!(stock.len(), 2);
/// assert_eq!(stock.remove(&"pears"), Some(1));
/// assert!(!stock.contains_key(&"pears"));
/// ```
pub struct BPlusMap<K, V> {
    tree: BPlusTree<KeyValue<K, V>>,
}

/// An iterator over the entries of a `BPlusMap`, in key order.
///
/// This `struct` is created by the [`iter`] method on [`BPlusMap`].
///
/// [`iter`]: BPlusMap::iter
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, K: 'a, V: 'a> {
    inner: bplus_tree::Iter<'a, KeyValue<K, V>>,
}

impl<K, V> BPlusMap<K, V> {
    /// Makes a new, empty `BPlusMap`.
    #[must_use]
    pub fn new() -> Self {
        Self { tree: BPlusTree::new() }
    }

    /// Makes a new, empty `BPlusMap` whose nodes hold up to `max_records` entries.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `max_records` is out of range.
    pub fn with_max_records(max_records: usize) -> Result<Self, ConfigError> {
        let config = TreeConfig::builder().max_records(max_records).build()?;
        Ok(Self {
            tree: BPlusTree::with_config(config)?,
        })
    }

    /// Returns the number of keys in the map.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` if the map holds no keys.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Gets an iterator over `(key, value)` pairs in key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter { inner: self.tree.iter() }
    }

    /// Returns a sideways rendering of the underlying tree.
    pub fn dump(&self) -> Dump<'_, KeyValue<K, V>> {
        self.tree.dump()
    }
}

impl<K: Ord, V> BPlusMap<K, V> {
    /// Checks every structural invariant of the underlying tree.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantViolation`] found.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        self.tree.validate()
    }

    /// Returns `true` if every structural invariant of the underlying tree holds.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.tree.is_valid()
    }

    /// Returns a reference to the value under `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.tree.get(key).map(|entry| &entry.value)
    }

    /// Returns a mutable reference to the value under `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.tree.get_mut(key).map(|entry| &mut entry.value)
    }

    /// Returns `true` if the map holds `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.tree.contains(key)
    }
}

impl<K: Ord + Clone, V: Clone> BPlusMap<K, V> {
    /// Returns the value under `key`, inserting `V::default()` first if the key
    /// is missing.
    pub fn get_or_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        &mut self
            .tree
            .get_or_insert(KeyValue {
                key,
                value: V::default(),
            })
            .value
    }

    /// Stores `value` under `key` unless the key already holds a value other
    /// than `V::default()`. Returns whether `value` was stored.
    ///
    /// A key whose value is still the default counts as vacant, so it accepts
    /// the new value.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::BPlusMap;
    ///
    /// let mut map = BPlusMap::new();
    /// assert!(map.insert(1, "one"));
    /// assert!(!map.insert(1, "uno"));
    /// assert_eq!(map.get(&1), Some(&"one"));
    ///
    /// map.get_or_default(2);
    /// assert!(map.insert(2, "two"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> bool
    where
        V: Default + PartialEq,
    {
        let current = self.get_or_default(key);
        if *current != V::default() {
            return false;
        }
        *current = value;
        true
    }

    /// Stores `value` under `key` unconditionally and returns the previous value.
    pub fn replace(&mut self, key: K, value: V) -> Option<V> {
        if let Some(current) = self.get_mut(&key) {
            return Some(mem::replace(current, value));
        }
        self.tree.insert(KeyValue { key, value });
        None
    }

    /// Removes `key` and returns its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.tree.take(key).map(|entry| entry.value)
    }
}

impl<K, V> Default for BPlusMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone, V: Clone> Clone for BPlusMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for BPlusMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Ord + Clone, V: Clone> FromIterator<(K, V)> for BPlusMap<K, V> {
    /// Later pairs overwrite earlier ones with the same key.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = BPlusMap::new();
        for (key, value) in iter {
            map.replace(key, value);
        }
        map
    }
}

impl<K: Ord, V> Index<&K> for BPlusMap<K, V> {
    type Output = V;

    /// Returns a reference to the value under `key`.
    ///
    /// # Panics
    ///
    /// Panics if the key is not present in the map.
    fn index(&self, key: &K) -> &V {
        self.get(key).expect("no entry found for key")
    }
}

impl<'a, K, V> IntoIterator for &'a BPlusMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<(&'a K, &'a V)> {
        self.inner.next().map(|entry| (&entry.key, &entry.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Iter {
            inner: self.inner.clone(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::{String, ToString};

    #[test]
    fn records_compare_by_key_only() {
        let a = KeyValue { key: 1, value: "a" };
        let b = KeyValue { key: 1, value: "b" };
        assert!(a == b);
        assert!(KeyValue { key: 0, value: "z" } < a);
    }

    #[test]
    fn debug_renders_like_a_map() {
        let map: BPlusMap<i32, char> = [(2, 'b'), (1, 'a')].into_iter().collect();
        assert_eq!(format!("{map:?}"), "{1: 'a', 2: 'b'}");
    }

    #[test]
    fn from_iter_keeps_last_value() {
        let map: BPlusMap<&str, i32> = [("x", 1), ("y", 2), ("x", 3)].into_iter().collect();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&"x"], 3);
    }

    #[test]
    fn default_valued_entry_accepts_insert() {
        let mut map: BPlusMap<u8, String> = BPlusMap::new();
        map.get_or_default(7);
        assert_eq!(map.get(&7), Some(&String::new()));
        assert!(map.insert(7, "seven".to_string()));
        assert!(!map.insert(7, "sieben".to_string()));
        assert_eq!(map.replace(7, "sept".to_string()), Some("seven".to_string()));
        assert_eq!(map.replace(8, "huit".to_string()), None);
    }

    #[test]
    #[should_panic(expected = "no entry found for key")]
    fn index_panics_on_missing_key() {
        let map: BPlusMap<u8, u8> = BPlusMap::new();
        let _value = map[&1];
    }

    #[test]
    fn small_nodes_are_configurable() {
        assert!(BPlusMap::<u8, u8>::with_max_records(2).is_err());
        let mut map = BPlusMap::<u32, u32>::with_max_records(3).unwrap();
        for key in 0..100u32 {
            *map.get_or_default(key % 17) += key;
        }
        assert_eq!(map.len(), 17);
        assert!(map.is_valid());
        assert_eq!(map.iter().map(|(_, v)| *v).sum::<u32>(), (0..100).sum());
    }

    #[test]
    fn lookups_work_without_clone() {
        struct Unclonable;

        let mut map: BPlusMap<u8, Unclonable> = BPlusMap::new();
        assert!(map.get(&1).is_none());
        assert!(map.get_mut(&1).is_none());
        assert!(!map.contains_key(&1));
    }
}
