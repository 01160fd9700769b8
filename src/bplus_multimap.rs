//! An ordered map from each key to a list of values, on top of [`BPlusTree`].

use alloc::vec::Vec;
use core::borrow::Borrow;
use core::cmp::Ordering;
use core::fmt;
use core::iter::FusedIterator;
use core::ops::Index;
use core::slice;

use crate::bplus_tree::{self, BPlusTree, Dump};
use crate::config::{ConfigError, TreeConfig};
use crate::raw::InvariantViolation;

/// The record a [`BPlusMultiMap`] stores: a key and every value filed under it.
#[derive(Clone)]
pub struct KeyValues<K, V> {
    /// Orders the record.
    pub key: K,
    /// Values in the order they were inserted.
    pub values: Vec<V>,
}

impl<K: PartialEq, V> PartialEq for KeyValues<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<K: Eq, V> Eq for KeyValues<K, V> {}

impl<K: Ord, V> PartialOrd for KeyValues<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, V> Ord for KeyValues<K, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl<K, V> Borrow<K> for KeyValues<K, V> {
    fn borrow(&self) -> &K {
        &self.key
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for KeyValues<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {:?}", self.key, self.values)
    }
}

/// An ordered multimap: each key holds a list of values.
///
/// Keys are unique in the underlying tree; repeated inserts under one key
/// append to its list. Separators in internal nodes are full copies of records
/// taken when the separator was created, so every separator key also keeps a
/// copy of that key's value list as it stood then. Long lists under keys that
/// open a leaf cost memory twice.
///
/// # Examples
///
/// ```
/// use bplus_tree::BPlusMultiMap;
///
/// let mut authors = BPlusMultiMap::new();
/// authors.insert("Pratchett", "Mort");
/// authors.insert("Le Guin", "The Dispossessed");
/// authors.insert("Pratchett", "Small Gods");
///
/// assert_eq!(authors.count(&"Pratchett"), 2);
/// assert_eq!(authors.get(&"Pratchett"), Some(&["Mort", "Small Gods"][..]));
/// assert_eq!(authors.len(), 2);
///
/// let flat: Vec<_> = authors.iter().map(|(_, title)| *title).collect();
/// assert_eq!(flat, ["The Dispossessed", "Mort", "Small Gods"]);
/// ```
pub struct BPlusMultiMap<K, V> {
    tree: BPlusTree<KeyValues<K, V>>,
}

/// An iterator over every `(key, value)` pair of a `BPlusMultiMap`, in key
/// order and then insertion order.
///
/// This `struct` is created by the [`iter`] method on [`BPlusMultiMap`].
///
/// [`iter`]: BPlusMultiMap::iter
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, K: 'a, V: 'a> {
    records: bplus_tree::Iter<'a, KeyValues<K, V>>,
    current: Option<(&'a K, slice::Iter<'a, V>)>,
}

impl<K, V> BPlusMultiMap<K, V> {
    /// Makes a new, empty `BPlusMultiMap`.
    #[must_use]
    pub fn new() -> Self {
        Self { tree: BPlusTree::new() }
    }

    /// Makes a new, empty `BPlusMultiMap` whose nodes hold up to `max_records` keys.
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

    /// Returns the number of distinct keys.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` if the multimap holds no keys.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Removes every key and its values.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Gets an iterator over every `(key, value)` pair, one per stored value.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            records: self.tree.iter(),
            current: None,
        }
    }

    /// Returns a sideways rendering of the underlying tree.
    pub fn dump(&self) -> Dump<'_, KeyValues<K, V>> {
        self.tree.dump()
    }
}

impl<K: Ord, V> BPlusMultiMap<K, V> {
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

    /// Returns the values under `key`.
    pub fn get(&self, key: &K) -> Option<&[V]> {
        self.tree.get(key).map(|record| record.values.as_slice())
    }

    /// Returns the value list under `key` for editing.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut Vec<V>> {
        self.tree.get_mut(key).map(|record| &mut record.values)
    }

    /// Returns how many values are filed under `key`; zero if it is missing.
    pub fn count(&self, key: &K) -> usize {
        self.get(key).map_or(0, <[V]>::len)
    }

    /// Returns `true` if the multimap holds `key`, even with an empty list.
    pub fn contains_key(&self, key: &K) -> bool {
        self.tree.contains(key)
    }
}

impl<K: Ord + Clone, V: Clone> BPlusMultiMap<K, V> {
    /// Appends `value` to the list under `key`, creating the list if needed.
    pub fn insert(&mut self, key: K, value: V) {
        self.get_or_default(key).push(value);
    }

    /// Returns the value list under `key`, inserting an empty one first if the
    /// key is missing.
    pub fn get_or_default(&mut self, key: K) -> &mut Vec<V> {
        &mut self
            .tree
            .get_or_insert(KeyValues {
                key,
                values: Vec::new(),
            })
            .values
    }

    /// Removes `key` and returns its values.
    pub fn remove(&mut self, key: &K) -> Option<Vec<V>> {
        self.tree.take(key).map(|record| record.values)
    }
}

impl<K, V> Default for BPlusMultiMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone, V: Clone> Clone for BPlusMultiMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for BPlusMultiMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.tree.iter().map(|record| (&record.key, &record.values)))
            .finish()
    }
}

impl<K: Ord + Clone, V: Clone> FromIterator<(K, V)> for BPlusMultiMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut multimap = BPlusMultiMap::new();
        multimap.extend(iter);
        multimap
    }
}

impl<K: Ord + Clone, V: Clone> Extend<(K, V)> for BPlusMultiMap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K: Ord, V> Index<&K> for BPlusMultiMap<K, V> {
    type Output = [V];

    /// Returns the values under `key`.
    ///
    /// # Panics
    ///
    /// Panics if the key is not present in the multimap.
    fn index(&self, key: &K) -> &[V] {
        self.get(key).expect("no entry found for key")
    }
}

impl<'a, K, V> IntoIterator for &'a BPlusMultiMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<(&'a K, &'a V)> {
        loop {
            if let Some((key, values)) = &mut self.current
                && let Some(value) = values.next()
            {
                return Some((*key, value));
            }
            // Keys with an empty list contribute nothing.
            let record = self.records.next()?;
            self.current = Some((&record.key, record.values.iter()));
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let in_current = self.current.as_ref().map_or(0, |(_, values)| values.len());
        if self.records.len() == 0 {
            (in_current, Some(in_current))
        } else {
            (in_current, None)
        }
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Iter {
            records: self.records.clone(),
            current: self.current.clone(),
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
    use alloc::string::ToString;
    use alloc::vec;

    #[test]
    fn empty_lists_are_skipped_by_iter() {
        let mut multimap: BPlusMultiMap<u8, char> = BPlusMultiMap::new();
        multimap.get_or_default(1);
        multimap.insert(2, 'b');
        multimap.get_or_default(3);
        multimap.insert(4, 'd');

        assert_eq!(multimap.len(), 4);
        assert!(multimap.contains_key(&3));
        assert_eq!(multimap.count(&3), 0);
        assert_eq!(multimap.iter().collect::<Vec<_>>(), vec![(&2, &'b'), (&4, &'d')]);
    }

    #[test]
    fn debug_shows_lists() {
        let multimap: BPlusMultiMap<u8, u8> = [(2, 20), (1, 10), (2, 21)].into_iter().collect();
        assert_eq!(format!("{multimap:?}"), "{1: [10], 2: [20, 21]}");
        assert_eq!(format!("{:?}", multimap.iter()), "[(1, 10), (2, 20), (2, 21)]");
    }

    #[test]
    fn size_hint_is_exact_on_last_record() {
        let multimap: BPlusMultiMap<u8, u8> = [(1, 1), (1, 2), (1, 3)].into_iter().collect();
        let mut iter = multimap.iter();
        assert_eq!(iter.next(), Some((&1, &1)));
        assert_eq!(iter.size_hint(), (2, Some(2)));
    }

    #[test]
    fn dump_shows_current_list_for_separator_keys() {
        let mut multimap = BPlusMultiMap::<u8, char>::with_max_records(3).unwrap();
        for (key, value) in [(1, 'a'), (2, 'b'), (3, 'c'), (4, 'd')] {
            multimap.insert(key, value);
        }
        // Key 3 opens the right leaf, so the root keeps a copy of its record.
        multimap.insert(3, 'z');

        let expected = "    [3: ['c', 'z'], 4: ['d']]\n(3: ['c', 'z'])\n    [1: ['a'], 2: ['b']]\n";
        assert_eq!(multimap.dump().to_string(), expected);
    }

    #[test]
    fn get_mut_edits_list_in_place() {
        let mut multimap = BPlusMultiMap::new();
        multimap.insert("k", 1);
        multimap.get_mut(&"k").unwrap().push(2);
        assert_eq!(&multimap[&"k"], &[1, 2]);
        assert_eq!(multimap.remove(&"k"), Some(vec![1, 2]));
        assert_eq!(multimap.count(&"k"), 0);
    }

    #[test]
    fn lookups_work_without_clone() {
        struct Unclonable;

        let mut multimap: BPlusMultiMap<u8, Unclonable> = BPlusMultiMap::new();
        assert!(multimap.get(&1).is_none());
        assert!(multimap.get_mut(&1).is_none());
        assert_eq!(multimap.count(&1), 0);
        assert!(!multimap.contains_key(&1));
    }
}
