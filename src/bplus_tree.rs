use alloc::vec::Vec;
use core::borrow::Borrow;
use core::fmt;
use core::iter::FusedIterator;

use crate::config::{ConfigError, TreeConfig};
use crate::raw::{InvariantViolation, RawBPlusTree};

mod cursor;
mod dump;

pub use cursor::{Cursor, Slot};
pub use dump::Dump;

/// An ordered collection of records based on a B+Tree.
///
/// Records live only in the leaves, and the leaves are chained left to right, so
/// a full traversal never climbs back up the tree. Internal nodes hold separator
/// copies of records: each separator is the smallest record of the subtree to
/// its right.
///
/// By default equal records are rejected, so the tree behaves like a set. A tree
/// built with [`BPlusTree::with_duplicates`] keeps equal records side by side in
/// insertion order instead.
///
/// It is a logic error for a record to be modified in such a way that its
/// ordering relative to any other record, as determined by the [`Ord`] trait,
/// changes while it is in the tree. The behavior resulting from such a logic
/// error is not specified, but will be encapsulated to the `BPlusTree` that
/// observed it and not result in undefined behavior. [`BPlusTree::validate`]
/// reports the damage.
///
/// # Examples
///
/// ```
/// use bplus_tree::BPlusTree;
///
/// let mut tree = BPlusTree::new();
/// for n in [5, 1, 4, 2, 3] {
///     tree.insert(n);
/// }
///
/// assert!(!tree.insert(3));
/// assert!(tree.contains(&4));
/// assert!(tree.remove(&1));
///
/// let ordered: Vec<_> = tree.iter().copied().collect();
/// assert_eq!(ordered, [2, 3, 4, 5]);
/// assert!(tree.is_valid());
/// ```
pub struct BPlusTree<T> {
    raw: RawBPlusTree<T>,
}

/// An iterator over the records of a `BPlusTree`, in ascending order.
///
/// This `struct` is created by the [`iter`] method on [`BPlusTree`].
///
/// [`iter`]: BPlusTree::iter
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, T: 'a> {
    cursor: Cursor<'a, T>,
    remaining: usize,
}

/// An owning iterator over the records of a `BPlusTree`, in ascending order.
///
/// This `struct` is created by the [`into_iter`] method on [`BPlusTree`]
/// (provided by the [`IntoIterator`] trait).
///
/// [`into_iter`]: BPlusTree#method.into_iter
pub struct IntoIter<T> {
    inner: alloc::vec::IntoIter<T>,
}

impl<T> BPlusTree<T> {
    /// Makes a new, empty `BPlusTree` that rejects equal records.
    ///
    /// Nodes hold up to [`DEFAULT_MAX_RECORDS`](crate::config::DEFAULT_MAX_RECORDS) records.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new();
    /// assert!(tree.insert(1));
    /// assert!(!tree.insert(1));
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            raw: RawBPlusTree::new(TreeConfig::default()),
        }
    }

    /// Makes a new, empty `BPlusTree` that keeps equal records in insertion order.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::BPlusTree;
    ///
    /// let mut tree = BPlusTree::with_duplicates();
    /// assert!(tree.insert(1));
    /// assert!(tree.insert(1));
    /// assert_eq!(tree.len(), 2);
    /// ```
    #[must_use]
    pub fn with_duplicates() -> Self {
        Self {
            raw: RawBPlusTree::new(TreeConfig {
                allow_duplicates: true,
                ..TreeConfig::default()
            }),
        }
    }

    /// Makes a new, empty `BPlusTree` shaped by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config.max_records` is out of range.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::{BPlusTree, TreeConfig};
    ///
    /// let config = TreeConfig::builder().max_records(4).build()?;
    /// let tree: BPlusTree<u32> = BPlusTree::with_config(config)?;
    /// assert_eq!(tree.max_records(), 4);
    /// # Ok::<(), bplus_tree::ConfigError>(())
    /// ```
    pub fn with_config(config: TreeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            raw: RawBPlusTree::new(config),
        })
    }

    /// Returns the number of records in the tree.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub const fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the tree holds no records.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Returns `true` if equal records may coexist in this tree.
    #[must_use]
    pub const fn allows_duplicates(&self) -> bool {
        self.raw.config().allow_duplicates
    }

    /// Returns the most records a node may hold.
    #[must_use]
    pub const fn max_records(&self) -> usize {
        self.raw.config().max_records
    }

    /// Returns the configuration the tree was built with.
    #[must_use]
    pub const fn config(&self) -> &TreeConfig {
        self.raw.config()
    }

    /// Returns the number of levels, leaves included. An empty tree has height 1.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::{BPlusTree, TreeConfig};
    ///
    /// let config = TreeConfig::builder().max_records(3).build()?;
    /// let mut tree = BPlusTree::with_config(config)?;
    /// tree.extend(0..3);
    /// assert_eq!(tree.height(), 1);
    /// tree.insert(3);
    /// assert_eq!(tree.height(), 2);
    /// # Ok::<(), bplus_tree::ConfigError>(())
    /// ```
    #[must_use]
    pub fn height(&self) -> usize {
        self.raw.height()
    }

    /// Removes every record, leaving the tree as freshly constructed.
    ///
    /// # Complexity
    ///
    /// O(n)
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Returns the smallest record, if any.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        let (leaf, index) = self.raw.first_position()?;
        self.raw.record_at(leaf, index)
    }

    /// Returns the largest record, if any.
    ///
    /// # Complexity
    ///
    /// O(log n)
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        let (leaf, index) = self.raw.last_position()?;
        self.raw.record_at(leaf, index)
    }

    /// Returns a cursor at the smallest record, or the end cursor if the tree is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::BPlusTree;
    ///
    /// let tree = BPlusTree::from([20, 10, 30]);
    /// let mut cursor = tree.begin();
    /// let mut seen = Vec::new();
    /// while cursor != tree.end() {
    ///     seen.push(*cursor.get().unwrap());
    ///     cursor.move_next();
    /// }
    /// assert_eq!(seen, [10, 20, 30]);
    /// ```
    pub fn begin(&self) -> Cursor<'_, T> {
        Cursor::new(&self.raw, self.raw.first_position())
    }

    /// Returns the end cursor, which points past the largest record.
    pub fn end(&self) -> Cursor<'_, T> {
        Cursor::new(&self.raw, None)
    }

    /// Gets an iterator that visits the records in ascending order.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::BPlusTree;
    ///
    /// let tree = BPlusTree::from([3, 1, 2]);
    /// let mut iter = tree.iter();
    /// assert_eq!(iter.next(), Some(&1));
    /// assert_eq!(iter.len(), 2);
    /// ```
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            cursor: self.begin(),
            remaining: self.len(),
        }
    }

    /// Resolves a slot taken by [`find`](BPlusTree::find) or [`Cursor::slot`].
    ///
    /// Returns `None` once the tree has been modified since the slot was taken:
    /// any insert, remove or clear may move records between nodes.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::BPlusTree;
    ///
    /// let mut tree = BPlusTree::from([1, 2, 3]);
    /// let slot = tree.find(&2).unwrap();
    /// assert_eq!(tree.slot(slot), Some(&2));
    ///
    /// tree.insert(4);
    /// assert_eq!(tree.slot(slot), None);
    /// ```
    #[must_use]
    pub fn slot(&self, slot: Slot) -> Option<&T> {
        if slot.epoch() != self.raw.epoch() {
            return None;
        }
        self.raw.record_at(slot.leaf(), slot.index())
    }

    /// Mutable version of [`slot`](BPlusTree::slot).
    ///
    /// The record's ordering must not change through the returned reference.
    #[must_use]
    pub fn slot_mut(&mut self, slot: Slot) -> Option<&mut T> {
        if slot.epoch() != self.raw.epoch() {
            return None;
        }
        self.raw.record_at_mut(slot.leaf(), slot.index())
    }

    /// Returns a printable rendering of the tree's shape.
    ///
    /// The tree is drawn sideways: the rightmost subtree comes first and each
    /// level is indented four spaces deeper than its parent. Leaves print as
    /// `[a, b, c]` and separators as `(s)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::{BPlusTree, TreeConfig};
    ///
    /// let config = TreeConfig::builder().max_records(3).build()?;
    /// let mut tree = BPlusTree::with_config(config)?;
    /// tree.extend([1, 2, 3, 4]);
    ///
    /// let expected = "    [3, 4]\n(3)\n    [1, 2]\n";
    /// assert_eq!(tree.dump().to_string(), expected);
    /// # Ok::<(), bplus_tree::ConfigError>(())
    /// ```
    pub fn dump(&self) -> Dump<'_, T> {
        Dump::new(&self.raw)
    }
}

impl<T: Ord> BPlusTree<T> {
    /// Checks every structural invariant of the tree.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantViolation`] found.
    ///
    /// # Complexity
    ///
    /// O(n)
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        self.raw.validate()
    }

    /// Returns `true` if every structural invariant holds.
    ///
    /// # Complexity
    ///
    /// O(n)
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Returns `true` if the tree holds a record equal to `key`.
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.search(key).is_some()
    }

    /// Returns a reference to the earliest record equal to `key`, if any.
    ///
    /// The key may be any borrowed form of the record type, but the ordering on
    /// the borrowed form *must* match the ordering on the record type.
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn get<Q>(&self, key: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get(key)
    }

    /// Returns a mutable reference to the earliest record equal to `key`, if any.
    ///
    /// The record's ordering must not change through the returned reference.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut T>
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get_mut(key)
    }

    /// Locates the earliest record equal to `key` and returns a detached slot
    /// for it, resolvable through [`slot`](BPlusTree::slot) until the next
    /// modification.
    pub fn find<Q>(&self, key: &Q) -> Option<Slot>
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.cursor_at(key).slot()
    }

    /// Returns a cursor at the earliest record equal to `key`, or the end cursor
    /// if there is none.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::BPlusTree;
    ///
    /// let tree = BPlusTree::from([1, 2, 3]);
    /// let mut cursor = tree.cursor_at(&2);
    /// assert_eq!(cursor.advance().get(), Some(&2));
    /// assert_eq!(cursor.get(), Some(&3));
    /// assert!(tree.cursor_at(&9).is_null());
    /// ```
    pub fn cursor_at<Q>(&self, key: &Q) -> Cursor<'_, T>
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        Cursor::new(&self.raw, self.raw.search(key))
    }
}

impl<T: Ord + Clone> BPlusTree<T> {
    /// Adds a record to the tree.
    ///
    /// Returns whether the record was stored. A tree that rejects duplicates
    /// returns `false` and drops `record` when an equal record is present; a tree
    /// that allows them stores it after every equal record and always returns `true`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new();
    /// assert!(tree.insert(2));
    /// assert!(!tree.insert(2));
    /// assert_eq!(tree.len(), 1);
    /// ```
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn insert(&mut self, record: T) -> bool {
        self.raw.insert(record).is_ok()
    }

    /// Removes a record equal to `key`. Returns whether one was present.
    ///
    /// With duplicates, the most recently inserted equal record goes first.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::BPlusTree;
    ///
    /// let mut tree = BPlusTree::from([1, 2]);
    /// assert!(tree.remove(&2));
    /// assert!(!tree.remove(&2));
    /// ```
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove(key).is_some()
    }

    /// Removes and returns a record equal to `key`, if any.
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn take<Q>(&mut self, key: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove(key)
    }

    /// Returns the earliest record equal to `record`, inserting `record` first if
    /// there is none.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new();
    /// assert_eq!(*tree.get_or_insert(7), 7);
    /// tree.get_or_insert(7);
    /// assert_eq!(tree.len(), 1);
    /// ```
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn get_or_insert(&mut self, record: T) -> &mut T {
        let (leaf, index) = self.raw.get_or_insert(record);
        self.raw
            .record_at_mut(leaf, index)
            .expect("`BPlusTree::get_or_insert()` - position does not name a record!")
    }
}

impl<T> Default for BPlusTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for BPlusTree<T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for BPlusTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: PartialEq> PartialEq for BPlusTree<T> {
    fn eq(&self, other: &BPlusTree<T>) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for BPlusTree<T> {}

impl<T: Ord + Clone> FromIterator<T> for BPlusTree<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut tree = BPlusTree::new();
        tree.extend(iter);
        tree
    }
}

impl<T: Ord + Clone> Extend<T> for BPlusTree<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for record in iter {
            self.insert(record);
        }
    }
}

impl<T: Ord + Clone, const N: usize> From<[T; N]> for BPlusTree<T> {
    fn from(arr: [T; N]) -> Self {
        arr.into_iter().collect()
    }
}

impl<T> IntoIterator for BPlusTree<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    /// Moves the records out in ascending order by draining the leaf chain.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_tree::BPlusTree;
    ///
    /// let tree = BPlusTree::from([3, 1, 2]);
    /// let v: Vec<_> = tree.into_iter().collect();
    /// assert_eq!(v, [1, 2, 3]);
    /// ```
    fn into_iter(mut self) -> IntoIter<T> {
        let records: Vec<T> = self.raw.drain_to_vec();
        IntoIter {
            inner: records.into_iter(),
        }
    }
}

impl<'a, T> IntoIterator for &'a BPlusTree<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let record = self.cursor.get()?;
        self.cursor.move_next();
        self.remaining -= 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<T> FusedIterator for Iter<'_, T> {}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Iter {
            cursor: self.cursor,
            remaining: self.remaining,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Iter<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for IntoIter<T> {
    fn next_back(&mut self) -> Option<T> {
        self.inner.next_back()
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<T> FusedIterator for IntoIter<T> {}

impl<T: fmt::Debug> fmt::Debug for IntoIter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntoIter").field("inner", &self.inner).finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::vec;

    #[test]
    fn iter_len_tracks_progress() {
        let tree: BPlusTree<u32> = (0..50).collect();
        let mut iter = tree.iter();
        assert_eq!(iter.len(), 50);
        iter.nth(9);
        assert_eq!(iter.len(), 40);
        assert_eq!(iter.next(), Some(&10));
        assert_eq!(iter.by_ref().count(), 39);
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn debug_lists_records_in_order() {
        let tree = BPlusTree::from([3, 1, 2]);
        assert_eq!(format!("{tree:?}"), "{1, 2, 3}");
        assert_eq!(format!("{:?}", tree.iter()), "[1, 2, 3]");
    }

    #[test]
    fn get_or_insert_is_idempotent_with_duplicates() {
        let mut tree = BPlusTree::with_duplicates();
        tree.get_or_insert(5);
        tree.get_or_insert(5);
        assert_eq!(tree.len(), 1);
        tree.insert(5);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn slot_mut_goes_stale_after_clear() {
        let mut tree = BPlusTree::from([(1, 'a'), (2, 'b')]);
        let slot = tree.find(&(2, 'b')).unwrap();
        tree.slot_mut(slot).unwrap().1 = 'B';
        assert_eq!(tree.last(), Some(&(2, 'B')));
        tree.clear();
        assert_eq!(tree.slot_mut(slot), None);
    }

    #[test]
    fn into_iter_empties_into_vec() {
        let tree: BPlusTree<i32> = (0..100).rev().collect();
        let drained: Vec<i32> = tree.into_iter().rev().collect();
        assert_eq!(drained, (0..100).rev().collect::<Vec<_>>());
    }

    #[test]
    fn trees_with_same_records_compare_equal() {
        let a: BPlusTree<i32> = (0..40).collect();
        let b: BPlusTree<i32> = (0..40).rev().collect();
        assert_eq!(a, b);
        assert_ne!(a, BPlusTree::from([1]));
        assert_eq!(a.clone(), a);
        assert_eq!(vec![0, 1], BPlusTree::from([1, 0]).into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn slot_resolves_only_in_its_own_tree() {
        let mut a = BPlusTree::from([1, 2, 3]);
        let mut b = BPlusTree::from([10, 20, 30]);
        a.insert(4);
        b.insert(40);

        let slot = a.find(&2).unwrap();
        assert_eq!(a.slot(slot), Some(&2));
        assert_eq!(b.slot(slot), None);
        assert_eq!(b.slot_mut(slot), None);

        // A clone shares the state a slot was taken in until either side changes.
        let mut copy = a.clone();
        assert_eq!(copy.slot(slot), Some(&2));
        copy.insert(5);
        assert_eq!(copy.slot(slot), None);
        assert_eq!(a.slot(slot), Some(&2));
    }

    #[test]
    fn lookups_work_without_clone() {
        #[derive(PartialEq, Eq, PartialOrd, Ord)]
        struct Unclonable(u8);

        let tree: BPlusTree<Unclonable> = BPlusTree::new();
        assert!(!tree.contains(&Unclonable(1)));
        assert!(tree.get(&Unclonable(1)).is_none());
        assert!(tree.find(&Unclonable(1)).is_none());
        assert!(tree.cursor_at(&Unclonable(1)).is_null());
        assert!(tree.is_valid());
    }
}
