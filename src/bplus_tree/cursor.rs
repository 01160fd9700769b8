use core::fmt;

use crate::raw::{Handle, RawBPlusTree};

/// A position in a [`BPlusTree`](crate::BPlusTree), or the end position past
/// its largest record.
///
/// Cursors borrow the tree, so it cannot change while one is alive. Two cursors
/// are equal when they name the same position; all end cursors are equal.
pub struct Cursor<'a, T> {
    tree: &'a RawBPlusTree<T>,
    position: Option<(Handle, usize)>,
}

impl<'a, T> Cursor<'a, T> {
    pub(crate) const fn new(tree: &'a RawBPlusTree<T>, position: Option<(Handle, usize)>) -> Self {
        Self { tree, position }
    }

    /// Returns the record under the cursor, or `None` at the end.
    #[must_use]
    pub fn get(&self) -> Option<&'a T> {
        let (leaf, index) = self.position?;
        self.tree.record_at(leaf, index)
    }

    /// Returns `true` for the end cursor.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.position.is_none()
    }

    /// Moves to the next record in ascending order. Does nothing at the end.
    pub fn move_next(&mut self) {
        if let Some((leaf, index)) = self.position {
            self.position = self.tree.next_position(leaf, index);
        }
    }

    /// Moves to the next record and returns the cursor as it was before the move.
    pub fn advance(&mut self) -> Self {
        let previous = *self;
        self.move_next();
        previous
    }

    /// Detaches the position from the borrow, so it can be resolved again later
    /// through [`BPlusTree::slot`](crate::BPlusTree::slot). `None` at the end.
    #[must_use]
    pub fn slot(&self) -> Option<Slot> {
        let (leaf, index) = self.position?;
        Some(Slot {
            leaf,
            index,
            epoch: self.tree.epoch(),
        })
    }
}

impl<T> Clone for Cursor<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Cursor<'_, T> {}

impl<T> PartialEq for Cursor<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
    }
}

impl<T> Eq for Cursor<'_, T> {}

impl<T: fmt::Debug> fmt::Debug for Cursor<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cursor").field(&self.get()).finish()
    }
}

/// The location of a record, detached from any borrow of the tree.
///
/// A slot stays resolvable until the tree is next modified. After that,
/// [`BPlusTree::slot`](crate::BPlusTree::slot) returns `None` for it rather
/// than a record that moved into its place. A slot only resolves in the tree
/// it came from, or in an unmodified clone of that tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Slot {
    leaf: Handle,
    index: usize,
    epoch: usize,
}

impl Slot {
    pub(crate) const fn leaf(self) -> Handle {
        self.leaf
    }

    pub(crate) const fn index(self) -> usize {
        self.index
    }

    pub(crate) const fn epoch(self) -> usize {
        self.epoch
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use crate::BPlusTree;
    use alloc::format;

    #[test]
    fn end_cursor_stays_put() {
        let tree = BPlusTree::from([1]);
        let mut cursor = tree.begin();
        cursor.move_next();
        assert!(cursor.is_null());
        assert_eq!(cursor, tree.end());
        cursor.move_next();
        assert_eq!(cursor.advance(), tree.end());
        assert_eq!(cursor.get(), None);
        assert_eq!(cursor.slot(), None);
    }

    #[test]
    fn empty_tree_begins_at_end() {
        let tree: BPlusTree<u8> = BPlusTree::new();
        assert_eq!(tree.begin(), tree.end());
        assert!(tree.begin().is_null());
    }

    #[test]
    fn debug_shows_current_record() {
        let tree = BPlusTree::from([4, 2]);
        assert_eq!(format!("{:?}", tree.begin()), "Cursor(Some(2))");
        assert_eq!(format!("{:?}", tree.end()), "Cursor(None)");
    }
}
