use core::borrow::Borrow;

use smallvec::SmallVec;

use super::handle::Handle;
use crate::config::DEFAULT_MAX_RECORDS;

/// Records held inline before a node spills to the heap. A node briefly holds
/// `MAX + 1` records between an overflowing insert and its split.
pub(crate) const INLINE_RECORDS: usize = DEFAULT_MAX_RECORDS + 1;
pub(crate) const INLINE_CHILDREN: usize = INLINE_RECORDS + 1;

pub(crate) type Records<T> = SmallVec<[T; INLINE_RECORDS]>;
type Children = SmallVec<[Handle; INLINE_CHILDREN]>;

#[allow(clippy::large_enum_variant)]
#[derive(Clone)]
pub(crate) enum Node<T> {
    Internal(InternalNode<T>),
    Leaf(LeafNode<T>),
}

// Internal nodes route only. `keys[i]` is a copy of the smallest record under
// `children[i + 1]`, so `children.len() == keys.len() + 1` outside of a split.
#[derive(Clone)]
pub(crate) struct InternalNode<T> {
    keys: Records<T>,
    children: Children,
}

// Leaves own the records and the forward link of the leaf chain.
#[derive(Clone)]
pub(crate) struct LeafNode<T> {
    next: Option<Handle>,
    records: Records<T>,
}

impl<T> Node<T> {
    /// Creates a new empty leaf node.
    pub(crate) fn new_leaf() -> Self {
        Node::Leaf(LeafNode::new())
    }

    /// Returns true if this is a leaf node.
    #[cfg(test)]
    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Returns the leaf node, panicking if this is not a leaf.
    pub(crate) fn as_leaf(&self) -> &LeafNode<T> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    /// Returns the leaf node mutably, panicking if this is not a leaf.
    pub(crate) fn as_leaf_mut(&mut self) -> &mut LeafNode<T> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    /// Returns the internal node, panicking if this is not internal.
    pub(crate) fn as_internal(&self) -> &InternalNode<T> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    /// Returns the internal node mutably, panicking if this is not internal.
    pub(crate) fn as_internal_mut(&mut self) -> &mut InternalNode<T> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    /// Number of records (separators, for internal nodes) held by this node.
    pub(crate) fn len(&self) -> usize {
        match self {
            Node::Internal(internal) => internal.key_count(),
            Node::Leaf(leaf) => leaf.len(),
        }
    }

    /// Unwraps a node taken out of the arena, panicking if it is not a leaf.
    pub(crate) fn into_leaf(self) -> LeafNode<T> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    /// Unwraps a node taken out of the arena, panicking if it is not internal.
    pub(crate) fn into_internal(self) -> InternalNode<T> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }
}

impl<T> InternalNode<T> {
    /// Creates a new empty internal node.
    pub(crate) fn new() -> Self {
        Self {
            keys: SmallVec::new(),
            children: SmallVec::new(),
        }
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn child_count(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &T {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[T] {
        &self.keys
    }

    #[inline]
    pub(crate) fn child(&self, index: usize) -> Handle {
        self.children[index]
    }

    pub(crate) fn children(&self) -> &[Handle] {
        &self.children
    }

    /// Index of the child whose range holds the first record equal to `key`:
    /// the number of separators strictly less than `key`.
    #[inline]
    pub(crate) fn lower_child<Q>(&self, key: &Q) -> usize
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.keys.partition_point(|k| k.borrow() < key)
    }

    /// Index of the child whose range holds the last record equal to `key`,
    /// which is also where a new record equal to `key` belongs: the number of
    /// separators less than or equal to `key`.
    #[inline]
    pub(crate) fn upper_child<Q>(&self, key: &Q) -> usize
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.keys.partition_point(|k| k.borrow() <= key)
    }

    /// Inserts `key` at `index` and `child` right after it, at `index + 1`.
    pub(crate) fn insert_child(&mut self, index: usize, key: T, child: Handle) {
        self.keys.insert(index, key);
        self.children.insert(index + 1, child);
    }

    /// Removes the separator at `index` together with the child to its right.
    pub(crate) fn remove_child(&mut self, index: usize) -> (T, Handle) {
        let key = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        (key, child)
    }

    /// Appends a separator and the child to its right.
    pub(crate) fn push_child(&mut self, key: T, child: Handle) {
        self.keys.push(key);
        self.children.push(child);
    }

    /// Prepends a child and the separator to its right.
    pub(crate) fn push_child_front(&mut self, child: Handle, key: T) {
        self.keys.insert(0, key);
        self.children.insert(0, child);
    }

    /// Sets the leftmost child; used when a new root adopts the old one.
    pub(crate) fn set_first_child(&mut self, child: Handle) {
        if self.children.is_empty() {
            self.children.push(child);
        } else {
            self.children[0] = child;
        }
    }

    pub(crate) fn set_key(&mut self, index: usize, key: T) {
        self.keys[index] = key;
    }

    /// Swaps in a new separator and hands back the old one.
    pub(crate) fn replace_key(&mut self, index: usize, key: T) -> T {
        core::mem::replace(&mut self.keys[index], key)
    }

    /// Pops the last separator and the last child.
    pub(crate) fn pop_child(&mut self) -> Option<(T, Handle)> {
        let key = self.keys.pop()?;
        let child = self.children.pop()?;
        Some((key, child))
    }

    /// Pops the first child and the first separator.
    pub(crate) fn pop_child_front(&mut self) -> Option<(Handle, T)> {
        if self.keys.is_empty() {
            return None;
        }
        let child = self.children.remove(0);
        let key = self.keys.remove(0);
        Some((child, key))
    }

    /// Splits an overflowing node. The lower half stays here, the median is
    /// returned for promotion, and the upper half moves to the new sibling.
    pub(crate) fn split(&mut self) -> (T, InternalNode<T>) {
        let mid = self.keys.len() / 2;

        let mut right = InternalNode::new();
        right.keys = self.keys.drain(mid + 1..).collect();
        right.children = self.children.drain(mid + 1..).collect();

        let median = self.keys.pop().expect("`InternalNode::split()` - node has no median separator!");
        (median, right)
    }

    /// Absorbs a right sibling; `separator` comes down from the parent.
    pub(crate) fn merge_with_right(&mut self, separator: T, mut right: InternalNode<T>) {
        self.keys.push(separator);
        self.keys.append(&mut right.keys);
        self.children.append(&mut right.children);
    }
}

impl<T> LeafNode<T> {
    /// Creates a new empty leaf node.
    pub(crate) fn new() -> Self {
        Self {
            next: None,
            records: SmallVec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn next(&self) -> Option<Handle> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: Option<Handle>) {
        self.next = next;
    }

    #[inline]
    pub(crate) fn record(&self, index: usize) -> &T {
        &self.records[index]
    }

    #[inline]
    pub(crate) fn record_mut(&mut self, index: usize) -> &mut T {
        &mut self.records[index]
    }

    pub(crate) fn records(&self) -> &[T] {
        &self.records
    }

    pub(crate) fn first(&self) -> Option<&T> {
        self.records.first()
    }

    pub(crate) fn last(&self) -> Option<&T> {
        self.records.last()
    }

    /// Index of the first record not less than `key`.
    #[inline]
    pub(crate) fn lower_bound<Q>(&self, key: &Q) -> usize
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.records.partition_point(|r| r.borrow() < key)
    }

    /// Index of the first record greater than `key`.
    #[inline]
    pub(crate) fn upper_bound<Q>(&self, key: &Q) -> usize
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.records.partition_point(|r| r.borrow() <= key)
    }

    pub(crate) fn insert(&mut self, index: usize, record: T) {
        self.records.insert(index, record);
    }

    pub(crate) fn remove(&mut self, index: usize) -> T {
        self.records.remove(index)
    }

    pub(crate) fn push(&mut self, record: T) {
        self.records.push(record);
    }

    pub(crate) fn push_front(&mut self, record: T) {
        self.records.insert(0, record);
    }

    pub(crate) fn pop(&mut self) -> Option<T> {
        self.records.pop()
    }

    pub(crate) fn pop_front(&mut self) -> Option<T> {
        if self.records.is_empty() {
            None
        } else {
            Some(self.records.remove(0))
        }
    }

    /// Takes every record, leaving the leaf empty.
    pub(crate) fn take_all(&mut self) -> Records<T> {
        core::mem::take(&mut self.records)
    }

    /// Splits an overflowing leaf. The left half keeps the extra record of an
    /// odd count; the upper half is returned as an unlinked sibling.
    pub(crate) fn split(&mut self) -> LeafNode<T> {
        let mid = self.records.len().div_ceil(2);

        let mut right = LeafNode::new();
        right.records = self.records.drain(mid..).collect();
        right
    }

    /// Absorbs a right sibling and takes over its forward link.
    pub(crate) fn merge_with_right(&mut self, mut right: LeafNode<T>) {
        self.records.append(&mut right.records);
        self.next = right.next;
    }
}
