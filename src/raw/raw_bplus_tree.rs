use alloc::vec::Vec;
use core::borrow::Borrow;
use core::sync::atomic::{self, AtomicUsize};

use smallvec::SmallVec;
use tracing::trace;

use super::arena::Arena;
use super::handle::Handle;
use super::node::{InternalNode, Node};
use crate::config::TreeConfig;

/// Epochs are drawn from one counter shared by every tree, so two trees never
/// hand out the same epoch unless one is a clone of the other.
static NEXT_EPOCH: AtomicUsize = AtomicUsize::new(1);

fn next_epoch() -> usize {
    NEXT_EPOCH.fetch_add(1, atomic::Ordering::Relaxed)
}

/// The core B+Tree implementation backing `BPlusTree`.
#[derive(Clone)]
pub(crate) struct RawBPlusTree<T> {
    /// Arena storing all tree nodes.
    nodes: Arena<Node<T>>,
    /// Handle to the root node. An empty tree is a single empty leaf.
    root: Handle,
    /// Handle to the leftmost leaf, where the leaf chain starts.
    first_leaf: Handle,
    /// Total number of records in the leaves.
    len: usize,
    config: TreeConfig,
    /// Replaced by every insert, remove and clear; positions taken under any
    /// other epoch may name the wrong record.
    epoch: usize,
}

/// Path element for tracking traversal during mutations.
#[derive(Clone, Copy)]
struct PathElement {
    /// Handle to the node at this level.
    node: Handle,
    /// Index of the child we descended into.
    child_index: usize,
}

/// Type alias for a path through the tree (stack of path elements).
type Path = SmallVec<[PathElement; 16]>;

/// Which end of a run of equal records a descent aims for.
#[derive(Clone, Copy)]
enum Bias {
    First,
    Last,
}

impl<T> RawBPlusTree<T> {
    /// Creates a new, empty tree.
    pub(crate) fn new(config: TreeConfig) -> Self {
        let mut nodes = Arena::new();
        let root = nodes.alloc(Node::new_leaf());
        Self {
            nodes,
            root,
            first_leaf: root,
            len: 0,
            config,
            epoch: next_epoch(),
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) const fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub(crate) const fn epoch(&self) -> usize {
        self.epoch
    }

    pub(crate) const fn root(&self) -> Handle {
        self.root
    }

    pub(crate) const fn first_leaf(&self) -> Handle {
        self.first_leaf
    }

    /// Number of live nodes in the arena.
    pub(crate) const fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns a reference to a node by handle.
    pub(crate) fn node(&self, handle: Handle) -> &Node<T> {
        self.nodes.get(handle)
    }

    /// Number of levels from the root down to the leaves, counting both.
    pub(crate) fn height(&self) -> usize {
        let mut height = 1;
        let mut current = self.root;
        while let Node::Internal(internal) = self.nodes.get(current) {
            current = internal.child(0);
            height += 1;
        }
        height
    }

    /// Removes every record and leaves a single empty root leaf.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.root = self.nodes.alloc(Node::new_leaf());
        self.first_leaf = self.root;
        self.len = 0;
        self.bump_epoch();
        trace!("tree cleared");
    }

    /// Drains all records by walking the leaf chain, without rebalancing.
    pub(crate) fn drain_to_vec(&mut self) -> Vec<T> {
        let mut result = Vec::with_capacity(self.len);
        let mut current = Some(self.first_leaf);

        while let Some(leaf_handle) = current {
            let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
            current = leaf.next();
            result.extend(leaf.take_all());
        }

        self.clear();
        result
    }

    /// Position of the smallest record, if any.
    pub(crate) fn first_position(&self) -> Option<(Handle, usize)> {
        let leaf = self.nodes.get(self.first_leaf).as_leaf();
        (!leaf.is_empty()).then_some((self.first_leaf, 0))
    }

    /// Position of the largest record, if any.
    pub(crate) fn last_position(&self) -> Option<(Handle, usize)> {
        let mut current = self.root;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.child(internal.child_count() - 1),
                Node::Leaf(leaf) => return leaf.len().checked_sub(1).map(|index| (current, index)),
            }
        }
    }

    /// Position following `(leaf, index)` in ascending order, crossing to the
    /// next leaf through the chain.
    pub(crate) fn next_position(&self, leaf_handle: Handle, index: usize) -> Option<(Handle, usize)> {
        let leaf = self.nodes.get(leaf_handle).as_leaf();
        if index + 1 < leaf.len() {
            return Some((leaf_handle, index + 1));
        }
        let next = leaf.next()?;
        (!self.nodes.get(next).as_leaf().is_empty()).then_some((next, 0))
    }

    /// Record at a position, or `None` if the position does not name one.
    pub(crate) fn record_at(&self, leaf_handle: Handle, index: usize) -> Option<&T> {
        match self.nodes.try_get(leaf_handle)? {
            Node::Leaf(leaf) => leaf.records().get(index),
            Node::Internal(_) => None,
        }
    }

    pub(crate) fn record_at_mut(&mut self, leaf_handle: Handle, index: usize) -> Option<&mut T> {
        match self.nodes.try_get_mut(leaf_handle)? {
            Node::Leaf(leaf) if index < leaf.len() => Some(leaf.record_mut(index)),
            _ => None,
        }
    }

    fn bump_epoch(&mut self) {
        self.epoch = next_epoch();
    }

    #[cfg(test)]
    pub(crate) fn nodes_mut(&mut self) -> &mut Arena<Node<T>> {
        &mut self.nodes
    }

    #[cfg(test)]
    pub(crate) fn set_len(&mut self, len: usize) {
        self.len = len;
    }

    #[cfg(test)]
    pub(crate) fn set_first_leaf(&mut self, leaf: Handle) {
        self.first_leaf = leaf;
    }
}

impl<T: Ord> RawBPlusTree<T> {
    /// Walks from the root to the leaf that holds (or would hold) `key`.
    ///
    /// `Bias::First` lands on the leaf where the earliest equal record is, or on
    /// its left neighbour when that record opens the next leaf. `Bias::Last`
    /// lands on the leaf holding the latest equal record, which is also where a
    /// new equal record is inserted.
    fn descend<Q>(&self, key: &Q, bias: Bias, mut path: Option<&mut Path>) -> Handle
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => {
                    let child_index = match bias {
                        Bias::First => internal.lower_child(key),
                        Bias::Last => internal.upper_child(key),
                    };
                    if let Some(path) = path.as_deref_mut() {
                        path.push(PathElement {
                            node: current,
                            child_index,
                        });
                    }
                    current = internal.child(child_index);
                }
                Node::Leaf(_) => return current,
            }
        }
    }

    /// Searches for the earliest record equal to `key`.
    pub(crate) fn search<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let leaf_handle = self.descend(key, Bias::First, None);
        let leaf = self.nodes.get(leaf_handle).as_leaf();
        let index = leaf.lower_bound(key);
        if index < leaf.len() {
            return (leaf.record(index).borrow() == key).then_some((leaf_handle, index));
        }

        // Everything here is smaller; a match can only open the next leaf.
        let next_handle = leaf.next()?;
        let next = self.nodes.get(next_handle).as_leaf();
        (next.first()?.borrow() == key).then_some((next_handle, 0))
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf_handle, index) = self.search(key)?;
        Some(self.nodes.get(leaf_handle).as_leaf().record(index))
    }

    pub(crate) fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut T>
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf_handle, index) = self.search(key)?;
        Some(self.nodes.get_mut(leaf_handle).as_leaf_mut().record_mut(index))
    }
}

impl<T: Ord + Clone> RawBPlusTree<T> {
    /// Inserts a record after every record equal to it.
    ///
    /// Returns the record's position, or `Err` with the position of the equal
    /// record that blocked it when duplicates are not allowed.
    pub(crate) fn insert(&mut self, record: T) -> Result<(Handle, usize), (Handle, usize)> {
        let mut path: Path = SmallVec::new();
        let leaf_handle = self.descend(&record, Bias::Last, Some(&mut path));

        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        let index = leaf.upper_bound(&record);
        if !self.config.allow_duplicates && index > 0 && *leaf.record(index - 1) == record {
            return Err((leaf_handle, index - 1));
        }

        leaf.insert(index, record);
        let overflow = leaf.len() > self.config.max_records;
        self.len += 1;
        self.bump_epoch();

        if !overflow {
            return Ok((leaf_handle, index));
        }

        let (right_handle, left_len) = self.split_leaf_and_propagate(leaf_handle, &mut path);
        if index < left_len {
            Ok((leaf_handle, index))
        } else {
            Ok((right_handle, index - left_len))
        }
    }

    /// Returns the position of the earliest record equal to `record`,
    /// inserting `record` first if there is none.
    pub(crate) fn get_or_insert(&mut self, record: T) -> (Handle, usize) {
        if let Some(position) = self.search(&record) {
            return position;
        }
        match self.insert(record) {
            Ok(position) | Err(position) => position,
        }
    }

    /// Splits an overflowing leaf and propagates splits up the tree as needed.
    /// Returns the new right leaf and the number of records left behind.
    fn split_leaf_and_propagate(&mut self, leaf_handle: Handle, path: &mut Path) -> (Handle, usize) {
        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        let mut right = leaf.split();
        right.set_next(leaf.next());
        let left_len = leaf.len();
        let separator = right.record(0).clone();

        let right_handle = self.nodes.alloc(Node::Leaf(right));
        self.nodes.get_mut(leaf_handle).as_leaf_mut().set_next(Some(right_handle));

        self.propagate_split(path, separator, right_handle);
        (right_handle, left_len)
    }

    /// Inserts `separator` and its right child into each parent on the path,
    /// splitting parents that overflow, and grows a new root if the old one split.
    fn propagate_split(&mut self, path: &mut Path, mut separator: T, mut new_child: Handle) {
        while let Some(elem) = path.pop() {
            let parent = self.nodes.get_mut(elem.node).as_internal_mut();
            parent.insert_child(elem.child_index, separator, new_child);
            if parent.key_count() <= self.config.max_records {
                return;
            }

            let (median, right) = parent.split();
            separator = median;
            new_child = self.nodes.alloc(Node::Internal(right));
        }

        let mut new_root = InternalNode::new();
        new_root.set_first_child(self.root);
        new_root.push_child(separator, new_child);
        self.root = self.nodes.alloc(Node::Internal(new_root));
        trace!(len = self.len, height = self.height(), nodes = self.node_count(), "root split");
    }

    /// Removes the latest record equal to `key`.
    pub(crate) fn remove<Q>(&mut self, key: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut path: Path = SmallVec::new();
        let leaf_handle = self.descend(key, Bias::Last, Some(&mut path));

        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        let index = leaf.upper_bound(key).checked_sub(1)?;
        if leaf.record(index).borrow() != key {
            return None;
        }

        let removed = leaf.remove(index);
        let remaining = leaf.len();
        self.len -= 1;
        self.bump_epoch();

        // A root leaf has no floor; it may end up as the empty tree.
        if path.is_empty() {
            return Some(removed);
        }

        if index == 0 {
            self.refresh_separator(leaf_handle, &path);
        }
        if remaining < self.config.min_leaf_records() {
            self.rebalance_leaf(leaf_handle, &mut path);
        }

        Some(removed)
    }

    /// After the first record of a leaf was removed, rewrites the one ancestor
    /// separator that named it: the one left of the deepest non-leftmost step.
    fn refresh_separator(&mut self, leaf_handle: Handle, path: &Path) {
        let Some(elem) = path.iter().rev().find(|elem| elem.child_index > 0) else {
            // Leftmost leaf of the whole tree; nothing routes to it by value.
            return;
        };
        let Some(first) = self.nodes.get(leaf_handle).as_leaf().first().cloned() else {
            return;
        };
        self.nodes.get_mut(elem.node).as_internal_mut().set_key(elem.child_index - 1, first);
    }

    /// Neighbours of the child at `child_index` in `parent`.
    fn siblings(&self, parent_handle: Handle, child_index: usize) -> (Option<Handle>, Option<Handle>) {
        let parent = self.nodes.get(parent_handle).as_internal();
        let left = child_index.checked_sub(1).map(|i| parent.child(i));
        let right = (child_index + 1 < parent.child_count()).then(|| parent.child(child_index + 1));
        (left, right)
    }

    /// Rebalances a leaf after a removal caused it to underflow.
    fn rebalance_leaf(&mut self, leaf_handle: Handle, path: &mut Path) {
        let Some(&PathElement {
            node: parent_handle,
            child_index,
        }) = path.last()
        else {
            return;
        };
        let min = self.config.min_leaf_records();
        let (left, right) = self.siblings(parent_handle, child_index);

        if let Some(left) = left
            && self.nodes.get(left).len() > min
        {
            self.borrow_from_left_leaf(leaf_handle, left, parent_handle, child_index);
            return;
        }

        if let Some(right) = right
            && self.nodes.get(right).len() > min
        {
            self.borrow_from_right_leaf(leaf_handle, right, parent_handle, child_index);
            return;
        }

        // Must merge; the left sibling wins when both exist.
        match (left, right) {
            (Some(left), _) => self.merge_leaves(left, leaf_handle, path, child_index - 1),
            (None, Some(right)) => self.merge_leaves(leaf_handle, right, path, child_index),
            (None, None) => {}
        }
    }

    /// Moves the last record of the left sibling to the front of the leaf.
    fn borrow_from_left_leaf(&mut self, leaf_handle: Handle, left_handle: Handle, parent_handle: Handle, child_index: usize) {
        let record = self
            .nodes
            .get_mut(left_handle)
            .as_leaf_mut()
            .pop()
            .expect("`RawBPlusTree::borrow_from_left_leaf()` - left sibling is empty!");
        let separator = record.clone();

        self.nodes.get_mut(leaf_handle).as_leaf_mut().push_front(record);
        self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_index - 1, separator);
    }

    /// Moves the first record of the right sibling to the back of the leaf.
    fn borrow_from_right_leaf(&mut self, leaf_handle: Handle, right_handle: Handle, parent_handle: Handle, child_index: usize) {
        let right = self.nodes.get_mut(right_handle).as_leaf_mut();
        let record = right
            .pop_front()
            .expect("`RawBPlusTree::borrow_from_right_leaf()` - right sibling is empty!");
        let separator = right.record(0).clone();

        self.nodes.get_mut(leaf_handle).as_leaf_mut().push(record);
        self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_index, separator);
    }

    /// Merges the right leaf into the left one and frees it.
    fn merge_leaves(&mut self, left_handle: Handle, right_handle: Handle, path: &mut Path, separator_index: usize) {
        let right = self.nodes.take(right_handle).into_leaf();
        self.nodes.get_mut(left_handle).as_leaf_mut().merge_with_right(right);
        self.remove_from_parent_and_propagate(path, separator_index);
    }

    /// Drops the separator at `separator_index` and the child right of it from
    /// the parent on top of the path, then rebalances the parent if needed.
    fn remove_from_parent_and_propagate(&mut self, path: &mut Path, separator_index: usize) {
        let Some(PathElement { node: parent_handle, .. }) = path.pop() else {
            return;
        };

        let parent = self.nodes.get_mut(parent_handle).as_internal_mut();
        // The child itself was already taken out of the arena by the merge.
        let _ = parent.remove_child(separator_index);
        let remaining = parent.key_count();

        if path.is_empty() {
            // The parent is the root; an empty root hands over to its only child.
            if remaining == 0 {
                let new_root = parent.child(0);
                self.nodes.free(parent_handle);
                self.root = new_root;
                trace!(len = self.len, height = self.height(), nodes = self.node_count(), "root collapsed");
            }
            return;
        }

        if remaining < self.config.min_internal_records() {
            self.rebalance_internal(parent_handle, path);
        }
    }

    /// Rebalances an internal node after one of its children was merged away.
    fn rebalance_internal(&mut self, node_handle: Handle, path: &mut Path) {
        let Some(&PathElement {
            node: parent_handle,
            child_index,
        }) = path.last()
        else {
            return;
        };
        let min = self.config.min_internal_records();
        let (left, right) = self.siblings(parent_handle, child_index);

        if let Some(left) = left
            && self.nodes.get(left).len() > min
        {
            self.borrow_from_left_internal(node_handle, left, parent_handle, child_index);
            return;
        }

        if let Some(right) = right
            && self.nodes.get(right).len() > min
        {
            self.borrow_from_right_internal(node_handle, right, parent_handle, child_index);
            return;
        }

        match (left, right) {
            (Some(left), _) => self.merge_internals(left, node_handle, path, child_index - 1),
            (None, Some(right)) => self.merge_internals(node_handle, right, path, child_index),
            (None, None) => {}
        }
    }

    /// Rotates the last child of the left sibling through the parent.
    fn borrow_from_left_internal(&mut self, node_handle: Handle, left_handle: Handle, parent_handle: Handle, child_index: usize) {
        let (left_key, left_child) = self
            .nodes
            .get_mut(left_handle)
            .as_internal_mut()
            .pop_child()
            .expect("`RawBPlusTree::borrow_from_left_internal()` - left sibling has no separators!");

        let separator = self.nodes.get_mut(parent_handle).as_internal_mut().replace_key(child_index - 1, left_key);
        self.nodes.get_mut(node_handle).as_internal_mut().push_child_front(left_child, separator);
    }

    /// Rotates the first child of the right sibling through the parent.
    fn borrow_from_right_internal(&mut self, node_handle: Handle, right_handle: Handle, parent_handle: Handle, child_index: usize) {
        let (right_child, right_key) = self
            .nodes
            .get_mut(right_handle)
            .as_internal_mut()
            .pop_child_front()
            .expect("`RawBPlusTree::borrow_from_right_internal()` - right sibling has no separators!");

        let separator = self.nodes.get_mut(parent_handle).as_internal_mut().replace_key(child_index, right_key);
        self.nodes.get_mut(node_handle).as_internal_mut().push_child(separator, right_child);
    }

    /// Merges two internal nodes, pulling their parent separator down between them.
    fn merge_internals(&mut self, left_handle: Handle, right_handle: Handle, path: &mut Path, separator_index: usize) {
        let Some(&PathElement { node: parent_handle, .. }) = path.last() else {
            return;
        };
        let separator = self.nodes.get(parent_handle).as_internal().key(separator_index).clone();

        let right = self.nodes.take(right_handle).into_internal();
        self.nodes.get_mut(left_handle).as_internal_mut().merge_with_right(separator, right);

        self.remove_from_parent_and_propagate(path, separator_index);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;
    use alloc::vec;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn tree(max_records: usize, allow_duplicates: bool) -> RawBPlusTree<i32> {
        RawBPlusTree::new(TreeConfig {
            max_records,
            allow_duplicates,
        })
    }

    fn filled(max_records: usize, records: impl IntoIterator<Item = i32>) -> RawBPlusTree<i32> {
        let mut tree = tree(max_records, false);
        for record in records {
            assert!(tree.insert(record).is_ok());
            tree.validate().unwrap();
        }
        tree
    }

    fn root_keys(tree: &RawBPlusTree<i32>) -> Vec<i32> {
        tree.node(tree.root()).as_internal().keys().to_vec()
    }

    fn leaves(tree: &RawBPlusTree<i32>) -> Vec<Vec<i32>> {
        let mut result = Vec::new();
        let mut current = Some(tree.first_leaf());
        while let Some(handle) = current {
            let leaf = tree.node(handle).as_leaf();
            result.push(leaf.records().to_vec());
            current = leaf.next();
        }
        result
    }

    fn collect(tree: &RawBPlusTree<i32>) -> Vec<i32> {
        leaves(tree).into_iter().flatten().collect()
    }

    #[test]
    fn empty_tree_is_a_single_empty_leaf() {
        let tree = tree(4, false);
        assert!(tree.node(tree.root()).is_leaf());
        assert_eq!(tree.root(), tree.first_leaf());
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.first_position(), None);
        assert_eq!(tree.last_position(), None);
        tree.validate().unwrap();
    }

    #[test]
    fn overflowing_root_leaf_grows_a_root() {
        let tree = filled(4, 1..=5);
        assert_eq!(tree.height(), 2);
        assert_eq!(root_keys(&tree), vec![4]);
        assert_eq!(leaves(&tree), vec![vec![1, 2, 3], vec![4, 5]]);
    }

    #[test]
    fn insert_reports_position_after_split() {
        let mut tree = filled(4, [10, 20, 30, 40]);
        let (leaf, index) = tree.insert(35).unwrap();
        assert_eq!(tree.record_at(leaf, index), Some(&35));
        let (leaf, index) = tree.insert(5).unwrap();
        assert_eq!(tree.record_at(leaf, index), Some(&5));
    }

    #[test]
    fn duplicate_insert_points_at_existing_record() {
        let mut tree = filled(4, 1..=9);
        let len = tree.len();
        let (leaf, index) = tree.insert(6).unwrap_err();
        assert_eq!(tree.record_at(leaf, index), Some(&6));
        assert_eq!(tree.len(), len);
    }

    #[test]
    fn underflow_borrows_from_left_sibling_first() {
        let mut tree = filled(4, 1..=5);
        assert_eq!(tree.remove(&5), Some(5));
        assert_eq!(leaves(&tree), vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(root_keys(&tree), vec![3]);
        tree.validate().unwrap();
    }

    #[test]
    fn underflow_borrows_from_right_sibling() {
        let mut tree = filled(4, 1..=6);
        tree.remove(&1);
        tree.remove(&2);
        assert_eq!(leaves(&tree), vec![vec![3, 4], vec![5, 6]]);
        assert_eq!(root_keys(&tree), vec![5]);
        tree.validate().unwrap();
    }

    #[test]
    fn merge_collapses_root() {
        let mut tree = filled(4, 1..=5);
        tree.remove(&5);
        tree.remove(&4);
        assert_eq!(tree.height(), 1);
        assert!(tree.node(tree.root()).is_leaf());
        assert_eq!(leaves(&tree), vec![vec![1, 2, 3]]);
        assert_eq!(tree.node_count(), 1);
        tree.validate().unwrap();
    }

    #[test]
    fn merge_prefers_left_sibling() {
        let mut tree = filled(4, 1..=9);
        assert_eq!(leaves(&tree), vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]]);
        for record in [9, 6, 3] {
            tree.remove(&record);
        }
        assert_eq!(leaves(&tree), vec![vec![1, 2], vec![4, 5], vec![7, 8]]);
        assert_eq!(root_keys(&tree), vec![4, 7]);

        // Both siblings sit at the floor, so the middle leaf folds into the left one.
        tree.remove(&4);
        assert_eq!(leaves(&tree), vec![vec![1, 2, 5], vec![7, 8]]);
        assert_eq!(root_keys(&tree), vec![7]);
        tree.validate().unwrap();
    }

    #[test]
    fn removing_first_record_refreshes_separator() {
        let mut tree = filled(4, 1..=6);
        assert_eq!(root_keys(&tree), vec![4]);
        tree.remove(&4);
        assert_eq!(root_keys(&tree), vec![5]);
        tree.validate().unwrap();
    }

    #[test]
    fn remove_missing_is_a_no_op() {
        let mut tree = filled(4, (0..20).map(|i| i * 2));
        let epoch = tree.epoch();
        assert_eq!(tree.remove(&7), None);
        assert_eq!(tree.remove(&-1), None);
        assert_eq!(tree.remove(&100), None);
        assert_eq!(tree.len(), 20);
        assert_eq!(tree.epoch(), epoch);
    }

    #[test]
    fn removing_last_record_leaves_valid_empty_tree() {
        let mut tree = filled(4, [42]);
        assert_eq!(tree.remove(&42), Some(42));
        assert!(tree.is_empty());
        assert!(tree.node(tree.root()).is_leaf());
        assert_eq!(tree.node(tree.root()).len(), 0);
        tree.validate().unwrap();
    }

    #[test]
    fn search_finds_record_opening_next_leaf() {
        let tree = filled(4, 1..=5);
        // 4 is a separator; a lower-bound descent lands left of it.
        let (leaf, index) = tree.search(&4).unwrap();
        assert_eq!(index, 0);
        assert_ne!(leaf, tree.first_leaf());
        assert_eq!(tree.search(&6), None);
        assert_eq!(tree.search(&0), None);
    }

    #[test]
    fn duplicates_keep_insertion_order() {
        #[derive(Clone, Debug)]
        struct Tagged(i32, u32);
        impl PartialEq for Tagged {
            fn eq(&self, other: &Self) -> bool {
                self.0 == other.0
            }
        }
        impl Eq for Tagged {}
        impl PartialOrd for Tagged {
            fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }
        impl Ord for Tagged {
            fn cmp(&self, other: &Self) -> core::cmp::Ordering {
                self.0.cmp(&other.0)
            }
        }

        let mut tree = RawBPlusTree::new(TreeConfig {
            max_records: 3,
            allow_duplicates: true,
        });
        for tag in 0..12 {
            assert!(tree.insert(Tagged(tag % 3, tag as u32)).is_ok());
            tree.validate().unwrap();
        }
        let (leaf, index) = tree.search(&Tagged(1, 0)).unwrap();
        assert_eq!(tree.record_at(leaf, index).unwrap().1, 1);

        // Removal takes the latest equal record first.
        assert_eq!(tree.remove(&Tagged(1, 0)).unwrap().1, 10);
        assert_eq!(tree.remove(&Tagged(1, 0)).unwrap().1, 7);
        tree.validate().unwrap();

        let mut tags = Vec::new();
        let mut position = tree.first_position();
        while let Some((leaf, index)) = position {
            let record = tree.record_at(leaf, index).unwrap();
            tags.push((record.0, record.1));
            position = tree.next_position(leaf, index);
        }
        assert_eq!(tags, vec![(0, 0), (0, 3), (0, 6), (0, 9), (1, 1), (1, 4), (2, 2), (2, 5), (2, 8), (2, 11)]);
    }

    #[test]
    fn drain_walks_leaf_chain_and_resets() {
        let mut tree = filled(3, [5, 3, 9, 1, 7, 2, 8]);
        assert_eq!(tree.drain_to_vec(), vec![1, 2, 3, 5, 7, 8, 9]);
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 1);
        tree.validate().unwrap();
    }

    #[test]
    fn record_at_rejects_positions_outside_leaves() {
        let mut tree = filled(3, 0..20);
        let root = tree.root();
        assert_eq!(tree.record_at(root, 0), None);
        assert_eq!(tree.record_at(tree.first_leaf(), 99), None);
        assert_eq!(tree.record_at_mut(tree.first_leaf(), 99), None);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Insert(i32),
        Remove(i32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0i32..400).prop_map(Op::Insert),
            2 => (0i32..400).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn invariants_hold_after_every_operation(
            max_records in 3usize..9,
            allow_duplicates in any::<bool>(),
            ops in prop::collection::vec(op_strategy(), 0..400),
        ) {
            let mut tree = tree(max_records, allow_duplicates);
            // Multiset model: record -> copies.
            let mut model: BTreeMap<i32, usize> = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Insert(record) => {
                        let stored = tree.insert(record).is_ok();
                        let present = model.contains_key(&record);
                        prop_assert_eq!(stored, allow_duplicates || !present);
                        if stored {
                            *model.entry(record).or_default() += 1;
                        }
                    }
                    Op::Remove(record) => {
                        let removed = tree.remove(&record);
                        let expected = match model.get_mut(&record) {
                            Some(copies) if *copies > 1 => { *copies -= 1; true }
                            Some(_) => { model.remove(&record); true }
                            None => false,
                        };
                        prop_assert_eq!(removed, expected.then_some(record));
                    }
                }

                prop_assert_eq!(tree.validate(), Ok(()));
                let expected: Vec<i32> = model.iter().flat_map(|(&r, &n)| core::iter::repeat_n(r, n)).collect();
                prop_assert_eq!(tree.len(), expected.len());
                prop_assert_eq!(collect(&tree), expected);
            }
        }
    }
}
