use core::fmt;

use crate::raw::{Handle, Node, RawBPlusTree};

/// Indentation per tree level.
const INDENT: usize = 4;

/// A sideways rendering of a [`BPlusTree`](crate::BPlusTree), created by
/// [`BPlusTree::dump`](crate::BPlusTree::dump).
///
/// Read it with your head tilted left: the root sits at the left margin and
/// larger records are printed above smaller ones. Each separator line shows
/// the record it routes to, the smallest record right of it, as that record
/// currently reads in its leaf.
pub struct Dump<'a, T> {
    tree: &'a RawBPlusTree<T>,
}

impl<'a, T> Dump<'a, T> {
    pub(crate) const fn new(tree: &'a RawBPlusTree<T>) -> Self {
        Self { tree }
    }

    fn write_node(&self, f: &mut fmt::Formatter<'_>, handle: Handle, depth: usize) -> fmt::Result
    where
        T: fmt::Debug,
    {
        let indent = depth * INDENT;
        match self.tree.node(handle) {
            Node::Leaf(leaf) => writeln!(f, "{:indent$}{:?}", "", leaf.records()),
            Node::Internal(internal) => {
                for index in (0..internal.child_count()).rev() {
                    self.write_node(f, internal.child(index), depth + 1)?;
                    if index > 0 {
                        let separator = self.smallest(internal.child(index)).unwrap_or(internal.key(index - 1));
                        writeln!(f, "{:indent$}({separator:?})", "")?;
                    }
                }
                Ok(())
            }
        }
    }

    /// First record of the leftmost leaf under `handle`.
    fn smallest(&self, mut handle: Handle) -> Option<&'a T> {
        loop {
            match self.tree.node(handle) {
                Node::Leaf(leaf) => return leaf.first(),
                Node::Internal(internal) => handle = internal.child(0),
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Display for Dump<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_node(f, self.tree.root(), 0)
    }
}
