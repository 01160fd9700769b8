use alloc::vec::Vec;

use snafu::{Snafu, ensure};

use super::handle::Handle;
use super::node::Node;
use super::raw_bplus_tree::RawBPlusTree;

/// A structural rule the tree was found to break.
///
/// Nodes are named by their arena index.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum InvariantViolation {
    /// An internal node does not have exactly one more child than separators.
    #[snafu(display("node {node} has {keys} separators but {children} children"))]
    ChildCount {
        /// Arena index of the node.
        node: usize,
        /// Separators held.
        keys: usize,
        /// Children held.
        children: usize,
    },

    /// Records or separators inside one node are not ascending.
    #[snafu(display("node {node} is out of order at position {index}"))]
    Unordered {
        /// Arena index of the node.
        node: usize,
        /// Position of the first record that is not greater than its predecessor.
        index: usize,
    },

    /// A subtree left of a separator holds a record that should sit right of it.
    #[snafu(display("subtree left of separator {index} in node {node} reaches past it"))]
    SeparatorBound {
        /// Arena index of the internal node.
        node: usize,
        /// Position of the separator.
        index: usize,
    },

    /// A separator differs from the smallest record of the subtree right of it.
    #[snafu(display("separator {index} in node {node} is not the smallest record right of it"))]
    SeparatorNotMinimum {
        /// Arena index of the internal node.
        node: usize,
        /// Position of the separator.
        index: usize,
    },

    /// Leaves do not all sit at the same depth.
    #[snafu(display("leaf {node} sits at depth {depth}, expected {expected}"))]
    UnevenDepth {
        /// Arena index of the leaf.
        node: usize,
        /// Depth found.
        depth: usize,
        /// Depth of the first leaf reached.
        expected: usize,
    },

    /// A non-root node holds fewer records than the minimum fill.
    #[snafu(display("node {node} holds {count} records, below the minimum of {minimum}"))]
    Underfull {
        /// Arena index of the node.
        node: usize,
        /// Records (separators for internal nodes) held.
        count: usize,
        /// Minimum fill for this kind of node.
        minimum: usize,
    },

    /// A node holds more records than `max_records`.
    #[snafu(display("node {node} holds {count} records, above the maximum of {maximum}"))]
    Overfull {
        /// Arena index of the node.
        node: usize,
        /// Records (separators for internal nodes) held.
        count: usize,
        /// Configured `max_records`.
        maximum: usize,
    },

    /// The root is an internal node without separators.
    #[snafu(display("internal root {node} holds no separators"))]
    EmptyRoot {
        /// Arena index of the root.
        node: usize,
    },

    /// The tree's first-leaf handle is not the leftmost leaf.
    #[snafu(display("leaf chain starts at {found}, but the leftmost leaf is {expected}"))]
    ChainStart {
        /// Arena index of the leftmost leaf.
        expected: usize,
        /// Arena index recorded as the first leaf.
        found: usize,
    },

    /// A leaf's forward link skips or misorders leaves.
    #[snafu(display("leaf {node} links to {found:?}, expected {expected:?}"))]
    BrokenLeafChain {
        /// Arena index of the leaf.
        node: usize,
        /// Arena index of the next leaf in key order, if any.
        expected: Option<usize>,
        /// Arena index the leaf actually links to, if any.
        found: Option<usize>,
    },

    /// The cached record count disagrees with the leaves.
    #[snafu(display("tree counts {recorded} records but its leaves hold {counted}"))]
    LenMismatch {
        /// Count kept by the tree.
        recorded: usize,
        /// Records found in the leaves.
        counted: usize,
    },
}

/// State carried across the depth-first walk.
struct Walk {
    /// Leaves in key order.
    leaves: Vec<Handle>,
    /// Depth of the first leaf reached.
    leaf_depth: Option<usize>,
}

impl<T: Ord> RawBPlusTree<T> {
    /// Checks every structural invariant and reports the first one broken.
    pub(crate) fn validate(&self) -> Result<(), InvariantViolation> {
        let mut walk = Walk {
            leaves: Vec::new(),
            leaf_depth: None,
        };
        self.validate_node(self.root(), 0, true, &mut walk)?;

        let leftmost = walk.leaves.first().copied().unwrap_or(self.root());
        ensure!(
            leftmost == self.first_leaf(),
            ChainStartSnafu {
                expected: leftmost.to_index(),
                found: self.first_leaf().to_index(),
            }
        );

        let mut counted = 0;
        for (position, &leaf_handle) in walk.leaves.iter().enumerate() {
            let leaf = self.node(leaf_handle).as_leaf();
            counted += leaf.len();

            let expected = walk.leaves.get(position + 1).copied();
            ensure!(
                leaf.next() == expected,
                BrokenLeafChainSnafu {
                    node: leaf_handle.to_index(),
                    expected: expected.map(Handle::to_index),
                    found: leaf.next().map(Handle::to_index),
                }
            );
        }

        ensure!(
            counted == self.len(),
            LenMismatchSnafu {
                recorded: self.len(),
                counted,
            }
        );
        Ok(())
    }

    /// Checks the subtree at `handle` and returns its smallest and largest
    /// records, or `None` for the empty root leaf.
    fn validate_node(&self, handle: Handle, depth: usize, is_root: bool, walk: &mut Walk) -> Result<Option<(&T, &T)>, InvariantViolation> {
        let config = self.config();
        let node = handle.to_index();

        match self.node(handle) {
            Node::Leaf(leaf) => {
                let expected = *walk.leaf_depth.get_or_insert(depth);
                ensure!(depth == expected, UnevenDepthSnafu { node, depth, expected });

                let count = leaf.len();
                ensure!(
                    count <= config.max_records,
                    OverfullSnafu {
                        node,
                        count,
                        maximum: config.max_records,
                    }
                );
                ensure!(
                    is_root || count >= config.min_leaf_records(),
                    UnderfullSnafu {
                        node,
                        count,
                        minimum: config.min_leaf_records(),
                    }
                );
                self.check_ascending(leaf.records(), node)?;

                walk.leaves.push(handle);
                Ok(leaf.first().zip(leaf.last()))
            }
            Node::Internal(internal) => {
                let keys = internal.key_count();
                let children = internal.child_count();
                ensure!(children == keys + 1, ChildCountSnafu { node, keys, children });
                ensure!(!is_root || keys > 0, EmptyRootSnafu { node });
                ensure!(
                    keys <= config.max_records,
                    OverfullSnafu {
                        node,
                        count: keys,
                        maximum: config.max_records,
                    }
                );
                ensure!(
                    is_root || keys >= config.min_internal_records(),
                    UnderfullSnafu {
                        node,
                        count: keys,
                        minimum: config.min_internal_records(),
                    }
                );
                self.check_ascending(internal.keys(), node)?;

                let mut bounds: Option<(&T, &T)> = None;
                for (index, &child) in internal.children().iter().enumerate() {
                    // Non-root subtrees are never empty; the underfull check above catches it.
                    let Some((low, high)) = self.validate_node(child, depth + 1, false, walk)? else {
                        continue;
                    };

                    if index > 0 {
                        ensure!(
                            low == internal.key(index - 1),
                            SeparatorNotMinimumSnafu { node, index: index - 1 }
                        );
                    }
                    if index < keys {
                        let separator = internal.key(index);
                        let within = if config.allow_duplicates { high <= separator } else { high < separator };
                        ensure!(within, SeparatorBoundSnafu { node, index });
                    }

                    bounds = Some(match bounds {
                        Some((first, _)) => (first, high),
                        None => (low, high),
                    });
                }
                Ok(bounds)
            }
        }
    }

    /// Neighbours must ascend; equal neighbours only when duplicates are allowed.
    fn check_ascending(&self, records: &[T], node: usize) -> Result<(), InvariantViolation> {
        let allow_duplicates = self.config().allow_duplicates;
        for (index, pair) in records.windows(2).enumerate() {
            let ascending = if allow_duplicates { pair[0] <= pair[1] } else { pair[0] < pair[1] };
            ensure!(ascending, UnorderedSnafu { node, index: index + 1 });
        }
        Ok(())
    }
}
