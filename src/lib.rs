//! An in-memory B+Tree for Rust.
//!
//! [`BPlusTree`] keeps records in sorted order. Every record lives in a leaf,
//! and the leaves are chained left to right, so ordered traversal walks the
//! chain instead of the tree. Internal nodes only route: each separator is a
//! copy of the smallest record in the subtree to its right.
//!
//! Two adapters store key/value records in the same tree:
//!
//! - [`BPlusMap`] - one value per key
//! - [`BPlusMultiMap`] - a list of values per key
//!
//! # Example
//!
//! ```
//! use bplus_tree::{BPlusTree, TreeConfig};
//!
//! let config = TreeConfig::builder().max_records(4).build()?;
//! let mut tree = BPlusTree::with_config(config)?;
//! for n in (0..100).rev() {
//!     tree.insert(n);
//! }
//!
//! assert_eq!(tree.len(), 100);
//! assert_eq!(tree.first(), Some(&0));
//! assert!(tree.remove(&42));
//! assert_eq!(tree.get(&42), None);
//!
//! // Cursors walk the leaf chain.
//! let mut cursor = tree.cursor_at(&41);
//! cursor.move_next();
//! assert_eq!(cursor.get(), Some(&43));
//!
//! assert!(tree.is_valid());
//! # Ok::<(), bplus_tree::ConfigError>(())
//! ```
//!
//! # Features
//!
//! - **`no_std` compatible** - Only requires `alloc`, no standard library dependency
//! - **Optional duplicates** - Equal records can be rejected or kept in insertion order
//! - **Self-checking** - [`BPlusTree::validate`] reports the first broken structural invariant
//! - **Arena storage** - Nodes live in one arena and refer to each other by index
//!
//! # Logging
//!
//! Structural milestones (root split, root collapse, clear) are emitted as
//! `tracing` events at `TRACE` level. Install a subscriber to see them.

#![no_std]
// These forbid rules and lint groups are meant to be very restrictive.
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![deny(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

mod raw;

pub mod bplus_map;
pub mod bplus_multimap;
pub mod bplus_tree;
pub mod config;

pub use bplus_map::BPlusMap;
pub use bplus_multimap::BPlusMultiMap;
pub use bplus_tree::{BPlusTree, Cursor, Slot};
pub use config::{ConfigError, TreeConfig};
pub use raw::InvariantViolation;
