//! Ordered index over store keys.
//!
//! This module provides a page-based B-tree used as the document index.
//!
//! # Structure
//!
//! The B-tree consists of:
//! - Internal nodes: store separator keys and child page pointers
//! - Leaf nodes: store key/value entries and deletion tombstones, doubly
//!   linked for range scans
//!
//! Keys are variable-length [`StoreKey`](crate::types::StoreKey)s. Values are
//! opaque slot bytes of at most [`MAX_SLOT_VALUE_SIZE`] bytes; their format
//! belongs to the caller, which describes it through a [`ValueSizer`].
//!
//! # Recency
//!
//! Every entry carries the recency of the write that produced it. Deletions
//! leave tombstones until a full leaf prunes them, raising the leaf's
//! deletion horizon. Backfill uses both to report changes since a point in
//! time.

mod cursor;
mod node;
mod traversal;
mod tree;

pub use cursor::{CursorEntry, RangeCursor};
pub use node::{
    DATA_SPACE, InternalNode, LeafEntry, LeafNode, MAX_SLOT_VALUE_SIZE, Node, NodeError,
    NodeHeader, NodeType,
};
pub use traversal::{BackfillVisitor, KeyTester};
pub use tree::{BTree, BTreeError, ValueSizer};
