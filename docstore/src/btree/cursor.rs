//! Lazy in-order iteration over a key range.
//!
//! The cursor loads one leaf at a time. When a leaf runs out it descends again
//! from the root with the leaf's upper separator, which lands on the next
//! leaf. It yields only live entries and stops at the range's right bound.
//! Callers that stop pulling early never touch the remaining leaves.

use crate::btree::node::LeafEntry;
use crate::btree::tree::{BTree, BTreeError};
use crate::storage::Storage;
use crate::types::{KeyRange, Recency, RightBound, StoreKey};

/// A live entry produced by a [`RangeCursor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorEntry {
    pub key: StoreKey,
    pub recency: Recency,
    pub value: Vec<u8>,
}

/// Iterator over the live entries of a key range, in key order.
pub struct RangeCursor<'a, S: Storage> {
    tree: &'a BTree<S>,
    right: RightBound,
    entries: std::vec::IntoIter<LeafEntry>,
    /// Exclusive upper bound of the current leaf, `None` for the last leaf.
    leaf_upper: Option<StoreKey>,
    done: bool,
}

impl<S: Storage> BTree<S> {
    /// Create a cursor over the live entries in `range`.
    pub fn cursor(&self, range: &KeyRange) -> Result<RangeCursor<'_, S>, BTreeError> {
        if range.is_empty() {
            return Ok(RangeCursor {
                tree: self,
                right: range.right.clone(),
                entries: Vec::new().into_iter(),
                leaf_upper: None,
                done: true,
            });
        }

        let (mut leaf, leaf_upper) = self.find_leaf_bounded(&range.left)?;
        let start = leaf.find_index(&range.left).unwrap_or_else(|i| i);
        let entries = leaf.entries.split_off(start);

        Ok(RangeCursor {
            tree: self,
            right: range.right.clone(),
            entries: entries.into_iter(),
            leaf_upper,
            done: false,
        })
    }
}

impl<S: Storage> Iterator for RangeCursor<'_, S> {
    type Item = Result<CursorEntry, BTreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if let Some(entry) = self.entries.next() {
                if !self.right.is_above(&entry.key) {
                    self.done = true;
                    break;
                }
                if let Some(value) = entry.value {
                    return Some(Ok(CursorEntry {
                        key: entry.key,
                        recency: entry.recency,
                        value,
                    }));
                }
                continue;
            }

            let Some(upper) = self.leaf_upper.take() else {
                self.done = true;
                break;
            };
            if !self.right.is_above(&upper) {
                self.done = true;
                break;
            }

            match self.tree.find_leaf_bounded(&upper) {
                Ok((leaf, leaf_upper)) => {
                    self.leaf_upper = leaf_upper;
                    self.entries = leaf.entries.into_iter();
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}
