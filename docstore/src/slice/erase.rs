//! Bulk deletion of a key range.

use crate::btree::KeyTester;
use crate::slice::value::{self, ValueRef};
use crate::slice::{Slice, StoreError};
use crate::storage::Storage;
use crate::types::{KeyRange, RightBound, StoreKey};

/// Erases every key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl KeyTester for AcceptAll {
    fn key_should_be_erased(&self, _key: &StoreKey) -> bool {
        true
    }
}

/// Erases nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectAll;

impl KeyTester for RejectAll {
    fn key_should_be_erased(&self, _key: &StoreKey) -> bool {
        false
    }
}

/// Erases keys that fall in any of a set of ranges, such as the ranges a
/// node no longer owns.
#[derive(Debug, Clone, Default)]
pub struct RangeTester {
    ranges: Vec<KeyRange>,
}

impl RangeTester {
    #[must_use]
    pub const fn new(ranges: Vec<KeyRange>) -> Self {
        Self { ranges }
    }
}

impl KeyTester for RangeTester {
    fn key_should_be_erased(&self, key: &StoreKey) -> bool {
        self.ranges.iter().any(|range| range.contains_key(key))
    }
}

impl<S: Storage> Slice<S> {
    /// Delete every document in `range` that `tester` accepts, releasing
    /// their overflow storage. Returns the number of documents deleted.
    ///
    /// Erased keys leave no tombstones.
    pub fn erase_range(
        &mut self,
        range: &KeyRange,
        tester: &dyn KeyTester,
    ) -> Result<u64, StoreError> {
        if range.is_empty() {
            return Ok(0);
        }

        // The tree erases (left_exclusive, right_inclusive].
        let mut left = range.left.clone();
        let left_exclusive = left.decrement().then_some(left);
        let right_inclusive = match &range.right {
            RightBound::Unbounded => None,
            RightBound::Exclusive(right) => {
                let mut right = right.clone();
                if !right.decrement() {
                    return Ok(0);
                }
                Some(right)
            }
        };

        let mut released_pages = 0u64;
        let erased = self.tree.erase_range(
            left_exclusive.as_ref(),
            right_inclusive.as_ref(),
            tester,
            &mut |storage: &mut S, slot: &[u8]| -> Result<(), StoreError> {
                released_pages += value::release(storage, ValueRef::from_slot_bytes(slot)?)?;
                Ok(())
            },
        )?;

        tracing::info!(
            "Erased {erased} documents in {range}, released {released_pages} overflow pages"
        );
        Ok(erased)
    }
}
