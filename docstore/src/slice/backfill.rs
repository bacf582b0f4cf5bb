//! Backfill: replaying a key range's changes to a lagging replica.

use crate::btree::{BackfillVisitor, CursorEntry};
use crate::signal::Interruptor;
use crate::slice::value::{self, ValueRef};
use crate::slice::{Slice, StoreError};
use crate::storage::Storage;
use crate::types::{Document, KeyRange, Recency, StoreKey};

/// A live document to send to a replica.
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillAtom {
    pub key: StoreKey,
    pub value: Document,
    pub recency: Recency,
}

/// Receives backfill events in key order.
pub trait BackfillCallback {
    /// Every key in `range` may have been deleted; the live ones follow.
    fn on_delete_range(&mut self, range: &KeyRange) -> Result<(), StoreError>;

    fn on_deletion(&mut self, key: &StoreKey, recency: Recency) -> Result<(), StoreError>;

    fn on_keyvalue(&mut self, atom: BackfillAtom) -> Result<(), StoreError>;
}

/// Decodes values for a [`BackfillCallback`] and checks every event lies
/// inside the requested range.
struct BackfillAdapter<'a> {
    callback: &'a mut dyn BackfillCallback,
    range: &'a KeyRange,
    atoms: u64,
    deletions: u64,
}

impl<S: Storage> BackfillVisitor<S, StoreError> for BackfillAdapter<'_> {
    fn on_delete_range(&mut self, range: &KeyRange) -> Result<(), StoreError> {
        debug_assert!(
            self.range.is_superset(range),
            "deletion range {range} outside backfill range {}",
            self.range
        );
        self.callback.on_delete_range(range)
    }

    fn on_deletion(&mut self, key: &StoreKey, recency: Recency) -> Result<(), StoreError> {
        debug_assert!(self.range.contains_key(key), "deletion of {key} outside {}", self.range);
        self.deletions += 1;
        self.callback.on_deletion(key, recency)
    }

    fn on_pair(&mut self, storage: &S, entry: CursorEntry) -> Result<(), StoreError> {
        debug_assert!(
            self.range.contains_key(&entry.key),
            "pair {} outside {}",
            entry.key,
            self.range
        );
        let value = value::decode(storage, &ValueRef::from_slot_bytes(&entry.value)?)?;
        self.atoms += 1;
        self.callback.on_keyvalue(BackfillAtom {
            key: entry.key,
            value,
            recency: entry.recency,
        })
    }
}

impl<S: Storage> Slice<S> {
    /// Report every change in `range` made at or after `since_when`.
    ///
    /// Where deletions that old are no longer recorded, a deletion range is
    /// reported and followed by every live document in it. Pulsing
    /// `interruptor` stops the traversal with [`StoreError::Interrupted`];
    /// events already delivered stay delivered.
    pub fn backfill(
        &self,
        range: &KeyRange,
        since_when: Recency,
        callback: &mut dyn BackfillCallback,
        interruptor: &Interruptor,
    ) -> Result<(), StoreError> {
        let mut adapter = BackfillAdapter {
            callback,
            range,
            atoms: 0,
            deletions: 0,
        };
        let result = self
            .tree
            .backfill(range, since_when, &mut adapter, interruptor);

        match &result {
            Ok(()) => tracing::debug!(
                "Backfill of {range} since {} sent {} atoms and {} deletions",
                since_when.value(),
                adapter.atoms,
                adapter.deletions
            ),
            Err(e) => tracing::info!(
                "Backfill of {range} stopped after {} atoms: {e}",
                adapter.atoms
            ),
        }
        result
    }
}
