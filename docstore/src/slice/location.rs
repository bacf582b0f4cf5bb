//! Scoped handles on the slot of one key.
//!
//! A [`ReadLocation`] borrows the slice shared and a [`WriteLocation`]
//! borrows it exclusively, so the borrow checker enforces the locking
//! discipline: any number of readers, or one writer, and no second write
//! acquisition while a write location is alive.

use crate::slice::value::{self, ValueRef};
use crate::slice::{Slice, StoreError};
use crate::storage::Storage;
use crate::types::{Document, Recency, StoreKey};

/// Shared access to the slot of one key.
pub struct ReadLocation<'a, S: Storage> {
    slice: &'a Slice<S>,
    key: StoreKey,
    value: Option<(ValueRef, Recency)>,
}

impl<S: Storage> ReadLocation<'_, S> {
    #[must_use]
    pub const fn key(&self) -> &StoreKey {
        &self.key
    }

    /// The stored reference, absent if the key has no value.
    #[must_use]
    pub fn value(&self) -> Option<&ValueRef> {
        self.value.as_ref().map(|(value, _)| value)
    }

    /// Recency of the write that produced the stored value.
    #[must_use]
    pub fn recency(&self) -> Option<Recency> {
        self.value.as_ref().map(|(_, recency)| *recency)
    }

    /// Decode the stored document.
    pub fn read_document(&self) -> Result<Option<Document>, StoreError> {
        self.value()
            .map(|value| value::decode(self.slice.storage(), value))
            .transpose()
    }
}

/// Exclusive access to the slot of one key.
///
/// Finish with [`commit`](Self::commit), [`write_document`](Self::write_document)
/// or [`abandon`](Self::abandon). Dropping an unfinished location abandons it.
pub struct WriteLocation<'a, S: Storage> {
    slice: &'a mut Slice<S>,
    key: StoreKey,
    value: Option<ValueRef>,
    finished: bool,
}

impl<S: Storage> WriteLocation<'_, S> {
    #[must_use]
    pub const fn key(&self) -> &StoreKey {
        &self.key
    }

    #[must_use]
    pub const fn value(&self) -> Option<&ValueRef> {
        self.value.as_ref()
    }

    pub fn read_document(&self) -> Result<Option<Document>, StoreError> {
        self.value
            .as_ref()
            .map(|value| value::decode(self.slice.storage(), value))
            .transpose()
    }

    /// Encode a document into this slice's storage, ready for `commit`.
    ///
    /// The returned reference owns any overflow chain written for it; pass
    /// it to `commit` or release it.
    pub fn encode(&mut self, doc: &Document) -> Result<ValueRef, StoreError> {
        value::encode(self.slice.storage_mut(), doc)
    }

    /// Store `new_value` (or remove the slot) stamped with `timestamp`.
    ///
    /// The slot is written first. Only then is the previous value's overflow
    /// chain released. If the slot write fails, `new_value` is released
    /// instead and the old value stays in place.
    pub fn commit(
        mut self,
        new_value: Option<ValueRef>,
        timestamp: Recency,
    ) -> Result<(), StoreError> {
        self.finished = true;
        let slot = new_value.as_ref().map(ValueRef::to_slot_bytes);

        let previous = match self.slice.tree.apply_change(&self.key, slot, timestamp) {
            Ok(previous) => previous,
            Err(e) => {
                if let Some(new_value) = new_value {
                    if let Err(release_err) = value::release(self.slice.storage_mut(), new_value) {
                        tracing::warn!(
                            "Failed to release uncommitted value for {}: {release_err}",
                            self.key
                        );
                    }
                }
                return Err(e.into());
            }
        };

        if let Some(previous) = previous {
            let freed = value::release(
                self.slice.storage_mut(),
                ValueRef::from_slot_bytes(&previous)?,
            )?;
            if freed > 0 {
                tracing::trace!("Released {freed} overflow pages of {}", self.key);
            }
        }
        Ok(())
    }

    /// Encode and commit `doc`, or remove the slot for `None`.
    pub fn write_document(
        mut self,
        doc: Option<&Document>,
        timestamp: Recency,
    ) -> Result<(), StoreError> {
        let new_value = doc.map(|doc| self.encode(doc)).transpose()?;
        self.commit(new_value, timestamp)
    }

    /// Give up the location without touching the slot.
    pub fn abandon(mut self) {
        self.finished = true;
    }
}

impl<S: Storage> Drop for WriteLocation<'_, S> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::trace!("Write location for {} dropped without commit", self.key);
        }
    }
}

impl<S: Storage> Slice<S> {
    /// Look up the slot for `key` for reading.
    pub fn acquire_for_read(&self, key: &StoreKey) -> Result<ReadLocation<'_, S>, StoreError> {
        let value = match self.tree.get(key)? {
            Some((slot, recency)) => Some((ValueRef::from_slot_bytes(&slot)?, recency)),
            None => None,
        };
        Ok(ReadLocation {
            slice: self,
            key: key.clone(),
            value,
        })
    }

    /// Look up the slot for `key` for writing.
    pub fn acquire_for_write(&mut self, key: &StoreKey) -> Result<WriteLocation<'_, S>, StoreError> {
        let value = match self.tree.get(key)? {
            Some((slot, _)) => Some(ValueRef::from_slot_bytes(&slot)?),
            None => None,
        };
        Ok(WriteLocation {
            slice: self,
            key: key.clone(),
            value,
            finished: false,
        })
    }
}
