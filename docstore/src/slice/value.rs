//! Value codec: documents to leaf slot references and back.
//!
//! A slot starts with a one-byte tag:
//!
//! ```text
//! 0x00 [payload]            inline, payload at most MAX_INLINE_VALUE_SIZE bytes
//! 0x01 [12-byte OverflowRef] payload stored in an overflow chain
//! ```
//!
//! The payload is a little-endian CRC32 of the document bytes followed by the
//! document bytes, so a decode always detects torn or flipped bytes whether
//! the payload lives in the leaf or in a chain.

use crate::btree::ValueSizer;
use crate::slice::StoreError;
use crate::storage::overflow::{
    OVERFLOW_REF_SIZE, chain_pages, free_overflow, read_overflow, write_overflow,
};
use crate::storage::{OverflowRef, PageId, Storage};
use crate::types::{Document, MAX_NESTING_DEPTH};

const TAG_INLINE: u8 = 0x00;
const TAG_OVERFLOW: u8 = 0x01;
const CHECKSUM_SIZE: usize = 4;

/// Largest payload kept inside the leaf slot.
pub const MAX_INLINE_VALUE_SIZE: usize = 251;

/// Largest slot a value reference ever occupies.
pub const MAX_VALUE_REF_SIZE: usize = 1 + MAX_INLINE_VALUE_SIZE;

/// The slot-resident form of a stored document.
///
/// An `Overflow` reference exclusively owns its chain. It is deliberately not
/// `Clone`: [`release`] consumes it, so a chain cannot be freed twice
/// through the same reference.
#[derive(Debug, PartialEq, Eq)]
pub enum ValueRef {
    Inline(Vec<u8>),
    Overflow(OverflowRef),
}

impl ValueRef {
    /// The bytes written into the leaf slot.
    #[must_use]
    pub fn to_slot_bytes(&self) -> Vec<u8> {
        match self {
            Self::Inline(payload) => {
                let mut bytes = Vec::with_capacity(1 + payload.len());
                bytes.push(TAG_INLINE);
                bytes.extend_from_slice(payload);
                bytes
            }
            Self::Overflow(overflow_ref) => {
                let mut bytes = Vec::with_capacity(1 + OVERFLOW_REF_SIZE);
                bytes.push(TAG_OVERFLOW);
                bytes.extend_from_slice(&overflow_ref.to_bytes());
                bytes
            }
        }
    }

    /// Parse a leaf slot. Anything malformed is corruption.
    pub fn from_slot_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        parse_slot(bytes).ok_or_else(|| {
            StoreError::StorageCorruption(format!("malformed value slot of {} bytes", bytes.len()))
        })
    }

    /// Size of the slot this reference occupies.
    #[must_use]
    pub fn slot_size(&self) -> usize {
        match self {
            Self::Inline(payload) => 1 + payload.len(),
            Self::Overflow(_) => 1 + OVERFLOW_REF_SIZE,
        }
    }

    #[must_use]
    pub const fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow(_))
    }
}

fn parse_slot(bytes: &[u8]) -> Option<ValueRef> {
    let (&tag, rest) = bytes.split_first()?;
    match tag {
        TAG_INLINE if (CHECKSUM_SIZE..=MAX_INLINE_VALUE_SIZE).contains(&rest.len()) => {
            Some(ValueRef::Inline(rest.to_vec()))
        }
        TAG_OVERFLOW if rest.len() == OVERFLOW_REF_SIZE => {
            let overflow_ref = OverflowRef::from_bytes(rest)?;
            (overflow_ref.total_length as usize > MAX_INLINE_VALUE_SIZE)
                .then_some(ValueRef::Overflow(overflow_ref))
        }
        _ => None,
    }
}

/// Serialize `doc`, spilling into a fresh overflow chain when it does not
/// fit inline. Documents nested deeper than [`MAX_NESTING_DEPTH`] are
/// refused before anything is written.
pub fn encode<S: Storage>(storage: &mut S, doc: &Document) -> Result<ValueRef, StoreError> {
    if doc.nests_deeper_than(MAX_NESTING_DEPTH) {
        return Err(StoreError::DocumentTooDeep);
    }
    let bytes = doc.to_bytes();
    let mut payload = Vec::with_capacity(CHECKSUM_SIZE + bytes.len());
    payload.extend_from_slice(&crc32fast::hash(&bytes).to_le_bytes());
    payload.extend_from_slice(&bytes);

    if payload.len() <= MAX_INLINE_VALUE_SIZE {
        return Ok(ValueRef::Inline(payload));
    }
    let overflow_ref = write_overflow(storage, &payload)?;
    tracing::trace!(
        "Wrote {} byte value to overflow chain at page {}",
        payload.len(),
        overflow_ref.first_page
    );
    Ok(ValueRef::Overflow(overflow_ref))
}

/// Read a document back. Checksum or format failures are corruption.
pub fn decode<S: Storage>(storage: &S, value: &ValueRef) -> Result<Document, StoreError> {
    let payload = match value {
        ValueRef::Inline(payload) => payload.clone(),
        ValueRef::Overflow(overflow_ref) => read_overflow(storage, overflow_ref)?,
    };

    let Some((checksum, bytes)) = payload.split_first_chunk::<CHECKSUM_SIZE>() else {
        return Err(StoreError::StorageCorruption(
            "value payload shorter than its checksum".to_string(),
        ));
    };
    let expected = u32::from_le_bytes(*checksum);
    let actual = crc32fast::hash(bytes);
    if expected != actual {
        tracing::warn!("Value checksum mismatch: expected {expected:08x}, got {actual:08x}");
        return Err(StoreError::StorageCorruption(format!(
            "value checksum mismatch: expected {expected:08x}, got {actual:08x}"
        )));
    }

    Document::from_bytes(bytes)
        .map_err(|e| StoreError::StorageCorruption(format!("undecodable document: {e}")))
}

/// Whether `slot` is a well-formed reference no longer than `available`.
#[must_use]
pub fn fits(slot: &[u8], available: usize) -> bool {
    slot.len() <= available && parse_slot(slot).is_some()
}

/// Free every overflow page owned by `value`. Returns the pages freed.
pub fn release<S: Storage>(storage: &mut S, value: ValueRef) -> Result<u64, StoreError> {
    match value {
        ValueRef::Inline(_) => Ok(0),
        ValueRef::Overflow(overflow_ref) => Ok(free_overflow(storage, &overflow_ref)?),
    }
}

/// Overflow pages owned by `value`, in chain order.
pub fn overflow_pages<S: Storage>(storage: &S, value: &ValueRef) -> Result<Vec<PageId>, StoreError> {
    match value {
        ValueRef::Inline(_) => Ok(Vec::new()),
        ValueRef::Overflow(overflow_ref) => Ok(chain_pages(storage, overflow_ref)?),
    }
}

/// Tells the index how large document slots can be.
pub struct DocumentValueSizer;

impl ValueSizer for DocumentValueSizer {
    fn fits(&self, value: &[u8], length_available: usize) -> bool {
        fits(value, length_available)
    }

    fn max_possible_size(&self) -> usize {
        MAX_VALUE_REF_SIZE
    }
}
