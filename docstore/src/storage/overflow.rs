//! Overflow page chains for values too large to live in a leaf slot.
//!
//! ```text
//! [page header 8] [next page u64] [bytes here u32] [bytes...]
//! ```
//!
//! A next page of 0 ends the chain. A chain is owned by exactly one
//! `OverflowRef`; freeing the chain returns every page to the allocator.

use crate::storage::io::{Storage, StorageError};
use crate::storage::page::{PAGE_SIZE, Page, PageHeader, PageId, PageType};

const NEXT_PAGE_OFFSET: usize = PageHeader::SIZE;
const CHUNK_LENGTH_OFFSET: usize = NEXT_PAGE_OFFSET + 8;
const OVERFLOW_DATA_OFFSET: usize = CHUNK_LENGTH_OFFSET + 4;

pub const OVERFLOW_DATA_PER_PAGE: usize = PAGE_SIZE - OVERFLOW_DATA_OFFSET;

/// Serialized [`OverflowRef`]: first page (u64) then value length (u32).
pub const OVERFLOW_REF_SIZE: usize = 12;

/// Owning handle to a chain: where it starts and how many bytes it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverflowRef {
    pub first_page: PageId,
    pub total_length: u32,
}

impl OverflowRef {
    #[must_use]
    pub const fn new(first_page: PageId, total_length: u32) -> Self {
        Self {
            first_page,
            total_length,
        }
    }

    /// Number of pages the chain occupies.
    #[must_use]
    pub const fn page_count(&self) -> usize {
        (self.total_length as usize).div_ceil(OVERFLOW_DATA_PER_PAGE)
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; OVERFLOW_REF_SIZE] {
        let mut buf = [0u8; OVERFLOW_REF_SIZE];
        buf[0..8].copy_from_slice(&self.first_page.to_le_bytes());
        buf[8..12].copy_from_slice(&self.total_length.to_le_bytes());
        buf
    }

    /// Returns `None` unless `bytes` is exactly one serialized reference.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != OVERFLOW_REF_SIZE {
            return None;
        }
        let mut page = [0u8; 8];
        page.copy_from_slice(&bytes[0..8]);
        let mut length = [0u8; 4];
        length.copy_from_slice(&bytes[8..12]);
        Some(Self::new(u64::from_le_bytes(page), u32::from_le_bytes(length)))
    }
}

/// Write a value to a fresh overflow chain.
///
/// Pages are allocated up front so each page is written once with its final
/// next pointer. If any write fails, every page allocated for the chain is
/// released before returning the error, so a failed write leaves nothing
/// behind.
pub fn write_overflow<S: Storage>(
    storage: &mut S,
    value: &[u8],
) -> Result<OverflowRef, OverflowError> {
    if value.is_empty() {
        return Err(OverflowError::EmptyValue);
    }
    let total_length = u32::try_from(value.len()).map_err(|_| OverflowError::TooLarge(value.len()))?;

    let chunks: Vec<&[u8]> = value.chunks(OVERFLOW_DATA_PER_PAGE).collect();
    let mut pages = Vec::with_capacity(chunks.len());
    for _ in 0..chunks.len() {
        match storage.allocate_page() {
            Ok(page_id) => pages.push(page_id),
            Err(e) => {
                release_pages(storage, &pages);
                return Err(e.into());
            }
        }
    }

    for (i, chunk) in chunks.iter().enumerate() {
        let next_page = pages.get(i + 1).copied().unwrap_or(0);
        let mut page = Page::with_type(PageType::Overflow);
        page.write_u64(NEXT_PAGE_OFFSET, next_page);
        // A chunk never exceeds OVERFLOW_DATA_PER_PAGE.
        #[allow(clippy::cast_possible_truncation)]
        page.write_u32(CHUNK_LENGTH_OFFSET, chunk.len() as u32);
        page.write_bytes(OVERFLOW_DATA_OFFSET, chunk);

        if let Err(e) = storage.write_page(pages[i], page) {
            tracing::warn!(
                "Overflow write failed after {i} of {} pages, releasing chain: {e}",
                pages.len()
            );
            release_pages(storage, &pages);
            return Err(e.into());
        }
    }

    Ok(OverflowRef::new(pages[0], total_length))
}

fn release_pages<S: Storage>(storage: &mut S, pages: &[PageId]) {
    for &page_id in pages {
        if let Err(e) = storage.free_page(page_id) {
            tracing::warn!("Failed to release overflow page {page_id}: {e}");
        }
    }
}

/// Read a value back from its overflow chain.
pub fn read_overflow<S: Storage>(
    storage: &S,
    overflow_ref: &OverflowRef,
) -> Result<Vec<u8>, OverflowError> {
    let mut result = Vec::with_capacity(overflow_ref.total_length as usize);
    walk_chain(storage, overflow_ref, |_, data| result.extend_from_slice(data))?;

    if result.len() != overflow_ref.total_length as usize {
        return Err(OverflowError::LengthMismatch {
            expected: overflow_ref.total_length as usize,
            actual: result.len(),
        });
    }
    Ok(result)
}

/// The pages of a chain, in order.
pub fn chain_pages<S: Storage>(
    storage: &S,
    overflow_ref: &OverflowRef,
) -> Result<Vec<PageId>, OverflowError> {
    let mut pages = Vec::with_capacity(overflow_ref.page_count());
    walk_chain(storage, overflow_ref, |page_id, _| pages.push(page_id))?;
    Ok(pages)
}

/// Release every page of a chain. Returns the number of pages freed.
pub fn free_overflow<S: Storage>(
    storage: &mut S,
    overflow_ref: &OverflowRef,
) -> Result<u64, OverflowError> {
    let pages = chain_pages(storage, overflow_ref)?;
    for &page_id in &pages {
        storage.free_page(page_id)?;
    }
    Ok(pages.len() as u64)
}

/// Visit each page of a chain with its data, validating page types and
/// refusing to follow more links than the declared length allows.
fn walk_chain<S: Storage>(
    storage: &S,
    overflow_ref: &OverflowRef,
    mut visit: impl FnMut(PageId, &[u8]),
) -> Result<(), OverflowError> {
    let max_pages = overflow_ref.page_count();
    let mut current_page_id = overflow_ref.first_page;
    let mut visited = 0usize;

    while current_page_id != 0 {
        if visited == max_pages {
            return Err(OverflowError::ChainTooLong(max_pages));
        }
        let page = storage.read_page(current_page_id)?;

        match page.header() {
            Ok(header) if header.page_type == PageType::Overflow => {}
            _ => return Err(OverflowError::NotOverflow(current_page_id)),
        }

        let next_page = page.read_u64(NEXT_PAGE_OFFSET);
        let data_length = page.read_u32(CHUNK_LENGTH_OFFSET) as usize;
        if data_length > OVERFLOW_DATA_PER_PAGE {
            return Err(OverflowError::LengthMismatch {
                expected: OVERFLOW_DATA_PER_PAGE,
                actual: data_length,
            });
        }

        visit(current_page_id, page.read_bytes(OVERFLOW_DATA_OFFSET, data_length));
        visited += 1;
        current_page_id = next_page;
    }

    Ok(())
}

#[derive(Debug)]
pub enum OverflowError {
    Storage(StorageError),
    /// Empty values are stored inline.
    EmptyValue,
    /// Longer than a u32 length can describe.
    TooLarge(usize),
    /// A link points at a page that is not part of a chain.
    NotOverflow(PageId),
    /// More links than the declared length allows.
    ChainTooLong(usize),
    LengthMismatch { expected: usize, actual: usize },
}

impl OverflowError {
    /// Whether the chain's stored bytes are inconsistent.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_corruption(),
            Self::NotOverflow(_) | Self::ChainTooLong(_) | Self::LengthMismatch { .. } => true,
            Self::EmptyValue | Self::TooLarge(_) => false,
        }
    }
}

impl std::fmt::Display for OverflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "overflow chain: {e}"),
            Self::EmptyValue => write!(f, "an empty value needs no overflow chain"),
            Self::TooLarge(len) => write!(f, "{len}-byte value exceeds the overflow limit"),
            Self::NotOverflow(page_id) => write!(f, "chain links to page {page_id}, which is not an overflow page"),
            Self::ChainTooLong(max) => write!(f, "overflow chain runs past its {max} pages"),
            Self::LengthMismatch { expected, actual } => {
                write!(f, "overflow chain holds {actual} bytes where {expected} were expected")
            }
        }
    }
}

impl std::error::Error for OverflowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for OverflowError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
