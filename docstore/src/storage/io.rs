//! Storage abstraction over page-based block devices.
//!
//! The `Storage` trait is the seam between the index and the bytes: a file in
//! production, an in-memory map in tests. Implementations own the page
//! allocator so that every page handed out can be released exactly once.

use std::path::PathBuf;

use crate::storage::page::{Page, PageError, PageId};
use crate::storage::superblock::{Superblock, SuperblockError};

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error.
    Io(std::io::Error),
    /// Page out of bounds.
    PageOutOfBounds { page_id: PageId, total_pages: u64 },
    /// Page was never written or has been freed.
    MissingPage(PageId),
    /// A page failed its integrity check.
    Corruption { page_id: PageId, source: PageError },
    /// A page was released twice, or a reserved page was released.
    DoubleFree(PageId),
    /// Superblock error.
    Superblock(SuperblockError),
    /// Refused to create a store over an existing file.
    AlreadyExists(PathBuf),
}

impl StorageError {
    /// Whether this error means stored bytes cannot be trusted.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. } | Self::Superblock(_))
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::PageOutOfBounds {
                page_id,
                total_pages,
            } => write!(
                f,
                "page {page_id} out of bounds (total pages: {total_pages})"
            ),
            Self::MissingPage(page_id) => write!(f, "page {page_id} has no contents"),
            Self::Corruption { page_id, source } => {
                write!(f, "corruption in page {page_id}: {source}")
            }
            Self::DoubleFree(page_id) => write!(f, "page {page_id} released twice"),
            Self::Superblock(e) => write!(f, "superblock error: {e}"),
            Self::AlreadyExists(path) => write!(f, "file already exists: {}", path.display()),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Corruption { source, .. } => Some(source),
            Self::Superblock(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<SuperblockError> for StorageError {
    fn from(e: SuperblockError) -> Self {
        Self::Superblock(e)
    }
}

/// Abstraction over page-based storage operations.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - `read_page` returns the last written content for a page and verifies
///   its checksum
/// - `write_page` seals the page checksum before storing it
/// - `allocate_page` never returns a page that is currently in use
/// - `free_page` rejects pages that are not in use
/// - superblock changes are persisted on `sync`
pub trait Storage {
    /// Read a page. Reads only need shared access.
    fn read_page(&self, page_id: PageId) -> Result<Page, StorageError>;

    /// Write a page, sealing its checksum.
    fn write_page(&mut self, page_id: PageId, page: Page) -> Result<(), StorageError>;

    /// Allocate a page, growing the store if needed.
    fn allocate_page(&mut self) -> Result<PageId, StorageError>;

    /// Release a page for reuse.
    fn free_page(&mut self, page_id: PageId) -> Result<(), StorageError>;

    /// Forget every allocation except the reserved pages.
    ///
    /// Followed by `mark_allocated` for every reachable page when rebuilding
    /// allocation state on open.
    fn reset_allocation(&mut self);

    /// Mark a page as in use.
    fn mark_allocated(&mut self, page_id: PageId);

    /// Number of pages currently in use, superblock included.
    fn pages_in_use(&self) -> u64;

    /// Get a reference to the superblock.
    fn superblock(&self) -> &Superblock;

    /// Get a mutable reference to the superblock.
    fn superblock_mut(&mut self) -> &mut Superblock;

    /// Persist the superblock and make all previous writes durable.
    fn sync(&mut self) -> Result<(), StorageError>;
}

/// Verify a page read back from storage.
pub(crate) fn verify_page(page_id: PageId, page: Page) -> Result<Page, StorageError> {
    match page.verify() {
        Ok(()) => Ok(page),
        Err(source) => {
            tracing::error!("Page {page_id} failed integrity check: {source}");
            Err(StorageError::Corruption { page_id, source })
        }
    }
}
