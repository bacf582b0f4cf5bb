//! In-memory storage for tests and ephemeral slices.
//!
//! Pages live in a `HashMap`. Two deterministic fault hooks exist:
//! - `corrupt_page` flips a byte of a stored page so the next read fails its
//!   checksum
//! - `fail_writes_after` makes page writes fail once a budget is spent

use std::collections::HashMap;

use crate::storage::allocator::PageAllocator;
use crate::storage::io::{Storage, StorageError, verify_page};
use crate::storage::page::{Page, PageId};
use crate::storage::superblock::Superblock;

/// Pages added to the allocator each time it runs out.
const GROWTH_PAGES: u64 = 64;

/// In-memory implementation of [`Storage`].
#[derive(Debug)]
pub struct MemoryStorage {
    pages: HashMap<PageId, Page>,
    allocator: PageAllocator,
    superblock: Superblock,
    /// Remaining successful writes before injected failures start.
    write_budget: Option<u64>,
    sync_count: u64,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        let allocator = PageAllocator::new(GROWTH_PAGES);
        let superblock = Superblock {
            total_page_count: allocator.total_pages(),
            ..Superblock::new()
        };
        Self {
            pages: HashMap::new(),
            allocator,
            superblock,
            write_budget: None,
            sync_count: 0,
        }
    }

    /// Flip one byte of a stored page. Returns `false` if the page is not stored.
    pub fn corrupt_page(&mut self, page_id: PageId, offset: usize) -> bool {
        match self.pages.get_mut(&page_id) {
            Some(page) => {
                let byte = page.read_u8(offset);
                page.write_u8(offset, !byte);
                true
            }
            None => false,
        }
    }

    /// Allow `writes` more page writes, then fail every write. `None` disables
    /// the fault.
    pub const fn fail_writes_after(&mut self, writes: Option<u64>) {
        self.write_budget = writes;
    }

    /// Number of pages holding data.
    #[must_use]
    pub fn stored_page_count(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub const fn sync_count(&self) -> u64 {
        self.sync_count
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn read_page(&self, page_id: PageId) -> Result<Page, StorageError> {
        let page = self
            .pages
            .get(&page_id)
            .ok_or(StorageError::MissingPage(page_id))?;
        verify_page(page_id, page.clone())
    }

    fn write_page(&mut self, page_id: PageId, mut page: Page) -> Result<(), StorageError> {
        if page_id >= self.allocator.total_pages() {
            return Err(StorageError::PageOutOfBounds {
                page_id,
                total_pages: self.allocator.total_pages(),
            });
        }
        if let Some(budget) = self.write_budget.as_mut() {
            if *budget == 0 {
                return Err(StorageError::Io(std::io::Error::other(
                    "injected write failure",
                )));
            }
            *budget -= 1;
        }
        page.seal();
        self.pages.insert(page_id, page);
        Ok(())
    }

    fn allocate_page(&mut self) -> Result<PageId, StorageError> {
        if let Some(page_id) = self.allocator.allocate() {
            return Ok(page_id);
        }
        let new_total = self.allocator.total_pages() + GROWTH_PAGES;
        self.allocator.grow(new_total);
        self.superblock.total_page_count = new_total;
        self.allocator.allocate().ok_or(StorageError::PageOutOfBounds {
            page_id: new_total,
            total_pages: new_total,
        })
    }

    fn free_page(&mut self, page_id: PageId) -> Result<(), StorageError> {
        if !self.allocator.free(page_id) {
            return Err(StorageError::DoubleFree(page_id));
        }
        self.pages.remove(&page_id);
        Ok(())
    }

    fn reset_allocation(&mut self) {
        self.allocator = PageAllocator::new(self.allocator.total_pages());
    }

    fn mark_allocated(&mut self, page_id: PageId) {
        self.allocator.mark_used(page_id);
    }

    fn pages_in_use(&self) -> u64 {
        self.allocator.used_count()
    }

    fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    fn superblock_mut(&mut self) -> &mut Superblock {
        &mut self.superblock
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.sync_count += 1;
        Ok(())
    }
}
