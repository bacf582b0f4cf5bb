//! File-backed page storage.
//!
//! Page N lives at byte offset `N * PAGE_SIZE`. The file grows in chunks of
//! `growth_pages` pages. Allocation state is kept in memory and rebuilt from
//! the index when the file is reopened.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
#[cfg(unix)]
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::storage::allocator::PageAllocator;
use crate::storage::io::{Storage, StorageError, verify_page};
use crate::storage::page::{PAGE_SIZE, PAGE_SIZE_U64, Page, PageId, PageType};
use crate::storage::superblock::Superblock;

/// A store file handle with low-level page I/O operations.
#[derive(Debug)]
pub struct DatabaseFile {
    file: File,
    path: PathBuf,
    superblock: Superblock,
    allocator: PageAllocator,
    growth_pages: u64,
}

impl DatabaseFile {
    /// Create a new store file at the given path.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path, growth_pages: u64) -> Result<Self, StorageError> {
        if path.exists() {
            return Err(StorageError::AlreadyExists(path.to_path_buf()));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let superblock = Superblock::new();
        let mut page = superblock.to_page();
        page.seal();
        file.write_all(page.as_bytes())?;
        file.sync_all()?;

        tracing::info!("Created store file {}", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
            allocator: PageAllocator::new(superblock.total_page_count),
            superblock,
            growth_pages: growth_pages.max(1),
        })
    }

    /// Open an existing store file.
    ///
    /// Only the superblock is read; the caller is expected to rebuild the
    /// allocation state with `reset_allocation` and `mark_allocated`.
    pub fn open(path: &Path, growth_pages: u64) -> Result<Self, StorageError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut buf = Box::new([0u8; PAGE_SIZE]);
        file.read_exact(buf.as_mut_slice())?;
        let page = verify_page(0, Page::from_boxed(buf))?;
        let superblock = Superblock::from_page(&page)?;

        tracing::info!(
            "Opened store file {} ({} pages)",
            path.display(),
            superblock.total_page_count
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            allocator: PageAllocator::new(superblock.total_page_count),
            superblock,
            growth_pages: growth_pages.max(1),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_bounds(&self, page_id: PageId) -> Result<(), StorageError> {
        if page_id >= self.superblock.total_page_count {
            return Err(StorageError::PageOutOfBounds {
                page_id,
                total_pages: self.superblock.total_page_count,
            });
        }
        Ok(())
    }

    /// Read a page using pread, which leaves the file cursor alone and so
    /// only needs shared access.
    #[cfg(unix)]
    fn read_raw(&self, page_id: PageId) -> Result<Box<[u8; PAGE_SIZE]>, StorageError> {
        let mut buf = Box::new([0u8; PAGE_SIZE]);
        self.file
            .read_exact_at(buf.as_mut_slice(), page_id * PAGE_SIZE_U64)?;
        Ok(buf)
    }

    #[cfg(not(unix))]
    fn read_raw(&self, page_id: PageId) -> Result<Box<[u8; PAGE_SIZE]>, StorageError> {
        let mut buf = Box::new([0u8; PAGE_SIZE]);
        let mut handle = &self.file;
        handle.seek(SeekFrom::Start(page_id * PAGE_SIZE_U64))?;
        handle.read_exact(buf.as_mut_slice())?;
        Ok(buf)
    }

    fn write_raw(&mut self, page_id: PageId, page: &Page) -> Result<(), StorageError> {
        self.file.seek(SeekFrom::Start(page_id * PAGE_SIZE_U64))?;
        self.file.write_all(page.as_bytes())?;
        Ok(())
    }

    /// Extend the file by `growth_pages` pages.
    fn grow(&mut self) -> Result<(), StorageError> {
        let new_total = self.superblock.total_page_count + self.growth_pages;
        self.file.set_len(new_total * PAGE_SIZE_U64)?;
        self.allocator.grow(new_total);
        self.superblock.total_page_count = new_total;
        tracing::debug!("Grew {} to {new_total} pages", self.path.display());
        Ok(())
    }
}

impl Storage for DatabaseFile {
    fn read_page(&self, page_id: PageId) -> Result<Page, StorageError> {
        self.check_bounds(page_id)?;
        let buf = self.read_raw(page_id)?;
        verify_page(page_id, Page::from_boxed(buf))
    }

    fn write_page(&mut self, page_id: PageId, mut page: Page) -> Result<(), StorageError> {
        self.check_bounds(page_id)?;
        page.seal();
        self.write_raw(page_id, &page)
    }

    fn allocate_page(&mut self) -> Result<PageId, StorageError> {
        if let Some(page_id) = self.allocator.allocate() {
            return Ok(page_id);
        }
        self.grow()?;
        self.allocator
            .allocate()
            .ok_or(StorageError::PageOutOfBounds {
                page_id: self.superblock.total_page_count,
                total_pages: self.superblock.total_page_count,
            })
    }

    fn free_page(&mut self, page_id: PageId) -> Result<(), StorageError> {
        if !self.allocator.free(page_id) {
            return Err(StorageError::DoubleFree(page_id));
        }
        let mut page = Page::with_type(PageType::Free);
        page.seal();
        self.write_raw(page_id, &page)
    }

    fn reset_allocation(&mut self) {
        self.allocator = PageAllocator::new(self.superblock.total_page_count);
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
        let mut page = self.superblock.to_page();
        page.seal();
        self.write_raw(0, &page)?;
        self.file.sync_all()?;
        Ok(())
    }
}
