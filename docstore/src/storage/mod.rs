//! Page store backing the document index.
//!
//! # Layout
//!
//! Storage is a flat array of 8KB pages:
//!
//! - Page 0: Superblock (format metadata and the index root)
//! - Remaining pages: B-tree nodes, overflow pages and free pages
//!
//! Allocation state lives in memory and is rebuilt from the index on open.
//!
//! # Usage
//!
//! ```ignore
//! use docstore::storage::{MemoryStorage, Page, PageType, Storage};
//!
//! let mut storage = MemoryStorage::new();
//! let page_id = storage.allocate_page()?;
//!
//! let mut page = Page::with_type(PageType::Overflow);
//! page.write_bytes(64, b"hello");
//! storage.write_page(page_id, page)?;
//!
//! storage.sync()?;
//! ```

mod allocator;
mod file;
mod io;
mod memory;
pub mod overflow;
mod page;
mod superblock;

pub use allocator::{PageAllocator, RESERVED_PAGES};
pub use file::DatabaseFile;
pub use io::{Storage, StorageError};
pub use memory::MemoryStorage;
pub use overflow::{OverflowError, OverflowRef};
pub use page::{PAGE_SIZE, Page, PageError, PageHeader, PageId, PageType};
pub use superblock::{Superblock, SuperblockError};
