//! Page 0: what kind of store this is, how big it is and where the index
//! root lives.
//!
//! ```text
//! [header 8]
//! [magic 8] "DOCSTORE"
//! [format version u32] [page size u32]
//! [total pages u64]
//! [index root u64]    0 until the index exists
//! ```

use crate::storage::page::{PAGE_SIZE, Page, PageHeader, PageId, PageType};

pub const MAGIC: [u8; 8] = *b"DOCSTORE";

pub const FORMAT_VERSION: u32 = 1;

#[allow(clippy::cast_possible_truncation)] // 8192 fits
const PAGE_SIZE_U32: u32 = PAGE_SIZE as u32;

const MAGIC_OFFSET: usize = PageHeader::SIZE;
const VERSION_OFFSET: usize = MAGIC_OFFSET + MAGIC.len();
const PAGE_SIZE_OFFSET: usize = VERSION_OFFSET + 4;
const TOTAL_PAGES_OFFSET: usize = PAGE_SIZE_OFFSET + 4;
const INDEX_ROOT_OFFSET: usize = TOTAL_PAGES_OFFSET + 8;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub format_version: u32,
    /// Pages backing the store, free ones included.
    pub total_page_count: u64,
    pub index_root: PageId,
}

impl Superblock {
    /// Metadata of an empty store holding only page 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            total_page_count: 1,
            index_root: 0,
        }
    }

    #[must_use]
    pub fn to_page(&self) -> Page {
        let mut page = Page::with_type(PageType::Superblock);
        page.write_bytes(MAGIC_OFFSET, &MAGIC);
        page.write_u32(VERSION_OFFSET, self.format_version);
        page.write_u32(PAGE_SIZE_OFFSET, PAGE_SIZE_U32);
        page.write_u64(TOTAL_PAGES_OFFSET, self.total_page_count);
        page.write_u64(INDEX_ROOT_OFFSET, self.index_root);
        page
    }

    pub fn from_page(page: &Page) -> Result<Self, SuperblockError> {
        match page.header() {
            Ok(header) if header.page_type == PageType::Superblock => {}
            _ => return Err(SuperblockError::NotASuperblock),
        }
        if page.read_bytes(MAGIC_OFFSET, MAGIC.len()) != MAGIC {
            return Err(SuperblockError::InvalidMagic);
        }

        let format_version = page.read_u32(VERSION_OFFSET);
        if format_version != FORMAT_VERSION {
            return Err(SuperblockError::UnsupportedVersion(format_version));
        }
        let page_size = page.read_u32(PAGE_SIZE_OFFSET);
        if page_size != PAGE_SIZE_U32 {
            return Err(SuperblockError::PageSizeMismatch(page_size));
        }

        Ok(Self {
            format_version,
            total_page_count: page.read_u64(TOTAL_PAGES_OFFSET),
            index_root: page.read_u64(INDEX_ROOT_OFFSET),
        })
    }
}

impl Default for Superblock {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuperblockError {
    NotASuperblock,
    InvalidMagic,
    UnsupportedVersion(u32),
    /// The store was written with a different page size.
    PageSizeMismatch(u32),
}

impl std::fmt::Display for SuperblockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotASuperblock => write!(f, "page 0 is not a superblock"),
            Self::InvalidMagic => write!(f, "not a docstore file"),
            Self::UnsupportedVersion(version) => {
                write!(f, "format version {version} is not supported (expected {FORMAT_VERSION})")
            }
            Self::PageSizeMismatch(size) => {
                write!(f, "store uses {size}-byte pages, this build uses {PAGE_SIZE}")
            }
        }
    }
}

impl std::error::Error for SuperblockError {}
