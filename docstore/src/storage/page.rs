//! Fixed-size pages and their header.
//!
//! Header layout (8 bytes):
//!
//! ```text
//! [0]     page type
//! [1..4]  zero
//! [4..8]  CRC32 of the page with this field zeroed, little-endian
//! ```
//!
//! Stores seal a page right before writing it and verify it right after
//! reading it, so a torn or flipped page never reaches a decoder.

pub const PAGE_SIZE: usize = 8192;

pub const PAGE_SIZE_U64: u64 = PAGE_SIZE as u64;

/// Page number within a store. Page 0 is the superblock, which lets 0 mean
/// "no page" in on-disk links.
pub type PageId = u64;

const TYPE_OFFSET: usize = 0;
const CHECKSUM_OFFSET: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    Superblock = 1,
    BTreeInternal = 2,
    BTreeLeaf = 3,
    /// One link of a value's overflow chain.
    Overflow = 4,
    /// Released and scrubbed.
    Free = 5,
}

impl TryFrom<u8> for PageType {
    type Error = PageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::Superblock,
            2 => Self::BTreeInternal,
            3 => Self::BTreeLeaf,
            4 => Self::Overflow,
            5 => Self::Free,
            other => return Err(PageError::InvalidPageType(other)),
        })
    }
}

/// The decoded header of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub page_type: PageType,
    pub checksum: u32,
}

impl PageHeader {
    /// Bytes reserved at the start of every page. Page contents start here.
    pub const SIZE: usize = 8;
}

/// One page worth of bytes.
#[derive(Clone)]
pub struct Page {
    data: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    /// A zeroed page stamped with `page_type`. The checksum is left for
    /// [`Page::seal`].
    #[must_use]
    pub fn with_type(page_type: PageType) -> Self {
        let mut page = Self {
            data: Box::new([0u8; PAGE_SIZE]),
        };
        page.data[TYPE_OFFSET] = page_type as u8;
        page
    }

    /// Wrap bytes read back from a store.
    #[must_use]
    pub const fn from_boxed(data: Box<[u8; PAGE_SIZE]>) -> Self {
        Self { data }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn header(&self) -> Result<PageHeader, PageError> {
        Ok(PageHeader {
            page_type: PageType::try_from(self.data[TYPE_OFFSET])?,
            checksum: self.read_u32(CHECKSUM_OFFSET),
        })
    }

    #[must_use]
    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    #[must_use]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    #[must_use]
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes(self.array(offset))
    }

    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.array(offset))
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    #[must_use]
    pub fn read_u64(&self, offset: usize) -> u64 {
        u64::from_le_bytes(self.array(offset))
    }

    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    fn array<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut raw = [0u8; N];
        raw.copy_from_slice(&self.data[offset..offset + N]);
        raw
    }

    fn checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.data[..CHECKSUM_OFFSET]);
        hasher.update(&[0u8; 4]);
        hasher.update(&self.data[CHECKSUM_OFFSET + 4..]);
        hasher.finalize()
    }

    /// Stamp the checksum of the current contents.
    pub fn seal(&mut self) {
        let checksum = self.checksum();
        self.write_u32(CHECKSUM_OFFSET, checksum);
    }

    pub fn verify(&self) -> Result<(), PageError> {
        let stored = self.read_u32(CHECKSUM_OFFSET);
        let computed = self.checksum();
        if stored == computed {
            Ok(())
        } else {
            Err(PageError::ChecksumMismatch { stored, computed })
        }
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("type", &self.data[TYPE_OFFSET])
            .field("checksum", &self.read_u32(CHECKSUM_OFFSET))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    InvalidPageType(u8),
    ChecksumMismatch { stored: u32, computed: u32 },
}

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPageType(byte) => write!(f, "unknown page type {byte:#04x}"),
            Self::ChecksumMismatch { stored, computed } => write!(
                f,
                "page checksum {stored:#010x} does not match contents ({computed:#010x})"
            ),
        }
    }
}

impl std::error::Error for PageError {}
