//! Document storage over one index: the entry point for every operation.
//!
//! A [`Slice`] owns a B-tree and its page store. Point operations go through
//! a [`ReadLocation`] or [`WriteLocation`]; range operations walk the tree
//! directly. Values are encoded by the codec in [`value`].
//!
//! # Errors
//!
//! Operations return [`StoreError`] only for failures of the store itself.
//! Evaluation errors raised by user expressions are part of the successful
//! response of the operation that hit them.

mod backfill;
mod distribution;
mod erase;
mod location;
mod point;
mod scan;
pub mod value;

use std::path::Path;

use crate::btree::{BTree, BTreeError, Node};
use crate::config::StoreConfig;
use crate::storage::{
    DatabaseFile, OverflowError, PageId, RESERVED_PAGES, Storage, StorageError,
};
use crate::types::{KeyError, KeyRange, MAX_NESTING_DEPTH};

pub use backfill::{BackfillAtom, BackfillCallback};
pub use distribution::DistributionResponse;
pub use erase::{AcceptAll, RangeTester, RejectAll};
pub use location::{ReadLocation, WriteLocation};
pub use point::{
    ModifyRequest, ModifyResult, PointDeleteResult, PointModifyResponse, PointReadResponse,
    PointWriteResult,
};
pub use scan::{
    FixedSizeEstimator, ScanRequest, ScanResponse, ScanResult, SizeEstimator,
};
pub use value::{DocumentValueSizer, ValueRef};

/// One document index and the pages behind it.
pub struct Slice<S: Storage> {
    tree: BTree<S>,
    scan_chunk_size: u64,
    estimator: Box<dyn SizeEstimator>,
}

impl<S: Storage> Slice<S> {
    /// Create an empty slice on fresh storage.
    pub fn create(storage: S) -> Result<Self, StoreError> {
        let tree = BTree::create(storage, Box::new(DocumentValueSizer))?;
        tracing::debug!("Created slice with root page {}", tree.root_page());
        Ok(Self::from_tree(tree))
    }

    /// Open the slice recorded in the storage's superblock.
    ///
    /// Allocation state is rebuilt from reachability: every node and every
    /// overflow page referenced by a live value is marked used, everything
    /// else is free.
    pub fn open(storage: S) -> Result<Self, StoreError> {
        let tree = BTree::open(storage, Box::new(DocumentValueSizer))?;
        let mut slice = Self::from_tree(tree);

        let pages = slice.reachable_pages()?;
        let storage = slice.tree.storage_mut();
        storage.reset_allocation();
        for &page_id in &pages {
            storage.mark_allocated(page_id);
        }
        tracing::info!(
            "Opened slice at root page {} with {} reachable pages",
            slice.tree.root_page(),
            pages.len()
        );
        Ok(slice)
    }

    fn from_tree(tree: BTree<S>) -> Self {
        Self {
            tree,
            scan_chunk_size: StoreConfig::DEFAULT_SCAN_CHUNK_SIZE,
            estimator: Box::new(FixedSizeEstimator::default()),
        }
    }

    /// Cap on the estimated size of one stream-mode scan response.
    #[must_use]
    pub fn with_scan_chunk_size(mut self, bytes: u64) -> Self {
        self.scan_chunk_size = bytes.max(1);
        self
    }

    /// Replace the per-document size estimate used for chunking.
    #[must_use]
    pub fn with_size_estimator(mut self, estimator: Box<dyn SizeEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    #[must_use]
    pub const fn scan_chunk_size(&self) -> u64 {
        self.scan_chunk_size
    }

    #[must_use]
    pub const fn storage(&self) -> &S {
        self.tree.storage()
    }

    #[allow(clippy::missing_const_for_fn)] // mutable references can't be const
    pub fn storage_mut(&mut self) -> &mut S {
        self.tree.storage_mut()
    }

    /// Give back the page store.
    pub fn into_storage(self) -> S {
        self.tree.into_storage()
    }

    /// Flush the superblock and page writes.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.tree.storage_mut().sync()?;
        Ok(())
    }

    /// Number of live documents in `range`.
    pub fn count(&self, range: &KeyRange) -> Result<u64, StoreError> {
        Ok(self.tree.count_live(range)?)
    }

    /// Walk every reachable page, decode every value and account for every
    /// allocated page.
    pub fn check_integrity(&self) -> Result<IntegrityReport, StoreError> {
        let storage = self.tree.storage();
        let mut report = IntegrityReport::default();

        self.tree.visit_nodes::<StoreError>(&mut |_, node| {
            match node {
                Node::Internal(_) => report.internal_nodes += 1,
                Node::Leaf(leaf) => {
                    report.leaves += 1;
                    for entry in &leaf.entries {
                        let Some(slot) = &entry.value else {
                            report.tombstones += 1;
                            continue;
                        };
                        let value = ValueRef::from_slot_bytes(slot)?;
                        value::decode(storage, &value)?;
                        report.overflow_pages += value::overflow_pages(storage, &value)?.len() as u64;
                        report.live_entries += 1;
                    }
                }
            }
            Ok(())
        })?;

        let reachable = report.internal_nodes + report.leaves + report.overflow_pages;
        report.leaked_pages = storage
            .pages_in_use()
            .saturating_sub(RESERVED_PAGES + reachable);
        if report.leaked_pages > 0 {
            tracing::warn!("Integrity check found {} leaked pages", report.leaked_pages);
        }
        Ok(report)
    }

    fn reachable_pages(&self) -> Result<Vec<PageId>, StoreError> {
        let storage = self.tree.storage();
        let mut pages = Vec::new();
        self.tree.visit_nodes::<StoreError>(&mut |page_id, node| {
            pages.push(page_id);
            if let Node::Leaf(leaf) = node {
                for slot in leaf.entries.iter().filter_map(|e| e.value.as_ref()) {
                    let value = ValueRef::from_slot_bytes(slot)?;
                    pages.extend(value::overflow_pages(storage, &value)?);
                }
            }
            Ok(())
        })?;
        Ok(pages)
    }
}

impl Slice<DatabaseFile> {
    /// Create a file-backed slice at the configured path.
    pub fn create_file(config: &StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::from)?;
        }
        let file = DatabaseFile::create(
            &config.database_path,
            u64::from(config.file_growth_pages),
        )?;
        let mut slice = Self::create(file)?.with_scan_chunk_size(config.scan_chunk_size);
        slice.sync()?;
        Ok(slice)
    }

    /// Open the file-backed slice at the configured path.
    pub fn open_file(config: &StoreConfig) -> Result<Self, StoreError> {
        let file = DatabaseFile::open(
            &config.database_path,
            u64::from(config.file_growth_pages),
        )?;
        Ok(Self::open(file)?.with_scan_chunk_size(config.scan_chunk_size))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.tree.storage().path()
    }
}

/// Page and entry counts gathered by [`Slice::check_integrity`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub internal_nodes: u64,
    pub leaves: u64,
    pub overflow_pages: u64,
    pub live_entries: u64,
    pub tombstones: u64,
    /// Allocated pages that nothing reachable refers to.
    pub leaked_pages: u64,
}

/// Errors returned by slice operations.
#[derive(Debug)]
pub enum StoreError {
    /// Stored bytes failed an integrity check. Fatal for the operation.
    StorageCorruption(String),
    /// The page store failed.
    Storage(StorageError),
    /// The index failed for a reason other than corruption.
    Index(BTreeError),
    /// An overflow chain could not be written.
    Overflow(OverflowError),
    /// A key could not be built.
    InvalidKey(KeyError),
    /// A document to be written nests deeper than `MAX_NESTING_DEPTH`.
    DocumentTooDeep,
    /// The operation was cancelled through its interruptor.
    Interrupted,
}

impl StoreError {
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::StorageCorruption(_))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StorageCorruption(msg) => write!(f, "storage corruption: {msg}"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Index(e) => write!(f, "index error: {e}"),
            Self::Overflow(e) => write!(f, "overflow error: {e}"),
            Self::InvalidKey(e) => write!(f, "invalid key: {e}"),
            Self::DocumentTooDeep => {
                write!(f, "document nesting exceeds {MAX_NESTING_DEPTH} levels")
            }
            Self::Interrupted => write!(f, "operation interrupted"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Index(e) => Some(e),
            Self::Overflow(e) => Some(e),
            Self::InvalidKey(e) => Some(e),
            Self::StorageCorruption(_) | Self::DocumentTooDeep | Self::Interrupted => None,
        }
    }
}

impl From<StorageError> for StoreError {
    fn from(e: StorageError) -> Self {
        if e.is_corruption() {
            tracing::error!("Storage corruption: {e}");
            return Self::StorageCorruption(e.to_string());
        }
        Self::Storage(e)
    }
}

impl From<BTreeError> for StoreError {
    fn from(e: BTreeError) -> Self {
        match e {
            BTreeError::Interrupted => Self::Interrupted,
            BTreeError::Storage(e) => e.into(),
            e if e.is_corruption() => {
                tracing::error!("Index corruption: {e}");
                Self::StorageCorruption(e.to_string())
            }
            e => Self::Index(e),
        }
    }
}

impl From<OverflowError> for StoreError {
    fn from(e: OverflowError) -> Self {
        match e {
            OverflowError::Storage(e) => e.into(),
            e if e.is_corruption() => {
                tracing::error!("Overflow corruption: {e}");
                Self::StorageCorruption(e.to_string())
            }
            e => Self::Overflow(e),
        }
    }
}

impl From<KeyError> for StoreError {
    fn from(e: KeyError) -> Self {
        Self::InvalidKey(e)
    }
}

impl From<crate::signal::Interrupted> for StoreError {
    fn from(_: crate::signal::Interrupted) -> Self {
        Self::Interrupted
    }
}
