//! B-tree implementation for the document index.
//!
//! The tree maps store keys to opaque slot values. It owns its page store
//! and never interprets values beyond asking a [`ValueSizer`] whether they
//! fit in a leaf slot; overflow chains referenced by values are managed by
//! the layer above.
//!
//! Nodes keep no parent pointers. Writes descend from the root and remember
//! the path, so a split can walk back up without rewriting children.

use crate::btree::node::{
    InternalNode, LeafEntry, LeafNode, MAX_SLOT_VALUE_SIZE, Node, NodeError,
};
use crate::signal::Interrupted;
use crate::storage::{Page, PageId, Storage, StorageError};
use crate::types::{Recency, StoreKey};

/// Deepest tree a descent will follow before declaring a cycle.
pub(crate) const MAX_TREE_DEPTH: usize = 64;

/// Sizing contract for slot values, supplied by the value codec.
pub trait ValueSizer: Send + Sync {
    /// Whether `value` is well formed and no longer than `length_available`.
    fn fits(&self, value: &[u8], length_available: usize) -> bool;

    /// Largest slot value this sizer ever accepts.
    fn max_possible_size(&self) -> usize;
}

/// One internal node on the way down to a leaf.
pub(crate) struct PathStep {
    pub page_id: PageId,
    pub node: InternalNode,
    pub child_index: usize,
}

/// A B-tree over a page store.
pub struct BTree<S: Storage> {
    storage: S,
    root_page: PageId,
    sizer: Box<dyn ValueSizer>,
}

impl<S: Storage> BTree<S> {
    /// Create an empty tree with a leaf root and record it in the superblock.
    pub fn create(mut storage: S, sizer: Box<dyn ValueSizer>) -> Result<Self, BTreeError> {
        check_sizer(sizer.as_ref())?;

        let root_page = storage.allocate_page()?;
        storage.write_page(root_page, LeafNode::new().to_page())?;
        storage.superblock_mut().index_root = root_page;

        Ok(Self {
            storage,
            root_page,
            sizer,
        })
    }

    /// Open the tree whose root is recorded in the superblock.
    pub fn open(storage: S, sizer: Box<dyn ValueSizer>) -> Result<Self, BTreeError> {
        check_sizer(sizer.as_ref())?;

        let root_page = storage.superblock().index_root;
        if root_page == 0 {
            return Err(BTreeError::NotInitialized);
        }

        let tree = Self {
            storage,
            root_page,
            sizer,
        };
        // Fail early on a root that does not decode.
        tree.read_node(root_page)?;
        Ok(tree)
    }

    #[must_use]
    pub const fn root_page(&self) -> PageId {
        self.root_page
    }

    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    #[allow(clippy::missing_const_for_fn)] // mutable references can't be const
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Give back the page store.
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Look up the live value for a key, with the recency it was written at.
    pub fn get(&self, key: &StoreKey) -> Result<Option<(Vec<u8>, Recency)>, BTreeError> {
        let (_, mut leaf) = self.find_leaf(key)?;
        let Ok(index) = leaf.find_index(key) else {
            return Ok(None);
        };
        let entry = leaf.entries.swap_remove(index);
        Ok(entry.value.map(|value| (value, entry.recency)))
    }

    /// Write or delete the value under a key, stamped with `recency`.
    ///
    /// Deleting an absent key is a no-op. Deletions leave a tombstone so that
    /// backfills can report them. Returns the previous live value.
    pub fn apply_change(
        &mut self,
        key: &StoreKey,
        value: Option<Vec<u8>>,
        recency: Recency,
    ) -> Result<Option<Vec<u8>>, BTreeError> {
        if let Some(value) = &value {
            if !self.sizer.fits(value, MAX_SLOT_VALUE_SIZE) {
                return Err(BTreeError::InvalidValue(NodeError::ValueTooLarge(
                    value.len(),
                )));
            }
        }

        let (path, leaf_page_id, mut leaf) = self.descend(key)?;

        let previous = match value {
            Some(value) => leaf.upsert(LeafEntry {
                key: key.clone(),
                recency,
                value: Some(value),
            }),
            None => {
                let Ok(index) = leaf.find_index(key) else {
                    return Ok(None);
                };
                if leaf.entries[index].is_tombstone() {
                    return Ok(None);
                }
                if recency >= leaf.header.deletion_horizon {
                    let tombstone = LeafEntry {
                        key: key.clone(),
                        recency,
                        value: None,
                    };
                    std::mem::replace(&mut leaf.entries[index], tombstone).value
                } else {
                    leaf.entries.remove(index).value
                }
            }
        };

        if leaf.is_overfull() {
            let pruned = leaf.prune_tombstones();
            if pruned > 0 {
                tracing::trace!(
                    "Pruned {pruned} tombstones from leaf {leaf_page_id}, horizon now {}",
                    leaf.header.deletion_horizon
                );
            }
        }

        if leaf.is_overfull() {
            self.split_leaf(path, leaf_page_id, leaf)?;
        } else {
            self.write_leaf(leaf_page_id, &leaf)?;
        }

        Ok(previous)
    }

    /// Find the leaf page that should contain the given key.
    pub(crate) fn find_leaf(&self, key: &StoreKey) -> Result<(PageId, LeafNode), BTreeError> {
        let mut current_page_id = self.root_page;

        for _ in 0..MAX_TREE_DEPTH {
            match self.read_node(current_page_id)? {
                Node::Leaf(leaf) => return Ok((current_page_id, leaf)),
                Node::Internal(node) => {
                    current_page_id = node.children[node.find_child_index(key)];
                }
            }
        }

        Err(too_deep())
    }

    /// Like `find_leaf`, also returning the separator that bounds the leaf
    /// from above. `None` means the leaf is the last one.
    pub(crate) fn find_leaf_bounded(
        &self,
        key: &StoreKey,
    ) -> Result<(LeafNode, Option<StoreKey>), BTreeError> {
        let mut current_page_id = self.root_page;
        let mut upper = None;

        for _ in 0..MAX_TREE_DEPTH {
            match self.read_node(current_page_id)? {
                Node::Leaf(leaf) => return Ok((leaf, upper)),
                Node::Internal(mut node) => {
                    let index = node.find_child_index(key);
                    current_page_id = node.children[index];
                    if index < node.keys.len() {
                        upper = Some(node.keys.swap_remove(index));
                    }
                }
            }
        }

        Err(too_deep())
    }

    /// Like `find_leaf`, but keeps the internal nodes passed on the way.
    fn descend(&self, key: &StoreKey) -> Result<(Vec<PathStep>, PageId, LeafNode), BTreeError> {
        let mut path = Vec::new();
        let mut current_page_id = self.root_page;

        while path.len() < MAX_TREE_DEPTH {
            match self.read_node(current_page_id)? {
                Node::Leaf(leaf) => return Ok((path, current_page_id, leaf)),
                Node::Internal(node) => {
                    let child_index = node.find_child_index(key);
                    let child = node.children[child_index];
                    path.push(PathStep {
                        page_id: current_page_id,
                        node,
                        child_index,
                    });
                    current_page_id = child;
                }
            }
        }

        Err(too_deep())
    }

    /// Split an overfull leaf, leaving every reachable page untouched until
    /// a single final write.
    ///
    /// Both halves, and both halves of every internal node that overflows on
    /// the way up, go to fresh pages. The one in-place write is the first
    /// ancestor that absorbs the new separator, or the switch to a new root.
    /// The pages replaced by fresh copies are freed afterwards. On failure
    /// the fresh pages are freed and the tree reads as before.
    fn split_leaf(
        &mut self,
        path: Vec<PathStep>,
        leaf_page_id: PageId,
        leaf: LeafNode,
    ) -> Result<(), BTreeError> {
        let mut fresh = Vec::new();
        match self.write_split(path, leaf_page_id, leaf, &mut fresh) {
            Ok(replaced) => {
                for page_id in replaced {
                    if let Err(e) = self.storage.free_page(page_id) {
                        tracing::warn!("Failed to free page {page_id} replaced by a split: {e}");
                    }
                }
                Ok(())
            }
            Err(e) => {
                for page_id in fresh {
                    if let Err(free_err) = self.storage.free_page(page_id) {
                        tracing::warn!("Failed to free page {page_id} of an abandoned split: {free_err}");
                    }
                }
                Err(e)
            }
        }
    }

    /// Returns the pages that are no longer part of the tree.
    fn write_split(
        &mut self,
        mut path: Vec<PathStep>,
        leaf_page_id: PageId,
        mut leaf: LeafNode,
        fresh: &mut Vec<PageId>,
    ) -> Result<Vec<PageId>, BTreeError> {
        let (mut separator, right) = leaf.split();
        let mut left_page = self.write_fresh(leaf.to_page(), fresh)?;
        let mut right_page = self.write_fresh(right.to_page(), fresh)?;
        tracing::debug!(
            "Split leaf {leaf_page_id} at {separator} into {left_page} and {right_page}"
        );

        let mut replaced = vec![leaf_page_id];
        while let Some(PathStep {
            page_id,
            mut node,
            child_index,
        }) = path.pop()
        {
            debug_assert_eq!(Some(&node.children[child_index]), replaced.last());
            node.children[child_index] = left_page;
            node.insert_after(child_index, separator, right_page);

            if !node.is_overfull() {
                self.write_internal(page_id, &node)?;
                return Ok(replaced);
            }

            let (median, right) = node.split();
            left_page = self.write_fresh(node.to_page(), fresh)?;
            right_page = self.write_fresh(right.to_page(), fresh)?;
            replaced.push(page_id);
            separator = median;
        }

        let root = InternalNode::with_children(left_page, separator, right_page);
        let root_page = self.write_fresh(root.to_page(), fresh)?;
        self.set_root(root_page);
        tracing::debug!("Tree grew a level, new root {root_page}");
        Ok(replaced)
    }

    fn write_fresh(&mut self, page: Page, fresh: &mut Vec<PageId>) -> Result<PageId, BTreeError> {
        let page_id = self.storage.allocate_page()?;
        fresh.push(page_id);
        self.storage.write_page(page_id, page)?;
        Ok(page_id)
    }

    pub(crate) fn set_root(&mut self, page_id: PageId) {
        self.root_page = page_id;
        self.storage.superblock_mut().index_root = page_id;
    }

    pub(crate) fn read_node(&self, page_id: PageId) -> Result<Node, BTreeError> {
        let page = self.storage.read_page(page_id)?;
        Node::from_page(&page).map_err(|source| BTreeError::Node { page_id, source })
    }

    pub(crate) fn write_leaf(&mut self, page_id: PageId, leaf: &LeafNode) -> Result<(), BTreeError> {
        self.storage.write_page(page_id, leaf.to_page())?;
        Ok(())
    }

    pub(crate) fn write_internal(
        &mut self,
        page_id: PageId,
        node: &InternalNode,
    ) -> Result<(), BTreeError> {
        self.storage.write_page(page_id, node.to_page())?;
        Ok(())
    }
}

fn check_sizer(sizer: &dyn ValueSizer) -> Result<(), BTreeError> {
    let max = sizer.max_possible_size();
    if max > MAX_SLOT_VALUE_SIZE {
        return Err(BTreeError::InvalidValue(NodeError::ValueTooLarge(max)));
    }
    Ok(())
}

fn too_deep() -> BTreeError {
    BTreeError::Corruption(format!(
        "descent exceeded {MAX_TREE_DEPTH} levels, the tree has a cycle"
    ))
}

/// Errors that can occur during B-tree operations.
#[derive(Debug)]
pub enum BTreeError {
    /// Page store error.
    Storage(StorageError),
    /// A node page failed to decode.
    Node { page_id: PageId, source: NodeError },
    /// A value was rejected before it was written.
    InvalidValue(NodeError),
    /// The superblock records no tree root.
    NotInitialized,
    /// A traversal was interrupted.
    Interrupted,
    /// The tree's structure is inconsistent.
    Corruption(String),
}

impl BTreeError {
    /// Whether this error means stored bytes cannot be trusted.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_corruption(),
            Self::Node { .. } | Self::Corruption(_) => true,
            Self::InvalidValue(_) | Self::NotInitialized | Self::Interrupted => false,
        }
    }
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Node { page_id, source } => write!(f, "node error in page {page_id}: {source}"),
            Self::InvalidValue(e) => write!(f, "invalid value: {e}"),
            Self::NotInitialized => write!(f, "no index root recorded"),
            Self::Interrupted => write!(f, "traversal interrupted"),
            Self::Corruption(msg) => write!(f, "index corruption: {msg}"),
        }
    }
}

impl std::error::Error for BTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Node { source, .. } => Some(source),
            Self::InvalidValue(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for BTreeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<Interrupted> for BTreeError {
    fn from(_: Interrupted) -> Self {
        Self::Interrupted
    }
}
