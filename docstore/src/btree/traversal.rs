//! Depth-first traversals: erase-range, split sampling, backfill and a raw
//! node visitor used for reachability and integrity checks.

use std::collections::HashSet;

use crate::btree::cursor::CursorEntry;
use crate::btree::node::{InternalNode, LeafEntry, LeafNode, Node};
use crate::btree::tree::{BTree, BTreeError, MAX_TREE_DEPTH};
use crate::signal::Interruptor;
use crate::storage::{PageId, Storage};
use crate::types::{KeyRange, Recency, RightBound, StoreKey};

/// Decides which keys inside an erase interval are actually erased.
pub trait KeyTester {
    fn key_should_be_erased(&self, key: &StoreKey) -> bool;
}

/// Receives the raw events of a backfill traversal.
///
/// `E` is the caller's error type; the tree converts its own failures into it.
pub trait BackfillVisitor<S: Storage, E> {
    /// Everything in `range` may have been deleted since the backfill point.
    fn on_delete_range(&mut self, range: &KeyRange) -> Result<(), E>;

    /// `key` was deleted at `recency`.
    fn on_deletion(&mut self, key: &StoreKey, recency: Recency) -> Result<(), E>;

    /// `entry` is live. `storage` is available for resolving the value.
    fn on_pair(&mut self, storage: &S, entry: CursorEntry) -> Result<(), E>;
}

/// `(left_exclusive, right_inclusive]`, with absent sides unbounded.
struct EraseBounds<'a> {
    left_exclusive: Option<&'a StoreKey>,
    right_inclusive: Option<&'a StoreKey>,
}

impl EraseBounds<'_> {
    fn contains(&self, key: &StoreKey) -> bool {
        self.left_exclusive.is_none_or(|left| key > left)
            && self.right_inclusive.is_none_or(|right| key <= right)
    }

    /// Conservative: may report overlap for a node holding no erasable key.
    fn overlaps(&self, range: &KeyRange) -> bool {
        let below = match (&range.right, self.left_exclusive) {
            (RightBound::Exclusive(high), Some(left)) => high <= left,
            _ => false,
        };
        let above = self
            .right_inclusive
            .is_some_and(|right| range.left > *right);
        !below && !above
    }
}

/// The key range covered by child `index` of a node covering `range`.
fn child_range(node: &InternalNode, index: usize, range: &KeyRange) -> KeyRange {
    let left = if index == 0 {
        range.left.clone()
    } else {
        node.keys[index - 1].clone()
    };
    let right = match node.keys.get(index) {
        Some(key) => RightBound::Exclusive(key.clone()),
        None => range.right.clone(),
    };
    KeyRange { left, right }
}

fn overlaps(a: &KeyRange, b: &KeyRange) -> bool {
    !a.intersection(b).is_empty()
}

impl<S: Storage> BTree<S> {
    /// Remove every entry with a key in `(left_exclusive, right_inclusive]`
    /// that `tester` accepts.
    ///
    /// Each removed live value is passed to `deleter` after the leaf holding
    /// it has been rewritten. Emptied nodes are freed and a root left with a
    /// single child is collapsed. Returns the number of live entries removed.
    pub fn erase_range<E, F>(
        &mut self,
        left_exclusive: Option<&StoreKey>,
        right_inclusive: Option<&StoreKey>,
        tester: &dyn KeyTester,
        deleter: &mut F,
    ) -> Result<u64, E>
    where
        E: From<BTreeError>,
        F: FnMut(&mut S, &[u8]) -> Result<(), E>,
    {
        let bounds = EraseBounds {
            left_exclusive,
            right_inclusive,
        };
        let mut erased = 0;
        let root = self.root_page();
        let emptied = self.erase_in_node(
            root,
            &KeyRange::universe(),
            &bounds,
            tester,
            deleter,
            &mut erased,
            0,
        )?;
        self.normalize_root(emptied)?;
        Ok(erased)
    }

    #[allow(clippy::too_many_arguments)]
    fn erase_in_node<E, F>(
        &mut self,
        page_id: PageId,
        node_range: &KeyRange,
        bounds: &EraseBounds<'_>,
        tester: &dyn KeyTester,
        deleter: &mut F,
        erased: &mut u64,
        depth: usize,
    ) -> Result<bool, E>
    where
        E: From<BTreeError>,
        F: FnMut(&mut S, &[u8]) -> Result<(), E>,
    {
        if depth >= MAX_TREE_DEPTH {
            return Err(BTreeError::Corruption("erase descended too deep".to_string()).into());
        }

        match self.read_node(page_id)? {
            Node::Leaf(mut leaf) => {
                let (gone, kept): (Vec<LeafEntry>, Vec<LeafEntry>) =
                    std::mem::take(&mut leaf.entries)
                        .into_iter()
                        .partition(|e| bounds.contains(&e.key) && tester.key_should_be_erased(&e.key));
                leaf.entries = kept;

                if gone.is_empty() {
                    return Ok(leaf.entries.is_empty());
                }
                self.write_leaf(page_id, &leaf)?;

                for value in gone.into_iter().filter_map(|e| e.value) {
                    deleter(self.storage_mut(), &value)?;
                    *erased += 1;
                }
                Ok(leaf.entries.is_empty())
            }
            Node::Internal(mut node) => {
                let mut emptied = Vec::new();
                for index in 0..node.children.len() {
                    let range = child_range(&node, index, node_range);
                    if !bounds.overlaps(&range) {
                        continue;
                    }
                    let child = node.children[index];
                    if self.erase_in_node(
                        child, &range, bounds, tester, deleter, erased, depth + 1,
                    )? {
                        emptied.push(index);
                    }
                }

                if emptied.is_empty() {
                    return Ok(false);
                }
                for &index in emptied.iter().rev() {
                    self.storage_mut().free_page(node.children[index]).map_err(BTreeError::from)?;
                    node.remove_child(index);
                }
                if node.children.is_empty() {
                    return Ok(true);
                }
                self.write_internal(page_id, &node)?;
                Ok(false)
            }
        }
    }


    fn normalize_root(&mut self, emptied: bool) -> Result<(), BTreeError> {
        let root = self.root_page();
        if emptied && matches!(self.read_node(root)?, Node::Internal(_)) {
            let leaf_page = self.storage_mut().allocate_page()?;
            self.write_leaf(leaf_page, &LeafNode::new())?;
            self.set_root(leaf_page);
            self.storage_mut().free_page(root)?;
            tracing::debug!("Erase emptied the tree, new root leaf {leaf_page}");
            return Ok(());
        }

        loop {
            let root = self.root_page();
            match self.read_node(root)? {
                Node::Internal(node) if node.children.len() == 1 => {
                    self.set_root(node.children[0]);
                    self.storage_mut().free_page(root)?;
                    tracing::debug!("Collapsed root {root} into {}", node.children[0]);
                }
                _ => return Ok(()),
            }
        }
    }

    /// Separator keys of internal nodes shallower than `max_depth` that lie
    /// strictly inside `range`, in key order. The root is at depth 0.
    pub fn sample_splits(
        &self,
        range: &KeyRange,
        max_depth: usize,
    ) -> Result<Vec<StoreKey>, BTreeError> {
        let mut splits = Vec::new();
        self.sample_in_node(
            self.root_page(),
            &KeyRange::universe(),
            range,
            0,
            max_depth.min(MAX_TREE_DEPTH),
            &mut splits,
        )?;
        Ok(splits)
    }

    fn sample_in_node(
        &self,
        page_id: PageId,
        node_range: &KeyRange,
        range: &KeyRange,
        depth: usize,
        max_depth: usize,
        splits: &mut Vec<StoreKey>,
    ) -> Result<(), BTreeError> {
        if depth >= max_depth {
            return Ok(());
        }
        let Node::Internal(node) = self.read_node(page_id)? else {
            return Ok(());
        };

        for (index, &child) in node.children.iter().enumerate() {
            let child_range = child_range(&node, index, node_range);
            if overlaps(&child_range, range) {
                self.sample_in_node(child, &child_range, range, depth + 1, max_depth, splits)?;
            }
            if let Some(key) = node.keys.get(index) {
                if *key > range.left && range.contains_key(key) {
                    splits.push(key.clone());
                }
            }
        }
        Ok(())
    }

    /// Number of live entries in `range`.
    pub fn count_live(&self, range: &KeyRange) -> Result<u64, BTreeError> {
        let mut count = 0;
        for entry in self.cursor(range)? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    /// Report everything in `range` that changed at or after `since_when`.
    ///
    /// Leaves whose tombstones do not reach back to `since_when` are reported
    /// as a deletion range followed by all of their live entries.
    pub fn backfill<E>(
        &self,
        range: &KeyRange,
        since_when: Recency,
        visitor: &mut dyn BackfillVisitor<S, E>,
        interruptor: &Interruptor,
    ) -> Result<(), E>
    where
        E: From<BTreeError>,
    {
        self.backfill_node(
            self.root_page(),
            &KeyRange::universe(),
            range,
            since_when,
            visitor,
            interruptor,
            0,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn backfill_node<E>(
        &self,
        page_id: PageId,
        node_range: &KeyRange,
        range: &KeyRange,
        since_when: Recency,
        visitor: &mut dyn BackfillVisitor<S, E>,
        interruptor: &Interruptor,
        depth: usize,
    ) -> Result<(), E>
    where
        E: From<BTreeError>,
    {
        if depth >= MAX_TREE_DEPTH {
            return Err(BTreeError::Corruption("backfill descended too deep".to_string()).into());
        }
        interruptor.check().map_err(BTreeError::from)?;

        match self.read_node(page_id)? {
            Node::Internal(node) => {
                for (index, &child) in node.children.iter().enumerate() {
                    let child_range = child_range(&node, index, node_range);
                    if overlaps(&child_range, range) {
                        self.backfill_node(
                            child,
                            &child_range,
                            range,
                            since_when,
                            visitor,
                            interruptor,
                            depth + 1,
                        )?;
                    }
                }
                Ok(())
            }
            Node::Leaf(leaf) => {
                let leaf_range = node_range.intersection(range);
                if leaf_range.is_empty() {
                    return Ok(());
                }

                let complete = since_when >= leaf.header.deletion_horizon;
                if !complete {
                    visitor.on_delete_range(&leaf_range)?;
                }

                for entry in leaf.entries {
                    if !leaf_range.contains_key(&entry.key) {
                        continue;
                    }
                    if complete && entry.recency < since_when {
                        continue;
                    }
                    interruptor.check().map_err(BTreeError::from)?;
                    match entry.value {
                        Some(value) => visitor.on_pair(
                            self.storage(),
                            CursorEntry {
                                key: entry.key,
                                recency: entry.recency,
                                value,
                            },
                        )?,
                        None if complete => visitor.on_deletion(&entry.key, entry.recency)?,
                        None => {}
                    }
                }
                Ok(())
            }
        }
    }

    /// Visit every node reachable from the root exactly once.
    pub fn visit_nodes<E>(
        &self,
        visit: &mut dyn FnMut(PageId, &Node) -> Result<(), E>,
    ) -> Result<(), E>
    where
        E: From<BTreeError>,
    {
        let mut seen = HashSet::new();
        let mut stack = vec![self.root_page()];

        while let Some(page_id) = stack.pop() {
            if !seen.insert(page_id) {
                return Err(BTreeError::Corruption(format!(
                    "page {page_id} is reachable twice"
                ))
                .into());
            }
            let node = self.read_node(page_id)?;
            visit(page_id, &node)?;
            if let Node::Internal(internal) = &node {
                stack.extend(internal.children.iter().rev());
            }
        }
        Ok(())
    }
}
