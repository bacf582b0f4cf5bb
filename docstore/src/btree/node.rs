//! On-page layout of index nodes.
//!
//! Internal nodes hold separator keys and child pointers. Leaves hold
//! `(key, recency, slot or tombstone)` entries. Leaves carry no sibling
//! links; range walks find the next leaf through its parent separators. Both are sized in bytes, not entries, since keys and slots vary in length.

#![allow(clippy::cast_possible_truncation)]

use crate::storage::{PAGE_SIZE, Page, PageHeader, PageId, PageType};
use crate::types::{MAX_KEY_SIZE, Recency, StoreKey};

/// `[kind u8][count u16][deletion horizon u64]`, the horizon zero on
/// internal nodes.
const NODE_HEADER_SIZE: usize = 11;

const DATA_OFFSET: usize = PageHeader::SIZE + NODE_HEADER_SIZE;

/// Available space for node data.
pub const DATA_SPACE: usize = PAGE_SIZE - DATA_OFFSET;

/// Largest value a leaf slot accepts.
pub const MAX_SLOT_VALUE_SIZE: usize = 1024;

/// Leaf entry overhead: key length (1) + recency (8) + flags (1) + value length (2).
const LEAF_ENTRY_OVERHEAD: usize = 12;

/// Internal entry overhead: key length (1) + child pointer (8).
const INTERNAL_ENTRY_OVERHEAD: usize = 9;

/// Leaf entry flag marking a deletion tombstone.
const FLAG_TOMBSTONE: u8 = 0x01;

/// Node type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeType {
    Internal = 0,
    Leaf = 1,
}

impl TryFrom<u8> for NodeType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Internal),
            1 => Ok(Self::Leaf),
            _ => Err(value),
        }
    }
}

/// Header information for a B-tree node.
#[derive(Debug, Clone, Copy)]
pub struct NodeHeader {
    pub node_type: NodeType,
    pub key_count: u16,
    /// Deletions at or after this recency are recorded as tombstones.
    pub deletion_horizon: Recency,
}

impl NodeHeader {
    const fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            key_count: 0,
            deletion_horizon: Recency::DISTANT_PAST,
        }
    }

    /// Read a node header from a page.
    #[must_use]
    pub fn from_page(page: &Page) -> Option<Self> {
        let offset = PageHeader::SIZE;
        let node_type = NodeType::try_from(page.read_u8(offset)).ok()?;
        Some(Self {
            node_type,
            key_count: page.read_u16(offset + 1),
            deletion_horizon: Recency::new(page.read_u64(offset + 3)),
        })
    }

    /// Write a node header to a page.
    pub fn write_to_page(&self, page: &mut Page) {
        let offset = PageHeader::SIZE;
        page.write_u8(offset, self.node_type as u8);
        page.write_u16(offset + 1, self.key_count);
        page.write_u64(offset + 3, self.deletion_horizon.value());
    }
}

/// Bounds-checked reader over a node's data area.
struct NodeReader<'a> {
    page: &'a Page,
    offset: usize,
}

impl<'a> NodeReader<'a> {
    const fn new(page: &'a Page) -> Self {
        Self {
            page,
            offset: DATA_OFFSET,
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], NodeError> {
        if self.offset + len > PAGE_SIZE {
            return Err(NodeError::Truncated);
        }
        let bytes = self.page.read_bytes(self.offset, len);
        self.offset += len;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, NodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, NodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u64(&mut self) -> Result<u64, NodeError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn key(&mut self) -> Result<StoreKey, NodeError> {
        let len = self.u8()? as usize;
        if len > MAX_KEY_SIZE {
            return Err(NodeError::KeyTooLong(len));
        }
        StoreKey::from_bytes(self.take(len)?).map_err(|_| NodeError::KeyTooLong(len))
    }
}

/// An internal (non-leaf) B-tree node.
///
/// Stores N keys and N+1 child pointers.
/// `Child[i]` contains keys < `Key[i]`
/// `Child[i+1]` contains keys >= `Key[i]`
#[derive(Debug, Clone)]
pub struct InternalNode {
    pub header: NodeHeader,
    /// Keys in sorted order.
    pub keys: Vec<StoreKey>,
    /// Child page pointers. `children.len()` == `keys.len()` + 1
    pub children: Vec<PageId>,
}

impl InternalNode {
    /// Create an internal node with two children.
    #[must_use]
    pub fn with_children(left_child: PageId, key: StoreKey, right_child: PageId) -> Self {
        Self {
            header: NodeHeader::new(NodeType::Internal),
            keys: vec![key],
            children: vec![left_child, right_child],
        }
    }

    /// Read an internal node from a page.
    pub fn from_page(page: &Page) -> Result<Self, NodeError> {
        let header = NodeHeader::from_page(page).ok_or(NodeError::InvalidHeader)?;
        if header.node_type != NodeType::Internal {
            return Err(NodeError::WrongNodeType);
        }

        let key_count = header.key_count as usize;
        let mut keys = Vec::with_capacity(key_count);
        let mut children = Vec::with_capacity(key_count + 1);

        let mut reader = NodeReader::new(page);
        children.push(reader.u64()?);
        for _ in 0..key_count {
            keys.push(reader.key()?);
            children.push(reader.u64()?);
        }

        Ok(Self {
            header,
            keys,
            children,
        })
    }

    /// Serialize to a fresh page.
    #[must_use]
    pub fn to_page(&self) -> Page {
        let mut page = Page::with_type(PageType::BTreeInternal);

        let mut header = self.header;
        header.key_count = self.keys.len() as u16;
        header.write_to_page(&mut page);

        let mut offset = DATA_OFFSET;
        page.write_u64(offset, self.children.first().copied().unwrap_or(0));
        offset += 8;

        for (key, child) in self.keys.iter().zip(&self.children[1..]) {
            page.write_u8(offset, key.len() as u8);
            page.write_bytes(offset + 1, key.as_bytes());
            offset += 1 + key.len();
            page.write_u64(offset, *child);
            offset += 8;
        }

        page
    }

    /// Serialized size of the data area.
    #[must_use]
    pub fn size(&self) -> usize {
        8 + self
            .keys
            .iter()
            .map(|k| INTERNAL_ENTRY_OVERHEAD + k.len())
            .sum::<usize>()
    }

    #[must_use]
    pub fn is_overfull(&self) -> bool {
        self.size() > DATA_SPACE
    }

    /// Find the child index for a given key.
    #[must_use]
    pub fn find_child_index(&self, key: &StoreKey) -> usize {
        match self.keys.binary_search(key) {
            Ok(i) => i + 1, // Exact match, go right
            Err(i) => i,
        }
    }

    /// Insert a separator with the child to its right, next to `left_index`.
    pub fn insert_after(&mut self, left_index: usize, key: StoreKey, right_child: PageId) {
        self.keys.insert(left_index, key);
        self.children.insert(left_index + 1, right_child);
    }

    /// Remove the child at `index` together with one adjacent separator.
    pub fn remove_child(&mut self, index: usize) {
        self.children.remove(index);
        if !self.keys.is_empty() {
            self.keys.remove(index.saturating_sub(1));
        }
    }

    /// Split the node by bytes, returning the median key and the new right node.
    ///
    /// # Pre-conditions
    ///
    /// The node holds at least three keys.
    #[must_use]
    pub fn split(&mut self) -> (StoreKey, Self) {
        let sizes: Vec<usize> = self
            .keys
            .iter()
            .map(|k| INTERNAL_ENTRY_OVERHEAD + k.len())
            .collect();
        let mid = split_point(&sizes).clamp(1, self.keys.len().saturating_sub(2));

        let right_keys: Vec<StoreKey> = self.keys.drain(mid + 1..).collect();
        let right_children: Vec<PageId> = self.children.drain(mid + 1..).collect();
        let median_key = self.keys.pop().unwrap_or_default();

        let right_node = Self {
            header: NodeHeader::new(NodeType::Internal),
            keys: right_keys,
            children: right_children,
        };

        (median_key, right_node)
    }
}

/// A key/value entry in a leaf node. `value` is `None` for a deletion tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    pub key: StoreKey,
    pub recency: Recency,
    pub value: Option<Vec<u8>>,
}

impl LeafEntry {
    #[must_use]
    pub fn size(&self) -> usize {
        LEAF_ENTRY_OVERHEAD + self.key.len() + self.value.as_ref().map_or(0, Vec::len)
    }

    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// A leaf B-tree node.
///
/// # Invariants
///
/// - Entries are sorted by key with no duplicates.
/// - Every deletion with recency >= `header.deletion_horizon` that happened
///   in this leaf's key range is present as a tombstone.
#[derive(Debug, Clone)]
pub struct LeafNode {
    pub header: NodeHeader,
    /// Entries in sorted order by key.
    pub entries: Vec<LeafEntry>,
}

impl LeafNode {
    /// Create a new empty leaf node.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            header: NodeHeader::new(NodeType::Leaf),
            entries: Vec::new(),
        }
    }

    /// Read a leaf node from a page.
    pub fn from_page(page: &Page) -> Result<Self, NodeError> {
        let header = NodeHeader::from_page(page).ok_or(NodeError::InvalidHeader)?;
        if header.node_type != NodeType::Leaf {
            return Err(NodeError::WrongNodeType);
        }

        let entry_count = header.key_count as usize;
        let mut entries = Vec::with_capacity(entry_count);
        let mut reader = NodeReader::new(page);

        for _ in 0..entry_count {
            let key = reader.key()?;
            let recency = Recency::new(reader.u64()?);
            let flags = reader.u8()?;
            let value_len = reader.u16()? as usize;
            let bytes = reader.take(value_len)?;
            let value = if flags & FLAG_TOMBSTONE == 0 {
                Some(bytes.to_vec())
            } else {
                None
            };
            entries.push(LeafEntry {
                key,
                recency,
                value,
            });
        }

        Ok(Self { header, entries })
    }

    /// Serialize to a fresh page.
    #[must_use]
    pub fn to_page(&self) -> Page {
        let mut page = Page::with_type(PageType::BTreeLeaf);

        let mut header = self.header;
        header.key_count = self.entries.len() as u16;
        header.write_to_page(&mut page);

        let mut offset = DATA_OFFSET;
        for entry in &self.entries {
            page.write_u8(offset, entry.key.len() as u8);
            page.write_bytes(offset + 1, entry.key.as_bytes());
            offset += 1 + entry.key.len();

            page.write_u64(offset, entry.recency.value());
            offset += 8;

            let (flags, value): (u8, &[u8]) = match &entry.value {
                Some(v) => (0, v),
                None => (FLAG_TOMBSTONE, &[]),
            };
            page.write_u8(offset, flags);
            page.write_u16(offset + 1, value.len() as u16);
            offset += 3;

            page.write_bytes(offset, value);
            offset += value.len();
        }

        page
    }

    /// Serialized size of all entries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.iter().map(LeafEntry::size).sum()
    }

    #[must_use]
    pub fn is_overfull(&self) -> bool {
        self.size() > DATA_SPACE
    }

    /// Find the index where a key should be inserted (or exists).
    pub fn find_index(&self, key: &StoreKey) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.key.cmp(key))
    }

    /// The live entry for a key, ignoring tombstones.
    #[must_use]
    pub fn get(&self, key: &StoreKey) -> Option<&LeafEntry> {
        self.find_index(key)
            .ok()
            .map(|i| &self.entries[i])
            .filter(|e| !e.is_tombstone())
    }

    /// Insert or replace the entry for `entry.key`.
    ///
    /// Returns the previous live value, if any.
    pub fn upsert(&mut self, entry: LeafEntry) -> Option<Vec<u8>> {
        match self.find_index(&entry.key) {
            Ok(i) => std::mem::replace(&mut self.entries[i], entry).value,
            Err(i) => {
                self.entries.insert(i, entry);
                None
            }
        }
    }

    /// Drop every tombstone and raise the deletion horizon past them.
    ///
    /// Returns the number of tombstones dropped.
    pub fn prune_tombstones(&mut self) -> usize {
        let before = self.entries.len();
        let mut horizon = self.header.deletion_horizon;
        self.entries.retain(|e| {
            if e.is_tombstone() {
                horizon = horizon.max(e.recency.next());
                false
            } else {
                true
            }
        });
        self.header.deletion_horizon = horizon;
        before - self.entries.len()
    }

    /// Split the node by bytes, returning the split key and the new right node.
    ///
    /// The right node inherits the deletion horizon.
    #[must_use]
    pub fn split(&mut self) -> (StoreKey, Self) {
        let sizes: Vec<usize> = self.entries.iter().map(LeafEntry::size).collect();
        let mid = split_point(&sizes).clamp(1, self.entries.len().saturating_sub(1));

        let right_entries: Vec<LeafEntry> = self.entries.drain(mid..).collect();
        let split_key = right_entries
            .first()
            .map(|e| e.key.clone())
            .unwrap_or_default();

        let right_node = Self {
            header: NodeHeader {
                deletion_horizon: self.header.deletion_horizon,
                ..NodeHeader::new(NodeType::Leaf)
            },
            entries: right_entries,
        };

        (split_key, right_node)
    }
}

impl Default for LeafNode {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoded node of either kind.
#[derive(Debug, Clone)]
pub enum Node {
    Internal(InternalNode),
    Leaf(LeafNode),
}

impl Node {
    /// Decode a node, dispatching on the page type.
    pub fn from_page(page: &Page) -> Result<Self, NodeError> {
        match PageType::try_from(page.read_u8(0)) {
            Ok(PageType::BTreeInternal) => InternalNode::from_page(page).map(Self::Internal),
            Ok(PageType::BTreeLeaf) => LeafNode::from_page(page).map(Self::Leaf),
            _ => Err(NodeError::WrongNodeType),
        }
    }
}

/// Index of the first item past the byte midpoint.
fn split_point(sizes: &[usize]) -> usize {
    let half = sizes.iter().sum::<usize>() / 2;
    let mut acc = 0;
    for (i, size) in sizes.iter().enumerate() {
        acc += size;
        if acc >= half {
            return i + 1;
        }
    }
    sizes.len()
}

/// Errors that can occur when working with B-tree nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Invalid node header.
    InvalidHeader,
    /// Wrong node type for operation.
    WrongNodeType,
    /// Entry data runs past the end of the page.
    Truncated,
    /// Stored key longer than `MAX_KEY_SIZE`.
    KeyTooLong(usize),
    /// Value too large to store in a leaf slot.
    ValueTooLarge(usize),
    /// Value bytes are not a well-formed value reference.
    MalformedValue,
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidHeader => write!(f, "invalid node header"),
            Self::WrongNodeType => write!(f, "wrong node type for operation"),
            Self::Truncated => write!(f, "node entries run past the end of the page"),
            Self::KeyTooLong(len) => write!(f, "stored key of {len} bytes is too long"),
            Self::ValueTooLarge(size) => {
                write!(
                    f,
                    "value too large: {size} bytes (max {MAX_SLOT_VALUE_SIZE})"
                )
            }
            Self::MalformedValue => write!(f, "malformed value reference"),
        }
    }
}

impl std::error::Error for NodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(bytes: &[u8]) -> StoreKey {
        StoreKey::from_bytes(bytes).expect("valid key")
    }

    fn live(k: &[u8], value: &[u8], recency: u64) -> LeafEntry {
        LeafEntry {
            key: key(k),
            recency: Recency::new(recency),
            value: Some(value.to_vec()),
        }
    }

    #[test]
    fn test_internal_node_roundtrip() {
        let mut node = InternalNode::with_children(10, key(b"b"), 20);
        node.insert_after(1, key(b"dd"), 30);
        node.insert_after(2, key(b"fff"), 40);

        let restored = InternalNode::from_page(&node.to_page()).expect("should parse");
        assert_eq!(restored.keys, vec![key(b"b"), key(b"dd"), key(b"fff")]);
        assert_eq!(restored.children, vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_leaf_node_roundtrip_with_tombstone() {
        let mut node = LeafNode::new();
        node.header.deletion_horizon = Recency::new(4);
        node.upsert(live(b"a", b"value1", 5));
        node.upsert(LeafEntry {
            key: key(b"b"),
            recency: Recency::new(6),
            value: None,
        });
        node.upsert(live(b"c", b"value3", 7));

        let restored = LeafNode::from_page(&node.to_page()).expect("should parse");
        assert_eq!(restored.entries, node.entries);
        assert_eq!(restored.header.deletion_horizon, Recency::new(4));
        assert!(restored.get(&key(b"b")).is_none());
        assert_eq!(
            restored.get(&key(b"c")).and_then(|e| e.value.as_deref()),
            Some(b"value3".as_slice())
        );
    }

    #[test]
    fn test_upsert_returns_previous_live_value() {
        let mut node = LeafNode::new();
        assert!(node.upsert(live(b"k", b"one", 1)).is_none());
        assert_eq!(node.upsert(live(b"k", b"two", 2)), Some(b"one".to_vec()));
        assert_eq!(node.entries.len(), 1);
    }

    #[test]
    fn test_prune_tombstones_raises_horizon() {
        let mut node = LeafNode::new();
        node.upsert(live(b"a", b"x", 1));
        for (k, t) in [(b"b", 9), (b"c", 4)] {
            node.upsert(LeafEntry {
                key: key(k),
                recency: Recency::new(t),
                value: None,
            });
        }

        assert_eq!(node.prune_tombstones(), 2);
        assert_eq!(node.entries.len(), 1);
        assert_eq!(node.header.deletion_horizon, Recency::new(10));
    }

    #[test]
    fn test_internal_node_find_child() {
        let mut node = InternalNode::with_children(100, key(b"j"), 200);
        node.insert_after(1, key(b"t"), 300);

        assert_eq!(node.find_child_index(&key(b"a")), 0);
        assert_eq!(node.find_child_index(&key(b"j")), 1);
        assert_eq!(node.find_child_index(&key(b"m")), 1);
        assert_eq!(node.find_child_index(&key(b"z")), 2);
    }

    #[test]
    fn test_remove_child() {
        let mut node = InternalNode::with_children(100, key(b"j"), 200);
        node.insert_after(1, key(b"t"), 300);

        node.remove_child(0);
        assert_eq!(node.children, vec![200, 300]);
        assert_eq!(node.keys, vec![key(b"t")]);

        node.remove_child(1);
        assert_eq!(node.children, vec![200]);
        assert!(node.keys.is_empty());
    }

    #[test]
    fn test_leaf_split_balances_bytes() {
        let mut node = LeafNode::new();
        node.header.deletion_horizon = Recency::new(77);
        node.upsert(live(b"a", &[0u8; 900], 1));
        for i in 0..30u8 {
            node.upsert(live(&[b'b', i], b"small", 1));
        }

        let (split_key, right) = node.split();
        assert!(!node.entries.is_empty());
        assert!(!right.entries.is_empty());
        assert_eq!(split_key, right.entries[0].key);
        assert_eq!(right.header.deletion_horizon, Recency::new(77));
        let diff = node.size().abs_diff(right.size());
        assert!(diff <= 900 + LEAF_ENTRY_OVERHEAD + 2);
    }

    #[test]
    fn test_internal_split_promotes_median() {
        let mut node = InternalNode::with_children(0, key(&[0]), 1);
        for i in 1..10u8 {
            node.insert_after(usize::from(i), key(&[i]), u64::from(i) + 1);
        }

        let (median, right) = node.split();
        assert_eq!(node.children.len(), node.keys.len() + 1);
        assert_eq!(right.children.len(), right.keys.len() + 1);
        assert!(node.keys.iter().all(|k| *k < median));
        assert!(right.keys.iter().all(|k| *k > median));
    }

    #[test]
    fn test_truncated_leaf_rejected() {
        let mut page = LeafNode::new().to_page();
        let mut header = NodeHeader::from_page(&page).expect("header");
        header.key_count = 2000;
        header.write_to_page(&mut page);
        assert_eq!(LeafNode::from_page(&page).map(|_| ()), Err(NodeError::Truncated));
    }
}
