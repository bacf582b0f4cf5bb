//! Store keys and key ranges.
//!
//! A store key is the byte string a document is indexed under. Keys compare
//! lexicographically by byte, which defines scan order and range semantics.
//!
//! # Invariants
//!
//! - A key is never longer than `MAX_KEY_SIZE` bytes.
//! - For primary keys, numeric order matches key order and every number
//!   sorts before every string.

/// Maximum length of a store key in bytes.
pub const MAX_KEY_SIZE: usize = 250;

const NUMBER_PREFIX: u8 = b'N';
const STRING_PREFIX: u8 = b'S';

/// A byte-string key in the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreKey(Vec<u8>);

impl StoreKey {
    /// The smallest key (empty).
    #[must_use]
    pub const fn min() -> Self {
        Self(Vec::new())
    }

    /// The largest key in the bounded key space.
    #[must_use]
    pub fn max() -> Self {
        Self(vec![0xFF; MAX_KEY_SIZE])
    }

    /// Create a key from raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, KeyError> {
        let bytes = bytes.into();
        if bytes.len() > MAX_KEY_SIZE {
            return Err(KeyError::TooLong(bytes.len()));
        }
        Ok(Self(bytes))
    }

    /// Derive the store key for a primary-key value.
    pub fn from_primary_key(pk: &crate::types::Document) -> Result<Self, KeyError> {
        use crate::types::Document;

        match pk {
            Document::Number(n) => {
                if n.is_nan() {
                    return Err(KeyError::NanPrimaryKey);
                }
                // Fold -0.0 into 0.0 so equal numbers give equal keys.
                let n = if *n == 0.0 { 0.0 } else { *n };
                let bits = n.to_bits();
                let ordered = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
                let mut bytes = Vec::with_capacity(9);
                bytes.push(NUMBER_PREFIX);
                bytes.extend_from_slice(&ordered.to_be_bytes());
                Ok(Self(bytes))
            }
            Document::String(s) => {
                let mut bytes = Vec::with_capacity(s.len() + 1);
                bytes.push(STRING_PREFIX);
                bytes.extend_from_slice(s.as_bytes());
                Self::from_bytes(bytes)
            }
            other => Err(KeyError::InvalidPrimaryKeyType(other.type_name())),
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replace this key with its immediate predecessor.
    ///
    /// Returns `false` (leaving the key untouched) for the empty key, which
    /// has no predecessor.
    pub fn decrement(&mut self) -> bool {
        match self.0.last_mut() {
            None => false,
            Some(0) => {
                self.0.pop();
                true
            }
            Some(last) => {
                *last -= 1;
                self.0.resize(MAX_KEY_SIZE, 0xFF);
                true
            }
        }
    }

    /// The smallest key strictly greater than this one, if any.
    #[must_use]
    pub fn successor(&self) -> Option<Self> {
        let mut bytes = self.0.clone();
        if bytes.len() < MAX_KEY_SIZE {
            bytes.push(0);
            return Some(Self(bytes));
        }
        while bytes.last() == Some(&0xFF) {
            bytes.pop();
        }
        let last = bytes.last_mut()?;
        *last += 1;
        Some(Self(bytes))
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", char::from(b))?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

/// Upper end of a key range.
///
/// Declaration order matters: every `Exclusive` bound sorts below `Unbounded`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RightBound {
    Exclusive(StoreKey),
    Unbounded,
}

impl RightBound {
    /// Whether `key` lies strictly below this bound.
    #[must_use]
    pub fn is_above(&self, key: &StoreKey) -> bool {
        match self {
            Self::Exclusive(right) => key < right,
            Self::Unbounded => true,
        }
    }
}

/// A range of keys: inclusive left bound, exclusive or unbounded right bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyRange {
    pub left: StoreKey,
    pub right: RightBound,
}

impl KeyRange {
    /// Every key.
    #[must_use]
    pub const fn universe() -> Self {
        Self {
            left: StoreKey::min(),
            right: RightBound::Unbounded,
        }
    }

    /// `[left, right)`.
    #[must_use]
    pub const fn half_open(left: StoreKey, right: StoreKey) -> Self {
        Self {
            left,
            right: RightBound::Exclusive(right),
        }
    }

    /// `[left, right]`.
    #[must_use]
    pub fn closed(left: StoreKey, right: &StoreKey) -> Self {
        let right = right
            .successor()
            .map_or(RightBound::Unbounded, RightBound::Exclusive);
        Self { left, right }
    }

    /// `[left, +inf)`.
    #[must_use]
    pub const fn at_least(left: StoreKey) -> Self {
        Self {
            left,
            right: RightBound::Unbounded,
        }
    }

    #[must_use]
    pub fn contains_key(&self, key: &StoreKey) -> bool {
        *key >= self.left && self.right.is_above(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.right {
            RightBound::Exclusive(right) => *right <= self.left,
            RightBound::Unbounded => false,
        }
    }

    /// Whether every key of `other` is also in `self`.
    #[must_use]
    pub fn is_superset(&self, other: &Self) -> bool {
        other.is_empty() || (self.left <= other.left && self.right >= other.right)
    }

    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            left: self.left.clone().max(other.left.clone()),
            right: self.right.clone().min(other.right.clone()),
        }
    }
}

impl std::fmt::Display for KeyRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.right {
            RightBound::Exclusive(right) => write!(f, "[{}, {})", self.left, right),
            RightBound::Unbounded => write!(f, "[{}, +inf)", self.left),
        }
    }
}

/// Errors constructing store keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The key is longer than `MAX_KEY_SIZE`.
    TooLong(usize),
    /// Primary keys must be numbers or strings.
    InvalidPrimaryKeyType(&'static str),
    NanPrimaryKey,
}

impl std::fmt::Display for KeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLong(len) => {
                write!(f, "key of {len} bytes exceeds maximum of {MAX_KEY_SIZE}")
            }
            Self::InvalidPrimaryKeyType(kind) => {
                write!(f, "primary key must be a number or a string, got {kind}")
            }
            Self::NanPrimaryKey => write!(f, "primary key cannot be NaN"),
        }
    }
}

impl std::error::Error for KeyError {}
