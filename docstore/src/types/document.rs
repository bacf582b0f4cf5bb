//! JSON-like documents and their compact binary form.
//!
//! The binary form is a tagged, length-prefixed encoding:
//!
//! ```text
//! 0x00                      null
//! 0x01 / 0x02               false / true
//! 0x03 [f64 LE]             number
//! 0x04 [u32 len] [utf-8]    string
//! 0x05 [u32 count] items    array
//! 0x06 [u32 count] entries  object, each entry is [u32 len] [utf-8 key] value
//! ```
//!
//! Object keys are kept in a `BTreeMap`, so encoding the same document twice
//! always yields the same bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Deepest nesting a stored document may have. Writes check it before
/// encoding and decoding rejects anything deeper.
pub const MAX_NESTING_DEPTH: usize = 256;

/// A JSON-like value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Document {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Document>),
    Object(BTreeMap<String, Document>),
}

/// Type discriminants for the binary form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Tag {
    Null = 0x00,
    False = 0x01,
    True = 0x02,
    Number = 0x03,
    String = 0x04,
    Array = 0x05,
    Object = 0x06,
}

impl TryFrom<u8> for Tag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Null),
            0x01 => Ok(Self::False),
            0x02 => Ok(Self::True),
            0x03 => Ok(Self::Number),
            0x04 => Ok(Self::String),
            0x05 => Ok(Self::Array),
            0x06 => Ok(Self::Object),
            _ => Err(value),
        }
    }
}

impl Document {
    /// Build an object from `(field, value)` pairs.
    #[must_use]
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Look up a field if this is an object.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&Self> {
        match self {
            Self::Object(fields) => fields.get(name),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Human readable type name used in diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BOOL",
            Self::Number(_) => "NUMBER",
            Self::String(_) => "STRING",
            Self::Array(_) => "ARRAY",
            Self::Object(_) => "OBJECT",
        }
    }

    /// Whether some value inside this document sits more than `limit`
    /// levels below the top. The document itself is at level 0.
    #[must_use]
    pub fn nests_deeper_than(&self, limit: usize) -> bool {
        let mut pending = vec![(self, 0usize)];
        while let Some((doc, depth)) = pending.pop() {
            match doc {
                Self::Array(items) if !items.is_empty() => {
                    if depth >= limit {
                        return true;
                    }
                    pending.extend(items.iter().map(|item| (item, depth + 1)));
                }
                Self::Object(fields) if !fields.is_empty() => {
                    if depth >= limit {
                        return true;
                    }
                    pending.extend(fields.values().map(|value| (value, depth + 1)));
                }
                _ => {}
            }
        }
        false
    }

    /// Serialize to the binary form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }

    // Lengths are bounded well below u32::MAX by the overflow chain format.
    #[allow(clippy::cast_possible_truncation)]
    fn write_to(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Null => buf.push(Tag::Null as u8),
            Self::Bool(false) => buf.push(Tag::False as u8),
            Self::Bool(true) => buf.push(Tag::True as u8),
            Self::Number(n) => {
                buf.push(Tag::Number as u8);
                buf.extend_from_slice(&n.to_le_bytes());
            }
            Self::String(s) => {
                buf.push(Tag::String as u8);
                buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            Self::Array(items) => {
                buf.push(Tag::Array as u8);
                buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
                for item in items {
                    item.write_to(buf);
                }
            }
            Self::Object(fields) => {
                buf.push(Tag::Object as u8);
                buf.extend_from_slice(&(fields.len() as u32).to_le_bytes());
                for (key, value) in fields {
                    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                    buf.extend_from_slice(key.as_bytes());
                    value.write_to(buf);
                }
            }
        }
    }

    /// Deserialize from the binary form. The whole input must be consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader { bytes, pos: 0 };
        let document = reader.read_document(0)?;
        if reader.pos != bytes.len() {
            return Err(DecodeError::TrailingBytes(bytes.len() - reader.pos));
        }
        Ok(document)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(DecodeError::UnexpectedEnd)?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<usize, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
    }

    fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u32()?;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    fn read_document(&mut self, depth: usize) -> Result<Document, DecodeError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(DecodeError::TooDeep);
        }
        let tag = Tag::try_from(self.read_u8()?).map_err(DecodeError::InvalidTag)?;
        match tag {
            Tag::Null => Ok(Document::Null),
            Tag::False => Ok(Document::Bool(false)),
            Tag::True => Ok(Document::Bool(true)),
            Tag::Number => {
                let b = self.take(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                Ok(Document::Number(f64::from_le_bytes(raw)))
            }
            Tag::String => Ok(Document::String(self.read_string()?)),
            Tag::Array => {
                let count = self.read_u32()?;
                // Every item takes at least one byte.
                if count > self.bytes.len() - self.pos {
                    return Err(DecodeError::UnexpectedEnd);
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.read_document(depth + 1)?);
                }
                Ok(Document::Array(items))
            }
            Tag::Object => {
                let count = self.read_u32()?;
                let mut fields = BTreeMap::new();
                for _ in 0..count {
                    let key = self.read_string()?;
                    let value = self.read_document(depth + 1)?;
                    if fields.insert(key, value).is_some() {
                        return Err(DecodeError::DuplicateField);
                    }
                }
                Ok(Document::Object(fields))
            }
        }
    }
}

impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        f.write_str(&text)
    }
}

impl From<serde_json::Value> for Document {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(fields) => {
                Self::Object(fields.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Document {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Document {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Document {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Document {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Errors produced when stored bytes do not form a valid document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnexpectedEnd,
    InvalidTag(u8),
    InvalidUtf8,
    DuplicateField,
    TooDeep,
    TrailingBytes(usize),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedEnd => write!(f, "unexpected end of document bytes"),
            Self::InvalidTag(t) => write!(f, "invalid document tag: 0x{t:02x}"),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8 in document string"),
            Self::DuplicateField => write!(f, "duplicate object field"),
            Self::TooDeep => write!(f, "document nesting exceeds {MAX_NESTING_DEPTH}"),
            Self::TrailingBytes(n) => write!(f, "{n} trailing bytes after document"),
        }
    }
}

impl std::error::Error for DecodeError {}
