//! Shared fixtures for unit and end-to-end tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::btree::{BTree, MAX_SLOT_VALUE_SIZE, ValueSizer};
use crate::storage::MemoryStorage;
use crate::types::{Document, StoreKey};

/// Accepts any byte string that fits, for trees holding raw test values.
pub struct RawValueSizer;

impl ValueSizer for RawValueSizer {
    fn fits(&self, value: &[u8], length_available: usize) -> bool {
        value.len() <= length_available
    }

    fn max_possible_size(&self) -> usize {
        MAX_SLOT_VALUE_SIZE
    }
}

/// A raw key from a string literal.
#[allow(clippy::expect_used)]
pub fn key(s: &str) -> StoreKey {
    StoreKey::from_bytes(s.as_bytes()).expect("test key fits")
}

/// An empty in-memory tree storing raw values.
#[allow(clippy::expect_used)]
pub fn memory_tree() -> BTree<MemoryStorage> {
    BTree::create(MemoryStorage::new(), Box::new(RawValueSizer)).expect("create tree")
}

/// Deterministic random documents keyed by an `id` field.
pub struct DocumentGenerator {
    rng: StdRng,
}

impl DocumentGenerator {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// A document with primary key `id` and a body of roughly `body_len`
    /// characters spread over a few fields.
    pub fn document(&mut self, id: impl Into<Document>, body_len: usize) -> Document {
        let mut fields = vec![("id".to_string(), id.into())];
        fields.push((
            "n".to_string(),
            Document::Number(f64::from(self.rng.random_range(0..1000u32))),
        ));
        fields.push(("flag".to_string(), Document::Bool(self.rng.random())));
        fields.push(("body".to_string(), Document::String(self.text(body_len))));
        let tags = (0..self.rng.random_range(0..4usize))
            .map(|_| Document::String(self.text(6)))
            .collect();
        fields.push(("tags".to_string(), Document::Array(tags)));
        Document::object(fields)
    }

    /// A document whose body size is drawn at random, sometimes large
    /// enough to need overflow storage.
    pub fn any_document(&mut self, id: impl Into<Document>) -> Document {
        let body_len = if self.rng.random_bool(0.25) {
            self.rng.random_range(300..20_000)
        } else {
            self.rng.random_range(0..120)
        };
        self.document(id, body_len)
    }

    fn text(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| char::from(self.rng.random_range(b'a'..=b'z')))
            .collect()
    }
}
