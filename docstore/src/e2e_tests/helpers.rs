//! Common helpers for end-to-end tests.

use tempfile::TempDir;

use crate::config::StoreConfig;
use crate::query::Environment;
use crate::signal::{InterruptSource, Interruptor};
use crate::slice::{
    BackfillAtom, BackfillCallback, ScanRequest, ScanResponse, ScanResult, StoreError,
};
use crate::storage::{MemoryStorage, Storage};
use crate::testing::DocumentGenerator;
use crate::types::{Document, KeyRange, Recency, StoreKey};
use crate::Slice;

/// A fresh in-memory slice.
#[allow(clippy::expect_used)]
pub fn memory_slice() -> Slice<MemoryStorage> {
    Slice::create(MemoryStorage::new()).expect("Failed to create slice")
}

/// The store key for a string primary key.
#[allow(clippy::expect_used)]
pub fn pk(id: &str) -> StoreKey {
    StoreKey::from_primary_key(&Document::from(id)).expect("valid primary key")
}

/// The store key for a numeric primary key.
#[allow(clippy::expect_used)]
pub fn num_pk(id: u32) -> StoreKey {
    StoreKey::from_primary_key(&Document::from(f64::from(id))).expect("valid primary key")
}

/// Insert `count` generated documents with numeric ids `0..count`, each at
/// recency `id + 1`. Returns the documents in key order.
#[allow(clippy::expect_used)]
pub fn fill<S: Storage>(slice: &mut Slice<S>, count: u32, seed: u64) -> Vec<(StoreKey, Document)> {
    let mut generator = DocumentGenerator::new(seed);
    (0..count)
        .map(|id| {
            let doc = generator.any_document(f64::from(id));
            slice
                .set(&num_pk(id), &doc, false, Recency::new(u64::from(id) + 1))
                .expect("set");
            (num_pk(id), doc)
        })
        .collect()
}

/// Run a plain stream scan and return its response.
#[allow(clippy::expect_used)]
pub fn stream_scan(slice: &Slice<MemoryStorage>, range: KeyRange) -> ScanResponse {
    slice
        .scan(
            &ScanRequest::new(range),
            &Environment::new(),
            &Interruptor::never(),
        )
        .expect("scan")
}

/// The streamed items of a response.
pub fn stream_items(response: ScanResponse) -> Vec<(StoreKey, Document)> {
    match response.result {
        ScanResult::Stream(items) => items,
        other => panic!("expected a stream, got {other:?}"),
    }
}

/// A config pointing into a temporary directory.
pub fn file_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        database_path: dir.path().join("data").join("docstore.db"),
        ..StoreConfig::default()
    }
}

/// Records every backfill event.
#[derive(Default)]
pub struct CollectingCallback {
    pub delete_ranges: Vec<KeyRange>,
    pub deletions: Vec<(StoreKey, Recency)>,
    pub atoms: Vec<BackfillAtom>,
    /// Pulse `source` once this many atoms have arrived.
    pub pulse_after: Option<usize>,
    pub source: InterruptSource,
}

impl BackfillCallback for CollectingCallback {
    fn on_delete_range(&mut self, range: &KeyRange) -> Result<(), StoreError> {
        self.delete_ranges.push(range.clone());
        Ok(())
    }

    fn on_deletion(&mut self, key: &StoreKey, recency: Recency) -> Result<(), StoreError> {
        self.deletions.push((key.clone(), recency));
        Ok(())
    }

    fn on_keyvalue(&mut self, atom: BackfillAtom) -> Result<(), StoreError> {
        self.atoms.push(atom);
        if self.pulse_after == Some(self.atoms.len()) {
            self.source.pulse();
        }
        Ok(())
    }
}
