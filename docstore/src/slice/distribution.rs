//! Key distribution estimates from the index's split points.

use std::collections::BTreeMap;

use crate::slice::{Slice, StoreError};
use crate::storage::Storage;
use crate::types::{KeyRange, StoreKey};

/// Estimated document counts per bucket. Each bucket starts at its key and
/// runs up to the next bucket's key (or the end of the sampled range).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributionResponse {
    pub key_counts: BTreeMap<StoreKey, u64>,
}

impl<S: Storage> Slice<S> {
    /// Estimate how documents in `range` are spread, using separator keys
    /// of the index nodes above `max_depth` as bucket boundaries.
    ///
    /// Every bucket gets the same share, at least 1. Without splits, or
    /// when the range holds no documents, the left key gets the whole
    /// count as a single bucket.
    pub fn sample_distribution(
        &self,
        range: &KeyRange,
        max_depth: usize,
    ) -> Result<DistributionResponse, StoreError> {
        let total = self.tree.count_live(range)?;
        let splits = if total == 0 {
            Vec::new()
        } else {
            self.tree.sample_splits(range, max_depth)?
        };

        let mut key_counts = BTreeMap::new();
        if splits.is_empty() {
            key_counts.insert(range.left.clone(), total);
        } else {
            let buckets = splits.len() as u64 + 1;
            let per_bucket = (total / buckets).max(1);
            key_counts.insert(range.left.clone(), per_bucket);
            for split in splits {
                key_counts.insert(split, per_bucket);
            }
        }

        tracing::debug!(
            "Sampled {} buckets over {range} ({total} documents)",
            key_counts.len()
        );
        Ok(DistributionResponse { key_counts })
    }
}
