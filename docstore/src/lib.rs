// Life of a request:
// 1. Caller hands a slice a key (or a key range) and a request
// 2. Point operations:
//     - Acquire a read or write location for the key
//     - Decode the current value (inline or from its overflow chain)
//     - Evaluate, encode, commit the slot, release the old chain
// 3. Range operations:
//     - Walk the index cursor over the range
//     - Decode, transform, then stream or fold into a terminal
//     - Stop at the chunk cap and report where we stopped
//
// System components:
//  - Page store (memory or file) with overflow chains
//  - B-tree index with recency stamps and tombstones
//  - Expression evaluator for transforms, terminals and modify

pub mod btree;
pub mod config;
pub mod query;
pub mod signal;
pub mod slice;
pub mod storage;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
mod testing;

pub use config::{ConfigError, StoreConfig};
pub use slice::{Slice, StoreError};
pub use types::{Document, KeyRange, Recency, StoreKey};
