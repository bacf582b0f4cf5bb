mod document;
mod recency;
mod store_key;

pub use document::{DecodeError, Document, MAX_NESTING_DEPTH};
pub use recency::Recency;
pub use store_key::{KeyError, KeyRange, MAX_KEY_SIZE, RightBound, StoreKey};
