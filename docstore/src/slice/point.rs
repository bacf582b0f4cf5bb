//! Point operations: get, set, delete and atomic modify.
//!
//! Each operation runs to completion inside one location. Modify is the
//! read-modify-write primitive: the current row is decoded, handed to the
//! evaluator and the outcome committed, all while the write location is held.

use crate::query::{
    Backtrace, Environment, Mapping, ModifyOp, ModifyOutcome, QueryError, calculate_modify,
};
use crate::slice::{Slice, StoreError};
use crate::storage::Storage;
use crate::types::{Document, MAX_NESTING_DEPTH, Recency, StoreKey};

#[derive(Debug, Clone, PartialEq)]
pub struct PointReadResponse {
    /// The stored document, or `Document::Null` if the key is unset.
    pub data: Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointWriteResult {
    Stored,
    /// The key already had a value and overwriting was not allowed.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointDeleteResult {
    Deleted,
    Missing,
}

/// What an atomic modify did. `Error` carries the evaluator's diagnostic;
/// the store is unchanged for the key in that case.
#[derive(Debug, Clone, PartialEq)]
pub enum ModifyResult {
    Inserted,
    Modified,
    Deleted,
    Skipped,
    Nop,
    Error(QueryError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointModifyResponse {
    pub result: ModifyResult,
}

/// An atomic modify of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifyRequest {
    pub op: ModifyOp,
    /// Field of the row holding its primary key.
    pub primary_key: String,
    pub mapping: Mapping,
}

impl ModifyRequest {
    #[must_use]
    pub fn new(op: ModifyOp, primary_key: &str, mapping: Mapping) -> Self {
        Self {
            op,
            primary_key: primary_key.to_string(),
            mapping,
        }
    }
}

impl<S: Storage> Slice<S> {
    pub fn get(&self, key: &StoreKey) -> Result<PointReadResponse, StoreError> {
        let location = self.acquire_for_read(key)?;
        let data = location.read_document()?.unwrap_or_default();
        Ok(PointReadResponse { data })
    }

    pub fn set(
        &mut self,
        key: &StoreKey,
        doc: &Document,
        overwrite: bool,
        timestamp: Recency,
    ) -> Result<PointWriteResult, StoreError> {
        let location = self.acquire_for_write(key)?;
        if location.value().is_some() && !overwrite {
            location.abandon();
            tracing::debug!("Set of {key} refused, key exists");
            return Ok(PointWriteResult::Duplicate);
        }
        location.write_document(Some(doc), timestamp)?;
        Ok(PointWriteResult::Stored)
    }

    pub fn delete(
        &mut self,
        key: &StoreKey,
        timestamp: Recency,
    ) -> Result<PointDeleteResult, StoreError> {
        let location = self.acquire_for_write(key)?;
        if location.value().is_none() {
            location.abandon();
            return Ok(PointDeleteResult::Missing);
        }
        location.write_document(None, timestamp)?;
        Ok(PointDeleteResult::Deleted)
    }

    /// Atomically evaluate `request` against the row at `key` and commit
    /// the outcome.
    ///
    /// Evaluation errors and rows that cannot be stored under `key` become
    /// [`ModifyResult::Error`] and leave the row as it was. Only store
    /// failures are returned as `Err`.
    pub fn modify(
        &mut self,
        key: &StoreKey,
        request: &ModifyRequest,
        env: &Environment,
        timestamp: Recency,
    ) -> Result<PointModifyResponse, StoreError> {
        let backtrace = Backtrace::new().with_frame("modify");
        let location = self.acquire_for_write(key)?;
        let current = location.read_document()?.unwrap_or_default();

        let outcome = match calculate_modify(
            request.op,
            &current,
            &request.primary_key,
            &request.mapping,
            env,
            &backtrace,
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                location.abandon();
                tracing::debug!("Modify of {key} failed: {e}");
                return Ok(PointModifyResponse {
                    result: ModifyResult::Error(e),
                });
            }
        };

        let rejection = match &outcome {
            ModifyOutcome::Inserted { row, primary_key } => {
                insert_rejection(row, primary_key, &request.primary_key, key)
            }
            ModifyOutcome::Modified { row, .. } => depth_rejection(row),
            _ => None,
        };
        if let Some(message) = rejection {
            location.abandon();
            tracing::debug!("Modify of {key} rejected: {message}");
            return Ok(PointModifyResponse {
                result: ModifyResult::Error(QueryError::new(message, &backtrace)),
            });
        }

        let result = match outcome {
            ModifyOutcome::Inserted { row, .. } => {
                location.write_document(Some(&row), timestamp)?;
                ModifyResult::Inserted
            }
            ModifyOutcome::Modified { row, .. } => {
                location.write_document(Some(&row), timestamp)?;
                ModifyResult::Modified
            }
            ModifyOutcome::Deleted => {
                location.write_document(None, timestamp)?;
                ModifyResult::Deleted
            }
            ModifyOutcome::Skipped => {
                location.abandon();
                ModifyResult::Skipped
            }
            ModifyOutcome::Nop => {
                location.abandon();
                ModifyResult::Nop
            }
        };
        Ok(PointModifyResponse { result })
    }
}

/// Why an inserted `row` cannot be stored under `key`, if it cannot.
fn insert_rejection(
    row: &Document,
    primary_key: &Document,
    field: &str,
    key: &StoreKey,
) -> Option<String> {
    match StoreKey::from_primary_key(primary_key) {
        Ok(derived) if derived == *key => depth_rejection(row),
        Ok(_) => Some(format!(
            "mutate can't change the primary key ({field}) when doing an insert of {row}"
        )),
        Err(e) => Some(format!("invalid primary key ({field}) {primary_key}: {e}")),
    }
}

fn depth_rejection(row: &Document) -> Option<String> {
    row.nests_deeper_than(MAX_NESTING_DEPTH)
        .then(|| format!("document nesting exceeds {MAX_NESTING_DEPTH} levels"))
}
