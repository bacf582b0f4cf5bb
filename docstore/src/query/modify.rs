//! Read-modify-write evaluation for a single row.
//!
//! [`calculate_modify`] decides what an atomic modify does to one row. It
//! never touches storage: the caller holds the row's write location, feeds
//! the current value in and commits whatever outcome comes back.

use crate::query::env::Environment;
use crate::query::error::{Backtrace, QueryError};
use crate::query::expr::{Mapping, expect_object};
use crate::types::Document;

/// How the mapping's result is combined with the current row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOp {
    /// Merge the mapping's object into an existing row.
    Update,
    /// Replace the row with the mapping's result. `null` deletes.
    Replace,
}

/// What a modify decided to do with the row.
#[derive(Debug, Clone, PartialEq)]
pub enum ModifyOutcome {
    Inserted { row: Document, primary_key: Document },
    Modified { row: Document, primary_key: Document },
    Deleted,
    /// The row was absent and the operation only applies to existing rows.
    Skipped,
    /// The row is left exactly as it was.
    Nop,
}

/// Evaluate `mapping` against `current` (`Document::Null` when the row is
/// absent) and decide the row's fate.
pub fn calculate_modify(
    op: ModifyOp,
    current: &Document,
    primary_key: &str,
    mapping: &Mapping,
    env: &Environment,
    backtrace: &Backtrace,
) -> Result<ModifyOutcome, QueryError> {
    let existing = match current {
        Document::Null => None,
        Document::Object(fields) => {
            let pk = fields.get(primary_key).cloned().ok_or_else(|| {
                QueryError::new(
                    format!("stored row has no primary key `{primary_key}`: {current}"),
                    backtrace,
                )
            })?;
            Some((fields, pk))
        }
        other => {
            return Err(QueryError::new(
                format!("stored row is not an OBJECT but {}", other.type_name()),
                backtrace,
            ));
        }
    };

    let result = mapping.apply(env, current.clone(), backtrace)?;
    match op {
        ModifyOp::Update => {
            let Some((fields, old_pk)) = existing else {
                return Ok(ModifyOutcome::Skipped);
            };
            let mut fields = fields.clone();
            fields.extend(expect_object(result, backtrace)?);
            finish_modified(current, Document::Object(fields), old_pk, primary_key, backtrace)
        }
        ModifyOp::Replace => match (existing, result) {
            (None, Document::Null) => Ok(ModifyOutcome::Nop),
            (Some(_), Document::Null) => Ok(ModifyOutcome::Deleted),
            (None, row @ Document::Object(_)) => {
                let pk = row.get_field(primary_key).cloned().ok_or_else(|| {
                    QueryError::new(
                        format!("inserted object must have primary key `{primary_key}`: {row}"),
                        backtrace,
                    )
                })?;
                Ok(ModifyOutcome::Inserted {
                    row,
                    primary_key: pk,
                })
            }
            (Some((_, old_pk)), row @ Document::Object(_)) => {
                finish_modified(current, row, old_pk, primary_key, backtrace)
            }
            (_, other) => Err(QueryError::new(
                format!(
                    "replace must return an OBJECT or NULL, got {}",
                    other.type_name()
                ),
                backtrace,
            )),
        },
    }
}

fn finish_modified(
    current: &Document,
    row: Document,
    old_pk: Document,
    primary_key: &str,
    backtrace: &Backtrace,
) -> Result<ModifyOutcome, QueryError> {
    if row.get_field(primary_key) != Some(&old_pk) {
        return Err(QueryError::new(
            format!("mutate can't change the primary key ({primary_key}) of {current} to {row}"),
            backtrace,
        ));
    }
    if &row == current {
        return Ok(ModifyOutcome::Nop);
    }
    Ok(ModifyOutcome::Modified {
        row,
        primary_key: old_pk,
    })
}
