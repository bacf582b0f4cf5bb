//! Per-document transform steps of a scan pipeline.

use crate::query::env::Environment;
use crate::query::error::{Backtrace, QueryError};
use crate::query::expr::Mapping;
use crate::types::Document;

/// What a transform step does to each input document.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOp {
    /// Replace the document with the mapping's result.
    Map(Mapping),
    /// Keep the document when the mapping returns `true`.
    Filter(Mapping),
    /// Replace the document with the elements of the array the mapping returns.
    ConcatMap(Mapping),
}

/// One step of a transform chain.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformStep {
    pub op: TransformOp,
    pub backtrace: Backtrace,
}

impl TransformStep {
    #[must_use]
    pub fn new(op: TransformOp) -> Self {
        let frame = match &op {
            TransformOp::Map(_) => "map",
            TransformOp::Filter(_) => "filter",
            TransformOp::ConcatMap(_) => "concat_map",
        };
        Self {
            op,
            backtrace: Backtrace::new().with_frame(frame),
        }
    }

    #[must_use]
    pub fn map(mapping: Mapping) -> Self {
        Self::new(TransformOp::Map(mapping))
    }

    #[must_use]
    pub fn filter(mapping: Mapping) -> Self {
        Self::new(TransformOp::Filter(mapping))
    }

    #[must_use]
    pub fn concat_map(mapping: Mapping) -> Self {
        Self::new(TransformOp::ConcatMap(mapping))
    }

    /// Apply the step to one document, producing zero or more documents.
    pub fn apply(&self, env: &Environment, doc: Document) -> Result<Vec<Document>, QueryError> {
        match &self.op {
            TransformOp::Map(mapping) => Ok(vec![mapping.apply(env, doc, &self.backtrace)?]),
            TransformOp::Filter(mapping) => {
                match mapping.apply(env, doc.clone(), &self.backtrace)? {
                    Document::Bool(true) => Ok(vec![doc]),
                    Document::Bool(false) => Ok(Vec::new()),
                    other => Err(QueryError::new(
                        format!("filter must return a BOOL, got {}", other.type_name()),
                        &self.backtrace,
                    )),
                }
            }
            TransformOp::ConcatMap(mapping) => match mapping.apply(env, doc, &self.backtrace)? {
                Document::Array(items) => Ok(items),
                other => Err(QueryError::new(
                    format!("concat_map must return an ARRAY, got {}", other.type_name()),
                    &self.backtrace,
                )),
            },
        }
    }
}

/// Run a document through every step in order. Each step's outputs become
/// the next step's inputs.
pub fn apply_transforms(
    steps: &[TransformStep],
    env: &Environment,
    doc: Document,
) -> Result<Vec<Document>, QueryError> {
    let mut data = vec![doc];
    for step in steps {
        let mut next = Vec::with_capacity(data.len());
        for item in data {
            next.extend(step.apply(env, item)?);
        }
        data = next;
    }
    Ok(data)
}
