//! Reducing terminals of a scan pipeline.

use crate::query::env::Environment;
use crate::query::error::{Backtrace, QueryError};
use crate::query::expr::{Expr, Mapping, Reduction, add};
use crate::types::Document;

/// How a terminal folds documents into one result.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalOp {
    /// Number of documents.
    Count,
    /// Sum of the mapping over every document.
    Sum(Mapping),
    /// Fold every document into `base` with `reduction`.
    Reduce { base: Expr, reduction: Reduction },
    /// Fold per group. The result is an array of `[group, value]` pairs in
    /// first-seen order.
    GroupedMapReduce {
        group: Mapping,
        mapping: Mapping,
        base: Expr,
        reduction: Reduction,
    },
}

/// A terminal with its diagnostic backtrace.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalStep {
    pub op: TerminalOp,
    pub backtrace: Backtrace,
}

impl TerminalStep {
    #[must_use]
    pub fn new(op: TerminalOp) -> Self {
        let frame = match &op {
            TerminalOp::Count => "count",
            TerminalOp::Sum(_) => "sum",
            TerminalOp::Reduce { .. } => "reduce",
            TerminalOp::GroupedMapReduce { .. } => "grouped_map_reduce",
        };
        Self {
            op,
            backtrace: Backtrace::new().with_frame(frame),
        }
    }

    /// The accumulator before any document has been seen.
    pub fn init(&self, env: &Environment) -> Result<Document, QueryError> {
        match &self.op {
            TerminalOp::Count | TerminalOp::Sum(_) => Ok(Document::Number(0.0)),
            TerminalOp::Reduce { base, .. } => base.eval(&env.scope(), &self.backtrace),
            TerminalOp::GroupedMapReduce { base, .. } => {
                // Evaluated now so a broken base fails before the traversal.
                base.eval(&env.scope(), &self.backtrace)?;
                Ok(Document::Array(Vec::new()))
            }
        }
    }

    /// Fold one document into the accumulator.
    pub fn fold(
        &self,
        env: &Environment,
        acc: &mut Document,
        doc: Document,
    ) -> Result<(), QueryError> {
        let bt = &self.backtrace;
        match &self.op {
            TerminalOp::Count => {
                *acc = add(std::mem::take(acc), Document::Number(1.0), bt)?;
            }
            TerminalOp::Sum(mapping) => {
                let value = mapping.apply(env, doc, bt)?;
                if value.as_number().is_none() {
                    return Err(QueryError::new(
                        format!("sum expects NUMBER values, got {}", value.type_name()),
                        bt,
                    ));
                }
                *acc = add(std::mem::take(acc), value, bt)?;
            }
            TerminalOp::Reduce { reduction, .. } => {
                *acc = reduction.apply(env, std::mem::take(acc), doc, bt)?;
            }
            TerminalOp::GroupedMapReduce {
                group,
                mapping,
                base,
                reduction,
            } => {
                let key = group.apply(env, doc.clone(), bt)?;
                let value = mapping.apply(env, doc, bt)?;
                let Document::Array(groups) = acc else {
                    return Err(QueryError::new("grouped accumulator is not an ARRAY", bt));
                };

                let slot = groups.iter_mut().find_map(|pair| match pair {
                    Document::Array(kv) if kv.len() == 2 && kv[0] == key => Some(&mut kv[1]),
                    _ => None,
                });
                match slot {
                    Some(current) => {
                        *current = reduction.apply(env, std::mem::take(current), value, bt)?;
                    }
                    None => {
                        let start = base.eval(&env.scope(), bt)?;
                        let reduced = reduction.apply(env, start, value, bt)?;
                        groups.push(Document::Array(vec![key, reduced]));
                    }
                }
            }
        }
        Ok(())
    }
}
