//! Range scans with a transform chain and an optional terminal.
//!
//! The scan pulls entries from a lazy cursor in key order. Each document
//! runs through the transform chain; its outputs are either streamed back
//! with their key or folded into the terminal's accumulator.
//!
//! Stream mode is bounded: every streamed document adds an estimated size
//! to a running total, and once the total reaches the slice's chunk cap
//! the scan stops after the current key and reports `truncated`. The
//! caller resumes from just past `last_considered_key`. The estimate is
//! deliberately coarse; it bounds the chunk, not the exact bytes sent.

use crate::query::{Environment, QueryError, TerminalStep, TransformStep, apply_transforms};
use crate::signal::Interruptor;
use crate::slice::value::{self, ValueRef};
use crate::slice::{Slice, StoreError};
use crate::storage::Storage;
use crate::types::{Document, KeyRange, StoreKey};

/// Estimates how many bytes a streamed document adds to a response.
pub trait SizeEstimator: Send + Sync {
    fn estimate(&self, doc: &Document) -> u64;
}

/// Charges every document the same amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSizeEstimator(pub u64);

impl FixedSizeEstimator {
    pub const DEFAULT_DOCUMENT_SIZE: u64 = 250;
}

impl Default for FixedSizeEstimator {
    fn default() -> Self {
        Self(Self::DEFAULT_DOCUMENT_SIZE)
    }
}

impl SizeEstimator for FixedSizeEstimator {
    fn estimate(&self, _doc: &Document) -> u64 {
        self.0
    }
}

/// A range scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub range: KeyRange,
    pub transforms: Vec<TransformStep>,
    pub terminal: Option<TerminalStep>,
}

impl ScanRequest {
    #[must_use]
    pub const fn new(range: KeyRange) -> Self {
        Self {
            range,
            transforms: Vec::new(),
            terminal: None,
        }
    }

    #[must_use]
    pub fn with_transform(mut self, step: TransformStep) -> Self {
        self.transforms.push(step);
        self
    }

    #[must_use]
    pub fn with_terminal(mut self, terminal: TerminalStep) -> Self {
        self.terminal = Some(terminal);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanResult {
    /// Surviving documents tagged with the key they came from.
    Stream(Vec<(StoreKey, Document)>),
    /// The terminal's accumulated value.
    Terminal(Document),
    /// An evaluation error. Replaces any partial result.
    Error(QueryError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanResponse {
    pub result: ScanResult,
    /// The largest key examined so far. Starts at the range's left bound.
    pub last_considered_key: StoreKey,
    /// Whether a stream scan stopped at the chunk cap.
    pub truncated: bool,
}

impl<S: Storage> Slice<S> {
    /// Run a range scan.
    ///
    /// Store failures and interruption are returned as `Err`; evaluation
    /// errors are reported through [`ScanResult::Error`].
    pub fn scan(
        &self,
        request: &ScanRequest,
        env: &Environment,
        interruptor: &Interruptor,
    ) -> Result<ScanResponse, StoreError> {
        let mut response = ScanResponse {
            result: ScanResult::Stream(Vec::new()),
            last_considered_key: request.range.left.clone(),
            truncated: false,
        };

        let mut accumulator = match &request.terminal {
            None => None,
            Some(terminal) => match terminal.init(env) {
                Ok(acc) => Some(acc),
                Err(e) => {
                    response.result = ScanResult::Error(e);
                    return Ok(response);
                }
            },
        };

        let mut stream = Vec::new();
        let mut cumulative_size = 0u64;
        for entry in self.tree.cursor(&request.range)? {
            interruptor.check()?;
            let entry = entry?;
            if entry.key > response.last_considered_key {
                response.last_considered_key = entry.key.clone();
            }

            let doc = value::decode(self.storage(), &ValueRef::from_slot_bytes(&entry.value)?)?;
            let outputs = match apply_transforms(&request.transforms, env, doc) {
                Ok(outputs) => outputs,
                Err(e) => {
                    response.result = ScanResult::Error(e);
                    return Ok(response);
                }
            };

            if let (Some(terminal), Some(acc)) = (&request.terminal, accumulator.as_mut()) {
                for output in outputs {
                    if let Err(e) = terminal.fold(env, acc, output) {
                        response.result = ScanResult::Error(e);
                        return Ok(response);
                    }
                }
                continue;
            }

            for output in outputs {
                cumulative_size += self.estimator.estimate(&output);
                stream.push((entry.key.clone(), output));
            }
            if cumulative_size >= self.scan_chunk_size {
                response.truncated = true;
                tracing::debug!(
                    "Scan of {} truncated at {} after {} documents",
                    request.range,
                    response.last_considered_key,
                    stream.len()
                );
                break;
            }
        }

        response.result = match accumulator {
            Some(acc) => ScanResult::Terminal(acc),
            None => ScanResult::Stream(stream),
        };
        Ok(response)
    }
}
