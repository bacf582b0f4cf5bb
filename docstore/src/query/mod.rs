//! The narrow evaluator the store consumes: expressions over documents,
//! scan transform and terminal steps, and single-row modify decisions.
//!
//! Every evaluation failure is a [`QueryError`]: a user-visible diagnostic
//! that the calling operation stores in its response.

mod env;
mod error;
mod expr;
mod modify;
mod terminal;
mod transform;

pub use env::{Environment, Scope};
pub use error::{Backtrace, QueryError};
pub use expr::{Expr, Mapping, Reduction};
pub use modify::{ModifyOp, ModifyOutcome, calculate_modify};
pub use terminal::{TerminalOp, TerminalStep};
pub use transform::{TransformOp, TransformStep, apply_transforms};
