//! Domain errors raised while evaluating user expressions.

use std::fmt;

/// Where in a query an error was raised, outermost frame first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backtrace {
    frames: Vec<String>,
}

impl Backtrace {
    #[must_use]
    pub const fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// A copy of this backtrace with one more frame.
    #[must_use]
    pub fn with_frame(&self, frame: impl Into<String>) -> Self {
        let mut frames = self.frames.clone();
        frames.push(frame.into());
        Self { frames }
    }

    #[must_use]
    pub fn frames(&self) -> &[String] {
        &self.frames
    }
}

impl fmt::Display for Backtrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.frames.is_empty() {
            return write!(f, "<root>");
        }
        write!(f, "{}", self.frames.join("/"))
    }
}

/// A recoverable, user-visible evaluation error.
///
/// These never abort a transaction: the operation that hit one reports it in
/// its response and leaves the store untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    pub message: String,
    pub backtrace: Backtrace,
}

impl QueryError {
    #[must_use]
    pub fn new(message: impl Into<String>, backtrace: &Backtrace) -> Self {
        Self {
            message: message.into(),
            backtrace: backtrace.clone(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {})", self.message, self.backtrace)
    }
}

impl std::error::Error for QueryError {}
