//! Variable scopes for expression evaluation.
//!
//! An [`Environment`] holds the read-only globals of a request. Each
//! evaluation layers local bindings on top of it with a [`Scope`]; locals
//! shadow globals and later bindings shadow earlier ones.

use std::collections::HashMap;

use crate::types::Document;

/// Read-only global variables shared by every evaluation in a request.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    globals: HashMap<String, Document>,
}

impl Environment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a global variable.
    #[must_use]
    pub fn with_global(mut self, name: impl Into<String>, value: Document) -> Self {
        self.globals.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Document> {
        self.globals.get(name)
    }

    /// A fresh scope over these globals.
    #[must_use]
    pub fn scope(&self) -> Scope<'_> {
        Scope {
            env: self,
            locals: Vec::new(),
        }
    }
}

/// Local bindings layered over an [`Environment`].
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    env: &'a Environment,
    locals: Vec<(String, Document)>,
}

impl Scope<'_> {
    /// Bind a local variable, shadowing any earlier binding of the same name.
    #[must_use]
    pub fn bind(mut self, name: &str, value: Document) -> Self {
        self.locals.push((name.to_string(), value));
        self
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Document> {
        self.locals
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| value)
            .or_else(|| self.env.get(name))
    }
}
