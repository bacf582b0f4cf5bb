//! A small expression language over documents.

use std::collections::BTreeMap;

use crate::query::env::{Environment, Scope};
use crate::query::error::{Backtrace, QueryError};
use crate::types::Document;

/// An expression evaluated against a [`Scope`].
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Document),
    Var(String),
    /// Field of an object.
    GetAttr(Box<Expr>, String),
    /// Whether an object has a field.
    HasAttr(Box<Expr>, String),
    MakeObject(Vec<(String, Expr)>),
    MakeArray(Vec<Expr>),
    /// Fields of the right object override those of the left.
    Merge(Box<Expr>, Box<Expr>),
    /// Numbers add, strings and arrays concatenate.
    Add(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    /// Raise a user error.
    Error(String),
}

impl Expr {
    #[must_use]
    pub fn lit(value: impl Into<Document>) -> Self {
        Self::Literal(value.into())
    }

    #[must_use]
    pub fn var(name: &str) -> Self {
        Self::Var(name.to_string())
    }

    #[must_use]
    pub fn get_attr(self, field: &str) -> Self {
        Self::GetAttr(Box::new(self), field.to_string())
    }

    #[must_use]
    pub fn has_attr(self, field: &str) -> Self {
        Self::HasAttr(Box::new(self), field.to_string())
    }

    #[must_use]
    pub fn object<'a>(fields: impl IntoIterator<Item = (&'a str, Self)>) -> Self {
        Self::MakeObject(
            fields
                .into_iter()
                .map(|(name, expr)| (name.to_string(), expr))
                .collect(),
        )
    }

    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self::Merge(Box::new(self), Box::new(other))
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn add(self, other: Self) -> Self {
        Self::Add(Box::new(self), Box::new(other))
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn eq(self, other: Self) -> Self {
        Self::Eq(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn lt(self, other: Self) -> Self {
        Self::Lt(Box::new(self), Box::new(other))
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// Evaluate the expression.
    pub fn eval(&self, scope: &Scope<'_>, backtrace: &Backtrace) -> Result<Document, QueryError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Var(name) => scope.lookup(name).cloned().ok_or_else(|| {
                QueryError::new(format!("variable `{name}` is not in scope"), backtrace)
            }),
            Self::GetAttr(target, field) => {
                let target = target.eval(scope, &backtrace.with_frame(field.as_str()))?;
                let fields = expect_object(target, backtrace)?;
                fields.get(field).cloned().ok_or_else(|| {
                    QueryError::new(format!("object has no attribute `{field}`"), backtrace)
                })
            }
            Self::HasAttr(target, field) => {
                let fields = expect_object(target.eval(scope, backtrace)?, backtrace)?;
                Ok(Document::Bool(fields.contains_key(field)))
            }
            Self::MakeObject(fields) => {
                let mut out = BTreeMap::new();
                for (name, expr) in fields {
                    let value = expr.eval(scope, &backtrace.with_frame(name.as_str()))?;
                    out.insert(name.clone(), value);
                }
                Ok(Document::Object(out))
            }
            Self::MakeArray(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| item.eval(scope, &backtrace.with_frame(i.to_string())))
                .collect::<Result<Vec<_>, _>>()
                .map(Document::Array),
            Self::Merge(left, right) => {
                let mut fields = expect_object(left.eval(scope, backtrace)?, backtrace)?;
                fields.extend(expect_object(right.eval(scope, backtrace)?, backtrace)?);
                Ok(Document::Object(fields))
            }
            Self::Add(left, right) => add(
                left.eval(scope, backtrace)?,
                right.eval(scope, backtrace)?,
                backtrace,
            ),
            Self::Eq(left, right) => Ok(Document::Bool(
                left.eval(scope, backtrace)? == right.eval(scope, backtrace)?,
            )),
            Self::Lt(left, right) => {
                match (left.eval(scope, backtrace)?, right.eval(scope, backtrace)?) {
                    (Document::Number(a), Document::Number(b)) => Ok(Document::Bool(a < b)),
                    (Document::String(a), Document::String(b)) => Ok(Document::Bool(a < b)),
                    (a, b) => Err(QueryError::new(
                        format!("cannot compare {} and {}", a.type_name(), b.type_name()),
                        backtrace,
                    )),
                }
            }
            Self::Not(inner) => Ok(Document::Bool(!expect_bool(
                inner.eval(scope, backtrace)?,
                backtrace,
            )?)),
            Self::And(left, right) => {
                if !expect_bool(left.eval(scope, backtrace)?, backtrace)? {
                    return Ok(Document::Bool(false));
                }
                Ok(Document::Bool(expect_bool(
                    right.eval(scope, backtrace)?,
                    backtrace,
                )?))
            }
            Self::Error(message) => Err(QueryError::new(message.as_str(), backtrace)),
        }
    }
}

/// A one-argument function: `arg => body`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    pub arg: String,
    pub body: Expr,
}

impl Mapping {
    #[must_use]
    pub fn new(arg: &str, body: Expr) -> Self {
        Self {
            arg: arg.to_string(),
            body,
        }
    }

    /// The identity mapping.
    #[must_use]
    pub fn identity() -> Self {
        Self::new("row", Expr::var("row"))
    }

    pub fn apply(
        &self,
        env: &Environment,
        value: Document,
        backtrace: &Backtrace,
    ) -> Result<Document, QueryError> {
        let scope = env.scope().bind(&self.arg, value);
        self.body.eval(&scope, backtrace)
    }
}

/// A two-argument function used to combine an accumulator with a value.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub acc: String,
    pub value: String,
    pub body: Expr,
}

impl Reduction {
    #[must_use]
    pub fn new(acc: &str, value: &str, body: Expr) -> Self {
        Self {
            acc: acc.to_string(),
            value: value.to_string(),
            body,
        }
    }

    pub fn apply(
        &self,
        env: &Environment,
        acc: Document,
        value: Document,
        backtrace: &Backtrace,
    ) -> Result<Document, QueryError> {
        let scope = env.scope().bind(&self.acc, acc).bind(&self.value, value);
        self.body.eval(&scope, backtrace)
    }
}

pub(crate) fn expect_object(
    value: Document,
    backtrace: &Backtrace,
) -> Result<BTreeMap<String, Document>, QueryError> {
    match value {
        Document::Object(fields) => Ok(fields),
        other => Err(QueryError::new(
            format!("expected type OBJECT but found {}", other.type_name()),
            backtrace,
        )),
    }
}

fn expect_bool(value: Document, backtrace: &Backtrace) -> Result<bool, QueryError> {
    value.as_bool().ok_or_else(|| {
        QueryError::new(
            format!("expected type BOOL but found {}", value.type_name()),
            backtrace,
        )
    })
}

pub(crate) fn add(
    left: Document,
    right: Document,
    backtrace: &Backtrace,
) -> Result<Document, QueryError> {
    match (left, right) {
        (Document::Number(a), Document::Number(b)) => Ok(Document::Number(a + b)),
        (Document::String(a), Document::String(b)) => Ok(Document::String(a + &b)),
        (Document::Array(mut a), Document::Array(b)) => {
            a.extend(b);
            Ok(Document::Array(a))
        }
        (a, b) => Err(QueryError::new(
            format!("cannot add {} and {}", a.type_name(), b.type_name()),
            backtrace,
        )),
    }
}
