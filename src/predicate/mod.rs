//! Side-effect-free predicate language used by `pattern-where`
//!
//! A predicate is a single expression over the metavariables bound in a
//! range. Each metavariable name (`$X`) is in scope as a string, and `vars`
//! maps every name to its text:
//!
//! ```text
//! int($N) > 10 and not $FUNC.startswith("test_")
//! vars["$X"] in "abc" or len($Y) == 0
//! ```
//!
//! The language has no assignment, loops or I/O, so evaluation always
//! terminates.

mod interpreter;
mod lexer;
mod parser;
mod value;

pub use parser::{ArithOp, CompareOp, Expr};
pub use value::{Scope, Value};

use std::str::FromStr;
use thiserror::Error;

/// Error from parsing or evaluating a predicate
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredicateError {
    #[error("syntax error at offset {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("name '{0}' is not defined")]
    UnboundVariable(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },
}

impl PredicateError {
    /// Whether this is a syntax error rather than a runtime failure
    pub fn is_syntax(&self) -> bool {
        matches!(self, PredicateError::Parse { .. })
    }
}

/// A parsed predicate, ready to be evaluated against many scopes
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    source: String,
    expr: Expr,
}

impl Predicate {
    pub fn parse(source: &str) -> Result<Self, PredicateError> {
        Ok(Self {
            source: source.to_string(),
            expr: parser::parse(source.trim())?,
        })
    }

    pub fn evaluate(&self, scope: &Scope) -> Result<Value, PredicateError> {
        interpreter::eval(&self.expr, scope)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl FromStr for Predicate {
    type Err = PredicateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Predicate::parse(s)
    }
}
