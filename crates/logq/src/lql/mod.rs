//! The log query language (LQL): filter expressions over events and tags.
//!
//! ```text
//! ts = 4 OR msg contains 'asdf'
//! host = 'a' AND NOT (level = 'debug' OR msg contains 'healthz')
//! ts >= '2024-05-01T00:00:00Z' AND ts < '2024-05-02T00:00:00Z'
//! ```
//!
//! `ts` binds to the event timestamp, `msg` to the message, and any other
//! identifier to a tag of the event's stream.

pub mod ast;
pub mod eval;
mod lexer;
mod parser;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::Result;
use crate::event::LogEvent;
use crate::tag::TagLine;

pub use ast::{CmpOp, Comparison, Expr, Field, Value};
pub use eval::{EventFields, FieldSource};

/// Limits applied while compiling an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Longest accepted expression text, in bytes.
    pub max_length: usize,
    /// Deepest accepted nesting of parentheses and `NOT`.
    pub max_depth: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_length: 4096,
            max_depth: 64,
        }
    }
}

impl CompileOptions {
    /// Sets the maximum expression length.
    #[must_use]
    pub const fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Sets the maximum nesting depth.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// A compiled, immutable filter.
///
/// Clones share the same tree, so one predicate can back any number of
/// iterators, including across threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    root: Arc<Expr>,
}

impl Predicate {
    /// A predicate that matches every event.
    #[must_use]
    pub fn always() -> Self {
        Self::from_expr(Expr::All)
    }

    /// Wraps an already-built tree.
    #[must_use]
    pub fn from_expr(expr: Expr) -> Self {
        Self {
            root: Arc::new(expr),
        }
    }

    /// The predicate tree.
    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.root
    }

    /// Returns true if this predicate accepts every event.
    #[must_use]
    pub fn is_always(&self) -> bool {
        matches!(*self.root, Expr::All)
    }

    /// Tests an event from a stream with the given tag line.
    #[must_use]
    pub fn matches(&self, event: &LogEvent, tags: &TagLine) -> bool {
        self.root.evaluate(&EventFields { event, tags })
    }

    /// Tests arbitrary field values.
    pub fn evaluate<F: FieldSource + ?Sized>(&self, fields: &F) -> bool {
        self.root.evaluate(fields)
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Self::always()
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.root, f)
    }
}

/// Compiles an expression with default [`CompileOptions`].
///
/// # Errors
///
/// Returns [`QueryError::Syntax`](crate::QueryError::Syntax) for malformed
/// text and [`QueryError::Type`](crate::QueryError::Type) for operators
/// applied to incompatible fields or literals.
pub fn compile_expression(text: &str) -> Result<Predicate> {
    compile_expression_with(text, &CompileOptions::default())
}

/// Compiles an expression with explicit limits.
///
/// # Errors
///
/// See [`compile_expression`].
pub fn compile_expression_with(text: &str, options: &CompileOptions) -> Result<Predicate> {
    let expr = parser::parse(text, options)?;
    trace!(expr = %expr, "compiled expression");
    Ok(Predicate::from_expr(expr))
}
