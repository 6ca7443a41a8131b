//! Error types for the query engine.
//!
//! End-of-stream is deliberately absent: every `get` in this crate reports it
//! as `Ok(None)`, so it cannot be confused with a failure at any layer.

use thiserror::Error;

/// Errors that can occur while compiling a query or iterating a cursor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The expression text is malformed.
    #[error("syntax error at position {position} in `{expr}`: {message}")]
    Syntax {
        /// The offending expression text.
        expr: String,
        /// Byte offset of the error in `expr`.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// An operator was applied to an incompatible field/literal combination.
    #[error("type error at position {position} in `{expr}`: {message}")]
    Type {
        /// The offending expression text.
        expr: String,
        /// Byte offset of the comparison in `expr`.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// A tag line could not be parsed.
    #[error("tag syntax error at position {position} in `{line}`: {message}")]
    TagSyntax {
        /// The offending tag line text.
        line: String,
        /// Byte offset of the error in `line`.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// A raw record could not be decoded into a log event.
    #[error("decode error: {0}")]
    Decode(String),

    /// The caller's cancellation token fired mid-operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The cursor was used after `close`.
    #[error("cursor is closed")]
    Closed,

    /// The record source cannot be repositioned.
    #[error("record source does not support seeking")]
    SeekUnsupported,

    /// Cursor options describe an empty or contradictory window.
    #[error("invalid cursor options: {0}")]
    InvalidOptions(String),

    /// A marshal buffer did not have the exact encoded size.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize {
        /// Bytes the encoding occupies.
        expected: usize,
        /// Bytes the caller supplied.
        actual: usize,
    },
}

impl QueryError {
    /// Returns true for errors raised while setting up a query
    /// (expression compilation or tag line parsing).
    #[must_use]
    pub const fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Self::Syntax { .. } | Self::Type { .. } | Self::TagSyntax { .. }
        )
    }

    /// Returns the byte position carried by a compile error, if any.
    #[must_use]
    pub const fn position(&self) -> Option<usize> {
        match self {
            Self::Syntax { position, .. }
            | Self::Type { position, .. }
            | Self::TagSyntax { position, .. } => Some(*position),
            _ => None,
        }
    }
}

/// Result type alias for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;
