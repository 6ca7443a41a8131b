//! # logq
//!
//! Query and cursor engine for aggregated, tagged log streams.
//!
//! This crate provides:
//!
//! - [`LogEvent`] — Timestamped log message with a compact binary encoding
//! - [`TagLine`] — Immutable key/value labels attached to a whole stream
//! - [`compile_expression`] — Compiles LQL filter text into a [`Predicate`]
//! - [`LogEventIterator`] — Decodes a [`RecordSource`] into tagged events
//! - [`FilterIterator`] — Exposes only the events a predicate accepts
//! - [`Cursor`] — Merges many filtered streams into one timestamp-ordered view
//! - [`MemorySource`] — In-memory [`RecordSource`] for tests and tailing
//!
//! ## Example
//!
//! ```rust
//! use logq::{
//!     compile_expression, Cursor, CursorOptions, EventIterator, LogEvent, MemorySource,
//!     SourceBinding, TagLine,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let web = MemorySource::from_events(&[
//!     LogEvent::new(1, "GET /index"),
//!     LogEvent::new(4, "GET /healthz"),
//! ]);
//! let db = MemorySource::from_events(&[LogEvent::new(2, "slow query")]);
//!
//! let sources = vec![
//!     SourceBinding::new(TagLine::parse("app=web")?, web),
//!     SourceBinding::new(TagLine::parse("app=db")?, db),
//! ];
//! let predicate = compile_expression("NOT msg contains 'healthz'")?;
//! let mut cursor = Cursor::new(sources, predicate, &CursorOptions::default())?;
//!
//! let token = CancellationToken::new();
//! let mut seen = Vec::new();
//! while let Some((event, tags)) = cursor.get(&token)? {
//!     seen.push(format!("{} {}", tags.get("app").unwrap_or("-"), event.message()));
//!     cursor.advance(&token)?;
//! }
//! assert_eq!(seen, ["web GET /index", "db slow query"]);
//! # Ok::<(), logq::QueryError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cursor;
pub mod error;
pub mod event;
pub mod filter;
pub mod iterator;
pub mod lql;
pub mod source;
pub mod tag;
pub mod traits;

// Re-export main types
pub use cursor::{Cursor, CursorIter, CursorOptions, CursorStats, SourceBinding};
pub use error::{QueryError, Result};
pub use event::{LogEvent, Record, decode, encode};
pub use filter::{FilterIterator, TimeBounds};
pub use iterator::LogEventIterator;
pub use lql::{CompileOptions, Predicate, compile_expression, compile_expression_with};
pub use source::{MemorySource, RecordBuffer};
pub use tag::TagLine;
pub use traits::{EventIterator, RecordSource, TaggedEvent};
