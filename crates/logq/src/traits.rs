//! Iterator contracts shared by the storage boundary and the query pipeline.
//!
//! Both traits use the same two-step protocol: `advance` moves to the next
//! element, `get` reads the current one without moving. `get` returning
//! `Ok(None)` is end-of-stream, the normal terminal signal.

use tokio_util::sync::CancellationToken;

use crate::error::{QueryError, Result};
use crate::event::{LogEvent, Record};
use crate::tag::TagLine;

/// An event together with the tag line of the stream it came from.
pub type TaggedEvent = (LogEvent, TagLine);

/// A stream of raw records supplied by the storage layer, one per partition.
///
/// A fresh source is positioned on its first record (if any).
pub trait RecordSource: Send {
    /// Moves to the next record. A no-op once the source is exhausted.
    fn advance(&mut self, token: &CancellationToken);

    /// Reads the current record, or `Ok(None)` at end-of-stream.
    ///
    /// # Errors
    ///
    /// Implementations return [`QueryError::Cancelled`] if `token` fires
    /// while they wait on storage, or any storage-specific failure.
    fn get(&mut self, token: &CancellationToken) -> Result<Option<Record>>;

    /// Repositions on the first record of the stream.
    ///
    /// # Errors
    ///
    /// The default implementation returns [`QueryError::SeekUnsupported`].
    fn rewind(&mut self) -> Result<()> {
        Err(QueryError::SeekUnsupported)
    }
}

impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    fn advance(&mut self, token: &CancellationToken) {
        (**self).advance(token);
    }

    fn get(&mut self, token: &CancellationToken) -> Result<Option<Record>> {
        (**self).get(token)
    }

    fn rewind(&mut self) -> Result<()> {
        (**self).rewind()
    }
}

/// A stream of decoded, tagged events.
///
/// Implemented by [`LogEventIterator`](crate::LogEventIterator),
/// [`FilterIterator`](crate::FilterIterator) and [`Cursor`](crate::Cursor).
pub trait EventIterator {
    /// Moves to the next event.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Cancelled`] or [`QueryError::Decode`] if they
    /// occur while searching for the next position.
    fn advance(&mut self, token: &CancellationToken) -> Result<()>;

    /// Reads the current event, or `Ok(None)` at end-of-stream.
    fn get(&mut self, token: &CancellationToken) -> Result<Option<TaggedEvent>>;
}
