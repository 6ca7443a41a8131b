//! Decoding iterator over one tagged record stream.

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::event::decode;
use crate::tag::TagLine;
use crate::traits::{EventIterator, RecordSource, TaggedEvent};

/// Wraps a [`RecordSource`] with the tag line of its partition and decodes
/// records into events on demand.
pub struct LogEventIterator<S = Box<dyn RecordSource>> {
    tags: TagLine,
    source: S,
}

impl<S: RecordSource> LogEventIterator<S> {
    /// Wraps `source`, tagging every event it yields with `tags`.
    pub fn new(tags: TagLine, source: S) -> Self {
        Self { tags, source }
    }

    /// The tag line attached to every event.
    #[must_use]
    pub const fn tags(&self) -> &TagLine {
        &self.tags
    }

    /// Repositions the underlying source on its first record.
    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.source.rewind()
    }

    /// Unwraps the underlying source.
    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S: RecordSource> EventIterator for LogEventIterator<S> {
    fn advance(&mut self, token: &CancellationToken) -> Result<()> {
        self.source.advance(token);
        Ok(())
    }

    fn get(&mut self, token: &CancellationToken) -> Result<Option<TaggedEvent>> {
        let Some(record) = self.source.get(token)? else {
            return Ok(None);
        };
        let event = decode(&record)?;
        Ok(Some((event, self.tags.clone())))
    }
}
