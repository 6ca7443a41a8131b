//! Filtering iterator: exposes only the events a predicate accepts.
//!
//! The iterator is lazy. Construction does no I/O; the first `advance` or
//! `get` performs the forward seek to the first match. Errors met while
//! seeking are returned once and leave the iterator exhausted.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{QueryError, Result};
use crate::iterator::LogEventIterator;
use crate::lql::Predicate;
use crate::tag::TagLine;
use crate::traits::{EventIterator, RecordSource, TaggedEvent};

/// Timestamp window applied on top of a predicate.
///
/// Streams are expected in timestamp order, so reaching `end_before`
/// exhausts the iterator instead of scanning the rest of the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeBounds {
    /// Inclusive lower bound; earlier events are skipped.
    pub start_at: Option<i64>,
    /// Exclusive upper bound; the first event at or after it ends the stream.
    pub end_before: Option<i64>,
}

impl TimeBounds {
    /// Checks `ts` against the window, raised to `seek_to` when set.
    fn admits(&self, ts: i64, seek_to: Option<i64>) -> bool {
        self.start_at.max(seek_to).is_none_or(|start| ts >= start)
    }

    fn ends_at(&self, ts: i64) -> bool {
        self.end_before.is_some_and(|end| ts >= end)
    }
}

#[derive(Debug)]
enum State {
    Unpositioned,
    Positioned(TaggedEvent),
    Exhausted,
}

/// Wraps a [`LogEventIterator`] and skips events that do not match.
pub struct FilterIterator<S = Box<dyn RecordSource>> {
    inner: LogEventIterator<S>,
    predicate: Predicate,
    bounds: TimeBounds,
    /// Lower bound from the last `seek`; never widens `bounds`.
    seek_to: Option<i64>,
    state: State,
    scanned: u64,
    matched: u64,
}

impl<S: RecordSource> FilterIterator<S> {
    /// Filters `inner` with `predicate`.
    pub fn new(inner: LogEventIterator<S>, predicate: Predicate) -> Self {
        Self::with_bounds(inner, predicate, TimeBounds::default())
    }

    /// Filters `inner` with `predicate`, restricted to `bounds`.
    pub fn with_bounds(inner: LogEventIterator<S>, predicate: Predicate, bounds: TimeBounds) -> Self {
        Self {
            inner,
            predicate,
            bounds,
            seek_to: None,
            state: State::Unpositioned,
            scanned: 0,
            matched: 0,
        }
    }

    /// Returns true once the stream has ended (or failed).
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self.state, State::Exhausted)
    }

    /// The tag line of the underlying stream.
    #[must_use]
    pub const fn tags(&self) -> &TagLine {
        self.inner.tags()
    }

    /// Number of events decoded so far.
    #[must_use]
    pub const fn scanned(&self) -> u64 {
        self.scanned
    }

    /// Number of events that matched so far.
    #[must_use]
    pub const fn matched(&self) -> u64 {
        self.matched
    }

    /// The predicate this iterator applies.
    #[must_use]
    pub const fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Repositions on the first match at or after `timestamp`.
    ///
    /// The configured window still applies, so seeking before `start_at`
    /// lands on the first match at `start_at`. The seek itself is lazy; the
    /// next `get` or `advance` performs it.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::SeekUnsupported`] if the source cannot rewind,
    /// leaving the current position untouched.
    pub fn seek(&mut self, timestamp: i64) -> Result<()> {
        self.inner.rewind()?;
        self.seek_to = Some(timestamp);
        self.state = State::Unpositioned;
        Ok(())
    }

    /// Reads-and-advances until a match (positioned) or end-of-stream
    /// (exhausted). The current underlying record is examined first.
    fn seek_match(&mut self, token: &CancellationToken) -> Result<()> {
        loop {
            if token.is_cancelled() {
                return Err(QueryError::Cancelled);
            }

            let Some((event, tags)) = self.inner.get(token)? else {
                debug!(
                    tags = %self.inner.tags(),
                    scanned = self.scanned,
                    matched = self.matched,
                    "filter iterator reached end of stream"
                );
                self.state = State::Exhausted;
                return Ok(());
            };
            self.scanned += 1;

            if self.bounds.ends_at(event.timestamp()) {
                debug!(tags = %tags, ts = event.timestamp(), "filter iterator reached end bound");
                self.state = State::Exhausted;
                return Ok(());
            }

            if self.bounds.admits(event.timestamp(), self.seek_to) && self.predicate.matches(&event, &tags) {
                self.matched += 1;
                self.state = State::Positioned((event, tags));
                return Ok(());
            }

            self.inner.advance(token)?;
        }
    }

    /// Runs [`seek_match`](Self::seek_match), exhausting the iterator if it
    /// fails.
    fn reposition(&mut self, token: &CancellationToken) -> Result<()> {
        self.seek_match(token).inspect_err(|err| {
            match err {
                QueryError::Cancelled => {
                    debug!(tags = %self.inner.tags(), "filter iterator cancelled");
                }
                err => warn!(tags = %self.inner.tags(), error = %err, "filter iterator failed"),
            }
            self.state = State::Exhausted;
        })
    }
}

impl<S: RecordSource> EventIterator for FilterIterator<S> {
    /// Moves to the next match. From the unpositioned state this establishes
    /// the first match instead of skipping it.
    fn advance(&mut self, token: &CancellationToken) -> Result<()> {
        match self.state {
            State::Exhausted => Ok(()),
            State::Unpositioned => self.reposition(token),
            State::Positioned(_) => {
                self.state = State::Unpositioned;
                self.inner.advance(token)?;
                self.reposition(token)
            }
        }
    }

    /// Returns the current match without re-evaluating the predicate.
    fn get(&mut self, token: &CancellationToken) -> Result<Option<TaggedEvent>> {
        if matches!(self.state, State::Unpositioned) {
            self.reposition(token)?;
        }
        match &self.state {
            State::Positioned(current) => Ok(Some(current.clone())),
            _ => Ok(None),
        }
    }
}
