//! Cursor: a single time-ordered view over many filtered streams.
//!
//! This module provides:
//! - [`SourceBinding`] — a record source paired with its tag line
//! - [`CursorOptions`] — limit and time window for a query
//! - [`Cursor`] — k-way merge of filter iterators by timestamp
//! - [`CursorIter`] — `std::iter::Iterator` adapter over a cursor
//!
//! Events come out in ascending timestamp order. Ties go to the source
//! registered first. Each source is owned by exactly one filter iterator. A
//! drained source leaves the merge but stays owned so `seek` can replay it;
//! every source is dropped once the cursor is exhausted, fails, closes, or is
//! dropped.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{QueryError, Result};
use crate::filter::{FilterIterator, TimeBounds};
use crate::iterator::LogEventIterator;
use crate::lql::Predicate;
use crate::tag::TagLine;
use crate::traits::{EventIterator, RecordSource, TaggedEvent};

/// A record source and the tag line describing its partition.
pub struct SourceBinding {
    tags: TagLine,
    source: Box<dyn RecordSource>,
}

impl SourceBinding {
    /// Binds `source` to `tags`.
    pub fn new(tags: TagLine, source: impl RecordSource + 'static) -> Self {
        Self {
            tags,
            source: Box::new(source),
        }
    }

    /// Binds an already boxed source.
    #[must_use]
    pub fn boxed(tags: TagLine, source: Box<dyn RecordSource>) -> Self {
        Self { tags, source }
    }

    /// The tag line of this source.
    #[must_use]
    pub const fn tags(&self) -> &TagLine {
        &self.tags
    }
}

impl fmt::Debug for SourceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceBinding")
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// Options for a [`Cursor`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorOptions {
    /// Maximum number of events the cursor yields.
    pub limit: Option<usize>,
    /// Inclusive lower timestamp bound.
    pub start_at: Option<i64>,
    /// Exclusive upper timestamp bound.
    pub end_before: Option<i64>,
}

impl CursorOptions {
    /// Sets the maximum number of events yielded.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips events before `start_at`.
    #[must_use]
    pub const fn with_start_at(mut self, start_at: i64) -> Self {
        self.start_at = Some(start_at);
        self
    }

    /// Ends the cursor at the first event at or after `end_before`.
    #[must_use]
    pub const fn with_end_before(mut self, end_before: i64) -> Self {
        self.end_before = Some(end_before);
        self
    }

    fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start_at, self.end_before) {
            if end <= start {
                return Err(QueryError::InvalidOptions(format!(
                    "end_before ({end}) must be greater than start_at ({start})"
                )));
            }
        }
        Ok(())
    }

    const fn bounds(&self) -> TimeBounds {
        TimeBounds {
            start_at: self.start_at,
            end_before: self.end_before,
        }
    }
}

/// Counters describing the work a cursor has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CursorStats {
    /// Events decoded across all sources.
    pub scanned: u64,
    /// Events that passed the predicate and time window.
    pub matched: u64,
    /// Events the cursor has been positioned on.
    pub yielded: u64,
    /// Sources that can still produce events.
    pub live_sources: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No source has been read yet.
    Unprimed,
    /// The heap holds the head of every live source.
    Active,
    Exhausted,
    Closed,
}

/// Merges the matches of several sources into one timestamp-ordered stream.
///
/// The cursor is lazy: nothing is read until the first `get` or `advance`.
/// `get` returns the current event without moving; `advance` moves past it.
pub struct Cursor {
    iters: Vec<Option<FilterIterator>>,
    predicate: Predicate,
    /// Min-heap of `(head timestamp, registration index)`.
    heap: BinaryHeap<Reverse<(i64, usize)>>,
    state: State,
    limit: Option<usize>,
    yielded: u64,
    /// Counters carried over from released iterators.
    retired_scanned: u64,
    retired_matched: u64,
}

impl Cursor {
    /// Builds a cursor over `sources`, each filtered by `predicate` and the
    /// window in `options`.
    ///
    /// An empty source list yields a cursor that is immediately exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidOptions`] if `end_before` is not after
    /// `start_at`.
    pub fn new(sources: Vec<SourceBinding>, predicate: Predicate, options: &CursorOptions) -> Result<Self> {
        options.validate()?;

        let bounds = options.bounds();
        let iters: Vec<_> = sources
            .into_iter()
            .map(|binding| {
                let inner = LogEventIterator::new(binding.tags, binding.source);
                Some(FilterIterator::with_bounds(inner, predicate.clone(), bounds))
            })
            .collect();

        debug!(
            sources = iters.len(),
            predicate = %predicate,
            limit = ?options.limit,
            start_at = ?options.start_at,
            end_before = ?options.end_before,
            "cursor created"
        );

        Ok(Self {
            predicate,
            heap: BinaryHeap::with_capacity(iters.len()),
            iters,
            state: State::Unprimed,
            limit: options.limit,
            yielded: 0,
            retired_scanned: 0,
            retired_matched: 0,
        })
    }

    /// The predicate applied to every source.
    #[must_use]
    pub const fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Returns true once the cursor has no more events to yield.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self.state, State::Exhausted)
    }

    /// Returns true after [`close`](Self::close).
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// Current work counters.
    #[must_use]
    pub fn stats(&self) -> CursorStats {
        let live = self.iters.iter().flatten();
        CursorStats {
            scanned: self.retired_scanned + live.clone().map(FilterIterator::scanned).sum::<u64>(),
            matched: self.retired_matched + live.clone().map(FilterIterator::matched).sum::<u64>(),
            yielded: self.yielded,
            live_sources: live.filter(|it| !it.is_exhausted()).count(),
        }
    }

    /// Repositions every source on its first match at or after `timestamp`
    /// and rebuilds the merge.
    ///
    /// Sources that already drained are rewound too. The configured window
    /// still applies. Seeking an exhausted cursor is a no-op and it keeps
    /// returning end-of-stream. The limit keeps counting across seeks.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Closed`] after `close`. Any other failure,
    /// including [`QueryError::SeekUnsupported`], exhausts the cursor.
    pub fn seek(&mut self, timestamp: i64, token: &CancellationToken) -> Result<()> {
        match self.state {
            State::Closed => return Err(QueryError::Closed),
            State::Exhausted => return Ok(()),
            State::Unprimed | State::Active => {}
        }

        debug!(ts = timestamp, "cursor seek");
        for idx in 0..self.iters.len() {
            let Some(it) = self.iters[idx].as_mut() else {
                continue;
            };
            if let Err(err) = it.seek(timestamp) {
                return Err(self.fail(err));
            }
        }

        self.heap.clear();
        self.state = State::Unprimed;
        self.prime(token)
    }

    /// Releases every source. Later calls fail with [`QueryError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Closed`] if the cursor is already closed.
    pub fn close(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Err(QueryError::Closed);
        }
        self.release_all();
        self.state = State::Closed;
        debug!(yielded = self.yielded, "cursor closed");
        Ok(())
    }

    /// Iterates the remaining events, starting with the current one.
    pub fn iter<'a>(&'a mut self, token: &'a CancellationToken) -> CursorIter<'a> {
        CursorIter {
            cursor: self,
            token,
            started: false,
            done: false,
        }
    }

    /// Reads the head of every source and builds the heap.
    fn prime(&mut self, token: &CancellationToken) -> Result<()> {
        for idx in 0..self.iters.len() {
            if let Err(err) = self.refill(idx, token) {
                return Err(self.fail(err));
            }
        }
        self.state = State::Active;
        trace!(live = self.heap.len(), "cursor primed");
        self.settle();
        Ok(())
    }

    /// Pushes the head of source `idx` onto the heap. A drained source stays
    /// owned but off the heap.
    fn refill(&mut self, idx: usize, token: &CancellationToken) -> Result<()> {
        let Some(it) = self.iters[idx].as_mut() else {
            return Ok(());
        };
        match it.get(token)? {
            Some((event, _)) => self.heap.push(Reverse((event.timestamp(), idx))),
            None => trace!(source = idx, tags = %it.tags(), "source drained"),
        }
        Ok(())
    }

    /// Counts the new head against the limit, or exhausts the cursor when
    /// there is none left.
    fn settle(&mut self) {
        if self.heap.is_empty() {
            self.exhaust();
            return;
        }
        let limit_reached = self
            .limit
            .is_some_and(|limit| u64::try_from(limit).is_ok_and(|limit| self.yielded >= limit));
        if limit_reached {
            debug!(limit = ?self.limit, "cursor reached limit");
            self.exhaust();
            return;
        }
        self.yielded += 1;
    }

    fn exhaust(&mut self) {
        self.release_all();
        self.state = State::Exhausted;
        debug!(
            yielded = self.yielded,
            scanned = self.retired_scanned,
            matched = self.retired_matched,
            "cursor exhausted"
        );
    }

    /// Exhausts the cursor and hands back `err` for propagation.
    fn fail(&mut self, err: QueryError) -> QueryError {
        debug!(error = %err, "cursor failed");
        self.exhaust();
        err
    }

    fn release(&mut self, idx: usize) {
        if let Some(it) = self.iters[idx].take() {
            trace!(source = idx, tags = %it.tags(), "source released");
            self.retired_scanned += it.scanned();
            self.retired_matched += it.matched();
        }
    }

    fn release_all(&mut self) {
        self.heap.clear();
        for idx in 0..self.iters.len() {
            self.release(idx);
        }
    }

    fn head(&self) -> Option<usize> {
        self.heap.peek().map(|Reverse((_, idx))| *idx)
    }
}

impl EventIterator for Cursor {
    /// Moves past the current event. From a fresh cursor this establishes the
    /// first event instead of skipping it.
    fn advance(&mut self, token: &CancellationToken) -> Result<()> {
        match self.state {
            State::Closed => Err(QueryError::Closed),
            State::Exhausted => Ok(()),
            State::Unprimed => self.prime(token),
            State::Active => {
                let Some(Reverse((_, idx))) = self.heap.pop() else {
                    self.exhaust();
                    return Ok(());
                };
                let moved = match self.iters[idx].as_mut() {
                    Some(it) => it.advance(token),
                    None => Ok(()),
                };
                if let Err(err) = moved.and_then(|()| self.refill(idx, token)) {
                    return Err(self.fail(err));
                }
                self.settle();
                Ok(())
            }
        }
    }

    fn get(&mut self, token: &CancellationToken) -> Result<Option<TaggedEvent>> {
        if self.state == State::Unprimed {
            self.prime(token)?;
        }
        match self.state {
            State::Closed => Err(QueryError::Closed),
            State::Unprimed | State::Exhausted => Ok(None),
            State::Active => {
                let Some(idx) = self.head() else {
                    return Ok(None);
                };
                let Some(it) = self.iters[idx].as_mut() else {
                    return Ok(None);
                };
                let current = it.get(token);
                current.map_err(|err| self.fail(err))
            }
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("state", &self.state)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Iterator over the remaining events of a [`Cursor`].
///
/// Ends after end-of-stream or after yielding the first error.
pub struct CursorIter<'a> {
    cursor: &'a mut Cursor,
    token: &'a CancellationToken,
    started: bool,
    done: bool,
}

impl Iterator for CursorIter<'_> {
    type Item = Result<TaggedEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.started {
            if let Err(err) = self.cursor.advance(self.token) {
                self.done = true;
                return Some(Err(err));
            }
        }
        self.started = true;

        match self.cursor.get(self.token) {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
