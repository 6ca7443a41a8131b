//! In-memory record sources.
//!
//! This module provides:
//! - [`RecordBuffer`] — Thread-safe, append-only buffer of encoded records
//! - [`MemorySource`] — [`RecordSource`] reading a buffer front to back

use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::event::{LogEvent, Record, encode};
use crate::traits::RecordSource;

/// Shared, append-only buffer of encoded records.
///
/// Clones refer to the same buffer, so a writer can keep appending while
/// any number of [`MemorySource`] readers iterate it.
#[derive(Debug, Clone, Default)]
pub struct RecordBuffer {
    records: Arc<RwLock<Vec<Record>>>,
}

impl RecordBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a raw record.
    pub fn push(&self, record: Record) {
        self.records.write().push(record);
    }

    /// Encodes and appends an event.
    pub fn append(&self, event: &LogEvent) {
        self.push(encode(event));
    }

    /// Number of records in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the buffer holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Opens a reader positioned on the first record.
    #[must_use]
    pub fn reader(&self) -> MemorySource {
        MemorySource {
            buffer: self.clone(),
            idx: 0,
        }
    }
}

/// Reads records from a [`RecordBuffer`] in insertion order.
///
/// Records appended after the reader reached the end become visible again
/// on the next `get`, which makes a memory source usable for tailing.
#[derive(Debug, Clone)]
pub struct MemorySource {
    buffer: RecordBuffer,
    idx: usize,
}

impl MemorySource {
    /// Creates a source over a private buffer holding `records`.
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        RecordBuffer {
            records: Arc::new(RwLock::new(records)),
        }
        .reader()
    }

    /// Creates a source over encoded copies of `events`.
    #[must_use]
    pub fn from_events(events: &[LogEvent]) -> Self {
        Self::new(events.iter().map(encode).collect())
    }

    /// Index of the current record.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.idx
    }
}

impl RecordSource for MemorySource {
    fn advance(&mut self, _token: &CancellationToken) {
        if self.idx < self.buffer.len() {
            self.idx += 1;
        }
    }

    fn get(&mut self, _token: &CancellationToken) -> Result<Option<Record>> {
        Ok(self.buffer.records.read().get(self.idx).cloned())
    }

    fn rewind(&mut self) -> Result<()> {
        self.idx = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::decode;

    #[test]
    fn reads_in_order_then_ends() {
        let token = CancellationToken::new();
        let mut source = MemorySource::from_events(&[LogEvent::new(1, "a"), LogEvent::new(2, "b")]);

        let first = source.get(&token).expect("get").expect("record");
        assert_eq!(decode(&first), Ok(LogEvent::new(1, "a")));
        source.advance(&token);
        assert_eq!(source.position(), 1);
        source.advance(&token);
        assert_eq!(source.get(&token), Ok(None));

        // Advancing past the end is a no-op.
        source.advance(&token);
        assert_eq!(source.position(), 2);
    }

    #[test]
    fn rewind_restarts() {
        let token = CancellationToken::new();
        let mut source = MemorySource::from_events(&[LogEvent::new(1, "a")]);
        source.advance(&token);
        assert_eq!(source.get(&token), Ok(None));

        source.rewind().expect("rewind");
        assert!(source.get(&token).expect("get").is_some());
    }

    #[test]
    fn readers_see_appends() {
        let token = CancellationToken::new();
        let buffer = RecordBuffer::new();
        let mut reader = buffer.reader();
        assert_eq!(reader.get(&token), Ok(None));

        buffer.append(&LogEvent::new(5, "late"));
        assert_eq!(buffer.len(), 1);
        let record = reader.get(&token).expect("get").expect("record");
        assert_eq!(decode(&record), Ok(LogEvent::new(5, "late")));
    }

    #[test]
    fn readers_are_independent() {
        let token = CancellationToken::new();
        let buffer = RecordBuffer::new();
        buffer.append(&LogEvent::new(1, "a"));
        buffer.append(&LogEvent::new(2, "b"));

        let mut first = buffer.reader();
        let second = buffer.reader();
        first.advance(&token);
        assert_eq!(first.position(), 1);
        assert_eq!(second.position(), 0);
    }

    #[test]
    fn concurrent_append_and_read() {
        let buffer = RecordBuffer::new();
        let writer = buffer.clone();

        let handle = std::thread::spawn(move || {
            for i in 0..100 {
                writer.append(&LogEvent::new(i, "x"));
            }
        });
        handle.join().expect("writer thread");

        let token = CancellationToken::new();
        let mut reader = buffer.reader();
        let mut count = 0;
        while reader.get(&token).expect("get").is_some() {
            count += 1;
            reader.advance(&token);
        }
        assert_eq!(count, 100);
    }
}
