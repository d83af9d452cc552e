use std::cmp::Reverse;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

/// One pending firing in the due-job index.
///
/// Field order is the ordering: earliest `run_at` first, then `seq` so that
/// jobs due at the same instant fire in the order they were scheduled.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexEntry {
    pub run_at: DateTime<Utc>,
    pub seq: u64,
    pub job_id: String,
}

/// Min-heap of pending firings with lazy deletion.
///
/// Entries are never removed in place. Cancelling or rescheduling a job just
/// leaves its old entry behind; the caller validates each popped entry against
/// the job store and discards the stale ones.
#[derive(Debug, Default)]
pub struct DueIndex {
    heap: BinaryHeap<Reverse<IndexEntry>>,
    /// Monotonic, never reused.
    next_seq: u64,
}

impl DueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a firing of `job_id` at `run_at`. Returns the tie-break sequence.
    pub fn push(&mut self, run_at: DateTime<Utc>, job_id: &str) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(IndexEntry { run_at, seq, job_id: job_id.to_string() }));
        seq
    }

    /// Earliest entry, valid or not.
    pub fn peek(&self) -> Option<&IndexEntry> {
        self.heap.peek().map(|Reverse(e)| e)
    }

    /// Pop the earliest entry if it is due at `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<IndexEntry> {
        if self.peek()?.run_at > now {
            return None;
        }
        self.heap.pop().map(|Reverse(e)| e)
    }

    /// Raw entry count, stale duplicates included.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
