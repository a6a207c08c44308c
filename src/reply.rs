//! Reply correlation: the serial → callback table, and the timeout min-heap
//! that lets an expired call be found and fired in O(log n).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::message::Message;

/// No call made with an explicit timeout waits longer than this by default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25);

/// A pending reply. `callback` is invoked exactly once: with the matching
/// reply, or with a synthesized `Timeout` error, or never if cancelled first.
pub struct ReplyCallback<F> {
    pub serial: u32,
    pub deadline: Option<Instant>,
    callback: F,
}

struct HeapEntry {
    serial: u32,
    deadline: Instant,
}

/// Min-heap of pending deadlines. Entries with no deadline (`timeout =
/// infinite`) never enter the heap at all — they only live in the table.
struct TimeoutHeap {
    entries: Vec<HeapEntry>,
}

impl TimeoutHeap {
    fn new() -> Self { TimeoutHeap { entries: Vec::new() } }

    fn swap(&mut self, table: &mut HashMap<u32, usize>, i: usize, j: usize) {
        self.entries.swap(i, j);
        table.insert(self.entries[i].serial, i);
        table.insert(self.entries[j].serial, j);
    }

    fn sift_up(&mut self, table: &mut HashMap<u32, usize>, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.entries[i].deadline < self.entries[parent].deadline {
                self.swap(table, i, parent);
                i = parent;
            } else { break; }
        }
    }

    fn sift_down(&mut self, table: &mut HashMap<u32, usize>, mut i: usize) {
        loop {
            let (l, r) = (2 * i + 1, 2 * i + 2);
            let mut smallest = i;
            if l < self.entries.len() && self.entries[l].deadline < self.entries[smallest].deadline { smallest = l; }
            if r < self.entries.len() && self.entries[r].deadline < self.entries[smallest].deadline { smallest = r; }
            if smallest == i { break; }
            self.swap(table, i, smallest);
            i = smallest;
        }
    }

    fn push(&mut self, table: &mut HashMap<u32, usize>, serial: u32, deadline: Instant) -> usize {
        let i = self.entries.len();
        self.entries.push(HeapEntry { serial, deadline });
        table.insert(serial, i);
        self.sift_up(table, i);
        table[&serial]
    }

    fn remove(&mut self, table: &mut HashMap<u32, usize>, index: usize) {
        let last = self.entries.len() - 1;
        table.remove(&self.entries[index].serial);
        if index != last {
            self.swap(table, index, last);
        }
        self.entries.pop();
        if index < self.entries.len() {
            self.sift_down(table, index);
            self.sift_up(table, index);
        }
    }

    fn peek_expired(&self, now: Instant) -> Option<u32> {
        self.entries.first().filter(|e| e.deadline <= now).map(|e| e.serial)
    }

    fn earliest_deadline(&self) -> Option<Instant> {
        self.entries.first().map(|e| e.deadline)
    }
}

/// The connection's reply table: maps outgoing serial to its pending
/// callback, and tracks timeouts via a parallel min-heap.
pub struct ReplyTable<F> {
    entries: HashMap<u32, ReplyCallback<F>>,
    heap: TimeoutHeap,
    heap_index: HashMap<u32, usize>,
}

impl<F> Default for ReplyTable<F> {
    fn default() -> Self {
        ReplyTable { entries: HashMap::new(), heap: TimeoutHeap::new(), heap_index: HashMap::new() }
    }
}

impl<F> ReplyTable<F> {
    /// Registers a pending call. `deadline = None` means "infinite" (never times out).
    pub fn insert(&mut self, serial: u32, callback: F, deadline: Option<Instant>) {
        if let Some(d) = deadline {
            self.heap.push(&mut self.heap_index, serial, d);
        }
        self.entries.insert(serial, ReplyCallback { serial, deadline, callback });
    }

    /// Removes and returns a pending callback (on match or explicit cancel).
    /// Idempotent: returns `None` if the serial was already matched/cancelled/timed out.
    pub fn remove(&mut self, serial: u32) -> Option<F> {
        let entry = self.entries.remove(&serial)?;
        if let Some(idx) = self.heap_index.get(&serial).copied() {
            self.heap.remove(&mut self.heap_index, idx);
        }
        Some(entry.callback)
    }

    pub fn contains(&self, serial: u32) -> bool { self.entries.contains_key(&serial) }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// If the earliest deadline has passed, removes and returns that entry's
    /// serial and callback so the caller can synthesize a `Timeout` error
    /// reply and invoke it. Pops at most one entry per call, mirroring
    /// `process_timeout`'s "one expiration per dispatch iteration" rule.
    pub fn pop_expired(&mut self, now: Instant) -> Option<(u32, F)> {
        let serial = self.heap.peek_expired(now)?;
        let idx = *self.heap_index.get(&serial)?;
        self.heap.remove(&mut self.heap_index, idx);
        let entry = self.entries.remove(&serial)?;
        Some((serial, entry.callback))
    }

    /// Earliest pending deadline, for `get_timeout`.
    pub fn earliest_deadline(&self) -> Option<Instant> { self.heap.earliest_deadline() }

    pub fn deadline_for(&self, serial: u32) -> Option<Instant> {
        self.entries.get(&serial).and_then(|e| e.deadline)
    }
}

/// Builds the synthesized `Timeout` error message for an expired call,
/// correlated to the original call's serial.
pub fn timeout_message(call_serial: u32) -> Message {
    Message::error_for_reply(call_serial, crate::error::names::TIMEOUT, "Did not receive a reply in time")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fires_exactly_one_expired_entry_per_call() {
        let mut t: ReplyTable<u32> = ReplyTable::default();
        let now = Instant::now();
        t.insert(1, 10, Some(now));
        t.insert(2, 20, Some(now));
        let first = t.pop_expired(now + Duration::from_millis(1));
        assert!(first.is_some());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn infinite_timeout_never_expires() {
        let mut t: ReplyTable<u32> = ReplyTable::default();
        t.insert(1, 10, None);
        assert!(t.pop_expired(Instant::now() + Duration::from_secs(1_000_000)).is_none());
        assert_eq!(t.earliest_deadline(), None);
    }

    #[test]
    fn cancel_before_timeout_prevents_firing() {
        let mut t: ReplyTable<u32> = ReplyTable::default();
        let now = Instant::now();
        t.insert(1, 10, Some(now));
        assert_eq!(t.remove(1), Some(10));
        assert!(t.pop_expired(now + Duration::from_secs(1)).is_none());
        assert_eq!(t.remove(1), None);
    }

    #[test]
    fn removal_keeps_heap_consistent() {
        let mut t: ReplyTable<u32> = ReplyTable::default();
        let base = Instant::now();
        for i in 0..20u32 {
            t.insert(i, i, Some(base + Duration::from_secs(20 - i as u64)));
        }
        t.remove(5);
        t.remove(10);
        let mut popped = Vec::new();
        while let Some((serial, _)) = t.pop_expired(base + Duration::from_secs(1000)) {
            popped.push(serial);
        }
        assert_eq!(popped.len(), 18);
        // Must still come out in deadline order.
        let mut sorted = popped.clone();
        sorted.sort_by_key(|s| std::cmp::Reverse(*s));
        assert_eq!(popped, sorted);
    }
}
