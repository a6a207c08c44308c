//! Bounded send/receive queues with partial-write bookkeeping.

use std::collections::VecDeque;

use crate::error::Error;
use crate::message::Message;

/// Default bound for both queues, matching the reference implementation's
/// `BUS_WQUEUE_MAX`/`BUS_RQUEUE_MAX`.
pub const DEFAULT_QUEUE_MAX: usize = 1024;

/// Outbound message queue. The head element, if partially written, records
/// its own byte cursor (`windex`) so a partial socket write can resume
/// without losing message ordering.
pub struct WriteQueue {
    entries: VecDeque<Message>,
    /// Bytes of `entries[0]` already written to the transport.
    windex: usize,
    max: usize,
}

impl WriteQueue {
    pub fn new(max: usize) -> Self { WriteQueue { entries: VecDeque::new(), windex: 0, max } }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn len(&self) -> usize { self.entries.len() }

    /// Appends a message, honoring `max`. Always accepts the first entry
    /// (`max` is a minimum capacity of one regardless of its configured
    /// value) so a connection can never wedge on its own head-of-line item.
    pub fn push(&mut self, msg: Message) -> Result<(), Error> {
        if !self.entries.is_empty() && self.entries.len() >= self.max {
            return Err(Error::NoBufferSpace);
        }
        self.entries.push_back(msg);
        Ok(())
    }

    /// The head entry and how many of its bytes are already written.
    pub fn head(&self) -> Option<(&Message, usize)> {
        self.entries.front().map(|m| (m, self.windex))
    }

    /// Records additional bytes written to the head entry.
    pub fn advance(&mut self, n: usize) { self.windex += n; }

    /// Drops the head entry once it has been fully written, resetting the cursor.
    pub fn pop_completed(&mut self) -> Option<Message> {
        let popped = self.entries.pop_front();
        self.windex = 0;
        popped
    }
}

/// Inbound message queue: deserialized messages not yet dispatched.
pub struct ReadQueue {
    entries: VecDeque<Message>,
    max: usize,
}

impl ReadQueue {
    pub fn new(max: usize) -> Self { ReadQueue { entries: VecDeque::new(), max } }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn has_capacity(&self) -> bool { self.entries.len() < self.max }

    pub fn push(&mut self, msg: Message) -> Result<(), Error> {
        if self.entries.len() >= self.max { return Err(Error::NoBufferSpace); }
        self.entries.push_back(msg);
        Ok(())
    }

    /// Pushes to the front — used when a blocking call diverts an
    /// unrelated message back for later ordinary dispatch, preserving
    /// transport order relative to messages not yet read.
    pub fn push_front(&mut self, msg: Message) { self.entries.push_front(msg); }

    pub fn pop(&mut self) -> Option<Message> { self.entries.pop_front() }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::strings::{Interface, Member, Path};

    fn sig() -> Message {
        Message::new_signal(Path::new("/a").unwrap(), Interface::new("x.y").unwrap(), Member::new("S").unwrap())
    }

    #[test]
    fn wqueue_respects_bound_but_always_takes_first() {
        let mut q = WriteQueue::new(1);
        q.push(sig()).unwrap();
        assert!(q.push(sig()).is_err());
    }

    #[test]
    fn wqueue_partial_write_tracks_windex() {
        let mut q = WriteQueue::new(4);
        q.push(sig()).unwrap();
        q.advance(10);
        assert_eq!(q.head().unwrap().1, 10);
        q.pop_completed();
        assert!(q.head().is_none());
    }

    #[test]
    fn rqueue_respects_bound() {
        let mut q = ReadQueue::new(1);
        q.push(sig()).unwrap();
        assert!(q.push(sig()).is_err());
        assert!(!q.has_capacity());
    }

    #[test]
    fn rqueue_preserves_order_on_push_front() {
        let mut q = ReadQueue::new(4);
        q.push(sig()).unwrap();
        q.push_front(sig());
        assert_eq!(q.len(), 2);
    }
}
