//! The transport capability the connection drives but does not implement.
//!
//! Socket-level I/O, the SASL authentication handshake and kernel-transport
//! (`kdbus`) read/write primitives are external collaborators — out of
//! scope for this crate. What's defined here is the trait boundary the
//! state machine (`Bus`) calls through, plus a minimal in-memory mock used
//! only by this crate's own tests so the dispatch pipeline is exercisable
//! without a live broker or socket.

use std::io;

use crate::message::Message;

/// Poll-style readiness flags a transport may need, mirroring the bits
/// `get_events` (§4.1) exposes to the embedder.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Events {
    pub readable: bool,
    pub writable: bool,
}

impl Events {
    pub const NONE: Events = Events { readable: false, writable: false };
    pub const IN: Events = Events { readable: true, writable: false };
    pub const OUT: Events = Events { readable: false, writable: true };
}

/// Progress a non-blocking operation can report without being an error.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Progress<T> {
    Done(T),
    WouldBlock,
}

/// Capability the connection core requires from its transport. Implementors
/// own the actual socket/exec/kernel-fd plumbing and the wire codec; this
/// crate only calls through the trait.
pub trait Transport {
    /// Begins connecting (non-blocking); repeated calls drive the state
    /// machine's `Opening` phase forward.
    fn process_opening(&mut self) -> io::Result<Progress<()>>;

    /// Drives the SASL handshake forward; repeated calls drive `Authenticating`.
    fn process_authenticating(&mut self) -> io::Result<Progress<()>>;

    /// Attempts to read one fully-framed message without blocking.
    fn read_message(&mut self) -> io::Result<Progress<Message>>;

    /// Attempts to write as much of `msg` as possible without blocking,
    /// starting at byte offset `from`. Returns the number of additional
    /// bytes written and whether the message is now fully sent.
    fn write_message(&mut self, msg: &Message, from: usize) -> io::Result<(usize, bool)>;

    /// Whether this transport can carry file descriptors alongside a message.
    fn can_fds(&self) -> bool { false }

    /// The events this transport currently wants polled for.
    fn events(&self) -> Events;

    fn take_fd(&self) -> Option<std::os::fd::RawFd> { None }
}

/// An in-memory transport pair used only in `#[cfg(test)]`: writes on one
/// end become reads on the other, with no framing/codec step involved since
/// `Message` here is already the parsed representation (the real framing
/// step is the out-of-scope codec this crate treats as opaque).
#[cfg(any(test, feature = "test-support"))]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Pipe {
        queue: VecDeque<Message>,
    }

    /// One end of an in-memory, lossless, order-preserving pair of queues —
    /// enough to drive the dispatch pipeline deterministically in tests.
    pub struct MockTransport {
        inbox: Rc<RefCell<Pipe>>,
        outbox: Rc<RefCell<Pipe>>,
        connected: bool,
    }

    impl MockTransport {
        /// Builds a connected pair: what one side sends, the other receives.
        pub fn pair() -> (MockTransport, MockTransport) {
            let a = Rc::new(RefCell::new(Pipe::default()));
            let b = Rc::new(RefCell::new(Pipe::default()));
            (
                MockTransport { inbox: a.clone(), outbox: b.clone(), connected: true },
                MockTransport { inbox: b, outbox: a, connected: true },
            )
        }
    }

    impl Transport for MockTransport {
        fn process_opening(&mut self) -> io::Result<Progress<()>> {
            Ok(Progress::Done(()))
        }

        fn process_authenticating(&mut self) -> io::Result<Progress<()>> {
            Ok(Progress::Done(()))
        }

        fn read_message(&mut self) -> io::Result<Progress<Message>> {
            if !self.connected { return Err(io::Error::new(io::ErrorKind::NotConnected, "closed")); }
            match self.inbox.borrow_mut().queue.pop_front() {
                Some(m) => Ok(Progress::Done(m)),
                None => Ok(Progress::WouldBlock),
            }
        }

        fn write_message(&mut self, msg: &Message, _from: usize) -> io::Result<(usize, bool)> {
            if !self.connected { return Err(io::Error::new(io::ErrorKind::NotConnected, "closed")); }
            self.outbox.borrow_mut().queue.push_back(msg.clone());
            Ok((1, true))
        }

        fn events(&self) -> Events {
            let readable = !self.inbox.borrow().queue.is_empty();
            Events { readable, writable: true }
        }
    }
}
