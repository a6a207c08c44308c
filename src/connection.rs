//! `Bus`: the connection state machine, send/receive queues, reply
//! correlation and dispatch pipeline tying together [`crate::queue`],
//! [`crate::reply`], [`crate::filters`], [`crate::matchrule`],
//! [`crate::transport`] and [`crate::tree`].
//!
//! Grounded on the teacher's FFI `Connection`/`ConnectionItems` for the
//! overall shape of a type that owns its I/O, a handler chain, and a
//! process-one-iteration entry point, generalized here to a synchronous,
//! transport-generic state machine with no libdbus underneath it.

use std::num::NonZeroU32;
use std::process;
use std::time::{Duration, Instant};

use tracing::{debug, debug_span, trace, warn};

use crate::arg::Value;
use crate::config::BusConfig;
use crate::error::{Error, Result};
use crate::filters::{Filters, Token as FilterToken};
use crate::matchrule::{MatchCallbacks, MatchRule, MatchToken};
use crate::message::{Message, MessageType};
use crate::queue::{ReadQueue, WriteQueue};
use crate::reply::{self, ReplyTable};
use crate::strings::{BusName, Interface, Member, Path};
use crate::transport::{Events, Progress, Transport};
use crate::tree::{self, IntrospectionWriter, Tree, Vtable};

const DBUS_DESTINATION: &str = "org.freedesktop.DBus";
const DBUS_PATH: &str = "/org/freedesktop/DBus";
const DBUS_INTERFACE: &str = "org.freedesktop.DBus";

/// The connection's lifecycle state (§4.1). `BUS_IS_OPEN` corresponds to
/// every state except [`State::Unset`] and [`State::Closed`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum State {
    Unset,
    Opening,
    Authenticating,
    Hello,
    Running,
    Closed,
}

/// Invoked exactly once: with the matching reply, or a synthesized
/// `Timeout` error, or never if the call is cancelled first.
pub type ReplyCallback = Box<dyn FnOnce(Message) + Send>;
pub type FilterCallback = Box<dyn FnMut(&Message) -> bool + Send>;
pub type MatchCallback = Box<dyn FnMut(&Message) + Send>;

/// A D-Bus connection: transport-agnostic state machine, queues, reply
/// correlation table, filter/match chains and the server-side object tree.
///
/// `T` is the transport collaborator (see [`crate::transport::Transport`]);
/// `D` is the application data type every object-tree node carries.
pub struct Bus<T, D = ()> {
    state: State,
    config: BusConfig,
    transport: Option<T>,
    wqueue: WriteQueue,
    rqueue: ReadQueue,
    serial: u32,
    reply_table: ReplyTable<ReplyCallback>,
    filters: Filters<FilterCallback>,
    matches: MatchCallbacks<MatchCallback>,
    tree: Tree<D>,
    writer: Box<dyn IntrospectionWriter>,
    machine_id: String,
    unique_name: Option<BusName<'static>>,
    hello_serial: Option<u32>,
    pid: u32,
    iteration_counter: u64,
    processing: bool,
}

impl<T: Transport, D> Bus<T, D> {
    /// Builds an unconfigured (`Unset`) connection over `transport`. The
    /// transport is assumed already reachable; dialing addresses, forking
    /// `unixexec` helpers and similar are the transport's own concern (see
    /// [`crate::address`]), not this state machine's.
    pub fn new(transport: T, config: BusConfig) -> Self {
        Bus {
            state: State::Unset,
            wqueue: WriteQueue::new(config.wqueue_max),
            rqueue: ReadQueue::new(config.rqueue_max),
            config,
            transport: Some(transport),
            serial: 0,
            reply_table: ReplyTable::default(),
            filters: Filters::default(),
            matches: MatchCallbacks::default(),
            tree: Tree::new(),
            writer: Box::new(tree::DefaultIntrospectionWriter),
            machine_id: "0".repeat(32),
            unique_name: None,
            hello_serial: None,
            pid: process::id(),
            iteration_counter: 0,
            processing: false,
        }
    }

    pub fn state(&self) -> State { self.state }

    pub fn unique_name(&self) -> Option<&BusName<'static>> { self.unique_name.as_ref() }

    /// The object tree, for read access from outside the dispatch pipeline
    /// (e.g. to inspect what's currently registered).
    pub fn tree(&self) -> &Tree<D> { &self.tree }

    pub fn config(&self) -> &BusConfig { &self.config }

    /// Mutable access to the pre-`start` configuration. `OperationNotPermitted`
    /// once the connection has left `Unset`, mirroring §4.1's configuration-setter rule.
    pub fn config_mut(&mut self) -> Result<&mut BusConfig> {
        self.require_unset()?;
        Ok(&mut self.config)
    }

    pub fn set_introspection_writer(&mut self, writer: Box<dyn IntrospectionWriter>) -> Result<()> {
        self.require_unset()?;
        self.writer = writer;
        Ok(())
    }

    pub fn set_machine_id(&mut self, id: impl Into<String>) -> Result<()> {
        self.require_unset()?;
        self.machine_id = id.into();
        Ok(())
    }

    fn require_unset(&self) -> Result<()> {
        if self.state != State::Unset { return Err(Error::OperationNotPermitted); }
        Ok(())
    }

    fn check_pid(&self) -> Result<()> {
        if self.pid != process::id() { return Err(Error::WrongChildProcess); }
        Ok(())
    }

    /// Unset → Opening. Requires a configured transport target and rejects
    /// a connection set up as both server and bus client.
    pub fn start(&mut self) -> Result<()> {
        self.check_pid()?;
        self.require_unset()?;
        if !self.config.is_valid_for_start() { return Err(Error::OperationNotPermitted); }
        if self.config.address.is_none() && !self.config.is_server {
            return Err(Error::invalid_argument("no transport address configured"));
        }
        self.state = State::Opening;
        Ok(())
    }

    /// Terminal and idempotent: drops the transport and marks the connection
    /// unusable for any further operation.
    pub fn close(&mut self) {
        if self.state == State::Closed { return; }
        warn!(pid = self.pid, "closing connection");
        self.state = State::Closed;
        self.transport = None;
    }

    pub fn is_open(&self) -> bool { !matches!(self.state, State::Unset | State::Closed) }

    pub fn can_send(&self, with_fds: bool) -> bool {
        self.is_open()
            && (!with_fds
                || (self.config.hello_flags.accept_fd
                    && self.transport.as_ref().map_or(false, |t| t.can_fds())))
    }

    /// The transport's raw fd, if it exposes one, for an embedder's own poll loop.
    pub fn get_fd(&self) -> Option<std::os::fd::RawFd> {
        self.transport.as_ref().and_then(|t| t.take_fd())
    }

    /// A stand-in for `org.freedesktop.DBus.GetId`: the locally-configured
    /// machine/server id, also used to answer `Peer.GetMachineId`.
    pub fn get_server_id(&self) -> &str { &self.machine_id }

    /// Poll-event derivation (§4.1).
    pub fn get_events(&self) -> Events {
        match self.state {
            State::Opening => Events::OUT,
            State::Authenticating => self.transport.as_ref().map_or(Events::NONE, |t| t.events()),
            State::Hello | State::Running => Events {
                readable: self.rqueue.is_empty(),
                writable: !self.wqueue.is_empty(),
            },
            State::Unset | State::Closed => Events::NONE,
        }
    }

    /// Earliest pending reply deadline, for an embedder's poll timeout.
    pub fn get_timeout(&self) -> Option<Instant> {
        match self.state {
            State::Hello | State::Running => self.reply_table.earliest_deadline(),
            _ => None,
        }
    }

    fn next_serial(&mut self) -> NonZeroU32 {
        self.serial = self.serial.wrapping_add(1);
        if self.serial == 0 { self.serial = 1; }
        NonZeroU32::new(self.serial).expect("just forced non-zero")
    }

    /// Seals `msg` if needed and enqueues/writes it (§4.2). Returns the
    /// assigned serial.
    pub fn send(&mut self, mut msg: Message) -> Result<u32> {
        self.check_pid()?;
        if !self.is_open() { return Err(Error::NotConnected); }
        if !msg.is_sealed() {
            let serial = self.next_serial();
            msg.seal(serial)?;
        }
        let serial = msg.serial().expect("sealed above");
        trace!(serial, msg_type = ?msg.msg_type(), "send");
        self.enqueue_or_write(msg)?;
        Ok(serial)
    }

    fn enqueue_or_write(&mut self, msg: Message) -> Result<()> {
        if matches!(self.state, State::Running | State::Hello) && self.wqueue.is_empty() {
            let written = {
                let Some(t) = self.transport.as_mut() else { return Err(Error::NotConnected) };
                t.write_message(&msg, 0)
            };
            match written {
                Ok((_n, true)) => return Ok(()),
                Ok((n, false)) => {
                    self.wqueue.push(msg)?;
                    self.wqueue.advance(n);
                    return Ok(());
                }
                Err(e) => { self.close(); return Err(Error::Io(e)); }
            }
        }
        self.wqueue.push(msg)
    }

    /// Registers a pending method call (§4.3): seals, inserts into the
    /// reply table keyed by serial with a deadline, then sends. Any failure
    /// in `send` rolls the table insert back.
    pub fn send_with_reply<F>(&mut self, mut msg: Message, timeout: Option<Duration>, callback: F) -> Result<u32>
    where
        F: FnOnce(Message) + Send + 'static,
    {
        self.check_pid()?;
        if msg.msg_type() != MessageType::MethodCall {
            return Err(Error::invalid_argument("send_with_reply requires a method call"));
        }
        if msg.no_reply_expected() {
            return Err(Error::invalid_argument("message has NO_REPLY_EXPECTED set"));
        }
        if !msg.is_sealed() {
            let serial = self.next_serial();
            msg.seal(serial)?;
        }
        let serial = msg.serial().expect("sealed above");
        let deadline = Some(Instant::now() + timeout.unwrap_or(self.config.default_timeout));
        self.reply_table.insert(serial, Box::new(callback), deadline);
        if let Err(e) = self.enqueue_or_write(msg) {
            self.reply_table.remove(serial);
            return Err(e);
        }
        Ok(serial)
    }

    /// Idempotent: `false` if `serial` was already matched, cancelled or timed out.
    pub fn cancel_reply(&mut self, serial: u32) -> bool {
        self.reply_table.remove(serial).is_some()
    }

    /// `send_with_reply_and_block` (§4.4): drives the bus to `Running`,
    /// sends `msg`, then reads directly from the transport — bypassing
    /// `process`'s normal dispatch — until the matching reply arrives or
    /// the deadline elapses. Messages read along the way that aren't the
    /// reply are parked in `rqueue` for the next ordinary `process` call.
    pub fn send_with_reply_and_block(&mut self, mut msg: Message, timeout: Option<Duration>) -> Result<Message> {
        self.check_pid()?;
        if msg.msg_type() != MessageType::MethodCall {
            return Err(Error::invalid_argument("send_with_reply_and_block requires a method call"));
        }
        while self.state != State::Running {
            if self.state == State::Closed { return Err(Error::NotConnected); }
            self.process()?;
        }
        msg.set_no_reply_expected(false);
        let serial = self.send(msg)?;
        let deadline = Instant::now() + timeout.unwrap_or(self.config.default_timeout);

        loop {
            if !self.rqueue.has_capacity() {
                return Err(Error::NoBufferSpace);
            }
            let read = {
                let Some(t) = self.transport.as_mut() else { return Err(Error::NotConnected) };
                t.read_message()
            };
            match read {
                Ok(Progress::Done(incoming)) => {
                    if incoming.reply_serial() == Some(serial) {
                        return match incoming.msg_type() {
                            MessageType::MethodReturn => Ok(incoming),
                            MessageType::Error => {
                                let desc = incoming.body().first().and_then(Value::as_str).unwrap_or("");
                                let name = incoming.error_name().map(|n| n.as_str()).unwrap_or("unknown error");
                                Err(Error::BadMessage(format!("{}: {}", name, desc)))
                            }
                            _ => Err(Error::IoError("unexpected message type replying to a blocking call".into())),
                        };
                    }
                    self.rqueue.push(incoming)?;
                }
                Ok(Progress::WouldBlock) => {
                    let now = Instant::now();
                    if now >= deadline {
                        self.reply_table.remove(serial);
                        return Err(Error::TimedOut);
                    }
                    // A real transport would block in its own read/write here up to
                    // `deadline - now`; this trait has no raw pollable handle at this
                    // layer, so we yield briefly instead of busy-spinning.
                    std::thread::sleep((deadline - now).min(Duration::from_millis(5)));
                    self.dispatch_wqueue()?;
                }
                Err(e) => { self.close(); return Err(Error::Io(e)); }
            }
        }
    }

    /// Single-entry: re-entering while already processing returns `Busy`.
    /// Returns the number of dispatch-relevant events handled this call
    /// (0 means nothing to do right now).
    pub fn process(&mut self) -> Result<u32> {
        self.check_pid()?;
        if self.state == State::Closed { return Err(Error::NotConnected); }
        if self.processing { return Err(Error::Busy); }
        self.processing = true;
        let span = debug_span!("process", pid = self.pid, state = ?self.state);
        let _enter = span.enter();
        let result = self.process_inner();
        self.processing = false;
        if let Err(ref e) = result {
            warn!(error = %e, "process failed");
        }
        result
    }

    fn process_inner(&mut self) -> Result<u32> {
        self.iteration_counter += 1;
        match self.state {
            State::Opening => {
                let progress = {
                    let Some(t) = self.transport.as_mut() else { return Err(Error::NotConnected) };
                    t.process_opening()
                };
                match progress {
                    Ok(Progress::Done(())) => { self.state = State::Authenticating; Ok(1) }
                    Ok(Progress::WouldBlock) => Ok(0),
                    Err(e) => { self.close(); Err(Error::Io(e)) }
                }
            }
            State::Authenticating => {
                let progress = {
                    let Some(t) = self.transport.as_mut() else { return Err(Error::NotConnected) };
                    t.process_authenticating()
                };
                match progress {
                    Ok(Progress::Done(())) => { self.bus_start_running()?; Ok(1) }
                    Ok(Progress::WouldBlock) => Ok(0),
                    Err(e) => { self.close(); Err(Error::Io(e)) }
                }
            }
            State::Hello | State::Running => self.process_running(),
            State::Unset | State::Closed => Err(Error::NotConnected),
        }
    }

    fn bus_start_running(&mut self) -> Result<()> {
        if self.config.bus_client {
            self.state = State::Hello;
            let call = Message::new_method_call(
                BusName::new(DBUS_DESTINATION).expect("well-known name is valid"),
                Path::new(DBUS_PATH).expect("well-known path is valid"),
                Interface::new(DBUS_INTERFACE).expect("well-known interface is valid"),
                Member::new("Hello").expect("well-known member is valid"),
            );
            let serial = self.send(call)?;
            self.hello_serial = Some(serial);
            debug!(serial, "sent Hello");
        } else {
            self.state = State::Running;
        }
        Ok(())
    }

    fn process_running(&mut self) -> Result<u32> {
        if self.process_timeout() { return Ok(1); }
        self.dispatch_wqueue()?;
        let Some(msg) = self.dispatch_rqueue()? else { return Ok(0) };
        trace!(serial = ?msg.serial(), msg_type = ?msg.msg_type(), "dispatch");
        self.run_handler_chain(msg)?;
        Ok(1)
    }

    fn dispatch_wqueue(&mut self) -> Result<()> {
        loop {
            let result = {
                let Some((msg, written)) = self.wqueue.head() else { return Ok(()) };
                let Some(t) = self.transport.as_mut() else { return Ok(()) };
                t.write_message(msg, written)
            };
            match result {
                Ok((_n, true)) => { self.wqueue.pop_completed(); }
                Ok((n, false)) => { self.wqueue.advance(n); return Ok(()); }
                Err(e) => { self.close(); return Err(Error::Io(e)); }
            }
        }
    }

    fn dispatch_rqueue(&mut self) -> Result<Option<Message>> {
        if let Some(m) = self.rqueue.pop() { return Ok(Some(m)); }
        let Some(t) = self.transport.as_mut() else { return Ok(None) };
        match t.read_message() {
            Ok(Progress::Done(m)) => Ok(Some(m)),
            Ok(Progress::WouldBlock) => Ok(None),
            Err(e) => { self.close(); Err(Error::Io(e)) }
        }
    }

    /// `pop_expired` fires at most one timeout per call, matching
    /// `process_timeout`'s "one expiration per iteration" rule.
    fn process_timeout(&mut self) -> bool {
        let Some((serial, cb)) = self.reply_table.pop_expired(Instant::now()) else { return false };
        warn!(serial, "call timed out waiting for a reply");
        cb(reply::timeout_message(serial));
        true
    }

    /// Handler chain (§4.5): hello, reply correlation, filters, matches,
    /// built-in Peer, then the object tree. `process_hello` and
    /// `process_match` never stop the chain on their own; the others do.
    fn run_handler_chain(&mut self, msg: Message) -> Result<()> {
        self.process_hello(&msg)?;
        if self.process_reply(&msg) { return Ok(()); }
        if self.process_filter(&msg) { return Ok(()); }
        self.process_match(&msg);
        if self.process_builtin(&msg)? { return Ok(()); }
        self.process_object(&msg)
    }

    fn process_hello(&mut self, msg: &Message) -> Result<()> {
        if self.state != State::Hello { return Ok(()); }
        let Some(hello_serial) = self.hello_serial else { return Ok(()) };
        if msg.reply_serial() != Some(hello_serial) { return Ok(()); }
        match msg.msg_type() {
            MessageType::MethodReturn => {
                let name = msg.body().first().and_then(Value::as_str)
                    .ok_or_else(|| Error::BadMessage("Hello reply is missing its unique-name argument".into()))?;
                let bus_name = BusName::new(name.to_string())
                    .map_err(|_| Error::BadMessage("Hello reply is not a valid bus name".into()))?;
                if !bus_name.is_unique() {
                    return Err(Error::BadMessage("Hello reply did not return a unique name".into()));
                }
                self.unique_name = Some(bus_name.into_static());
                self.hello_serial = None;
                self.state = State::Running;
                debug!(serial = hello_serial, unique_name = %self.unique_name.as_ref().unwrap(), "hello complete");
                Ok(())
            }
            MessageType::Error => Err(Error::IoError("Hello call failed".into())),
            _ => Err(Error::IoError("unexpected message while awaiting the Hello reply".into())),
        }
    }

    fn process_reply(&mut self, msg: &Message) -> bool {
        if !matches!(msg.msg_type(), MessageType::MethodReturn | MessageType::Error) { return false; }
        let Some(reply_serial) = msg.reply_serial() else { return false };
        let Some(cb) = self.reply_table.remove(reply_serial) else { return false };
        cb(msg.clone());
        true
    }

    fn process_filter(&mut self, msg: &Message) -> bool {
        let iteration = self.iteration_counter;
        self.filters.dispatch(msg, iteration, |cb, m| cb(m))
    }

    fn process_match(&mut self, msg: &Message) {
        self.matches.dispatch(msg, |cb, m| cb(m));
    }

    fn process_builtin(&mut self, msg: &Message) -> Result<bool> {
        if msg.msg_type() != MessageType::MethodCall { return Ok(false); }
        if msg.interface().map(|i| i.as_str()) != Some(tree::builtin::PEER_INTERFACE) { return Ok(false); }
        let Some(member) = msg.member() else { return Ok(false) };
        let Some(body) = tree::builtin::peer_call(member.as_str(), &self.machine_id) else { return Ok(false) };
        if !msg.no_reply_expected() {
            let mut reply = msg.method_return();
            for v in body { reply.append_value(v); }
            self.send(reply)?;
        }
        Ok(true)
    }

    fn process_object(&mut self, msg: &Message) -> Result<()> {
        if msg.msg_type() != MessageType::MethodCall { return Ok(()); }
        if let Some(reply) = tree::dispatch(&mut self.tree, msg, &self.machine_id, self.writer.as_ref()) {
            self.send(reply)?;
        }
        Ok(())
    }

    /// Blocks (via repeated `process`) until progress is made or `timeout` elapses.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|d| Instant::now() + d);
        loop {
            if self.process()? > 0 { return Ok(()); }
            if let Some(dl) = deadline {
                if Instant::now() >= dl { return Err(Error::TimedOut); }
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Drains `wqueue` completely, blocking the calling thread via short
    /// sleeps between attempts if the transport reports it would block.
    pub fn flush(&mut self) -> Result<()> {
        while !self.wqueue.is_empty() {
            self.dispatch_wqueue()?;
        }
        Ok(())
    }

    pub fn add_filter<F>(&mut self, f: F) -> FilterToken
    where
        F: FnMut(&Message) -> bool + Send + 'static,
    {
        self.filters.add(Box::new(f))
    }

    pub fn remove_filter(&mut self, token: FilterToken) -> bool {
        self.filters.remove(token).is_some()
    }

    /// Registers a match rule. For a `bus_client` connection this also
    /// issues `org.freedesktop.DBus.AddMatch`; failure there rolls the
    /// local registration back, mirroring §4.3's rollback-on-failure discipline.
    pub fn add_match<F>(&mut self, rule: MatchRule<'static>, f: F) -> Result<MatchToken>
    where
        F: FnMut(&Message) + Send + 'static,
    {
        let match_str = rule.match_str();
        let (token, _cookie) = self.matches.add(rule, Box::new(f));
        if self.config.bus_client {
            let call = Message::new_method_call(
                BusName::new(DBUS_DESTINATION).expect("well-known name is valid"),
                Path::new(DBUS_PATH).expect("well-known path is valid"),
                Interface::new(DBUS_INTERFACE).expect("well-known interface is valid"),
                Member::new("AddMatch").expect("well-known member is valid"),
            ).append(Value::Str(match_str));
            if let Err(e) = self.send(call) {
                self.matches.remove(token);
                return Err(e);
            }
        }
        Ok(token)
    }

    /// Removes a match rule locally. `RemoveMatch` is not re-issued to the
    /// bus here — the broker drops per-connection match rules on disconnect
    /// regardless, and the textual rule isn't retained once registered.
    pub fn remove_match(&mut self, token: MatchToken) -> bool {
        self.matches.remove(token).is_some()
    }

    pub fn register_object(&mut self, path: Path<'static>, data: D, vtable: Vtable<D>) -> Result<()>
    where
        D: Default,
    {
        self.tree.insert_vtable(path, data, vtable)
    }

    pub fn unregister_object(&mut self, path: &Path<'static>, interface: &str) -> Option<Vtable<D>> {
        self.tree.remove_vtable(path, interface)
    }

    pub fn set_object_manager(&mut self, path: Path<'static>, data: D, v: bool)
    where
        D: Default,
    {
        self.tree.set_object_manager(path, data, v)
    }

    pub fn emit_signal(&mut self, msg: Message) -> Result<u32> {
        if msg.msg_type() != MessageType::Signal {
            return Err(Error::invalid_argument("emit_signal requires a signal message"));
        }
        self.send(msg)
    }

    pub fn emit_properties_changed_strv(
        &mut self,
        path: &Path<'static>,
        interface: &Interface<'static>,
        names: &[&str],
    ) -> Result<()> {
        for signal in tree::emit_properties_changed_strv(&self.tree, path, interface, names)? {
            self.send(signal)?;
        }
        Ok(())
    }

    /// Reserved — not implemented, per §6.
    pub fn emit_interfaces_added(&mut self, _path: &Path<'static>) -> Result<()> { Err(Error::NotImplemented) }

    /// Reserved — not implemented, per §6.
    pub fn emit_interfaces_removed(&mut self, _path: &Path<'static>) -> Result<()> { Err(Error::NotImplemented) }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::mock::MockTransport;
    use crate::tree::vtable::{EmitsChanged, MethodDescriptor, PropertyDescriptor, Vtable};

    fn running_pair() -> (Bus<MockTransport, i32>, Bus<MockTransport, i32>) {
        let (ta, tb) = MockTransport::pair();
        let mut a = Bus::new(ta, BusConfig::new().address("mock:"));
        let mut b = Bus::new(tb, BusConfig::new().address("mock:"));
        a.start().unwrap();
        b.start().unwrap();
        a.process().unwrap();
        b.process().unwrap();
        (a, b)
    }

    #[test]
    fn reaches_running_without_bus_client() {
        let (a, _b) = running_pair();
        assert_eq!(a.state(), State::Running);
    }

    #[test]
    fn hello_reply_sets_unique_name_and_running() {
        let (transport, _peer) = MockTransport::pair();
        let mut client: Bus<MockTransport, i32> = Bus::new(transport, BusConfig::new().address("mock:").bus_client(true));
        client.start().unwrap();
        client.process().unwrap(); // Opening -> Authenticating
        client.process().unwrap(); // Authenticating -> sends Hello, state = Hello
        assert_eq!(client.state(), State::Hello);
        let hello_serial = client.hello_serial.unwrap();

        let mut fake_call = Message::new_method_call(
            BusName::new(DBUS_DESTINATION).unwrap(), Path::new(DBUS_PATH).unwrap(),
            Interface::new(DBUS_INTERFACE).unwrap(), Member::new("Hello").unwrap());
        fake_call.seal(NonZeroU32::new(hello_serial).unwrap()).unwrap();
        let reply = fake_call.method_return().append(Value::Str(":1.42".to_string()));
        client.rqueue.push(reply).unwrap();

        client.process().unwrap();
        assert_eq!(client.state(), State::Running);
        assert_eq!(client.unique_name().unwrap().as_str(), ":1.42");
    }

    #[test]
    fn send_enqueues_and_assigns_serial() {
        let (mut a, _b) = running_pair();
        let msg = Message::new_signal(Path::new("/a").unwrap(), Interface::new("x.y").unwrap(), Member::new("S").unwrap());
        let serial = a.send(msg).unwrap();
        assert_eq!(serial, 1);
    }

    #[test]
    fn send_with_reply_invokes_callback_on_matching_return() {
        let (mut a, mut b) = running_pair();
        a.register_object(
            Path::new("/obj").unwrap(),
            21,
            Vtable::new(Interface::new("x.Test").unwrap(), false).with_method(MethodDescriptor::new(
                Member::new("Double").unwrap(), "", "i",
                |_args, data: &mut i32| Ok(vec![Value::I32(*data * 2)]),
            )),
        ).unwrap();

        let call = Message::new_method_call(
            BusName::new(":1.0").unwrap(), Path::new("/obj").unwrap(),
            Interface::new("x.Test").unwrap(), Member::new("Double").unwrap(),
        );
        let received = std::sync::Arc::new(std::sync::Mutex::new(None));
        let received2 = received.clone();
        // `send_with_reply` writes straight to the transport (Running, empty
        // wqueue), so the call is already on the wire at this point.
        b.send_with_reply(call, None, move |reply| { *received2.lock().unwrap() = Some(reply); }).unwrap();
        a.process().unwrap(); // reads, dispatches, replies
        b.process().unwrap(); // reads the reply, fires the callback

        let reply = received.lock().unwrap().take().expect("callback should have fired");
        assert_eq!(reply.body(), &[Value::I32(42)]);
    }

    #[test]
    fn send_with_reply_and_block_returns_method_return() {
        // `MockTransport`'s queues are plain in-memory `Rc<RefCell<..>>` pipes,
        // not thread-safe, so this drives both ends from one thread: the
        // expected reply is planted on the wire before the blocking call
        // reads it back, rather than racing a second thread against it.
        let (mut a, mut b) = running_pair();

        let mut fake_call = Message::new_method_call(
            BusName::new(":1.0").unwrap(), Path::new("/obj").unwrap(),
            Interface::new("x.Test").unwrap(), Member::new("Ping").unwrap(),
        );
        fake_call.seal(NonZeroU32::new(1).unwrap()).unwrap();
        let reply = fake_call.method_return();
        a.transport.as_mut().unwrap().write_message(&reply, 0).unwrap();

        let call = Message::new_method_call(
            BusName::new(":1.0").unwrap(), Path::new("/obj").unwrap(),
            Interface::new("x.Test").unwrap(), Member::new("Ping").unwrap(),
        );
        let reply = b.send_with_reply_and_block(call, Some(Duration::from_secs(1))).unwrap();
        assert_eq!(reply.msg_type(), MessageType::MethodReturn);
    }

    #[test]
    fn property_get_round_trip() {
        let (mut a, mut b) = running_pair();
        a.register_object(
            Path::new("/obj").unwrap(), 99,
            Vtable::new(Interface::new("x.Test").unwrap(), false).with_property(PropertyDescriptor::read_only(
                Member::new("Value").unwrap(), crate::strings::Signature::new("i").unwrap(),
                EmitsChanged::True, |d: &i32| Ok(Value::I32(*d)),
            )),
        ).unwrap();

        let call = Message::new_method_call(
            BusName::new(":1.0").unwrap(), Path::new("/obj").unwrap(),
            Interface::new(tree::builtin::PROPERTIES_INTERFACE).unwrap(), Member::new("Get").unwrap(),
        ).append(Value::Str("x.Test".into())).append(Value::Str("Value".into()));

        let received = std::sync::Arc::new(std::sync::Mutex::new(None));
        let received2 = received.clone();
        b.send_with_reply(call, None, move |reply| { *received2.lock().unwrap() = Some(reply); }).unwrap();
        a.process().unwrap();
        b.process().unwrap();

        let reply = received.lock().unwrap().take().unwrap();
        assert_eq!(reply.body(), &[Value::Variant(Box::new(Value::I32(99)))]);
    }

    #[test]
    fn process_is_not_reentrant() {
        let (mut a, _b) = running_pair();
        a.processing = true;
        assert!(matches!(a.process(), Err(Error::Busy)));
    }

    #[test]
    fn close_then_send_is_not_connected() {
        let (mut a, _b) = running_pair();
        a.close();
        let msg = Message::new_signal(Path::new("/a").unwrap(), Interface::new("x.y").unwrap(), Member::new("S").unwrap());
        assert!(matches!(a.send(msg), Err(Error::NotConnected)));
    }
}
