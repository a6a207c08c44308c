//! A blocking, synchronous calling convention layered on top of [`Bus`].
//!
//! Grounded on the teacher's `blocking::{Connection, Proxy, BlockingSender}`:
//! a thin `Proxy` bundling destination/path/timeout over a trait boundary so
//! a proxy can be built over anything that can make a blocking call. This
//! core has only one connection type (no FFI `Channel`/`Connection` split),
//! so `BlockingSender` collapses to a single impl, and it takes `&mut self`
//! rather than the teacher's `&self` — there's no interior mutability here
//! to hide a mutating call behind.

use std::ops::DerefMut;
use std::time::Duration;

use crate::arg::Value;
use crate::connection::Bus;
use crate::error::Result;
use crate::matchrule::{MatchRule, MatchToken};
use crate::message::Message;
use crate::strings::{BusName, Interface, Member, Path};
use crate::transport::Transport;

/// Abstraction over "something that can make a blocking method call".
pub trait BlockingSender {
    /// Sends `msg` and blocks waiting for a reply or `timeout`. An error
    /// reply comes back as `Err`, not as `Ok` carrying an error message.
    fn send_with_reply_and_block(&mut self, msg: Message, timeout: Option<Duration>) -> Result<Message>;
}

impl<T: Transport, D> BlockingSender for Bus<T, D> {
    fn send_with_reply_and_block(&mut self, msg: Message, timeout: Option<Duration>) -> Result<Message> {
        Bus::send_with_reply_and_block(self, msg, timeout)
    }
}

/// A struct that wraps a connection, destination and path.
///
/// A D-Bus "Proxy" is a client-side object that corresponds to a remote
/// object on the server side; calling a method on the proxy calls the
/// method on the remote object.
pub struct Proxy<'a, C> {
    /// Destination, i.e. what D-Bus service you're communicating with.
    pub destination: BusName<'a>,
    /// Object path on the destination.
    pub path: Path<'a>,
    /// Timeout for method calls made through this proxy.
    pub timeout: Duration,
    /// Some way to send and receive messages, usually `&mut Bus<T, D>`.
    pub connection: C,
}

impl<'a, C> Proxy<'a, C> {
    pub fn new<Dest, P>(destination: Dest, path: P, timeout: Duration, connection: C) -> Self
    where
        Dest: Into<BusName<'a>>,
        P: Into<Path<'a>>,
    {
        Proxy { destination: destination.into(), path: path.into(), timeout, connection }
    }
}

impl<'a, T, C> Proxy<'a, C>
where
    T: BlockingSender,
    C: DerefMut<Target = T>,
{
    /// Makes a method call against this proxy's destination/path, blocking
    /// until the reply arrives or the proxy's timeout elapses.
    pub fn method_call(
        &mut self,
        interface: impl Into<Interface<'static>>,
        member: impl Into<Member<'static>>,
        args: Vec<Value>,
    ) -> Result<Message> {
        let mut msg = Message::new_method_call(
            self.destination.clone().into_static(),
            self.path.clone().into_static(),
            interface.into(),
            member.into(),
        );
        for a in args { msg.append_value(a); }
        self.connection.send_with_reply_and_block(msg, Some(self.timeout))
    }
}

impl<'a, T, D, C> Proxy<'a, C>
where
    T: Transport,
    C: DerefMut<Target = Bus<T, D>>,
{
    /// Registers a signal match scoped to this proxy's destination and path.
    /// Unlike `method_call`, registration is fire-and-forget — see
    /// [`Bus::add_match`] — `f` is invoked later, from the connection's
    /// ordinary dispatch loop, for every matching signal.
    pub fn match_signal<F>(
        &mut self,
        interface: impl Into<Interface<'static>>,
        member: impl Into<Member<'static>>,
        f: F,
    ) -> Result<MatchToken>
    where
        F: FnMut(&Message) + Send + 'static,
    {
        let rule = MatchRule::new_signal(interface.into(), member.into());
        self.connection.add_match(rule, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::BusConfig;
    use crate::transport::mock::MockTransport;
    use crate::tree::vtable::{MethodDescriptor, Vtable};
    use std::num::NonZeroU32;

    #[test]
    fn proxy_method_call_round_trips() {
        let (ta, tb) = MockTransport::pair();
        let mut server: Bus<MockTransport, i32> = Bus::new(ta, BusConfig::new().address("mock:"));
        let mut client: Bus<MockTransport, i32> = Bus::new(tb, BusConfig::new().address("mock:"));
        server.start().unwrap();
        client.start().unwrap();
        server.process().unwrap();
        client.process().unwrap();

        server.register_object(
            Path::new("/obj").unwrap(), 21,
            Vtable::new(Interface::new("x.Test").unwrap(), false).with_method(MethodDescriptor::new(
                Member::new("Double").unwrap(), "", "i",
                |_args, data: &mut i32| Ok(vec![Value::I32(*data * 2)]),
            )),
        ).unwrap();

        // Plant the expected reply on the wire up front: `MockTransport` is a
        // single-threaded in-memory pipe, so there's no interleaving with the
        // server's own `process()` to rely on.
        let mut fake_call = Message::new_method_call(
            BusName::new(":1.0").unwrap(), Path::new("/obj").unwrap(),
            Interface::new("x.Test").unwrap(), Member::new("Double").unwrap());
        fake_call.seal(NonZeroU32::new(1).unwrap()).unwrap();
        let reply = fake_call.method_return().append(Value::I32(42));
        server.send(reply).unwrap();

        let mut proxy = Proxy::new(":1.0", Path::new("/obj").unwrap(), Duration::from_secs(1), &mut client);
        let reply = proxy.method_call(
            Interface::new("x.Test").unwrap(), Member::new("Double").unwrap(), Vec::new(),
        ).unwrap();
        assert_eq!(reply.body(), &[Value::I32(42)]);
    }
}
