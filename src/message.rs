//! Transport-agnostic D-Bus messages.
//!
//! A `Message` carries header fields (path, interface, member, error name,
//! reply serial, destination, sender, signature) and an opaque argument list.
//! Marshalling these into/out of the D-Bus wire format is the job of an
//! external message codec (out of scope here, see the crate docs) — this
//! type only models the header/body shape a codec would produce or consume,
//! plus the sealing and validation rules the connection itself must enforce.

use std::num::NonZeroU32;

use crate::arg::Value;
use crate::error::Error;
use crate::strings::{BusName, ErrorName, Interface, Member, Path, Signature};

/// One of the four D-Bus message types.
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub enum MessageType {
    MethodCall = 1,
    MethodReturn = 2,
    Error = 3,
    Signal = 4,
}

bitflags::bitflags! {
    /// Message header flags (`NO_REPLY_EXPECTED`, `NO_AUTO_START`, `ALLOW_INTERACTIVE_AUTHORIZATION`).
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct MessageFlags: u8 {
        const NO_REPLY_EXPECTED = 0x1;
        const NO_AUTO_START = 0x2;
        const ALLOW_INTERACTIVE_AUTHORIZATION = 0x4;
    }
}

/// A D-Bus message: header fields plus an opaque argument list.
///
/// Messages begin life unsealed (mutable, no serial). `Bus::send` assigns a
/// serial and seals the message (see §4.2 of the design notes); a sealed
/// message can no longer be mutated.
#[derive(Debug, Clone)]
pub struct Message {
    msg_type: MessageType,
    flags: MessageFlags,
    serial: Option<NonZeroU32>,
    path: Option<Path<'static>>,
    interface: Option<Interface<'static>>,
    member: Option<Member<'static>>,
    error_name: Option<ErrorName<'static>>,
    reply_serial: Option<u32>,
    destination: Option<BusName<'static>>,
    sender: Option<BusName<'static>>,
    signature: Option<Signature<'static>>,
    body: Vec<Value>,
}

impl Message {
    fn new_internal(msg_type: MessageType) -> Message {
        Message {
            msg_type,
            flags: MessageFlags::empty(),
            serial: None,
            path: None,
            interface: None,
            member: None,
            error_name: None,
            reply_serial: None,
            destination: None,
            sender: None,
            signature: None,
            body: Vec::new(),
        }
    }

    /// Creates a new method-call message.
    pub fn new_method_call(
        destination: impl Into<BusName<'static>>,
        path: impl Into<Path<'static>>,
        interface: impl Into<Interface<'static>>,
        member: impl Into<Member<'static>>,
    ) -> Message {
        let mut m = Message::new_internal(MessageType::MethodCall);
        m.path = Some(path.into());
        m.interface = Some(interface.into());
        m.member = Some(member.into());
        m.destination = Some(destination.into());
        m
    }

    /// Creates a new signal message.
    pub fn new_signal(
        path: impl Into<Path<'static>>,
        interface: impl Into<Interface<'static>>,
        member: impl Into<Member<'static>>,
    ) -> Message {
        let mut m = Message::new_internal(MessageType::Signal);
        m.path = Some(path.into());
        m.interface = Some(interface.into());
        m.member = Some(member.into());
        m
    }

    /// Creates a method-return reply to `self` (which must be a method call).
    pub fn method_return(&self) -> Message {
        let mut m = Message::new_internal(MessageType::MethodReturn);
        m.reply_serial = self.serial.map(NonZeroU32::get);
        m.destination = self.sender.clone();
        m
    }

    /// Creates a method-error reply to `self`.
    pub fn error_reply(&self, name: ErrorName<'static>, description: &str) -> Message {
        let mut m = Message::new_internal(MessageType::Error);
        m.reply_serial = self.serial.map(NonZeroU32::get);
        m.destination = self.sender.clone();
        m.error_name = Some(name);
        m.body = vec![Value::Str(description.to_string())];
        m
    }

    /// Builds an error reply using one of this crate's built-in error names
    /// (see [`crate::error::names`]).
    pub fn error_reply_named(&self, name: &'static str, description: &str) -> Message {
        self.error_reply(ErrorName::new(name).expect("built-in error names are valid"), description)
    }

    /// Builds a synthesized error reply for `reply_serial` with no original
    /// call message to hand, used when a local deadline expires before the
    /// peer responds.
    pub(crate) fn error_for_reply(reply_serial: u32, name: &'static str, description: &str) -> Message {
        let mut m = Message::new_internal(MessageType::Error);
        m.reply_serial = Some(reply_serial);
        m.error_name = Some(ErrorName::new(name).expect("built-in error names are valid"));
        m.body = vec![Value::Str(description.to_string())];
        m
    }

    pub fn msg_type(&self) -> MessageType { self.msg_type }
    pub fn flags(&self) -> MessageFlags { self.flags }
    pub fn set_flags(&mut self, flags: MessageFlags) { self.flags = flags; }

    /// The outgoing/assigned serial, if sealed.
    pub fn serial(&self) -> Option<u32> { self.serial.map(NonZeroU32::get) }

    pub fn reply_serial(&self) -> Option<u32> { self.reply_serial }

    pub fn path(&self) -> Option<&Path<'static>> { self.path.as_ref() }
    pub fn interface(&self) -> Option<&Interface<'static>> { self.interface.as_ref() }
    pub fn member(&self) -> Option<&Member<'static>> { self.member.as_ref() }
    pub fn error_name(&self) -> Option<&ErrorName<'static>> { self.error_name.as_ref() }
    pub fn destination(&self) -> Option<&BusName<'static>> { self.destination.as_ref() }
    pub fn sender(&self) -> Option<&BusName<'static>> { self.sender.as_ref() }
    pub fn signature(&self) -> Option<&Signature<'static>> { self.signature.as_ref() }
    pub fn body(&self) -> &[Value] { &self.body }

    pub(crate) fn set_sender(&mut self, sender: Option<BusName<'static>>) { self.sender = sender; }

    /// Whether the caller has asked not to receive a reply.
    pub fn no_reply_expected(&self) -> bool { self.flags.contains(MessageFlags::NO_REPLY_EXPECTED) }

    pub fn set_no_reply_expected(&mut self, v: bool) {
        self.flags.set(MessageFlags::NO_REPLY_EXPECTED, v);
    }

    /// Appends one argument. Builder-style: `m.append(Value::I32(7)).append(Value::Bool(true))`.
    pub fn append(mut self, v: impl Into<Value>) -> Self {
        self.body.push(v.into());
        self
    }

    pub fn append_value(&mut self, v: Value) { self.body.push(v); }

    pub fn is_sealed(&self) -> bool { self.serial.is_some() }

    /// Assigns `serial` and marks the message immutable to further header
    /// mutation. Returns an error if the message was already sealed.
    pub(crate) fn seal(&mut self, serial: NonZeroU32) -> Result<(), Error> {
        if self.is_sealed() {
            return Err(Error::invalid_argument("message is already sealed"));
        }
        self.serial = Some(serial);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn method_call_builder() {
        let m = Message::new_method_call(
            BusName::new("org.test.rust").unwrap(),
            Path::new("/").unwrap(),
            Interface::new("org.test.rust").unwrap(),
            Member::new("Test").unwrap(),
        );
        assert_eq!(m.msg_type(), MessageType::MethodCall);
        assert!(!m.is_sealed());
        assert!(!m.no_reply_expected());
    }

    #[test]
    fn seal_once() {
        let mut m = Message::new_signal(
            Path::new("/x").unwrap(), Interface::new("a.b").unwrap(), Member::new("Sig").unwrap());
        m.seal(NonZeroU32::new(1).unwrap()).unwrap();
        assert_eq!(m.serial(), Some(1));
        assert!(m.seal(NonZeroU32::new(2).unwrap()).is_err());
    }

    #[test]
    fn error_reply_carries_reply_serial() {
        let mut call = Message::new_method_call(
            BusName::new("org.test.rust").unwrap(), Path::new("/").unwrap(),
            Interface::new("a.b").unwrap(), Member::new("M").unwrap());
        call.seal(NonZeroU32::new(5).unwrap()).unwrap();
        let err = call.error_reply_named(crate::error::names::UNKNOWN_METHOD, "nope");
        assert_eq!(err.reply_serial(), Some(5));
        assert_eq!(err.msg_type(), MessageType::Error);
    }
}
