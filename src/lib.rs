//! D-Bus core: connection state machine, dispatch engine and object tree
//!
//! This crate implements the core of a [D-Bus](http://dbus.freedesktop.org/)
//! client/server library: a transport-agnostic connection state machine
//! ([`connection::Bus`]), request/reply correlation with timeouts, a
//! blocking call convenience layer ([`blocking`]), and a server-side object
//! tree with vtable dispatch and the built-in `Peer`/`Introspectable`/
//! `Properties`/`ObjectManager` interfaces ([`tree`]).
//!
//! Wire marshalling and the actual socket/auth handshake are deliberately
//! out of scope here — [`transport::Transport`] is the seam a concrete
//! implementation plugs into; see the crate's design notes for the rest of
//! the stack this core is meant to sit underneath.

#![warn(missing_docs)]

pub mod arg;
pub mod blocking;
pub mod config;
pub mod connection;
pub mod error;
pub mod filters;
pub mod matchrule;
pub mod message;
pub mod queue;
pub mod reply;
pub mod strings;
pub mod transport;
pub mod tree;

mod address;
mod validate;

pub use crate::blocking::{BlockingSender, Proxy};
pub use crate::connection::{Bus, State};
pub use crate::error::{Error, Result};
pub use crate::message::{Message, MessageType};
pub use crate::strings::{BusName, ErrorName, Interface, Member, Path, Signature};
pub use crate::transport::Transport;
