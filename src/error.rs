//! The error taxonomy returned by every fallible operation in this crate.

use std::fmt;

use crate::strings::ErrorName;

/// All failure modes the connection, dispatch pipeline and object tree can
/// produce. Variants map 1:1 onto the categorical error names a D-Bus
/// implementation conventionally uses internally; [`Error::dbus_name`]
/// translates the handful that have a standard wire equivalent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A null or malformed input: bad path/interface/member name, invalid signature.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A configuration setter was called outside `Unset`, or an operation was invoked
    /// in a state that forbids it.
    #[error("operation not permitted in the current state")]
    OperationNotPermitted,

    /// The connection is `Unset` or `Closed`.
    #[error("not connected")]
    NotConnected,

    /// The calling process's PID no longer matches the PID that created the connection.
    #[error("connection used from a forked child process")]
    WrongChildProcess,

    /// A queue bound (`wqueue_max`/`rqueue_max`) was exceeded.
    #[error("no buffer space available")]
    NoBufferSpace,

    /// File-descriptor passing (or another feature) is unavailable on this connection/transport.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// A blocking call's deadline elapsed before a reply arrived.
    #[error("timed out waiting for a reply")]
    TimedOut,

    /// A protocol-level violation was observed in bytes read from the transport.
    #[error("I/O or protocol error: {0}")]
    IoError(String),

    /// A received message violated a semantic rule (e.g. a malformed Hello reply).
    #[error("bad message: {0}")]
    BadMessage(String),

    /// A vtable registration collided with an existing one at the same (path, interface).
    #[error("already exists")]
    AlreadyExists,

    /// A direct and a fallback vtable were registered for the same (path, interface).
    #[error("wrong protocol (fallback/direct mismatch)")]
    WrongProtocol,

    /// A requested property, match, or callback entry was not found.
    #[error("no such entry")]
    NoEntry,

    /// A property lacks the flag required for the requested operation (e.g. emitting a
    /// change for a property without `EMITS_CHANGE`).
    #[error("argument out of domain")]
    ArgumentOutOfDomain,

    /// `process` was re-entered while already running.
    #[error("connection is busy processing")]
    Busy,

    /// Reserved for operations the core does not implement (`emit_interfaces_added/removed`).
    #[error("not implemented")]
    NotImplemented,

    /// Allocation failure, reported by a codec/transport collaborator. Kept for taxonomy
    /// completeness; unreachable from ordinary Rust allocation (which aborts on OOM).
    #[error("out of memory")]
    NoMemory,

    /// A lower-level I/O failure surfaced by a transport during a blocking read or write.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Error {
        Error::InvalidArgument(msg.into())
    }

    /// The standard D-Bus error name this error should be reported to a peer as, if any.
    /// Returns `None` for errors that never cross the wire (e.g. `Busy`, `NotConnected`)
    /// because they describe a local precondition violation rather than a protocol reply.
    pub fn dbus_name(&self) -> Option<&'static str> {
        match self {
            Error::TimedOut => Some(names::TIMEOUT),
            Error::InvalidArgument(_) => Some(names::INVALID_ARGS),
            Error::NotImplemented => Some("org.freedesktop.DBus.Error.NotSupported"),
            Error::NotSupported(_) => Some("org.freedesktop.DBus.Error.NotSupported"),
            _ => None,
        }
    }

    /// Build a D-Bus `ErrorName` for the handful of well-known built-in errors the
    /// dispatch pipeline itself synthesizes (as opposed to application handler errors).
    pub(crate) fn well_known(name: &'static str) -> ErrorName<'static> {
        ErrorName::new(name).expect("well-known error names are valid by construction")
    }
}

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The well-known `org.freedesktop.DBus.Error.*` names the dispatch pipeline synthesizes
/// directly (as opposed to names chosen by application-level handlers).
pub mod names {
    pub const TIMEOUT: &str = "org.freedesktop.DBus.Error.Timeout";
    pub const UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";
    pub const UNKNOWN_OBJECT: &str = "org.freedesktop.DBus.Error.UnknownObject";
    pub const UNKNOWN_INTERFACE: &str = "org.freedesktop.DBus.Error.UnknownInterface";
    pub const UNKNOWN_PROPERTY: &str = "org.freedesktop.DBus.Error.UnknownProperty";
    pub const PROPERTY_READ_ONLY: &str = "org.freedesktop.DBus.Error.PropertyReadOnly";
    pub const INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";
    pub const SERVICE_UNKNOWN: &str = "org.freedesktop.DBus.Error.ServiceUnknown";
}

/// A D-Bus method-error payload: the peer-visible error name plus a human-readable message.
/// Carried separately from [`Error`] because application handlers construct these to reply
/// with application-specific error names that have no [`Error`] variant of their own.
#[derive(Debug, Clone)]
pub struct MethodErr {
    name: String,
    message: String,
}

impl MethodErr {
    /// Build a method error from an explicit D-Bus error name and message.
    pub fn new(name: impl Into<String>, message: impl fmt::Display) -> MethodErr {
        MethodErr { name: name.into(), message: message.to_string() }
    }

    pub fn invalid_arg(arg: &str) -> MethodErr {
        MethodErr::new(names::INVALID_ARGS, format!("Invalid argument: {}", arg))
    }

    pub fn no_arg() -> MethodErr {
        MethodErr::new(names::INVALID_ARGS, "Not enough arguments")
    }

    pub fn no_interface(i: &str) -> MethodErr {
        MethodErr::new(names::UNKNOWN_INTERFACE, format!("Unknown interface {}", i))
    }

    pub fn no_property(p: &str) -> MethodErr {
        MethodErr::new(names::UNKNOWN_PROPERTY, format!("Unknown property {}", p))
    }

    pub fn no_method(m: &str) -> MethodErr {
        MethodErr::new(names::UNKNOWN_METHOD, format!("Unknown method {}", m))
    }

    pub fn read_only(p: &str) -> MethodErr {
        MethodErr::new(names::PROPERTY_READ_ONLY, format!("Property {} is read-only", p))
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn message(&self) -> &str { &self.message }
}

impl fmt::Display for MethodErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for MethodErr {}
