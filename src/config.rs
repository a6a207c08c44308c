//! Connection configuration: the setters that are only legal before `start`.

use std::time::Duration;

use crate::queue::DEFAULT_QUEUE_MAX;
use crate::reply::DEFAULT_TIMEOUT;

/// Which `KDBUS_HELLO_ATTACH_*` credential attachments to request during
/// the Hello handshake, plus whether fd-passing is accepted.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HelloFlags {
    pub accept_fd: bool,
    pub attach_comm: bool,
    pub attach_exe: bool,
    pub attach_cmdline: bool,
    pub attach_cgroup: bool,
    pub attach_caps: bool,
    pub attach_seclabel: bool,
    pub attach_audit: bool,
}

/// Configuration accepted by `Bus` setters prior to `start`. Setting any of
/// these after `start` is an `OperationNotPermitted` error (§4.1).
#[derive(Clone, Debug)]
pub struct BusConfig {
    pub address: Option<String>,
    pub is_server: bool,
    pub bus_client: bool,
    pub anonymous_auth: bool,
    pub hello_flags: HelloFlags,
    pub wqueue_max: usize,
    pub rqueue_max: usize,
    pub default_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            address: None,
            is_server: false,
            bus_client: false,
            anonymous_auth: false,
            hello_flags: HelloFlags::default(),
            wqueue_max: DEFAULT_QUEUE_MAX,
            rqueue_max: DEFAULT_QUEUE_MAX,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl BusConfig {
    pub fn new() -> Self { Self::default() }

    pub fn address(mut self, addr: impl Into<String>) -> Self { self.address = Some(addr.into()); self }
    pub fn server(mut self, v: bool) -> Self { self.is_server = v; self }
    pub fn bus_client(mut self, v: bool) -> Self { self.bus_client = v; self }
    pub fn anonymous_auth(mut self, v: bool) -> Self { self.anonymous_auth = v; self }
    pub fn wqueue_max(mut self, n: usize) -> Self { self.wqueue_max = n; self }
    pub fn rqueue_max(mut self, n: usize) -> Self { self.rqueue_max = n; self }
    pub fn default_timeout(mut self, d: Duration) -> Self { self.default_timeout = d; self }

    /// `start` rejects a connection configured as both a server and a bus client.
    pub fn is_valid_for_start(&self) -> bool { !(self.is_server && self.bus_client) }
}
