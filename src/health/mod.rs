/// Health checking for backend servers
///
/// Every server runs its own probe cycle: a non-blocking TCP connect followed
/// by a one-byte read. A server that accepts the connection and sends
/// anything (a database greeting, typically) is up; refusal, EOF, an error or
/// a timeout marks it down. After each cycle the server waits one interval
/// before probing again.
pub mod probe;
pub mod timer;
pub mod watch;

pub use probe::HealthCheck;
pub use timer::OneShotTimer;
pub use watch::ReadinessWatch;

use crate::event::{EventSender, ServerKey};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// Probe cycle of a single server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeState {
    /// No probe running; waiting for the next scheduled cycle
    #[default]
    Idle,
    /// Non-blocking connect issued, waiting for writable or error
    Connecting,
    /// Connected, waiting for the first byte
    Reading,
}

impl fmt::Display for ProbeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeState::Idle => write!(f, "idle"),
            ProbeState::Connecting => write!(f, "connecting"),
            ProbeState::Reading => write!(f, "reading"),
        }
    }
}

/// Why a probe cycle marked a server down
#[derive(Debug)]
pub enum ProbeFailure {
    TimedOut,
    NoData,
    Io(io::Error),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::TimedOut => write!(f, "timed out"),
            ProbeFailure::NoData => write!(f, "connection closed without data"),
            ProbeFailure::Io(e) => write!(f, "{}", e),
        }
    }
}

/// Probe cadence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Wait between the end of one cycle and the start of the next
    pub interval: Duration,
    /// Limit on the connect phase
    pub connect_timeout: Duration,
    /// Limit on waiting for the first byte
    pub read_timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
        }
    }
}

/// What a server's probe connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    host: String,
    port: u16,
    addr: SocketAddr,
}

impl ProbeTarget {
    pub fn new<S: Into<String>>(host: S, port: u16, addr: SocketAddr) -> Self {
        Self {
            host: host.into(),
            port,
            addr,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]:{}", self.host, self.addr.ip(), self.port)
    }
}

/// Everything a state transition needs besides the server itself
#[derive(Debug, Clone, Copy)]
pub struct ProbeContext<'a> {
    /// Tag carried by every timer and readiness event of this server
    pub key: ServerKey,
    pub settings: &'a ProbeSettings,
    pub events: &'a EventSender,
}
