/// A single probed backend server
use crate::error::ProbeError;
use crate::health::{HealthCheck, ProbeContext, ProbeState, ProbeTarget};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// A backend server together with its health check state
///
/// The address is resolved once when the roster is built and never changes
/// for the lifetime of this value. Dropping a server tears down its timer,
/// readiness watch and probe socket.
#[derive(Debug)]
pub struct Server {
    target: ProbeTarget,
    check: HealthCheck,
}

impl Server {
    pub fn new<S: Into<String>>(host: S, port: u16, addr: SocketAddr) -> Self {
        Self {
            target: ProbeTarget::new(host, port, addr),
            check: HealthCheck::new(),
        }
    }

    pub fn host(&self) -> &str {
        self.target.host()
    }

    pub fn port(&self) -> u16 {
        self.target.port()
    }

    pub fn addr(&self) -> SocketAddr {
        self.target.addr()
    }

    pub fn ip(&self) -> IpAddr {
        self.target.addr().ip()
    }

    pub fn is_online(&self) -> bool {
        self.check.is_online()
    }

    pub fn probe_state(&self) -> ProbeState {
        self.check.state()
    }

    pub fn health(&self) -> &HealthCheck {
        &self.check
    }

    /// Begin a probe right away instead of waiting for the timer
    pub fn start_check(&mut self, ctx: &ProbeContext<'_>) -> Result<(), ProbeError> {
        self.check.start_connect_check(&self.target, ctx)
    }

    pub fn handle_timer(&mut self, seq: u64, ctx: &ProbeContext<'_>) -> Result<(), ProbeError> {
        self.check.handle_timer(seq, &self.target, ctx)
    }

    pub fn handle_ready(&mut self, seq: u64, ctx: &ProbeContext<'_>) -> Result<(), ProbeError> {
        self.check.handle_ready(seq, &self.target, ctx)
    }

    #[cfg(test)]
    pub(crate) fn set_online(&mut self, online: bool) {
        self.check.set_online(online);
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.target, f)
    }
}
