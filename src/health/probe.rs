/// Connect-and-read probe state machine
use super::{OneShotTimer, ProbeContext, ProbeFailure, ProbeState, ProbeTarget, ReadinessWatch};
use crate::error::ProbeError;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::Interest;
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace, warn};

/// Liveness and in-flight probe of one server
///
/// Transitions:
///
/// ```text
/// Idle --timer--> connect() --in progress--> Connecting --writable--> read 1 byte
///                    |                            |                      |
///                    +--connected-----------------|----------------------+
///                                                 |                      |
///                                  error/timeout  |        would block --+--> Reading
///                                                 v                              |
///                     Idle (+ next cycle armed) <-- up / down <------------------+
/// ```
///
/// Every path back to `Idle` arms the timer for the next cycle. If that
/// fails the server would never be probed again, which is reported as
/// [`ProbeError::LostServer`].
#[derive(Debug, Default)]
pub struct HealthCheck {
    state: ProbeState,
    online: bool,
    socket: Option<Arc<TcpStream>>,
    timer: OneShotTimer,
    watch: ReadinessWatch,
    cycles: u64,
}

impl HealthCheck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn has_pending_timer(&self) -> bool {
        self.timer.is_armed()
    }

    pub fn has_pending_watch(&self) -> bool {
        self.watch.is_armed()
    }

    /// Number of finished probe cycles, successful or not
    pub fn completed_cycles(&self) -> u64 {
        self.cycles
    }

    /// Open a socket and issue a non-blocking connect
    pub fn start_connect_check(
        &mut self,
        target: &ProbeTarget,
        ctx: &ProbeContext<'_>,
    ) -> Result<(), ProbeError> {
        debug_assert_eq!(self.state, ProbeState::Idle);
        self.timer.disarm();
        trace!(server = %target, "starting connect check");

        let socket = match open_socket(target.addr()) {
            Ok(socket) => socket,
            Err(e) => {
                error!(server = %target, error = %e, "cannot create probe socket");
                return self.cancel_check(target, ctx);
            }
        };

        match socket.connect(&target.addr().into()) {
            Ok(()) => {
                let stream = match register(socket) {
                    Ok(stream) => Arc::new(stream),
                    Err(e) => {
                        error!(server = %target, error = %e, "cannot register probe socket");
                        return self.cancel_check(target, ctx);
                    }
                };
                self.socket = Some(stream);
                self.start_read_check(target, ctx)
            }
            Err(ref e) if connect_in_progress(e) => {
                let stream = match register(socket) {
                    Ok(stream) => Arc::new(stream),
                    Err(e) => {
                        error!(server = %target, error = %e, "cannot register probe socket");
                        return self.cancel_check(target, ctx);
                    }
                };
                self.socket = Some(Arc::clone(&stream));
                self.state = ProbeState::Connecting;

                if let Err(e) = self.timer.arm(ctx.settings.connect_timeout, ctx.key, ctx.events) {
                    error!(server = %target, error = %e, "cannot set connect timer");
                    return self.cancel_check(target, ctx);
                }
                if let Err(e) = self.watch.watch(stream, Interest::WRITABLE, ctx.key, ctx.events) {
                    error!(server = %target, error = %e, "cannot watch probe socket");
                    return self.cancel_check(target, ctx);
                }
                Ok(())
            }
            Err(e) => self.server_down(target, ctx, ProbeFailure::Io(e)),
        }
    }

    /// The server's timer expired
    ///
    /// While idle this starts the next cycle; while connecting or reading it
    /// means the in-flight step timed out.
    pub fn handle_timer(
        &mut self,
        seq: u64,
        target: &ProbeTarget,
        ctx: &ProbeContext<'_>,
    ) -> Result<(), ProbeError> {
        if !self.timer.take_expiry(seq) {
            trace!(server = %target, seq, "ignoring stale timer");
            return Ok(());
        }

        match self.state {
            ProbeState::Idle => self.start_connect_check(target, ctx),
            ProbeState::Connecting | ProbeState::Reading => {
                self.server_down(target, ctx, ProbeFailure::TimedOut)
            }
        }
    }

    /// The probe socket became ready (or failed)
    pub fn handle_ready(
        &mut self,
        seq: u64,
        target: &ProbeTarget,
        ctx: &ProbeContext<'_>,
    ) -> Result<(), ProbeError> {
        if !self.watch.take_ready(seq) {
            trace!(server = %target, seq, "ignoring stale readiness");
            return Ok(());
        }

        let stream = match (&self.state, &self.socket) {
            (ProbeState::Idle, _) | (_, None) => return Ok(()),
            (_, Some(stream)) => Arc::clone(stream),
        };

        match stream.take_error() {
            Err(e) => {
                error!(server = %target, error = %e, "cannot retrieve socket error");
                return self.cancel_check(target, ctx);
            }
            Ok(Some(e)) => return self.server_down(target, ctx, ProbeFailure::Io(e)),
            Ok(None) => {}
        }

        match self.state {
            ProbeState::Connecting => self.start_read_check(target, ctx),
            ProbeState::Reading => self.finish_read_check(&stream, target, ctx),
            ProbeState::Idle => Ok(()),
        }
    }

    /// Connected: try for one byte, or wait for it with a fresh timeout
    fn start_read_check(
        &mut self,
        target: &ProbeTarget,
        ctx: &ProbeContext<'_>,
    ) -> Result<(), ProbeError> {
        let stream = match &self.socket {
            Some(stream) => Arc::clone(stream),
            None => return self.cancel_check(target, ctx),
        };

        let mut byte = [0u8; 1];
        match stream.try_read(&mut byte) {
            Ok(0) => self.server_down(target, ctx, ProbeFailure::NoData),
            Ok(_) => self.server_up(target, ctx),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.state = ProbeState::Reading;

                if let Err(e) = self.timer.arm(ctx.settings.read_timeout, ctx.key, ctx.events) {
                    error!(server = %target, error = %e, "cannot set timer for read timeout");
                    return self.cancel_check(target, ctx);
                }
                if let Err(e) = self.watch.watch(stream, Interest::READABLE, ctx.key, ctx.events) {
                    error!(server = %target, error = %e, "cannot watch probe socket");
                    return self.cancel_check(target, ctx);
                }
                Ok(())
            }
            Err(e) => self.server_down(target, ctx, ProbeFailure::Io(e)),
        }
    }

    /// Readable while reading: the byte, EOF or an error decides the cycle
    fn finish_read_check(
        &mut self,
        stream: &Arc<TcpStream>,
        target: &ProbeTarget,
        ctx: &ProbeContext<'_>,
    ) -> Result<(), ProbeError> {
        let mut byte = [0u8; 1];
        match stream.try_read(&mut byte) {
            Ok(0) => self.server_down(target, ctx, ProbeFailure::NoData),
            Ok(_) => self.server_up(target, ctx),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                // Spurious wakeup; the read timeout keeps running.
                if let Err(e) = self
                    .watch
                    .watch(Arc::clone(stream), Interest::READABLE, ctx.key, ctx.events)
                {
                    error!(server = %target, error = %e, "cannot watch probe socket");
                    return self.cancel_check(target, ctx);
                }
                Ok(())
            }
            Err(e) => self.server_down(target, ctx, ProbeFailure::Io(e)),
        }
    }

    fn server_up(&mut self, target: &ProbeTarget, ctx: &ProbeContext<'_>) -> Result<(), ProbeError> {
        if !self.online {
            info!(server = %target, "state now UP");
            self.online = true;
        } else {
            trace!(server = %target, "still up");
        }
        self.finish_cycle(target, ctx)
    }

    fn server_down(
        &mut self,
        target: &ProbeTarget,
        ctx: &ProbeContext<'_>,
        failure: ProbeFailure,
    ) -> Result<(), ProbeError> {
        if self.online {
            warn!(server = %target, reason = %failure, "state now DOWN");
            self.online = false;
        } else {
            debug!(server = %target, reason = %failure, "probe failed");
        }
        self.finish_cycle(target, ctx)
    }

    /// Abandon the cycle without touching liveness
    fn cancel_check(&mut self, target: &ProbeTarget, ctx: &ProbeContext<'_>) -> Result<(), ProbeError> {
        self.finish_cycle(target, ctx)
    }

    fn finish_cycle(&mut self, target: &ProbeTarget, ctx: &ProbeContext<'_>) -> Result<(), ProbeError> {
        self.watch.disarm();
        self.socket = None;
        self.state = ProbeState::Idle;
        self.cycles += 1;

        self.timer
            .arm(ctx.settings.interval, ctx.key, ctx.events)
            .map_err(|e| ProbeError::lost_server(target.to_string(), e))
    }

    #[cfg(test)]
    pub(crate) fn set_online(&mut self, online: bool) {
        self.online = online;
    }
}

fn open_socket(addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

fn register(socket: Socket) -> io::Result<TcpStream> {
    let std_stream: std::net::TcpStream = socket.into();
    TcpStream::from_std(std_stream)
}

fn connect_in_progress(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EINPROGRESS) || e.kind() == io::ErrorKind::WouldBlock
}
