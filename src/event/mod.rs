/// Event plumbing for the single-threaded daemon
///
/// Every source of work (probe timers, probe socket readiness, the resolver
/// pipe and process signals) is a small task that forwards an [`Event`] into
/// one channel. The [`EventLoop`] is the only consumer and the only owner of
/// the roster, so all state changes happen on one thread, one event at a time.
pub mod event_loop;
pub mod frontend;
pub mod signals;

pub use event_loop::{EventLoop, Shutdown};
pub use frontend::spawn_reader;
pub use signals::spawn_signal_forwarder;

use bytes::Bytes;
use std::io;
use tokio::sync::mpsc;

/// Identifies a server across roster generations
///
/// Events from servers of a roster that has since been replaced carry an
/// older generation and are dropped by the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerKey {
    pub generation: u64,
    pub index: usize,
}

#[derive(Debug)]
pub enum Event {
    /// A server's one-shot timer expired
    Timer { server: ServerKey, seq: u64 },
    /// A server's probe socket is ready (or in error)
    Ready { server: ServerKey, seq: u64 },
    Frontend(FrontendInput),
    Signal(SignalEvent),
}

/// What the resolver pipe produced
#[derive(Debug)]
pub enum FrontendInput {
    Data(Bytes),
    Eof,
    Failed(io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// Re-read the roster (SIGHUP)
    Reload,
    /// Shut down (SIGINT, SIGTERM)
    Terminate,
}

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
