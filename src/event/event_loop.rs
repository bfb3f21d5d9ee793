/// The daemon's single-threaded dispatch loop
use super::{channel, Event, EventReceiver, EventSender, FrontendInput, ServerKey, SignalEvent};
use crate::config::RosterSource;
use crate::core::{Roster, RosterHandle, ServerId};
use crate::error::{ProbeError, ProtocolError, WitaError};
use crate::health::{ProbeContext, ProbeSettings};
use crate::protocol::Decoder;
use std::io::Write;
use tracing::{debug, error, info, trace};

/// Why the loop stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// SIGINT or SIGTERM
    Terminated,
    /// The resolver closed the pipe
    FrontendClosed,
}

/// Owns the roster, the decoder and the receiving end of the event channel
///
/// Every event is handled to completion before the next one is received.
pub struct EventLoop<W: Write> {
    roster: RosterHandle,
    source: Box<dyn RosterSource>,
    decoder: Decoder,
    settings: ProbeSettings,
    events: EventSender,
    receiver: EventReceiver,
    output: W,
}

impl<W: Write> EventLoop<W> {
    pub fn new(
        roster: Roster,
        source: Box<dyn RosterSource>,
        settings: ProbeSettings,
        decoder: Decoder,
        output: W,
    ) -> Self {
        let (events, receiver) = channel();
        Self {
            roster: RosterHandle::new(roster),
            source,
            decoder,
            settings,
            events,
            receiver,
            output,
        }
    }

    /// Handle for event sources feeding this loop
    pub fn sender(&self) -> EventSender {
        self.events.clone()
    }

    pub fn roster(&self) -> &Roster {
        self.roster.current()
    }

    /// Kick off a first probe of every server in the current roster
    pub fn start_probes(&mut self) -> Result<(), ProbeError> {
        let generation = self.roster.current().generation();
        for (index, server) in self.roster.current_mut().servers_mut().iter_mut().enumerate() {
            let ctx = ProbeContext {
                key: ServerKey { generation, index },
                settings: &self.settings,
                events: &self.events,
            };
            server.start_check(&ctx)?;
        }
        Ok(())
    }

    /// Dispatch events until shutdown or a fatal error
    pub async fn run(&mut self) -> Result<Shutdown, WitaError> {
        loop {
            let event = match self.receiver.recv().await {
                Some(event) => event,
                None => return Err(WitaError::startup("event channel closed")),
            };

            if let Some(shutdown) = self.dispatch(event)? {
                return Ok(shutdown);
            }
        }
    }

    /// Handle one event
    pub fn dispatch(&mut self, event: Event) -> Result<Option<Shutdown>, WitaError> {
        match event {
            Event::Timer { server, seq } => {
                self.with_server(server, |server, ctx| server.handle_timer(seq, ctx))?;
                Ok(None)
            }
            Event::Ready { server, seq } => {
                self.with_server(server, |server, ctx| server.handle_ready(seq, ctx))?;
                Ok(None)
            }
            Event::Frontend(FrontendInput::Data(data)) => {
                self.decoder
                    .feed(&data, self.roster.current(), &mut self.output)?;
                Ok(None)
            }
            Event::Frontend(FrontendInput::Eof) => {
                info!("resolver closed the pipe, exiting");
                Ok(Some(Shutdown::FrontendClosed))
            }
            Event::Frontend(FrontendInput::Failed(e)) => Err(ProtocolError::Read(e).into()),
            Event::Signal(SignalEvent::Reload) => {
                self.reload()?;
                Ok(None)
            }
            Event::Signal(SignalEvent::Terminate) => {
                info!("received termination request, exiting");
                Ok(Some(Shutdown::Terminated))
            }
        }
    }

    /// Swap in a freshly loaded roster, or keep the current one on failure
    pub fn reload(&mut self) -> Result<(), ProbeError> {
        let source = self.source.describe();
        match self.source.load() {
            Ok(roster) => {
                let generation = self.roster.replace(roster);
                info!(
                    source = %source,
                    generation,
                    groups = self.roster.current().groups().len(),
                    servers = self.roster.current().servers().len(),
                    "configuration reloaded"
                );
                self.start_probes()
            }
            Err(e) => {
                error!(source = %source, error = %e, "cannot reload configuration, keeping current roster");
                Ok(())
            }
        }
    }

    fn with_server<F>(&mut self, key: ServerKey, f: F) -> Result<(), ProbeError>
    where
        F: FnOnce(&mut crate::core::Server, &ProbeContext<'_>) -> Result<(), ProbeError>,
    {
        let roster = self.roster.current_mut();
        if key.generation != roster.generation() {
            trace!(
                generation = key.generation,
                index = key.index,
                "dropping event for discarded roster"
            );
            return Ok(());
        }

        let server = match roster.server_mut(ServerId(key.index)) {
            Some(server) => server,
            None => {
                debug!(index = key.index, "event for unknown server");
                return Ok(());
            }
        };
        let ctx = ProbeContext {
            key,
            settings: &self.settings,
            events: &self.events,
        };
        f(server, &ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::health::ProbeState;
    use crate::protocol::DEFAULT_BUFFER_CAPACITY;
    use bytes::Bytes;
    use std::cell::Cell;
    use std::net::SocketAddr;
    use std::rc::Rc;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn fast_settings() -> ProbeSettings {
        ProbeSettings {
            interval: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(300),
            read_timeout: Duration::from_millis(100),
        }
    }

    fn roster_at(addr: SocketAddr) -> Roster {
        let mut builder = Roster::builder();
        let server = builder.add_server("thyme", addr.port(), addr);
        let group = builder.add_group("sql-s1");
        builder.add_member(group, server, false);
        builder.build()
    }

    fn event_loop(roster: Roster, source: Box<dyn RosterSource>) -> EventLoop<Vec<u8>> {
        EventLoop::new(
            roster,
            source,
            fast_settings(),
            Decoder::new(DEFAULT_BUFFER_CAPACITY),
            Vec::new(),
        )
    }

    fn failing_source() -> Box<dyn RosterSource> {
        Box::new(|| -> Result<Roster, ConfigError> {
            Err(ConfigError::parse(1, "unterminated newline in configuration"))
        })
    }

    fn feed(el: &mut EventLoop<Vec<u8>>, input: &'static str) -> String {
        el.output.clear();
        let shutdown = el
            .dispatch(Event::Frontend(FrontendInput::Data(Bytes::from_static(
                input.as_bytes(),
            ))))
            .unwrap();
        assert!(shutdown.is_none());
        String::from_utf8(el.output.clone()).unwrap()
    }

    const QUERY: &str = "Q\tsql-s1.example.com\tIN\tA\t-1\t192.0.2.7\n";

    #[tokio::test]
    async fn test_queries_follow_probe_results() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let _ = stream.write_all(b"J").await;
            }
        });

        let mut el = event_loop(roster_at(addr), failing_source());
        assert_eq!(feed(&mut el, "HELO\t1\n"), "OK\twita ready\n");
        assert_eq!(feed(&mut el, QUERY), "END\n");

        el.start_probes().unwrap();
        let pump = async {
            while !el.roster().servers()[0].is_online() {
                let event = el.receiver.recv().await.unwrap();
                el.dispatch(event).unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(5), pump).await.unwrap();

        assert_eq!(
            feed(&mut el, QUERY),
            "DATA\tsql-s1.example.com\tIN\tA\t10\t-1\t127.0.0.1\nEND\n"
        );
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_roster() {
        let addr: SocketAddr = "192.0.2.1:3306".parse().unwrap();
        let mut roster = roster_at(addr);
        roster.server_mut(ServerId(0)).unwrap().set_online(true);

        let mut el = event_loop(roster, failing_source());
        feed(&mut el, "HELO\t1\n");
        let before = feed(&mut el, QUERY);
        assert!(before.starts_with("DATA\t"));

        let shutdown = el.dispatch(Event::Signal(SignalEvent::Reload)).unwrap();
        assert!(shutdown.is_none());

        assert_eq!(el.roster().generation(), 1);
        assert_eq!(feed(&mut el, QUERY), before);
        // No probe was started for the kept roster
        assert!(!el.roster().servers()[0].health().has_pending_timer());
    }

    #[tokio::test]
    async fn test_successful_reload_replaces_roster() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let loads = Rc::new(Cell::new(0));
        let counter = Rc::clone(&loads);
        let source = move || -> Result<Roster, ConfigError> {
            counter.set(counter.get() + 1);
            let mut builder = Roster::builder();
            let server = builder.add_server("rosemary", addr.port(), addr);
            let group = builder.add_group("sql-s2");
            builder.add_member(group, server, false);
            Ok(builder.build())
        };

        let mut old = roster_at("192.0.2.1:3306".parse().unwrap());
        old.server_mut(ServerId(0)).unwrap().set_online(true);
        let mut el = event_loop(old, Box::new(source));
        feed(&mut el, "HELO\t1\n");

        el.dispatch(Event::Signal(SignalEvent::Reload)).unwrap();
        assert_eq!(loads.get(), 1);
        assert_eq!(el.roster().generation(), 2);
        assert!(el.roster().find_group("sql-s1").is_none());
        assert_eq!(feed(&mut el, QUERY), "END\n");

        // The new server starts down with a probe under way
        let server = &el.roster().servers()[0];
        assert!(!server.is_online());
        assert!(
            server.health().has_pending_watch() || server.health().has_pending_timer()
        );

        // Events of the discarded generation are dropped
        let stale = ServerKey {
            generation: 1,
            index: 0,
        };
        assert!(el
            .dispatch(Event::Timer {
                server: stale,
                seq: 1
            })
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_reload_tears_down_inflight_probes() {
        use tokio::io::AsyncReadExt;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let source = || -> Result<Roster, ConfigError> { Ok(Roster::default()) };

        let mut el = event_loop(roster_at(addr), Box::new(source));
        el.start_probes().unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();

        let pump = async {
            while el.roster().servers()[0].probe_state() != ProbeState::Reading {
                let event = el.receiver.recv().await.unwrap();
                el.dispatch(event).unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(5), pump).await.unwrap();
        assert!(el.roster().servers()[0].health().has_pending_timer());

        el.dispatch(Event::Signal(SignalEvent::Reload)).unwrap();
        assert_eq!(el.roster().generation(), 2);
        assert!(el.roster().servers().is_empty());

        // The discarded server's socket is closed
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(5), peer.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read, 0);

        // ...and its read timeout and interval timer never fire
        let quiet = tokio::time::timeout(Duration::from_millis(400), el.receiver.recv()).await;
        assert!(quiet.is_err(), "unexpected event: {:?}", quiet);
    }

    #[tokio::test]
    async fn test_terminate_stops_run() {
        let mut el = event_loop(Roster::default(), failing_source());
        el.sender()
            .send(Event::Signal(SignalEvent::Terminate))
            .unwrap();

        assert_eq!(el.run().await.unwrap(), Shutdown::Terminated);
    }

    #[tokio::test]
    async fn test_pipe_eof_and_failure() {
        let mut el = event_loop(Roster::default(), failing_source());

        let shutdown = el.dispatch(Event::Frontend(FrontendInput::Eof)).unwrap();
        assert_eq!(shutdown, Some(Shutdown::FrontendClosed));

        let failed = std::io::Error::new(std::io::ErrorKind::Other, "pipe broke");
        let result = el.dispatch(Event::Frontend(FrontendInput::Failed(failed)));
        assert!(matches!(
            result,
            Err(WitaError::Protocol(ProtocolError::Read(_)))
        ));
    }

    #[tokio::test]
    async fn test_overlong_line_is_fatal() {
        let mut el = EventLoop::new(
            Roster::default(),
            failing_source(),
            fast_settings(),
            Decoder::new(16),
            Vec::new(),
        );

        let result = el.dispatch(Event::Frontend(FrontendInput::Data(Bytes::from_static(
            b"HELO\t1111111111111111111111",
        ))));
        assert!(matches!(
            result,
            Err(WitaError::Protocol(ProtocolError::Overflow { .. }))
        ));
    }
}
