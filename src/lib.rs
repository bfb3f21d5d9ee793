/// Wita - health-checking pipe backend for PowerDNS
///
/// Wita answers `A` queries for a name whose first label is a group of
/// database servers. Every server is probed continuously with a TCP connect
/// and a one-byte read; a query returns the live primaries of the group, or
/// the live backups when no primary is up.
///
/// Everything runs on one thread: probe timers, probe sockets, the resolver
/// pipe and process signals all feed one event loop (see [`event`]).
pub mod config;
pub mod core;
pub mod error;
pub mod event;
pub mod health;
pub mod protocol;

pub use config::{RosterFile, RosterSource, Settings};
pub use error::{WitaError, WitaResult};
pub use event::{EventLoop, Shutdown};

use crate::protocol::Decoder;
use std::io::Write;
use tokio::io::AsyncRead;
use tracing::info;

/// A configured daemon, ready to run
pub struct Wita {
    settings: Settings,
    source: Box<dyn RosterSource>,
}

impl Wita {
    pub fn new(settings: Settings, source: Box<dyn RosterSource>) -> Self {
        Self { settings, source }
    }

    /// Serve the resolver on stdin/stdout until shutdown
    pub async fn run(self) -> WitaResult<Shutdown> {
        self.run_with(tokio::io::stdin(), std::io::stdout()).await
    }

    /// Serve the resolver on the given pipe ends until shutdown
    ///
    /// The initial roster must load; a failure here is fatal. Must be called
    /// within a tokio runtime.
    pub async fn run_with<R, W>(self, reader: R, writer: W) -> WitaResult<Shutdown>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: Write,
    {
        let roster = self.source.load()?;
        info!(
            source = %self.source.describe(),
            groups = roster.groups().len(),
            servers = roster.servers().len(),
            "configuration loaded"
        );

        let mut event_loop = EventLoop::new(
            roster,
            self.source,
            self.settings.probe_settings(),
            Decoder::new(self.settings.protocol.buffer_capacity),
            writer,
        );

        let _signals = event::spawn_signal_forwarder(event_loop.sender())?;
        let _reader = event::spawn_reader(reader, event_loop.sender());

        event_loop.start_probes()?;
        info!("wita v{} ready", env!("CARGO_PKG_VERSION"));

        event_loop.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Roster;
    use crate::error::ConfigError;
    use std::sync::{Arc, Mutex};

    /// Writer whose contents outlive the event loop
    #[derive(Clone, Default)]
    struct SharedOutput(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedOutput {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn empty_roster() -> Result<Roster, ConfigError> {
        let mut builder = Roster::builder();
        builder.add_group("sql-s1");
        Ok(builder.build())
    }

    #[tokio::test]
    async fn test_session_until_pipe_closes() {
        let pipe = tokio_test::io::Builder::new()
            .read(b"HELO\t1\nQ\tsql-s1.example.com\tIN\tA\t-1\t192.0.2.7\n")
            .build();
        let output = SharedOutput::default();

        let wita = Wita::new(Settings::default(), Box::new(empty_roster));
        let shutdown = wita.run_with(pipe, output.clone()).await.unwrap();

        assert_eq!(shutdown, Shutdown::FrontendClosed);
        assert_eq!(
            String::from_utf8(output.0.lock().unwrap().clone()).unwrap(),
            "OK\twita ready\nEND\n"
        );
    }

    #[tokio::test]
    async fn test_initial_load_failure_is_fatal() {
        let pipe = tokio_test::io::Builder::new().build();
        let source = || -> Result<Roster, ConfigError> {
            Err(ConfigError::IoError("cannot open configuration file".to_string()))
        };

        let wita = Wita::new(Settings::default(), Box::new(source));
        let result = wita.run_with(pipe, Vec::new()).await;
        assert!(matches!(result, Err(WitaError::Config(_))));
    }
}
