/// Readiness notification for an in-flight probe socket
use crate::event::{Event, EventSender, ServerKey};
use std::io;
use std::sync::Arc;
use tokio::io::Interest;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Interest registration for one server's probe socket
///
/// Works like [`OneShotTimer`](super::OneShotTimer): one outstanding
/// registration at a time, sequence-tagged events, aborted on drop.
#[derive(Debug, Default)]
pub struct ReadinessWatch {
    seq: u64,
    task: Option<JoinHandle<()>>,
}

impl ReadinessWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `Event::Ready` for `key` once `stream` is ready for `interest`
    ///
    /// Error and hang-up conditions also complete the wait; the handler
    /// tells them apart by inspecting the socket.
    pub fn watch(
        &mut self,
        stream: Arc<TcpStream>,
        interest: Interest,
        key: ServerKey,
        events: &EventSender,
    ) -> io::Result<()> {
        self.disarm();

        let runtime = Handle::try_current()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;
        let events = events.clone();
        self.task = Some(runtime.spawn(async move {
            let _ = stream.ready(interest).await;
            let _ = events.send(Event::Ready { server: key, seq });
        }));
        Ok(())
    }

    pub fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    #[cfg(test)]
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    /// Consume a readiness event; false when it is stale
    pub fn take_ready(&mut self, seq: u64) -> bool {
        if self.task.is_none() || seq != self.seq {
            return false;
        }
        self.task = None;
        true
    }
}

impl Drop for ReadinessWatch {
    fn drop(&mut self) {
        self.disarm();
    }
}
