/// Per-server one-shot timer
use crate::event::{Event, EventSender, ServerKey};
use std::io;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A single-shot timer owned by one server
///
/// Arming replaces any earlier deadline, so at most one deadline is pending.
/// Each arm gets a fresh sequence number that the expiry event carries back;
/// an expiry whose sequence is no longer current was already queued when the
/// timer got re-armed or disarmed and must be ignored.
#[derive(Debug, Default)]
pub struct OneShotTimer {
    seq: u64,
    task: Option<JoinHandle<()>>,
}

impl OneShotTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `Event::Timer` for `key` after `after`
    pub fn arm(&mut self, after: Duration, key: ServerKey, events: &EventSender) -> io::Result<()> {
        self.disarm();

        if events.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "event loop is gone",
            ));
        }
        let runtime = Handle::try_current()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;
        let events = events.clone();
        self.task = Some(runtime.spawn(async move {
            tokio::time::sleep(after).await;
            let _ = events.send(Event::Timer { server: key, seq });
        }));
        Ok(())
    }

    /// Cancel the pending deadline, if any
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

    /// Consume an expiry event; false when it is stale
    pub fn take_expiry(&mut self, seq: u64) -> bool {
        if self.task.is_none() || seq != self.seq {
            return false;
        }
        self.task = None;
        true
    }
}

impl Drop for OneShotTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}
