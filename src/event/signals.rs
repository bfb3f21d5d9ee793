/// Process signal forwarding
///
/// SIGHUP asks for a roster reload; SIGINT and SIGTERM ask for shutdown.
/// Handlers are registered before the task is spawned so that a signal
/// arriving right after startup is not lost.
use super::{Event, EventSender, SignalEvent};
use crate::error::WitaError;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::debug;

pub fn spawn_signal_forwarder(events: EventSender) -> Result<JoinHandle<()>, WitaError> {
    let mut hangup = signal(SignalKind::hangup()).map_err(WitaError::Signal)?;
    let mut interrupt = signal(SignalKind::interrupt()).map_err(WitaError::Signal)?;
    let mut terminate = signal(SignalKind::terminate()).map_err(WitaError::Signal)?;

    Ok(tokio::spawn(async move {
        loop {
            let signal = tokio::select! {
                Some(()) = hangup.recv() => {
                    debug!("received SIGHUP");
                    SignalEvent::Reload
                }
                Some(()) = interrupt.recv() => {
                    debug!("received SIGINT");
                    SignalEvent::Terminate
                }
                Some(()) = terminate.recv() => {
                    debug!("received SIGTERM");
                    SignalEvent::Terminate
                }
                else => break,
            };

            if events.send(Event::Signal(signal)).is_err() {
                break;
            }
        }
    }))
}
