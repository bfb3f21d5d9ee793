/// Resolver pipe reader
use super::{Event, EventSender, FrontendInput};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::trace;

const READ_CHUNK: usize = 4096;

/// Forward everything read from `reader` to the event loop
///
/// Ends after reporting EOF or the first read error, or once the loop has
/// gone away.
pub fn spawn_reader<R>(mut reader: R, events: EventSender) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        loop {
            buf.reserve(READ_CHUNK);
            let input = match reader.read_buf(&mut buf).await {
                Ok(0) => FrontendInput::Eof,
                Ok(n) => {
                    trace!(bytes = n, "read from resolver");
                    FrontendInput::Data(buf.split().freeze())
                }
                Err(e) => FrontendInput::Failed(e),
            };

            let last = !matches!(input, FrontendInput::Data(_));
            if events.send(Event::Frontend(input)).is_err() || last {
                break;
            }
        }
    })
}
