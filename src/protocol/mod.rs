/// Resolver pipe protocol
///
/// The resolver writes one tab-separated command per line and expects each
/// answer to be complete and flushed before it sends the next one:
///
/// ```text
/// -> HELO\t1
/// <- OK\twita ready
/// -> Q\tsql-s1.example.com\tIN\tA\t-1\t192.0.2.7
/// <- DATA\tsql-s1.example.com\tIN\tA\t10\t-1\t10.0.0.5
/// <- END
/// ```
pub mod buffer;
pub mod command;
pub mod decoder;
pub mod response;

pub use buffer::LineBuffer;
pub use command::{Command, Query};
pub use decoder::{Decoder, SessionState};
pub use response::{FailReason, Response};

/// Longest line the resolver may send, delimiter included
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;
