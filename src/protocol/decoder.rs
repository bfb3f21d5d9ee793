/// Session decoder for the resolver pipe
use super::command::{Command, Query};
use super::response::{FailReason, Response};
use super::{LineBuffer, DEFAULT_BUFFER_CAPACITY};
use crate::core::Roster;
use crate::error::ProtocolError;
use std::io::Write;
use tracing::{debug, info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing but a hello is accepted
    AwaitingHello,
    /// Hello done; queries are answered. Never left again.
    Running,
}

/// Turns pipe input into answers against the current roster
#[derive(Debug)]
pub struct Decoder {
    state: SessionState,
    buffer: LineBuffer,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl Decoder {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: SessionState::AwaitingHello,
            buffer: LineBuffer::new(capacity),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bytes held back as an incomplete line
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Consume pipe input and answer every complete line in it
    ///
    /// Each response is flushed before the next line is looked at. A line
    /// longer than the buffer is a framing violation the session cannot
    /// recover from.
    pub fn feed<W: Write>(
        &mut self,
        mut data: &[u8],
        roster: &Roster,
        out: &mut W,
    ) -> Result<(), ProtocolError> {
        loop {
            let taken = self.buffer.fill(data);
            data = &data[taken..];

            while let Some(line) = self.buffer.next_line() {
                self.handle_line(&line, roster, out)?;
            }

            if self.buffer.is_stuck() {
                return Err(ProtocolError::Overflow {
                    capacity: self.buffer.capacity(),
                });
            }
            if data.is_empty() {
                return Ok(());
            }
        }
    }

    fn handle_line<W: Write>(
        &mut self,
        line: &[u8],
        roster: &Roster,
        out: &mut W,
    ) -> Result<(), ProtocolError> {
        trace!(line = %String::from_utf8_lossy(line), "resolver command");

        match (self.state, Command::parse(line)) {
            (SessionState::AwaitingHello, Command::Hello(version)) => self.hello(version, out),
            (SessionState::Running, Command::Axfr) => {
                respond(out, &[Response::Fail(FailReason::AxfrUnsupported)])
            }
            (SessionState::Running, Command::Query(None)) => {
                respond(out, &[Response::Fail(FailReason::NotEnoughArguments)])
            }
            (SessionState::Running, Command::Query(Some(query))) => answer(&query, roster, out),
            _ => respond(out, &[Response::Fail(FailReason::InvalidCommand)]),
        }
    }

    fn hello<W: Write>(&mut self, version: Option<&[u8]>, out: &mut W) -> Result<(), ProtocolError> {
        let response = match version {
            None => Response::Fail(FailReason::MissingVersion),
            Some(b"1") => {
                debug!("resolver session established");
                self.state = SessionState::Running;
                Response::Ready
            }
            Some(_) => Response::Fail(FailReason::UnsupportedVersion),
        };
        respond(out, &[response])
    }
}

/// Answer a query from the roster's current liveness
///
/// Checks run in a fixed order: class, then type, then group.
fn answer<W: Write>(query: &Query<'_>, roster: &Roster, out: &mut W) -> Result<(), ProtocolError> {
    if !query.is_internet_class() {
        return respond(out, &[Response::Fail(FailReason::UnsupportedClass)]);
    }
    if !query.wants_address() {
        return respond(out, &[Response::End]);
    }

    let name = String::from_utf8_lossy(query.group_name());
    let group = match roster.find_group(&name) {
        Some(group) => group,
        None => {
            info!(group = %name, "request for group which does not exist");
            return respond(out, &[Response::End]);
        }
    };

    let mut responses: Vec<Response<'_>> = roster
        .live_addresses(group)
        .into_iter()
        .map(|address| Response::Data {
            qname: query.qname,
            address,
        })
        .collect();
    responses.push(Response::End);
    respond(out, &responses)
}

fn respond<W: Write>(out: &mut W, responses: &[Response<'_>]) -> Result<(), ProtocolError> {
    for response in responses {
        response.write_to(out).map_err(ProtocolError::Write)?;
    }
    out.flush().map_err(ProtocolError::Write)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServerId;
    use std::net::SocketAddr;

    const THYME: &str = "10.0.0.5";
    const ROSEMARY: &str = "10.0.0.6";

    /// `sql-s1-fast thyme !rosemary` and `sql-s1 rosemary !thyme`
    fn sample_roster(thyme_up: bool, rosemary_up: bool) -> Roster {
        let mut builder = Roster::builder();
        let thyme = builder.add_server("thyme", 3306, SocketAddr::new(THYME.parse().unwrap(), 3306));
        let rosemary =
            builder.add_server("rosemary", 3306, SocketAddr::new(ROSEMARY.parse().unwrap(), 3306));

        let fast = builder.add_group("sql-s1-fast");
        builder.add_member(fast, thyme, false);
        builder.add_member(fast, rosemary, true);
        let slow = builder.add_group("sql-s1");
        builder.add_member(slow, rosemary, false);
        builder.add_member(slow, thyme, true);

        let mut roster = builder.build();
        roster.server_mut(ServerId(0)).unwrap().set_online(thyme_up);
        roster.server_mut(ServerId(1)).unwrap().set_online(rosemary_up);
        roster
    }

    fn run(decoder: &mut Decoder, roster: &Roster, input: &str) -> String {
        let mut out = Vec::new();
        decoder.feed(input.as_bytes(), roster, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn running(roster: &Roster) -> Decoder {
        let mut decoder = Decoder::default();
        assert_eq!(run(&mut decoder, roster, "HELO\t1\n"), "OK\twita ready\n");
        decoder
    }

    #[test]
    fn test_hello_handshake() {
        let roster = sample_roster(true, false);
        let mut decoder = Decoder::default();

        assert_eq!(
            run(&mut decoder, &roster, "HELO\n"),
            "FAIL\tMissing argument to HELO\n"
        );
        assert_eq!(
            run(&mut decoder, &roster, "HELO\t2\n"),
            "FAIL\tUnrecognised protocol version\n"
        );
        assert_eq!(decoder.state(), SessionState::AwaitingHello);

        assert_eq!(run(&mut decoder, &roster, "HELLO\t1\n"), "OK\twita ready\n");
        assert_eq!(decoder.state(), SessionState::Running);

        // A second hello is not a command of the running session
        assert_eq!(
            run(&mut decoder, &roster, "HELO\t1\n"),
            "FAIL\tUnknown command (or invalid for this state)\n"
        );
        assert_eq!(decoder.state(), SessionState::Running);
    }

    #[test]
    fn test_query_before_hello_is_rejected() {
        let roster = sample_roster(true, true);
        let mut decoder = Decoder::default();

        assert_eq!(
            run(&mut decoder, &roster, "Q\tsql-s1.example.com\tIN\tA\t-1\t192.0.2.7\n"),
            "FAIL\tUnknown command (or invalid for this state)\n"
        );
        assert_eq!(
            run(&mut decoder, &roster, "AXFR\n"),
            "FAIL\tUnknown command (or invalid for this state)\n"
        );
    }

    #[test]
    fn test_primary_answers() {
        let roster = sample_roster(true, false);
        let mut decoder = running(&roster);

        assert_eq!(
            run(&mut decoder, &roster, "Q\tsql-s1-fast.example.com\tIN\tA\t-1\t192.0.2.7\n"),
            "DATA\tsql-s1-fast.example.com\tIN\tA\t10\t-1\t10.0.0.5\nEND\n"
        );
    }

    #[test]
    fn test_backup_answers_when_primary_down() {
        let roster = sample_roster(true, false);
        let mut decoder = running(&roster);

        assert_eq!(
            run(&mut decoder, &roster, "Q\tsql-s1.example.com\tIN\tANY\t-1\t192.0.2.7\n"),
            "DATA\tsql-s1.example.com\tIN\tA\t10\t-1\t10.0.0.5\nEND\n"
        );
    }

    #[test]
    fn test_backups_hidden_while_primary_up() {
        let roster = sample_roster(true, true);
        let mut decoder = running(&roster);

        assert_eq!(
            run(&mut decoder, &roster, "Q\tsql-s1.example.com\tIN\tA\t-1\t192.0.2.7\n"),
            "DATA\tsql-s1.example.com\tIN\tA\t10\t-1\t10.0.0.6\nEND\n"
        );
    }

    #[test]
    fn test_nothing_live() {
        let roster = sample_roster(false, false);
        let mut decoder = running(&roster);

        assert_eq!(
            run(&mut decoder, &roster, "Q\tsql-s1.example.com\tIN\tA\t-1\t192.0.2.7\n"),
            "END\n"
        );
    }

    #[test]
    fn test_unknown_group_and_type() {
        let roster = sample_roster(true, true);
        let mut decoder = running(&roster);

        assert_eq!(
            run(&mut decoder, &roster, "Q\tsql-s9.example.com\tIN\tA\t-1\t192.0.2.7\n"),
            "END\n"
        );
        assert_eq!(
            run(&mut decoder, &roster, "Q\tsql-s1.example.com\tIN\tMX\t-1\t192.0.2.7\n"),
            "END\n"
        );
    }

    #[test]
    fn test_query_failures() {
        let roster = sample_roster(true, true);
        let mut decoder = running(&roster);

        assert_eq!(
            run(&mut decoder, &roster, "Q\tsql-s1.example.com\tIN\tA\n"),
            "FAIL\tNot enough arguments to query\n"
        );
        // Class is checked before type
        assert_eq!(
            run(&mut decoder, &roster, "Q\tsql-s1.example.com\tCH\tMX\t-1\t192.0.2.7\n"),
            "FAIL\tOnly IN class is supported\n"
        );
        assert_eq!(run(&mut decoder, &roster, "AXFR\n"), "FAIL\tAXFR not supported\n");
        assert_eq!(
            run(&mut decoder, &roster, "\n"),
            "FAIL\tUnknown command (or invalid for this state)\n"
        );
        assert_eq!(decoder.state(), SessionState::Running);
    }

    #[test]
    fn test_same_query_same_answer() {
        let roster = sample_roster(true, true);
        let mut decoder = running(&roster);
        let query = "Q\tsql-s1-fast.example.com\tIN\tA\t-1\t192.0.2.7\n";

        let first = run(&mut decoder, &roster, query);
        let second = run(&mut decoder, &roster, query);
        assert_eq!(first, second);
    }

    #[test]
    fn test_partial_lines_are_held_back() {
        let roster = sample_roster(true, false);
        let mut decoder = Decoder::default();

        assert_eq!(run(&mut decoder, &roster, "HE"), "");
        assert_eq!(decoder.pending(), 2);
        assert_eq!(
            run(&mut decoder, &roster, "LO\t1\nQ\tsql-s1-fast.example.com\tIN"),
            "OK\twita ready\n"
        );
        assert_eq!(
            run(&mut decoder, &roster, "\tA\t-1\t192.0.2.7\nAXFR\n"),
            "DATA\tsql-s1-fast.example.com\tIN\tA\t10\t-1\t10.0.0.5\nEND\nFAIL\tAXFR not supported\n"
        );
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_input_larger_than_buffer_is_fine_with_newlines() {
        let roster = sample_roster(true, false);
        let mut decoder = Decoder::new(16);
        let input = "HELO\t1\n".repeat(2) + &"AXFR\n".repeat(10);

        let output = run(&mut decoder, &roster, &input);
        assert!(output.starts_with("OK\twita ready\nFAIL\tUnknown command"));
        assert_eq!(output.matches("FAIL\tAXFR not supported\n").count(), 10);
    }

    #[test]
    fn test_overlong_line_is_fatal() {
        let roster = sample_roster(true, false);
        let mut decoder = Decoder::new(16);
        let mut out = Vec::new();

        let result = decoder.feed(&[b'x'; 40], &roster, &mut out);
        assert!(matches!(result, Err(ProtocolError::Overflow { capacity: 16 })));
    }

    #[test]
    fn test_write_failure_is_reported() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let roster = sample_roster(true, false);
        let mut decoder = Decoder::default();
        let result = decoder.feed(b"HELO\t1\n", &roster, &mut Closed);
        assert!(matches!(result, Err(ProtocolError::Write(_))));
    }
}
