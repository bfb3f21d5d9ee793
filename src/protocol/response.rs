/// Response lines written back to the resolver
use std::fmt;
use std::io::{self, Write};
use std::net::IpAddr;

/// TTL of every answer; liveness can change within seconds
pub const ANSWER_TTL: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    MissingVersion,
    UnsupportedVersion,
    AxfrUnsupported,
    NotEnoughArguments,
    UnsupportedClass,
    InvalidCommand,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            FailReason::MissingVersion => "Missing argument to HELO",
            FailReason::UnsupportedVersion => "Unrecognised protocol version",
            FailReason::AxfrUnsupported => "AXFR not supported",
            FailReason::NotEnoughArguments => "Not enough arguments to query",
            FailReason::UnsupportedClass => "Only IN class is supported",
            FailReason::InvalidCommand => "Unknown command (or invalid for this state)",
        };
        f.write_str(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response<'a> {
    Ready,
    Fail(FailReason),
    Data { qname: &'a [u8], address: IpAddr },
    End,
}

impl Response<'_> {
    /// Write the response as one line
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self {
            Response::Ready => out.write_all(b"OK\twita ready\n"),
            Response::Fail(reason) => writeln!(out, "FAIL\t{}", reason),
            Response::Data { qname, address } => {
                out.write_all(b"DATA\t")?;
                out.write_all(qname)?;
                writeln!(out, "\tIN\tA\t{}\t-1\t{}", ANSWER_TTL, address)
            }
            Response::End => out.write_all(b"END\n"),
        }
    }
}
