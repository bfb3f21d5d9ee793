/// One decoded command line
///
/// Tokens borrow from the line as raw bytes; the query name is echoed back
/// exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// `HELO` / `HELLO`, with the version token if one was given
    Hello(Option<&'a [u8]>),
    Axfr,
    /// `Q`; `None` when fewer than five fields followed
    Query(Option<Query<'a>>),
    /// Unrecognized keyword, or an empty line
    Unknown,
}

/// Fields of a `Q` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query<'a> {
    pub qname: &'a [u8],
    pub qclass: &'a [u8],
    pub qtype: &'a [u8],
    pub id: &'a [u8],
    pub remote: &'a [u8],
}

impl<'a> Query<'a> {
    /// The group a query addresses: its name up to the first `.`
    pub fn group_name(&self) -> &'a [u8] {
        match self.qname.iter().position(|&b| b == b'.') {
            Some(dot) => &self.qname[..dot],
            None => self.qname,
        }
    }

    pub fn is_internet_class(&self) -> bool {
        self.qclass == b"IN"
    }

    /// Whether the type can be answered with `A` records
    pub fn wants_address(&self) -> bool {
        self.qtype == b"A" || self.qtype == b"ANY"
    }
}

/// Split a line into tab-separated tokens
///
/// Runs of tabs count as one separator and leading or trailing tabs are
/// ignored, so no token is ever empty.
pub fn tokens(line: &[u8]) -> impl Iterator<Item = &[u8]> {
    line.split(|&b| b == b'\t').filter(|token| !token.is_empty())
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a [u8]) -> Self {
        let mut fields = tokens(line);

        match fields.next() {
            Some(b"HELO") | Some(b"HELLO") => Command::Hello(fields.next()),
            Some(b"AXFR") => Command::Axfr,
            Some(b"Q") => Command::Query(query_fields(&mut fields)),
            _ => Command::Unknown,
        }
    }
}

/// The five query fields; anything after them is ignored
fn query_fields<'a, I>(fields: &mut I) -> Option<Query<'a>>
where
    I: Iterator<Item = &'a [u8]>,
{
    Some(Query {
        qname: fields.next()?,
        qclass: fields.next()?,
        qtype: fields.next()?,
        id: fields.next()?,
        remote: fields.next()?,
    })
}
