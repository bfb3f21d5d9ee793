/// Roster file loader
///
/// One group per line, first token the group name, the rest its servers:
///
/// ```text
/// # group      servers, ! marks a backup
/// sql-s1-fast  thyme !rosemary
/// sql-s1       rosemary !thyme:3307
/// ```
///
/// Tokens are separated by spaces or tabs. Blank lines and lines starting
/// with `#` are skipped. Every line, the last one included, must end with a
/// newline.
use super::RosterSource;
use crate::core::{Roster, RosterBuilder, DEFAULT_PORT};
use crate::error::ConfigError;
use fnv::FnvHashMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use tracing::debug;

/// Longest accepted line, newline included
pub const MAX_LINE_LENGTH: usize = 1023;

/// Hostname lookup used while building a roster
pub trait Resolver {
    fn resolve(&self, host: &str) -> Result<Ipv4Addr, ConfigError>;
}

/// Blocking lookup through the system resolver, first IPv4 address wins
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str) -> Result<Ipv4Addr, ConfigError> {
        let addrs = (host, 0)
            .to_socket_addrs()
            .map_err(|e| ConfigError::resolve(host, e))?;

        addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| ConfigError::resolve(host, "no IPv4 address"))
    }
}

/// Roster file on disk, re-read on every load
#[derive(Debug, Clone)]
pub struct RosterFile<R = SystemResolver> {
    path: PathBuf,
    resolver: R,
}

impl RosterFile<SystemResolver> {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            resolver: SystemResolver,
        }
    }
}

impl<R: Resolver> RosterFile<R> {
    pub fn with_resolver<P: Into<PathBuf>>(path: P, resolver: R) -> Self {
        Self {
            path: path.into(),
            resolver,
        }
    }
}

impl<R: Resolver> RosterSource for RosterFile<R> {
    fn load(&self) -> Result<Roster, ConfigError> {
        let content = fs::read(&self.path).map_err(|e| {
            ConfigError::IoError(format!(
                "cannot open configuration file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let roster = parse_roster(&content, &self.resolver)?;
        debug!(
            path = %self.path.display(),
            groups = roster.groups().len(),
            servers = roster.servers().len(),
            "roster loaded"
        );
        Ok(roster)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// One server reference within a group line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerToken<'a> {
    pub host: &'a str,
    pub port: u16,
    pub backup: bool,
}

/// Parse `[!]host[:port]`
pub fn parse_server_token(token: &str, line: usize) -> Result<ServerToken<'_>, ConfigError> {
    let (backup, name) = match token.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, token),
    };

    let (host, port) = match name.split_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .ok()
                .filter(|&port| port != 0)
                .ok_or_else(|| ConfigError::parse(line, format!("invalid port in {}", token)))?;
            (host, port)
        }
        None => (name, DEFAULT_PORT),
    };

    if host.is_empty() {
        return Err(ConfigError::parse(line, format!("empty server name in {}", token)));
    }

    Ok(ServerToken { host, port, backup })
}

/// Build a roster from file contents
///
/// The roster is complete when this returns; nothing of a failed parse is
/// ever installed.
pub fn parse_roster<R: Resolver>(content: &[u8], resolver: &R) -> Result<Roster, ConfigError> {
    let mut builder = RosterBuilder::new();
    let mut addresses: FnvHashMap<String, Ipv4Addr> = FnvHashMap::default();

    let mut rest = content;
    let mut number = 0;
    while !rest.is_empty() {
        number += 1;
        let end = match rest.iter().position(|&b| b == b'\n') {
            Some(end) if end < MAX_LINE_LENGTH => end,
            Some(_) => {
                return Err(ConfigError::parse(number, "line too long"));
            }
            None => {
                return Err(ConfigError::parse(number, "unterminated newline in configuration"));
            }
        };
        let line = std::str::from_utf8(&rest[..end])
            .map_err(|_| ConfigError::parse(number, "line is not valid UTF-8"))?;
        rest = &rest[end + 1..];

        if line.starts_with('#') {
            continue;
        }

        let mut tokens = line.split([' ', '\t']).filter(|t| !t.is_empty());
        let group_name = match tokens.next() {
            Some(name) => name,
            None => continue,
        };
        let group = builder.add_group(group_name);

        for token in tokens {
            let server = parse_server_token(token, number)?;
            let id = match builder.find_server(server.host, server.port) {
                Some(id) => id,
                None => {
                    let ip = match addresses.get(server.host) {
                        Some(ip) => *ip,
                        None => {
                            let ip = resolver.resolve(server.host)?;
                            addresses.insert(server.host.to_string(), ip);
                            ip
                        }
                    };
                    let addr = SocketAddr::new(IpAddr::V4(ip), server.port);
                    builder.add_server(server.host, server.port, addr)
                }
            };
            builder.add_member(group, id, server.backup);
        }
    }

    Ok(builder.build())
}
