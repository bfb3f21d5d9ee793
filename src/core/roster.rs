/// Roster management: one complete configuration generation
use crate::core::{Group, GroupId, Server, ServerId};
use fnv::FnvHashMap;
use std::net::{IpAddr, SocketAddr};

/// All servers and groups of one configuration generation
///
/// Group memberships only ever reference servers of the same roster, so a
/// roster is always built completely before it is installed and discarded as
/// a whole.
#[derive(Debug, Default)]
pub struct Roster {
    generation: u64,
    servers: Vec<Server>,
    groups: Vec<Group>,
    group_index: FnvHashMap<String, GroupId>,
}

/// Incremental roster construction used by the configuration loader
#[derive(Debug, Default)]
pub struct RosterBuilder {
    servers: Vec<Server>,
    server_index: FnvHashMap<(String, u16), ServerId>,
    groups: Vec<Group>,
    group_index: FnvHashMap<String, GroupId>,
}

impl RosterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a server already added under this host and port
    pub fn find_server(&self, host: &str, port: u16) -> Option<ServerId> {
        self.server_index.get(&(host.to_string(), port)).copied()
    }

    /// Add a server, or return the existing one with the same host and port
    pub fn add_server(&mut self, host: &str, port: u16, addr: SocketAddr) -> ServerId {
        if let Some(id) = self.find_server(host, port) {
            return id;
        }

        let id = ServerId(self.servers.len());
        self.servers.push(Server::new(host, port, addr));
        self.server_index.insert((host.to_string(), port), id);
        id
    }

    /// Add an empty group
    ///
    /// A later group reusing an existing name is kept but never found by
    /// name; lookups return the first definition.
    pub fn add_group(&mut self, name: &str) -> GroupId {
        let id = GroupId(self.groups.len());
        self.groups.push(Group::new(name));
        self.group_index.entry(name.to_string()).or_insert(id);
        id
    }

    pub fn add_member(&mut self, group: GroupId, server: ServerId, backup: bool) {
        debug_assert!(server.0 < self.servers.len());
        if let Some(group) = self.groups.get_mut(group.0) {
            group.push(server, backup);
        }
    }

    pub fn build(self) -> Roster {
        Roster {
            generation: 0,
            servers: self.servers,
            groups: self.groups,
            group_index: self.group_index,
        }
    }
}

impl Roster {
    pub fn builder() -> RosterBuilder {
        RosterBuilder::new()
    }

    /// Generation number assigned when the roster was installed
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn servers_mut(&mut self) -> &mut [Server] {
        &mut self.servers
    }

    pub fn server(&self, id: ServerId) -> Option<&Server> {
        self.servers.get(id.0)
    }

    pub fn server_mut(&mut self, id: ServerId) -> Option<&mut Server> {
        self.servers.get_mut(id.0)
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn find_group(&self, name: &str) -> Option<&Group> {
        self.group_index
            .get(name)
            .and_then(|id| self.groups.get(id.0))
    }

    /// Addresses to answer for a group
    ///
    /// Every live primary in membership order; if none is live, every live
    /// backup in membership order instead.
    pub fn live_addresses(&self, group: &Group) -> Vec<IpAddr> {
        let primaries: Vec<IpAddr> = self.live(group.primaries()).collect();
        if !primaries.is_empty() {
            return primaries;
        }
        self.live(group.backups()).collect()
    }

    fn live<'a, I>(&'a self, members: I) -> impl Iterator<Item = IpAddr> + 'a
    where
        I: Iterator<Item = &'a crate::core::Membership> + 'a,
    {
        members
            .filter_map(move |m| self.servers.get(m.server.0))
            .filter(|server| server.is_online())
            .map(|server| server.ip())
    }
}

/// Owner of the current roster
///
/// Replacing the roster drops the previous one, which cancels every pending
/// timer and closes every in-flight probe socket that belonged to it.
#[derive(Debug)]
pub struct RosterHandle {
    current: Roster,
    next_generation: u64,
}

impl RosterHandle {
    pub fn new(mut roster: Roster) -> Self {
        roster.generation = 1;
        Self {
            current: roster,
            next_generation: 2,
        }
    }

    pub fn current(&self) -> &Roster {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut Roster {
        &mut self.current
    }

    /// Install a fully built roster and return its generation
    pub fn replace(&mut self, mut roster: Roster) -> u64 {
        roster.generation = self.next_generation;
        self.next_generation += 1;
        self.current = roster;
        self.current.generation
    }
}
