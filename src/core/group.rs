/// Named server groups
use crate::core::ServerId;

/// One entry of a group: a server and whether it only serves as a fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub server: ServerId,
    pub backup: bool,
}

/// A group of servers answered under one DNS label
///
/// Membership order is preserved exactly as configured; answers are emitted
/// in that order.
#[derive(Debug, Clone)]
pub struct Group {
    name: String,
    members: Vec<Membership>,
}

impl Group {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[Membership] {
        &self.members
    }

    pub fn push(&mut self, server: ServerId, backup: bool) {
        self.members.push(Membership { server, backup });
    }

    /// Members that are answered while at least one of them is up
    pub fn primaries(&self) -> impl Iterator<Item = &Membership> {
        self.members.iter().filter(|m| !m.backup)
    }

    /// Members that are answered only when every primary is down
    pub fn backups(&self) -> impl Iterator<Item = &Membership> {
        self.members.iter().filter(|m| m.backup)
    }
}
