/// Roster data model: servers, groups and the current configuration generation
pub mod group;
pub mod roster;
pub mod server;

pub use group::{Group, Membership};
pub use roster::{Roster, RosterBuilder, RosterHandle};
pub use server::Server;

/// Port probed when a server token carries no `:port` suffix
pub const DEFAULT_PORT: u16 = 3306;

/// Index of a server inside one roster generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerId(pub usize);

/// Index of a group inside one roster generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub usize);
