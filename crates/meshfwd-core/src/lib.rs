//! meshfwd-core: shared types, wire formats, and configuration.
//! All other meshfwd crates depend on this one.

pub mod config;
pub mod identity;
pub mod region;
pub mod wire;

pub use identity::{Gid, GroupInfo, PeerIdentity};
pub use region::Region;
pub use wire::{Beacon, ChunkFrame, ChunkHeader, WireError};
