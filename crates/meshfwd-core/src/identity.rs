//! Node and group identities on the mesh.

use serde::{Deserialize, Serialize};

/// Radio-network identifier of a node. Group ids live in the same space.
pub type Gid = u64;

/// Who a node is, on the radio (`gid`) and to the application (`uid`).
///
/// The local identity is fixed once the transport is built. Remote identities
/// are learned from discovery beacons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerIdentity {
    pub gid: Gid,
    pub uid: String,
    pub callsign: String,
}

impl PeerIdentity {
    pub fn new(gid: Gid, uid: impl Into<String>, callsign: impl Into<String>) -> Self {
        Self {
            gid,
            uid: uid.into(),
            callsign: callsign.into(),
        }
    }
}

/// A mesh group as acknowledged by the radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub group_id: Gid,
    /// Members in the order they were submitted to the radio.
    pub member_gids: Vec<Gid>,
}

impl GroupInfo {
    pub fn new(group_id: Gid, member_gids: Vec<Gid>) -> Self {
        Self {
            group_id,
            member_gids,
        }
    }

    pub fn contains(&self, gid: Gid) -> bool {
        self.member_gids.contains(&gid)
    }
}

/// Append `local` to `members` unless it is already there.
pub fn with_local_member(mut members: Vec<Gid>, local: Gid) -> Vec<Gid> {
    if !members.contains(&local) {
        members.push(local);
    }
    members
}
