//! Peer directory: who is out there, and which group we belong to.
//!
//! Fed by discovery beacons and group events. The dispatcher reads it through
//! [`GroupTracker`] to resolve uids and the current group at send time.

use std::sync::{Arc, RwLock};

use dashmap::DashMap;

use meshfwd_core::{Gid, GroupInfo, PeerIdentity};

use crate::listener::GroupListener;

/// Lookup surface the dispatcher needs.
pub trait GroupTracker: Send + Sync {
    fn gid_for_uid(&self, uid: &str) -> Option<Gid>;

    fn current_group(&self) -> Option<GroupInfo>;
}

/// Known peers keyed on uid, plus the group we last joined.
#[derive(Default)]
pub struct PeerDirectory {
    peers: DashMap<String, PeerIdentity>,
    group: RwLock<Option<GroupInfo>>,
}

impl PeerDirectory {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record or refresh a peer. A uid seen under a new GID is re-keyed.
    pub fn upsert(&self, peer: PeerIdentity) {
        if let Some(previous) = self.peers.insert(peer.uid.clone(), peer.clone()) {
            if previous.gid != peer.gid {
                tracing::info!(uid = %peer.uid, old = previous.gid, new = peer.gid, "peer gid changed");
            }
        }
    }

    pub fn get(&self, uid: &str) -> Option<PeerIdentity> {
        self.peers.get(uid).map(|entry| entry.value().clone())
    }

    pub fn peers(&self) -> Vec<PeerIdentity> {
        let mut peers: Vec<PeerIdentity> = self.peers.iter().map(|e| e.value().clone()).collect();
        peers.sort_by_key(|p| p.gid);
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn set_group(&self, group: GroupInfo) {
        *self.group.write().unwrap_or_else(|e| e.into_inner()) = Some(group);
    }

    pub fn clear_group(&self) {
        *self.group.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl GroupTracker for PeerDirectory {
    fn gid_for_uid(&self, uid: &str) -> Option<Gid> {
        self.peers.get(uid).map(|entry| entry.gid)
    }

    fn current_group(&self) -> Option<GroupInfo> {
        self.group.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl GroupListener for PeerDirectory {
    fn on_peer_discovered(&self, callsign: &str, gid: Gid, uid: &str) {
        self.upsert(PeerIdentity::new(gid, uid, callsign));
    }

    fn on_group_created(&self, group_id: Gid, member_gids: &[Gid]) {
        self.set_group(GroupInfo::new(group_id, member_gids.to_vec()));
    }
}
