//! Listener traits for transport events, and the set that holds them.
//!
//! Events fire from the link's inbound context. Implementations must return
//! quickly and never block on the transport itself.

use std::sync::{Arc, RwLock};

use meshfwd_core::Gid;

/// Receives complete application messages.
pub trait MessageListener: Send + Sync {
    fn on_message_received(&self, sender: Gid, message: &[u8]);
}

/// Receives discovery and group-membership events.
pub trait GroupListener: Send + Sync {
    fn on_peer_discovered(&self, callsign: &str, gid: Gid, uid: &str);

    fn on_group_created(&self, group_id: Gid, member_gids: &[Gid]);
}

/// Copy-on-iterate listener collection.
///
/// Notification works on a snapshot, so listeners can be added or removed
/// while an event is being delivered.
pub struct ListenerSet<L: ?Sized> {
    listeners: RwLock<Vec<Arc<L>>>,
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<L>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Remove by identity. Returns false if the listener was not registered.
    pub fn remove(&self, listener: &Arc<L>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All listener sets the transport notifies.
#[derive(Default)]
pub struct Listeners {
    pub messages: ListenerSet<dyn MessageListener>,
    pub groups: ListenerSet<dyn GroupListener>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_received(&self, sender: Gid, message: &[u8]) {
        for listener in self.messages.snapshot() {
            listener.on_message_received(sender, message);
        }
    }

    pub fn peer_discovered(&self, callsign: &str, gid: Gid, uid: &str) {
        for listener in self.groups.snapshot() {
            listener.on_peer_discovered(callsign, gid, uid);
        }
    }

    pub fn group_created(&self, group_id: Gid, member_gids: &[Gid]) {
        for listener in self.groups.snapshot() {
            listener.on_group_created(group_id, member_gids);
        }
    }
}
