//! Peer discovery over broadcast beacons.
//!
//! A node that comes up broadcasts a beacon with the initial flag set. Every
//! node hearing it answers once with its own non-initial beacon, so the
//! newcomer learns the existing nodes without them all beaconing on a timer.

use std::sync::Arc;

use meshfwd_core::{Beacon, PeerIdentity, WireError};
use meshfwd_services::{Destination, Listeners, MessageQueue, Priority};

pub struct Discovery {
    identity: PeerIdentity,
    queue: Arc<dyn MessageQueue>,
    listeners: Arc<Listeners>,
}

impl Discovery {
    pub fn new(identity: PeerIdentity, queue: Arc<dyn MessageQueue>, listeners: Arc<Listeners>) -> Self {
        Self {
            identity,
            queue,
            listeners,
        }
    }

    /// Queue our beacon ahead of all other traffic.
    pub fn announce(&self, initial: bool) -> Result<(), WireError> {
        let frame = Beacon::from_identity(&self.identity, initial).encode()?;
        self.queue
            .enqueue(frame, Destination::Broadcast, Priority::Highest);
        tracing::debug!(initial, "discovery beacon queued");
        Ok(())
    }

    /// Handle an inbound beacon frame. Returns the beacon if it came from
    /// another node and parsed cleanly.
    pub fn handle_beacon(&self, frame: &[u8]) -> Option<Beacon> {
        let beacon = match Beacon::parse(frame) {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed beacon");
                return None;
            }
        };

        if beacon.gid == self.identity.gid {
            tracing::trace!("ignoring own beacon");
            return None;
        }

        tracing::debug!(
            gid = beacon.gid,
            uid = %beacon.uid,
            callsign = %beacon.callsign,
            initial = beacon.initial,
            "peer discovered"
        );

        if beacon.initial {
            if let Err(e) = self.announce(false) {
                tracing::warn!(error = %e, "failed to queue beacon reply");
            }
        }

        self.listeners
            .peer_discovered(&beacon.callsign, beacon.gid, &beacon.uid);
        Some(beacon)
    }
}
