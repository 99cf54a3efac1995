//! Routes inbound radio frames: beacons to discovery, chunks to reassembly.

use std::sync::Arc;

use bytes::Bytes;

use meshfwd_core::{Beacon, Gid};
use meshfwd_services::{FragmentOutcome, Listeners, Reassembler};

use crate::discovery::Discovery;

pub struct InboundRouter {
    reassembler: Arc<Reassembler>,
    discovery: Arc<Discovery>,
    listeners: Arc<Listeners>,
}

impl InboundRouter {
    pub fn new(reassembler: Arc<Reassembler>, discovery: Arc<Discovery>, listeners: Arc<Listeners>) -> Self {
        Self {
            reassembler,
            discovery,
            listeners,
        }
    }

    pub fn on_frame(&self, sender: Gid, frame: Bytes) {
        tracing::trace!(sender, frame = %hex::encode(&frame), "frame received");

        // A chunk header can never spell the beacon marker's first byte.
        if Beacon::is_beacon(&frame) {
            self.discovery.handle_beacon(&frame);
            return;
        }

        match self.reassembler.on_frame(sender, frame) {
            FragmentOutcome::Complete(message) => {
                tracing::debug!(sender, len = message.len(), "message received");
                self.listeners.message_received(sender, &message);
            }
            FragmentOutcome::Discarded(reason) => {
                tracing::warn!(sender, ?reason, "chunk discarded");
            }
            FragmentOutcome::Pending | FragmentOutcome::Duplicate => {}
        }
    }
}
