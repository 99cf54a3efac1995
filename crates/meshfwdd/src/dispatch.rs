//! Outbound dispatcher: drains the priority queue onto the radio.
//!
//! One message per poll. Nothing is dequeued while the radio is not ready,
//! so queued traffic waits out disconnections instead of being lost.
//! Broadcasts go out as a single frame. Everything else is chunked and each
//! chunk is sent to the current group or to every resolvable recipient.
//! Every radio send takes a quota slot first. A teardown while waiting for
//! a slot abandons the message; a send already handed to the radio is not
//! interrupted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use meshfwd_core::{wire, Gid};
use meshfwd_services::{Destination, GroupTracker, MessageQueue, OutboundMessage, QuotaLimiter};

use crate::connection::ConnectionCoordinator;
use crate::error::TransportError;
use crate::link::RadioLink;

pub struct OutboundDispatcher {
    link: Arc<dyn RadioLink>,
    connection: Arc<ConnectionCoordinator>,
    queue: Arc<dyn MessageQueue>,
    tracker: Arc<dyn GroupTracker>,
    quota: Arc<QuotaLimiter>,
    chunk_len: usize,
    poll_interval: Duration,
}

impl OutboundDispatcher {
    pub fn new(
        link: Arc<dyn RadioLink>,
        connection: Arc<ConnectionCoordinator>,
        queue: Arc<dyn MessageQueue>,
        tracker: Arc<dyn GroupTracker>,
        quota: Arc<QuotaLimiter>,
        chunk_len: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            link,
            connection,
            queue,
            tracker,
            quota,
            chunk_len,
            poll_interval,
        }
    }

    /// Run until shutdown or teardown. Never exits on connection loss.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(poll_ms = self.poll_interval.as_millis() as u64, "dispatcher started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("dispatcher shutting down");
                    return;
                }

                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            if self.connection.is_destroyed() {
                tracing::info!("transport destroyed, dispatcher exiting");
                return;
            }
            if !self.connection.is_ready() {
                continue;
            }

            let Some(message) = self.queue.pop_highest_priority() else {
                continue;
            };

            match self.dispatch_one(&message).await {
                Ok(sent) => tracing::debug!(
                    priority = ?message.priority,
                    len = message.payload.len(),
                    frames = sent,
                    "message dispatched"
                ),
                Err(TransportError::Destroyed) => {
                    tracing::info!("transport destroyed mid-message, dispatcher exiting");
                    return;
                }
                Err(e) => tracing::warn!(
                    priority = ?message.priority,
                    len = message.payload.len(),
                    error = %e,
                    "message dropped"
                ),
            }
        }
    }

    /// Put one message on the air. Returns the number of frames the radio
    /// accepted. Failed frames are logged and skipped, never retried.
    pub async fn dispatch_one(&self, message: &OutboundMessage) -> Result<usize, TransportError> {
        let targets: Vec<Gid> = match &message.destination {
            Destination::Broadcast => {
                self.connection.wait_for_quota(&self.quota).await?;
                self.link.send_broadcast(message.payload.clone()).await?;
                return Ok(1);
            }
            Destination::Group => {
                let group = self.tracker.current_group().ok_or(TransportError::NoGroup)?;
                vec![group.group_id]
            }
            Destination::Users { uids } => uids
                .iter()
                .filter_map(|uid| {
                    let gid = self.tracker.gid_for_uid(uid);
                    if gid.is_none() {
                        tracing::warn!(uid = %uid, "unknown recipient, skipping");
                    }
                    gid
                })
                .collect(),
        };

        let chunks = wire::split(&message.payload, self.chunk_len)?;

        let mut sent = 0;
        for chunk in &chunks {
            let frame = chunk.encode();
            for &target in &targets {
                self.connection.wait_for_quota(&self.quota).await?;
                match self.link.send(frame.clone(), target).await {
                    Ok(()) => sent += 1,
                    Err(e) => tracing::warn!(
                        target,
                        index = chunk.header.index(),
                        count = chunk.header.count(),
                        error = %e,
                        "chunk send failed"
                    ),
                }
            }
        }
        Ok(sent)
    }
}
