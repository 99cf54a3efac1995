//! Radio link abstraction.
//!
//! The radio is request/response on the way out and event-driven on the way
//! in. Each request is one awaited call that resolves when the radio acks or
//! rejects it. Everything the radio pushes on its own (status changes,
//! inbound frames, invitations) arrives on the [`LinkEvent`] channel handed
//! out when the link is created.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use meshfwd_core::config::DeviceType;
use meshfwd_core::{Gid, PeerIdentity, Region};

pub mod memory;
pub mod udp;

pub use memory::{MemoryLink, MemoryMesh, Transmission, TransmissionKind};
pub use udp::UdpLink;

/// Connection status as reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Scanning,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Status(LinkStatus),

    /// A raw frame from another node.
    Frame { sender: Gid, payload: Bytes },

    /// Another node added us to a group.
    GroupInvite { group_id: Gid, members: Vec<Gid> },
}

pub type LinkEventSender = mpsc::UnboundedSender<LinkEvent>;
pub type LinkEventReceiver = mpsc::UnboundedReceiver<LinkEvent>;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("radio is not connected")]
    NotConnected,

    #[error("frame of {len} bytes exceeds the {max}-byte radio limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("no node or group with gid {0}")]
    UnknownDestination(Gid),

    #[error("radio rejected request: {0}")]
    Rejected(String),

    #[error("link i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("datagram encoding failed: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Everything the transport asks of a radio.
///
/// Requests may overlap; implementations must not assume completions arrive
/// in request order.
#[async_trait]
pub trait RadioLink: Send + Sync {
    /// Begin scanning for the radio. Progress is reported as
    /// [`LinkEvent::Status`].
    async fn connect(&self, device_type: DeviceType) -> Result<(), LinkError>;

    async fn disconnect(&self) -> Result<(), LinkError>;

    async fn set_region(&self, region: Region) -> Result<(), LinkError>;

    async fn set_local_identity(&self, identity: &PeerIdentity) -> Result<(), LinkError>;

    /// Send one frame to a node or group GID.
    async fn send(&self, frame: Bytes, destination: Gid) -> Result<(), LinkError>;

    async fn send_broadcast(&self, frame: Bytes) -> Result<(), LinkError>;

    /// Ask the radio to form a group. Resolves to the new group id.
    async fn create_group(&self, members: &[Gid]) -> Result<Gid, LinkError>;

    async fn invite_to_group(
        &self,
        group_id: Gid,
        members: &[Gid],
        new_member: Gid,
    ) -> Result<(), LinkError>;
}

/// Reject frames the radio cannot carry.
pub(crate) fn check_frame_len(frame: &[u8]) -> Result<(), LinkError> {
    let max = meshfwd_core::config::MAX_FRAME_BYTES;
    if frame.len() > max {
        return Err(LinkError::FrameTooLarge {
            len: frame.len(),
            max,
        });
    }
    Ok(())
}
