//! In-process mesh: several radio links wired together without hardware.
//!
//! Every node attached to a [`MemoryMesh`] gets a [`MemoryLink`] and an event
//! receiver. Frames sent to a node GID, a group GID, or broadcast are pushed
//! straight into the recipients' event channels. Every request that would
//! cost airtime on a real radio is appended to the mesh's transmission log.
//!
//! Faults can be injected per node: rejecting the identity push, failing
//! sends, or dropping the connection as if the radio went away.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;

use meshfwd_core::config::DeviceType;
use meshfwd_core::{Gid, PeerIdentity, Region};

use super::{check_frame_len, LinkError, LinkEvent, LinkEventReceiver, LinkStatus, RadioLink};

/// Group ids handed out by the mesh start here, clear of typical node GIDs.
const FIRST_GROUP_ID: Gid = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmissionKind {
    /// To a node or group GID.
    Unicast { destination: Gid },
    Broadcast,
    CreateGroup { group_id: Gid, members: Vec<Gid> },
    Invite { group_id: Gid, member: Gid },
}

/// One radio request, as seen on the air.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub at: Instant,
    pub from: Gid,
    pub kind: TransmissionKind,
    pub frame: Bytes,
}

struct Node {
    gid: Mutex<Option<Gid>>,
    connected: AtomicBool,
    region: Mutex<Option<Region>>,
    events: mpsc::UnboundedSender<LinkEvent>,
    reject_identity: AtomicBool,
    fail_sends: AtomicBool,
}

impl Node {
    fn gid(&self) -> Option<Gid> {
        *self.gid.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn deliver(&self, event: LinkEvent) {
        // Receiver gone means the node was torn down; nothing to do.
        let _ = self.events.send(event);
    }
}

struct MeshState {
    nodes: DashMap<u64, Arc<Node>>,
    groups: DashMap<Gid, Vec<Gid>>,
    next_node: AtomicU64,
    next_group: AtomicU64,
    log: Mutex<Vec<Transmission>>,
}

/// Shared medium all attached links transmit on.
#[derive(Clone)]
pub struct MemoryMesh {
    state: Arc<MeshState>,
}

impl Default for MemoryMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMesh {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MeshState {
                nodes: DashMap::new(),
                groups: DashMap::new(),
                next_node: AtomicU64::new(0),
                next_group: AtomicU64::new(FIRST_GROUP_ID),
                log: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Add a radio to the mesh. It stays silent until connected and given
    /// an identity.
    pub fn attach(&self) -> (Arc<MemoryLink>, LinkEventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let id = self.state.next_node.fetch_add(1, Ordering::Relaxed);
        let node = Arc::new(Node {
            gid: Mutex::new(None),
            connected: AtomicBool::new(false),
            region: Mutex::new(None),
            events,
            reject_identity: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
        });
        self.state.nodes.insert(id, node.clone());
        let link = Arc::new(MemoryLink {
            mesh: self.clone(),
            node,
        });
        (link, rx)
    }

    /// Everything transmitted so far, oldest first.
    pub fn transmissions(&self) -> Vec<Transmission> {
        self.state
            .log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Transmissions made by one node.
    pub fn transmissions_from(&self, gid: Gid) -> Vec<Transmission> {
        self.transmissions()
            .into_iter()
            .filter(|t| t.from == gid)
            .collect()
    }

    pub fn group_members(&self, group_id: Gid) -> Option<Vec<Gid>> {
        self.state.groups.get(&group_id).map(|g| g.value().clone())
    }

    fn record(&self, from: Gid, kind: TransmissionKind, frame: Bytes) {
        tracing::trace!(from, ?kind, frame = %hex::encode(&frame), "on air");
        self.state
            .log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Transmission {
                at: Instant::now(),
                from,
                kind,
                frame,
            });
    }

    /// Connected nodes with the given GID.
    fn nodes_with_gid(&self, gid: Gid) -> Vec<Arc<Node>> {
        self.state
            .nodes
            .iter()
            .filter(|n| n.is_connected() && n.gid() == Some(gid))
            .map(|n| n.value().clone())
            .collect()
    }

    fn connected_nodes(&self) -> Vec<Arc<Node>> {
        self.state
            .nodes
            .iter()
            .filter(|n| n.is_connected() && n.gid().is_some())
            .map(|n| n.value().clone())
            .collect()
    }
}

/// One node's radio on a [`MemoryMesh`].
pub struct MemoryLink {
    mesh: MemoryMesh,
    node: Arc<Node>,
}

impl MemoryLink {
    /// Make the next identity push fail.
    pub fn reject_identity(&self, reject: bool) {
        self.node.reject_identity.store(reject, Ordering::Release);
    }

    /// Make every frame send fail.
    pub fn fail_sends(&self, fail: bool) {
        self.node.fail_sends.store(fail, Ordering::Release);
    }

    /// Simulate the radio going away.
    pub fn drop_connection(&self) {
        if self.node.connected.swap(false, Ordering::AcqRel) {
            self.node.deliver(LinkEvent::Status(LinkStatus::Disconnected));
        }
    }

    /// Region last pushed by the transport.
    pub fn region(&self) -> Option<Region> {
        *self.node.region.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn local_gid(&self) -> Option<Gid> {
        self.node.gid()
    }

    /// Our GID, if we are allowed on the air.
    fn on_air(&self) -> Result<Gid, LinkError> {
        if !self.node.is_connected() {
            return Err(LinkError::NotConnected);
        }
        self.node.gid().ok_or(LinkError::NotConnected)
    }

    fn check_send(&self) -> Result<Gid, LinkError> {
        let gid = self.on_air()?;
        if self.node.fail_sends.load(Ordering::Acquire) {
            return Err(LinkError::Rejected("send failed".into()));
        }
        Ok(gid)
    }
}

#[async_trait]
impl RadioLink for MemoryLink {
    async fn connect(&self, device_type: DeviceType) -> Result<(), LinkError> {
        tracing::debug!(?device_type, "memory link connecting");
        self.node.deliver(LinkEvent::Status(LinkStatus::Scanning));
        if !self.node.connected.swap(true, Ordering::AcqRel) {
            self.node.deliver(LinkEvent::Status(LinkStatus::Connected));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        self.drop_connection();
        Ok(())
    }

    async fn set_region(&self, region: Region) -> Result<(), LinkError> {
        if !self.node.is_connected() {
            return Err(LinkError::NotConnected);
        }
        *self.node.region.lock().unwrap_or_else(|e| e.into_inner()) = Some(region);
        Ok(())
    }

    async fn set_local_identity(&self, identity: &PeerIdentity) -> Result<(), LinkError> {
        if !self.node.is_connected() {
            return Err(LinkError::NotConnected);
        }
        if self.node.reject_identity.load(Ordering::Acquire) {
            return Err(LinkError::Rejected("identity refused".into()));
        }
        *self.node.gid.lock().unwrap_or_else(|e| e.into_inner()) = Some(identity.gid);
        Ok(())
    }

    async fn send(&self, frame: Bytes, destination: Gid) -> Result<(), LinkError> {
        let from = self.check_send()?;
        check_frame_len(&frame)?;

        let recipients: Vec<Arc<Node>> = match self.mesh.group_members(destination) {
            Some(members) => members
                .into_iter()
                .filter(|gid| *gid != from)
                .flat_map(|gid| self.mesh.nodes_with_gid(gid))
                .collect(),
            None => {
                let nodes = self.mesh.nodes_with_gid(destination);
                if nodes.is_empty() {
                    return Err(LinkError::UnknownDestination(destination));
                }
                nodes
            }
        };

        self.mesh
            .record(from, TransmissionKind::Unicast { destination }, frame.clone());
        for node in recipients {
            node.deliver(LinkEvent::Frame {
                sender: from,
                payload: frame.clone(),
            });
        }
        Ok(())
    }

    async fn send_broadcast(&self, frame: Bytes) -> Result<(), LinkError> {
        let from = self.check_send()?;
        check_frame_len(&frame)?;

        self.mesh
            .record(from, TransmissionKind::Broadcast, frame.clone());
        for node in self.mesh.connected_nodes() {
            if node.gid() != Some(from) {
                node.deliver(LinkEvent::Frame {
                    sender: from,
                    payload: frame.clone(),
                });
            }
        }
        Ok(())
    }

    async fn create_group(&self, members: &[Gid]) -> Result<Gid, LinkError> {
        let from = self.on_air()?;
        let group_id = self.mesh.state.next_group.fetch_add(1, Ordering::Relaxed);
        self.mesh.state.groups.insert(group_id, members.to_vec());
        self.mesh.record(
            from,
            TransmissionKind::CreateGroup {
                group_id,
                members: members.to_vec(),
            },
            Bytes::new(),
        );

        for gid in members.iter().copied().filter(|gid| *gid != from) {
            for node in self.mesh.nodes_with_gid(gid) {
                node.deliver(LinkEvent::GroupInvite {
                    group_id,
                    members: members.to_vec(),
                });
            }
        }
        Ok(group_id)
    }

    async fn invite_to_group(
        &self,
        group_id: Gid,
        members: &[Gid],
        new_member: Gid,
    ) -> Result<(), LinkError> {
        let from = self.check_send()?;
        if !self.mesh.state.groups.contains_key(&group_id) {
            return Err(LinkError::UnknownDestination(group_id));
        }
        self.mesh.state.groups.insert(group_id, members.to_vec());
        self.mesh.record(
            from,
            TransmissionKind::Invite {
                group_id,
                member: new_member,
            },
            Bytes::new(),
        );

        for node in self.mesh.nodes_with_gid(new_member) {
            node.deliver(LinkEvent::GroupInvite {
                group_id,
                members: members.to_vec(),
            });
        }
        Ok(())
    }
}
