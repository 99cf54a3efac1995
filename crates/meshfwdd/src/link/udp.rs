//! Bench link: a radio stand-in over UDP datagrams.
//!
//! Lets several `meshfwdd` processes talk on one host or LAN without radio
//! hardware. Every request goes to every configured peer as one JSON
//! datagram; receivers keep what is addressed to their GID. Group ids are
//! random and membership is tracked locally from invitations.

use std::net::SocketAddr;
use std::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use meshfwd_core::config::{BenchConfig, DeviceType};
use meshfwd_core::{Gid, PeerIdentity, Region};

use super::{check_frame_len, LinkError, LinkEvent, LinkEventReceiver, LinkStatus, RadioLink};

const MAX_DATAGRAM: usize = 2048;

const RECV_BACKOFF_MIN: Duration = Duration::from_millis(10);
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Datagram {
    /// `to` empty means broadcast.
    Frame {
        from: Gid,
        to: Vec<Gid>,
        payload: String,
    },
    Invite {
        from: Gid,
        group_id: Gid,
        members: Vec<Gid>,
        invitees: Vec<Gid>,
    },
}

struct Shared {
    socket: UdpSocket,
    peers: Vec<SocketAddr>,
    gid: Mutex<Option<Gid>>,
    connected: AtomicBool,
    groups: DashMap<Gid, Vec<Gid>>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl Shared {
    fn gid(&self) -> Option<Gid> {
        *self.gid.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }

    async fn publish(&self, datagram: &Datagram) -> Result<(), LinkError> {
        let bytes = serde_json::to_vec(datagram)?;
        for peer in &self.peers {
            self.socket.send_to(&bytes, peer).await?;
        }
        Ok(())
    }

    fn accept(&self, datagram: Datagram) {
        let Some(local) = self.gid() else { return };
        match datagram {
            Datagram::Frame { from, to, payload } => {
                if from == local || !(to.is_empty() || to.contains(&local)) {
                    return;
                }
                match hex::decode(&payload) {
                    Ok(bytes) => self.emit(LinkEvent::Frame {
                        sender: from,
                        payload: Bytes::from(bytes),
                    }),
                    Err(e) => tracing::debug!(from, error = %e, "bad frame payload"),
                }
            }
            Datagram::Invite {
                from,
                group_id,
                members,
                invitees,
            } => {
                if from == local || !invitees.contains(&local) {
                    return;
                }
                self.groups.insert(group_id, members.clone());
                self.emit(LinkEvent::GroupInvite { group_id, members });
            }
        }
    }
}

pub struct UdpLink {
    shared: Arc<Shared>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl UdpLink {
    pub async fn bind(config: &BenchConfig) -> Result<(Arc<Self>, LinkEventReceiver), LinkError> {
        let socket = UdpSocket::bind(&config.bind).await?;
        let mut peers = Vec::with_capacity(config.peers.len());
        for peer in &config.peers {
            match peer.parse::<SocketAddr>() {
                Ok(addr) => peers.push(addr),
                Err(e) => tracing::warn!(peer, error = %e, "ignoring bad bench peer address"),
            }
        }
        tracing::info!(addr = %socket.local_addr()?, peers = peers.len(), "bench link bound");

        let (events, rx) = mpsc::unbounded_channel();
        let link = Arc::new(Self {
            shared: Arc::new(Shared {
                socket,
                peers,
                gid: Mutex::new(None),
                connected: AtomicBool::new(false),
                groups: DashMap::new(),
                events,
            }),
            receiver: Mutex::new(None),
        });
        Ok((link, rx))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        Ok(self.shared.socket.local_addr()?)
    }

    fn on_air(&self) -> Result<Gid, LinkError> {
        if !self.shared.connected.load(Ordering::Acquire) {
            return Err(LinkError::NotConnected);
        }
        self.shared.gid().ok_or(LinkError::NotConnected)
    }

    async fn send_frame(&self, frame: Bytes, to: Vec<Gid>) -> Result<(), LinkError> {
        let from = self.on_air()?;
        check_frame_len(&frame)?;
        tracing::trace!(from, ?to, frame = %hex::encode(&frame), "bench frame out");
        self.shared
            .publish(&Datagram::Frame {
                from,
                to,
                payload: hex::encode(&frame),
            })
            .await
    }

    async fn invite(&self, group_id: Gid, members: &[Gid], invitees: Vec<Gid>) -> Result<(), LinkError> {
        let from = self.on_air()?;
        self.shared.groups.insert(group_id, members.to_vec());
        self.shared
            .publish(&Datagram::Invite {
                from,
                group_id,
                members: members.to_vec(),
                invitees,
            })
            .await
    }
}

/// Delay after `failures` consecutive receive errors: doubling, capped.
fn recv_backoff(failures: u32) -> Duration {
    let factor = 1u32 << failures.saturating_sub(1).min(16);
    RECV_BACKOFF_MIN.saturating_mul(factor).min(RECV_BACKOFF_MAX)
}

async fn receive_loop(shared: Arc<Shared>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut failures: u32 = 0;
    loop {
        let (len, from) = match shared.socket.recv_from(&mut buf).await {
            Ok(r) => {
                failures = 0;
                r
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = recv_backoff(failures);
                tracing::warn!(
                    error = %e,
                    failures,
                    retry_ms = delay.as_millis() as u64,
                    "bench recv failed"
                );
                tokio::time::sleep(delay).await;
                continue;
            }
        };
        match serde_json::from_slice::<Datagram>(&buf[..len]) {
            Ok(datagram) => shared.accept(datagram),
            Err(e) => tracing::debug!(%from, error = %e, "ignoring malformed datagram"),
        }
    }
}

#[async_trait]
impl RadioLink for UdpLink {
    async fn connect(&self, device_type: DeviceType) -> Result<(), LinkError> {
        tracing::info!(?device_type, "bench link connecting");
        self.shared.emit(LinkEvent::Status(LinkStatus::Scanning));

        {
            let mut receiver = self.receiver.lock().unwrap_or_else(|e| e.into_inner());
            if receiver.is_none() {
                *receiver = Some(tokio::spawn(receive_loop(self.shared.clone())));
            }
        }

        if !self.shared.connected.swap(true, Ordering::AcqRel) {
            self.shared.emit(LinkEvent::Status(LinkStatus::Connected));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        if let Some(handle) = self
            .receiver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
        if self.shared.connected.swap(false, Ordering::AcqRel) {
            self.shared.emit(LinkEvent::Status(LinkStatus::Disconnected));
        }
        Ok(())
    }

    async fn set_region(&self, region: Region) -> Result<(), LinkError> {
        tracing::debug!(%region, "bench link region set");
        Ok(())
    }

    async fn set_local_identity(&self, identity: &PeerIdentity) -> Result<(), LinkError> {
        *self.shared.gid.lock().unwrap_or_else(|e| e.into_inner()) = Some(identity.gid);
        Ok(())
    }

    async fn send(&self, frame: Bytes, destination: Gid) -> Result<(), LinkError> {
        let to = match self.shared.groups.get(&destination) {
            Some(members) => members.value().clone(),
            None => vec![destination],
        };
        self.send_frame(frame, to).await
    }

    async fn send_broadcast(&self, frame: Bytes) -> Result<(), LinkError> {
        self.send_frame(frame, Vec::new()).await
    }

    async fn create_group(&self, members: &[Gid]) -> Result<Gid, LinkError> {
        let local = self.on_air()?;
        let group_id: Gid = rand::random::<u32>() as Gid | (1 << 40);
        let invitees = members.iter().copied().filter(|g| *g != local).collect();
        self.invite(group_id, members, invitees).await?;
        Ok(group_id)
    }

    async fn invite_to_group(
        &self,
        group_id: Gid,
        members: &[Gid],
        new_member: Gid,
    ) -> Result<(), LinkError> {
        self.invite(group_id, members, vec![new_member]).await
    }
}
