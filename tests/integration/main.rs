//! meshfwd integration test harness.
//!
//! Every test builds a handful of full transports on one in-memory mesh and
//! drives them end to end: discovery, groups, chunked delivery, quota pacing.
//! Time is paused, so quota windows and poll intervals cost nothing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use meshfwd_core::config::MeshfwdConfig;
use meshfwd_core::Gid;
use meshfwd_services::{GroupListener, MessageListener};
use meshfwdd::link::{MemoryLink, MemoryMesh, Transmission, TransmissionKind};
use meshfwdd::Transport;

mod discovery;
mod groups;
mod lifecycle;
mod messaging;
mod quota;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const POLL: Duration = Duration::from_millis(100);
pub const WINDOW: Duration = Duration::from_secs(60);

/// Everything a transport told its listeners.
#[derive(Default)]
pub struct Recorder {
    pub messages: Mutex<Vec<(Gid, Vec<u8>)>>,
    pub peers: Mutex<Vec<(String, Gid, String)>>,
    pub groups: Mutex<Vec<(Gid, Vec<Gid>)>>,
}

impl MessageListener for Recorder {
    fn on_message_received(&self, sender: Gid, message: &[u8]) {
        self.messages.lock().unwrap().push((sender, message.to_vec()));
    }
}

impl GroupListener for Recorder {
    fn on_peer_discovered(&self, callsign: &str, gid: Gid, uid: &str) {
        self.peers
            .lock()
            .unwrap()
            .push((callsign.to_string(), gid, uid.to_string()));
    }

    fn on_group_created(&self, group_id: Gid, member_gids: &[Gid]) {
        self.groups.lock().unwrap().push((group_id, member_gids.to_vec()));
    }
}

impl Recorder {
    pub fn messages(&self) -> Vec<(Gid, Vec<u8>)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn peers(&self) -> Vec<(String, Gid, String)> {
        self.peers.lock().unwrap().clone()
    }

    pub fn groups(&self) -> Vec<(Gid, Vec<Gid>)> {
        self.groups.lock().unwrap().clone()
    }
}

pub struct Node {
    pub gid: Gid,
    pub transport: Arc<Transport>,
    pub link: Arc<MemoryLink>,
    pub events: Arc<Recorder>,
}

/// Test config: small chunks, fast polling, generous quota.
pub fn config(gid: Gid, callsign: &str) -> MeshfwdConfig {
    let mut config = MeshfwdConfig::default();
    config.identity.gid = gid;
    config.identity.uid = format!("uid-{gid}");
    config.identity.callsign = callsign.to_string();
    config.radio.chunk_len = 60;
    config.quota.messages_per_window = 50;
    config.dispatch.poll_interval_ms = POLL.as_millis() as u64;
    config
}

/// Attach a node to the mesh without starting it.
pub fn node(mesh: &MemoryMesh, config: MeshfwdConfig) -> Node {
    let gid = config.identity.gid;
    let (link, events) = mesh.attach();
    let transport = Transport::new(config, link.clone(), events).unwrap();
    let recorder = Arc::new(Recorder::default());
    transport.add_message_listener(recorder.clone());
    transport.add_group_listener(recorder.clone());
    Node {
        gid,
        transport,
        link,
        events: recorder,
    }
}

/// Attach, start, and wait until the node is ready and has beaconed.
pub async fn online(mesh: &MemoryMesh, config: MeshfwdConfig) -> Node {
    let node = node(mesh, config);
    node.transport.start().await.unwrap();
    assert!(
        eventually(|| node.transport.is_ready() && !broadcasts_from(mesh, node.gid).is_empty())
            .await,
        "node {} never came up",
        node.gid
    );
    node
}

/// Poll `check` on virtual time until it holds or ten windows pass.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WINDOW * 10;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Let every queue drain and every frame land.
pub async fn settle() {
    tokio::time::sleep(POLL * 20).await;
}

pub fn broadcasts_from(mesh: &MemoryMesh, gid: Gid) -> Vec<String> {
    mesh.transmissions_from(gid)
        .into_iter()
        .filter(|t| t.kind == TransmissionKind::Broadcast)
        .map(|t| String::from_utf8_lossy(&t.frame).into_owned())
        .collect()
}

/// Most transmissions from `gid` inside any rolling window.
pub fn busiest_window(log: &[Transmission], window: Duration) -> usize {
    log.iter()
        .map(|start| {
            log.iter()
                .filter(|t| t.at >= start.at && t.at - start.at < window)
                .count()
        })
        .max()
        .unwrap_or(0)
}
