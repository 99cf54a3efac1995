//! Connection lifecycle.
//!
//! ```text
//! Disconnected --initiate_scan--> Scanning
//! Scanning     --link connected--> Connected
//! Connected    --anything else--> Disconnected
//! ```
//!
//! Entering `Connected` runs the one-time radio setup: push the frequency
//! region (mesh devices only), then the local identity. Only after both are
//! accepted is the coordinator ready, and only a ready coordinator lets
//! anything onto the air. A setup failure drops back to `Disconnected` and
//! stays there; there is no automatic retry.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use meshfwd_core::config::{DeviceType, RadioConfig};
use meshfwd_core::{PeerIdentity, Region};
use meshfwd_services::QuotaLimiter;

use crate::error::TransportError;
use crate::link::{LinkStatus, RadioLink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Scanning = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Scanning,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// What a status report changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Setup finished; the radio accepts traffic.
    Ready,
    /// We were connected and are not anymore.
    Lost,
    Unchanged,
}

pub struct ConnectionCoordinator {
    link: Arc<dyn RadioLink>,
    identity: PeerIdentity,
    radio: RadioConfig,
    state: AtomicU8,
    ready: AtomicBool,
    destroyed: AtomicBool,
    teardown: watch::Sender<bool>,
}

impl ConnectionCoordinator {
    pub fn new(link: Arc<dyn RadioLink>, identity: PeerIdentity, radio: RadioConfig) -> Self {
        Self {
            link,
            identity,
            radio,
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            ready: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            teardown: watch::Sender::new(false),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Connected and set up.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire) && self.state() == ConnectionState::Connected
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }

    /// Take a quota slot, waiting if the window is full. A teardown during
    /// the wait abandons it with `Destroyed`; no slot is consumed then.
    pub async fn wait_for_quota(&self, quota: &QuotaLimiter) -> Result<(), TransportError> {
        let mut teardown = self.teardown.subscribe();
        if *teardown.borrow_and_update() {
            return Err(TransportError::Destroyed);
        }
        tokio::select! {
            _ = teardown.wait_for(|down| *down) => Err(TransportError::Destroyed),
            _ = quota.record_send() => Ok(()),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = ConnectionState::from_u8(self.state.swap(state as u8, Ordering::AcqRel));
        if previous != state {
            tracing::debug!(?previous, ?state, "connection state changed");
        }
    }

    /// Start looking for the radio. No-op unless disconnected.
    pub async fn initiate_scan(&self) -> Result<(), TransportError> {
        if self.is_destroyed() {
            return Err(TransportError::Destroyed);
        }
        if self
            .state
            .compare_exchange(
                ConnectionState::Disconnected as u8,
                ConnectionState::Scanning as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            tracing::debug!(state = ?self.state(), "scan requested while not disconnected");
            return Ok(());
        }

        tracing::info!(device_type = ?self.radio.device_type, "scanning for radio");
        if let Err(e) = self.link.connect(self.radio.device_type).await {
            tracing::error!(error = %e, "radio connect failed");
            self.set_state(ConnectionState::Disconnected);
            return Err(e.into());
        }
        Ok(())
    }

    /// Apply a status report from the link.
    ///
    /// Runs the setup sequence on the way into `Connected`. Reports arrive on
    /// the link's event channel and must be applied in order from one task.
    pub async fn on_link_status(&self, status: LinkStatus) -> Result<Transition, TransportError> {
        if self.is_destroyed() {
            return Ok(Transition::Unchanged);
        }

        match status {
            LinkStatus::Connected => {
                if self.state() == ConnectionState::Connected {
                    return Ok(Transition::Unchanged);
                }
                self.set_state(ConnectionState::Connected);
                if let Err(e) = self.configure_radio().await {
                    tracing::error!(error = %e, "radio setup failed, staying offline");
                    self.ready.store(false, Ordering::Release);
                    self.set_state(ConnectionState::Disconnected);
                    return Err(TransportError::Setup(e));
                }
                self.ready.store(true, Ordering::Release);
                tracing::info!(gid = self.identity.gid, "radio ready");
                Ok(Transition::Ready)
            }
            LinkStatus::Scanning => {
                if self.state() == ConnectionState::Connected {
                    return Ok(self.lose_connection());
                }
                self.set_state(ConnectionState::Scanning);
                Ok(Transition::Unchanged)
            }
            LinkStatus::Disconnected => {
                if self.state() == ConnectionState::Connected {
                    return Ok(self.lose_connection());
                }
                self.set_state(ConnectionState::Disconnected);
                Ok(Transition::Unchanged)
            }
        }
    }

    fn lose_connection(&self) -> Transition {
        let was_ready = self.ready.swap(false, Ordering::AcqRel);
        self.set_state(ConnectionState::Disconnected);
        tracing::warn!(was_ready, "radio connection lost");
        Transition::Lost
    }

    async fn configure_radio(&self) -> Result<(), crate::link::LinkError> {
        if self.radio.device_type == DeviceType::Mesh {
            let region = Region::resolve(self.radio.location(), self.radio.fallback_location());
            tracing::debug!(%region, "pushing radio region");
            self.link.set_region(region).await?;
        }
        tracing::debug!(gid = self.identity.gid, callsign = %self.identity.callsign, "pushing local identity");
        self.link.set_local_identity(&self.identity).await
    }

    /// Mark torn down and release the radio. Background loops exit on their
    /// next wake-up.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.ready.store(false, Ordering::Release);
        self.teardown.send_replace(true);
        if let Err(e) = self.link.disconnect().await {
            tracing::warn!(error = %e, "radio disconnect failed");
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkEvent, LinkEventReceiver, MemoryLink, MemoryMesh};

    fn coordinator(radio: RadioConfig) -> (ConnectionCoordinator, Arc<MemoryLink>, LinkEventReceiver) {
        let (link, rx) = MemoryMesh::new().attach();
        let coordinator =
            ConnectionCoordinator::new(link.clone(), PeerIdentity::new(1, "u1", "Alpha"), radio);
        (coordinator, link, rx)
    }

    async fn pump(coordinator: &ConnectionCoordinator, rx: &mut LinkEventReceiver) -> Vec<Result<Transition, String>> {
        let mut out = Vec::new();
        while let Ok(LinkEvent::Status(status)) = rx.try_recv() {
            out.push(coordinator.on_link_status(status).await.map_err(|e| e.to_string()));
        }
        out
    }

    #[tokio::test]
    async fn scan_then_connect_becomes_ready() {
        let (c, link, mut rx) = coordinator(RadioConfig::default());
        assert_eq!(c.state(), ConnectionState::Disconnected);

        c.initiate_scan().await.unwrap();
        assert_eq!(c.state(), ConnectionState::Scanning);
        assert!(!c.is_ready());

        let transitions = pump(&c, &mut rx).await;
        assert_eq!(transitions.last(), Some(&Ok(Transition::Ready)));
        assert_eq!(c.state(), ConnectionState::Connected);
        assert!(c.is_ready());
        assert_eq!(link.local_gid(), Some(1));
        assert_eq!(link.region(), Some(Region::NorthAmerica));
    }

    #[tokio::test]
    async fn region_follows_configured_location() {
        let radio = RadioConfig {
            latitude: Some(48.85),
            longitude: Some(2.35),
            ..RadioConfig::default()
        };
        let (c, link, mut rx) = coordinator(radio);
        c.initiate_scan().await.unwrap();
        pump(&c, &mut rx).await;
        assert_eq!(link.region(), Some(Region::Europe));
    }

    #[tokio::test]
    async fn non_mesh_device_skips_region() {
        let radio = RadioConfig {
            device_type: DeviceType::Pro,
            ..RadioConfig::default()
        };
        let (c, link, mut rx) = coordinator(radio);
        c.initiate_scan().await.unwrap();
        pump(&c, &mut rx).await;
        assert!(c.is_ready());
        assert_eq!(link.region(), None);
    }

    #[tokio::test]
    async fn rejected_identity_leaves_coordinator_offline() {
        let (c, link, mut rx) = coordinator(RadioConfig::default());
        link.reject_identity(true);
        c.initiate_scan().await.unwrap();

        let transitions = pump(&c, &mut rx).await;
        assert!(matches!(transitions.last(), Some(Err(_))));
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert!(!c.is_ready());
        assert_eq!(link.local_gid(), None);
    }

    #[tokio::test]
    async fn losing_the_link_drops_readiness() {
        let (c, link, mut rx) = coordinator(RadioConfig::default());
        c.initiate_scan().await.unwrap();
        pump(&c, &mut rx).await;

        link.drop_connection();
        assert_eq!(pump(&c, &mut rx).await, vec![Ok(Transition::Lost)]);
        assert!(!c.is_ready());
        assert_eq!(c.state(), ConnectionState::Disconnected);

        c.initiate_scan().await.unwrap();
        assert_eq!(pump(&c, &mut rx).await.last(), Some(&Ok(Transition::Ready)));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_abandons_quota_wait() {
        let (c, _link, _rx) = coordinator(RadioConfig::default());
        let c = Arc::new(c);
        let quota = Arc::new(QuotaLimiter::new(1, std::time::Duration::from_secs(60)));
        c.wait_for_quota(&quota).await.unwrap();

        let waiter = {
            let (c, quota) = (c.clone(), quota.clone());
            tokio::spawn(async move { c.wait_for_quota(&quota).await })
        };
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert!(!waiter.is_finished());

        let start = tokio::time::Instant::now();
        c.destroy().await;
        assert!(matches!(waiter.await.unwrap(), Err(TransportError::Destroyed)));
        assert_eq!(start.elapsed(), std::time::Duration::ZERO);
        assert_eq!(quota.used(), 1);
        assert!(matches!(c.wait_for_quota(&quota).await, Err(TransportError::Destroyed)));
    }

    #[tokio::test]
    async fn destroyed_coordinator_refuses_to_scan() {
        let (c, _link, _rx) = coordinator(RadioConfig::default());
        c.destroy().await;
        assert!(c.is_destroyed());
        assert!(matches!(c.initiate_scan().await, Err(TransportError::Destroyed)));
    }
}
