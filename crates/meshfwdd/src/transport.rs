//! The transport facade: wires the coordinators to one radio link.
//!
//! ```text
//! app ─send─▶ queue ─▶ dispatcher ─▶ chunking ─▶ quota ─▶ link ─▶ air
//! air ─▶ link events ─▶ event loop ─┬▶ connection (status)
//!                                   ├▶ inbound router ─▶ discovery / reassembly ─▶ listeners
//!                                   └▶ group coordinator (invites) ─▶ listeners
//! ```
//!
//! Background workers (dispatcher, quota refresh, optional reassembly sweep)
//! start the first time the radio becomes ready, after setup has pushed the
//! local identity. Every transition to ready also queues an initial beacon.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use meshfwd_core::config::MeshfwdConfig;
use meshfwd_core::{wire, Gid, GroupInfo, PeerIdentity};
use meshfwd_services::{
    quota, reassembly, Destination, GroupListener, Listeners, MessageListener, MessageQueue,
    PeerDirectory, Priority, PriorityQueue, QuotaLimiter, Reassembler,
};

use crate::connection::{ConnectionCoordinator, ConnectionState, Transition};
use crate::discovery::Discovery;
use crate::dispatch::OutboundDispatcher;
use crate::error::TransportError;
use crate::group::GroupCoordinator;
use crate::inbound::InboundRouter;
use crate::link::{LinkEvent, LinkEventReceiver, RadioLink};

pub struct Transport {
    config: MeshfwdConfig,
    link: Arc<dyn RadioLink>,
    connection: Arc<ConnectionCoordinator>,
    discovery: Arc<Discovery>,
    groups: GroupCoordinator,
    inbound: InboundRouter,
    queue: Arc<PriorityQueue>,
    directory: Arc<PeerDirectory>,
    listeners: Arc<Listeners>,
    quota: Arc<QuotaLimiter>,
    reassembler: Arc<Reassembler>,
    events: Mutex<Option<LinkEventReceiver>>,
    workers_started: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Transport {
    /// Build a transport over `link`. `events` is the receiver the link
    /// handed out when it was created.
    pub fn new(
        config: MeshfwdConfig,
        link: Arc<dyn RadioLink>,
        events: LinkEventReceiver,
    ) -> Result<Arc<Self>, TransportError> {
        config.validate()?;
        let identity = config.identity.to_identity();

        let queue = Arc::new(PriorityQueue::new());
        let directory = PeerDirectory::shared();
        let listeners = Arc::new(Listeners::new());
        listeners.groups.add(directory.clone());

        let quota = Arc::new(QuotaLimiter::new(
            config.quota.messages_per_window,
            config.quota.window(),
        ));
        let reassembler = Arc::new(Reassembler::with_dedup_window(
            config.reassembly.dedup_window(),
        ));
        let connection = Arc::new(ConnectionCoordinator::new(
            link.clone(),
            identity.clone(),
            config.radio.clone(),
        ));
        let discovery = Arc::new(Discovery::new(identity, queue.clone(), listeners.clone()));
        let groups = GroupCoordinator::new(
            link.clone(),
            connection.clone(),
            directory.clone(),
            quota.clone(),
            listeners.clone(),
        );
        let inbound = InboundRouter::new(reassembler.clone(), discovery.clone(), listeners.clone());
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Arc::new(Self {
            config,
            link,
            connection,
            discovery,
            groups,
            inbound,
            queue,
            directory,
            listeners,
            quota,
            reassembler,
            events: Mutex::new(Some(events)),
            workers_started: AtomicBool::new(false),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Start the event loop and begin scanning for the radio.
    pub async fn start(self: &Arc<Self>) -> Result<(), TransportError> {
        if self.connection.is_destroyed() {
            return Err(TransportError::Destroyed);
        }
        let events = self
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(events) = events {
            let handle = tokio::spawn(self.clone().event_loop(events, self.shutdown_tx.subscribe()));
            self.track(handle);
        }
        self.connection.initiate_scan().await
    }

    /// Tear down: stop workers, release the radio. Queued messages are
    /// abandoned.
    pub async fn shutdown(&self) {
        if self.connection.is_destroyed() {
            return;
        }
        tracing::info!("transport shutting down");
        self.connection.destroy().await;
        let _ = self.shutdown_tx.send(());

        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
    }

    /// Queue a message. Non-broadcast payloads are checked against the
    /// chunk limit here so the caller learns about oversize immediately.
    pub fn send(
        &self,
        payload: impl Into<Bytes>,
        destination: Destination,
        priority: Priority,
    ) -> Result<(), TransportError> {
        if self.connection.is_destroyed() {
            return Err(TransportError::Destroyed);
        }
        let payload = payload.into();
        if !destination.is_broadcast() {
            wire::chunk_count(payload.len(), self.config.radio.chunk_len)?;
        }
        self.queue.enqueue(payload, destination, priority);
        Ok(())
    }

    /// Announce ourselves without asking for replies.
    pub fn broadcast_discovery(&self) -> Result<(), TransportError> {
        if self.connection.is_destroyed() {
            return Err(TransportError::Destroyed);
        }
        self.discovery.announce(false)?;
        Ok(())
    }

    pub async fn create_group(&self, members: Vec<Gid>) -> Result<GroupInfo, TransportError> {
        self.groups.create_group(members).await
    }

    pub async fn add_to_group(
        &self,
        all_members: Vec<Gid>,
        new_members: &[Gid],
    ) -> Result<usize, TransportError> {
        self.groups.add_to_group(all_members, new_members).await
    }

    pub fn add_message_listener(&self, listener: Arc<dyn MessageListener>) {
        self.listeners.messages.add(listener);
    }

    pub fn remove_message_listener(&self, listener: &Arc<dyn MessageListener>) -> bool {
        self.listeners.messages.remove(listener)
    }

    pub fn add_group_listener(&self, listener: Arc<dyn GroupListener>) {
        self.listeners.groups.add(listener);
    }

    pub fn remove_group_listener(&self, listener: &Arc<dyn GroupListener>) -> bool {
        self.listeners.groups.remove(listener)
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_ready(&self) -> bool {
        self.connection.is_ready()
    }

    pub fn identity(&self) -> &PeerIdentity {
        self.connection.identity()
    }

    pub fn directory(&self) -> &Arc<PeerDirectory> {
        &self.directory
    }

    pub fn pending_messages(&self) -> usize {
        self.queue.len()
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    async fn event_loop(
        self: Arc<Self>,
        mut events: LinkEventReceiver,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!("event loop shutting down");
                    return;
                }

                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::info!("link event channel closed");
                        return;
                    };
                    self.handle_event(event).await;
                }
            }
        }
    }

    async fn handle_event(&self, event: LinkEvent) {
        match event {
            LinkEvent::Status(status) => match self.connection.on_link_status(status).await {
                Ok(Transition::Ready) => self.on_ready(),
                Ok(Transition::Lost) => {
                    tracing::info!(queued = self.queue.len(), "radio offline, dispatch paused");
                }
                Ok(Transition::Unchanged) => {}
                Err(e) => tracing::error!(error = %e, "radio unusable for this session"),
            },
            LinkEvent::Frame { sender, payload } => self.inbound.on_frame(sender, payload),
            LinkEvent::GroupInvite { group_id, members } => {
                self.groups.on_group_invite(group_id, members)
            }
        }
    }

    fn on_ready(&self) {
        if self
            .workers_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.spawn_workers();
        }
        if let Err(e) = self.discovery.announce(true) {
            tracing::warn!(error = %e, "failed to queue initial beacon");
        }
    }

    fn spawn_workers(&self) {
        let queue: Arc<dyn MessageQueue> = self.queue.clone();
        let dispatcher = OutboundDispatcher::new(
            self.link.clone(),
            self.connection.clone(),
            queue,
            self.directory.clone(),
            self.quota.clone(),
            self.config.radio.chunk_len,
            self.config.dispatch.poll_interval(),
        );
        self.track(tokio::spawn(dispatcher.run(self.shutdown_tx.subscribe())));
        self.track(tokio::spawn(quota::refresh_loop(
            self.quota.clone(),
            self.shutdown_tx.subscribe(),
        )));

        if let Some(timeout) = self.config.reassembly.timeout() {
            self.track(tokio::spawn(reassembly::sweep_loop(
                self.reassembler.clone(),
                timeout,
                self.config.reassembly.sweep_interval(),
                self.shutdown_tx.subscribe(),
            )));
        }
        tracing::info!("transport workers started");
    }
}
