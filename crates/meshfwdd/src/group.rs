//! Mesh group creation and invitations.
//!
//! Both requests cost airtime, so each goes through the quota first. Neither
//! is retried: a rejected request is logged and reported back, nothing else.

use std::sync::Arc;

use meshfwd_core::identity::with_local_member;
use meshfwd_core::{Gid, GroupInfo};
use meshfwd_services::{GroupTracker, Listeners, QuotaLimiter};

use crate::connection::ConnectionCoordinator;
use crate::error::TransportError;
use crate::link::RadioLink;

pub struct GroupCoordinator {
    link: Arc<dyn RadioLink>,
    connection: Arc<ConnectionCoordinator>,
    tracker: Arc<dyn GroupTracker>,
    quota: Arc<QuotaLimiter>,
    listeners: Arc<Listeners>,
}

impl GroupCoordinator {
    pub fn new(
        link: Arc<dyn RadioLink>,
        connection: Arc<ConnectionCoordinator>,
        tracker: Arc<dyn GroupTracker>,
        quota: Arc<QuotaLimiter>,
        listeners: Arc<Listeners>,
    ) -> Self {
        Self {
            link,
            connection,
            tracker,
            quota,
            listeners,
        }
    }

    fn local_gid(&self) -> Gid {
        self.connection.identity().gid
    }

    fn require_ready(&self, operation: &'static str) -> Result<(), TransportError> {
        if self.connection.is_destroyed() {
            return Err(TransportError::Destroyed);
        }
        if !self.connection.is_ready() {
            tracing::info!(operation, "radio not ready, ignoring group request");
            return Err(TransportError::NotReady);
        }
        Ok(())
    }

    /// Form a group of `members` plus this node. Listeners hear about it
    /// only once the radio acknowledges.
    pub async fn create_group(&self, members: Vec<Gid>) -> Result<GroupInfo, TransportError> {
        self.require_ready("create_group")?;
        let members = with_local_member(members, self.local_gid());

        self.connection.wait_for_quota(&self.quota).await?;
        match self.link.create_group(&members).await {
            Ok(group_id) => {
                tracing::info!(group_id, members = ?members, "group created");
                self.listeners.group_created(group_id, &members);
                Ok(GroupInfo::new(group_id, members))
            }
            Err(e) => {
                tracing::warn!(members = ?members, error = %e, "group creation rejected");
                Err(e.into())
            }
        }
    }

    /// Invite `new_members` into the current group, one request each.
    ///
    /// `all_members` is the full membership after the additions. Returns how
    /// many invitations the radio accepted.
    pub async fn add_to_group(
        &self,
        all_members: Vec<Gid>,
        new_members: &[Gid],
    ) -> Result<usize, TransportError> {
        self.require_ready("add_to_group")?;
        let group = self.tracker.current_group().ok_or(TransportError::NoGroup)?;
        let members = with_local_member(all_members, self.local_gid());

        let mut accepted = 0;
        for &member in new_members {
            if self.connection.wait_for_quota(&self.quota).await.is_err() {
                break;
            }
            match self
                .link
                .invite_to_group(group.group_id, &members, member)
                .await
            {
                Ok(()) => {
                    tracing::debug!(group_id = group.group_id, member, "invitation sent");
                    accepted += 1;
                }
                Err(e) => {
                    tracing::warn!(group_id = group.group_id, member, error = %e, "invitation failed");
                }
            }
        }
        Ok(accepted)
    }

    /// Another node put us in a group.
    pub fn on_group_invite(&self, group_id: Gid, members: Vec<Gid>) {
        tracing::info!(group_id, members = ?members, "added to group");
        self.listeners.group_created(group_id, &members);
    }
}
