//! Send targeting: broadcast vs group vs individual users.

use serde::{Deserialize, Serialize};

/// Where an outbound message goes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Destination {
    /// Every reachable node, as one unsegmented frame.
    Broadcast,

    /// The current mesh group.
    #[default]
    Group,

    /// Specific users by application uid. Each uid is resolved to a GID at
    /// send time; unknown uids are skipped.
    Users { uids: Vec<String> },
}

impl Destination {
    pub fn users<I, S>(uids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Users {
            uids: uids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::Broadcast)
    }
}
