use meshfwd_core::config::ConfigError;
use meshfwd_core::WireError;

use crate::link::LinkError;

/// Why a transport operation did not happen.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("radio is not ready")]
    NotReady,

    #[error("transport has been shut down")]
    Destroyed,

    #[error("no current mesh group")]
    NoGroup,

    #[error("radio setup failed: {0}")]
    Setup(#[source] LinkError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
