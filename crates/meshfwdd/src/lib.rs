//! meshfwdd: message transport over a quota-limited mesh radio.
//!
//! [`Transport`] is the entry point. Give it a [`link::RadioLink`] and the
//! link's event receiver, call [`Transport::start`], and send through it.

pub mod connection;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod group;
pub mod inbound;
pub mod link;
pub mod transport;

pub use connection::{ConnectionCoordinator, ConnectionState, Transition};
pub use error::TransportError;
pub use link::{LinkError, LinkEvent, LinkStatus, RadioLink};
pub use transport::Transport;
