//! meshfwd-services: the transport's stateful building blocks.

pub mod directory;
pub mod listener;
pub mod queue;
pub mod quota;
pub mod reassembly;
pub mod send_target;

pub use directory::{GroupTracker, PeerDirectory};
pub use listener::{GroupListener, ListenerSet, Listeners, MessageListener};
pub use queue::{MessageQueue, OutboundMessage, Priority, PriorityQueue};
pub use quota::QuotaLimiter;
pub use reassembly::{DiscardReason, FragmentOutcome, Reassembler};
pub use send_target::Destination;
