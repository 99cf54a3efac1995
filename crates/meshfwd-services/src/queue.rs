//! Outbound message queue: the dispatcher drains it highest priority first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::send_target::Destination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    /// Discovery beacons.
    Highest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub payload: Bytes,
    pub destination: Destination,
    pub priority: Priority,
}

/// Anything the dispatcher can pull messages from.
///
/// Implementations must hand out the highest priority first and keep FIFO
/// order among equal priorities.
pub trait MessageQueue: Send + Sync {
    fn enqueue(&self, payload: Bytes, destination: Destination, priority: Priority);

    fn pop_highest_priority(&self) -> Option<OutboundMessage>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Queued {
    seq: u64,
    message: OutboundMessage,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority wins, then the older entry.
        self.message
            .priority
            .cmp(&other.message.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Queued {}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
}

/// In-memory priority queue.
#[derive(Default)]
pub struct PriorityQueue {
    state: Mutex<QueueState>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageQueue for PriorityQueue {
    fn enqueue(&self, payload: Bytes, destination: Destination, priority: Priority) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Queued {
            seq,
            message: OutboundMessage {
                payload,
                destination,
                priority,
            },
        });
        tracing::trace!(?priority, depth = state.heap.len(), "message queued");
    }

    fn pop_highest_priority(&self) -> Option<OutboundMessage> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.heap.pop().map(|q| q.message)
    }

    fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).heap.len()
    }
}
