//! Chunk reassembly: one accumulator per sending node.
//!
//! Fragments are collected per sender GID. The chunk with `index == count - 1`
//! closes the transmission: whatever has arrived is joined in index order,
//! missing indices are skipped, and the accumulator is cleared.
//!
//! Validation:
//!   * headers with `index >= count` or `count` outside 1..=15 are dropped
//!   * a fragment whose `count` differs from the open accumulator's is dropped
//!   * index 0 always starts a new transmission, replacing a stale accumulator
//!   * an exact repeat of the chunk that just completed a message is dropped,
//!     but only within the dedup window; later it is a new transmission
//!
//! The whole sender map sits behind one mutex and all reassembly work happens
//! inside it. Partial messages stay until completed, superseded, or evicted
//! by [`Reassembler::evict_stale`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::time::Instant;

use meshfwd_core::wire::{self, ChunkFrame, ChunkHeader};
use meshfwd_core::Gid;

/// How long a repeat of a final chunk counts as a radio-level duplicate.
/// Must stay below the sender's dispatch poll interval, since a node never
/// puts two messages on the air within one poll.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// The fragment closed a transmission; here is the message.
    Complete(Bytes),
    /// Stored, waiting for more.
    Pending,
    /// Repeat of the chunk that completed the previous message, heard
    /// inside the dedup window.
    Duplicate,
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    Malformed,
    CountMismatch,
}

struct PartialMessage {
    count: u8,
    fragments: BTreeMap<u8, ChunkFrame>,
    started: Instant,
}

struct Completed {
    chunk: ChunkFrame,
    at: Instant,
}

#[derive(Default)]
struct SenderState {
    partial: Option<PartialMessage>,
    last_completed: Option<Completed>,
}

pub struct Reassembler {
    senders: Mutex<HashMap<Gid, SenderState>>,
    dedup_window: Duration,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::with_dedup_window(DEFAULT_DEDUP_WINDOW)
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dedup_window(dedup_window: Duration) -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
            dedup_window,
        }
    }

    /// Decode a raw chunk frame and feed it in.
    pub fn on_frame(&self, sender: Gid, frame: Bytes) -> FragmentOutcome {
        match ChunkFrame::decode(frame) {
            Ok(chunk) => self.on_fragment(sender, chunk.header, chunk.fragment),
            Err(e) => {
                tracing::debug!(sender, error = %e, "malformed chunk frame, discarding");
                FragmentOutcome::Discarded(DiscardReason::Malformed)
            }
        }
    }

    pub fn on_fragment(&self, sender: Gid, header: ChunkHeader, fragment: Bytes) -> FragmentOutcome {
        let chunk = ChunkFrame { header, fragment };
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        let state = senders.entry(sender).or_default();

        let now = Instant::now();
        let repeat = state.partial.is_none()
            && state.last_completed.as_ref().is_some_and(|done| {
                done.chunk == chunk && now.saturating_duration_since(done.at) < self.dedup_window
            });
        if repeat {
            tracing::debug!(sender, "repeated final chunk, discarding");
            return FragmentOutcome::Duplicate;
        }

        if header.index() == 0 && state.partial.is_some() {
            tracing::debug!(sender, "new transmission supersedes partial message");
            state.partial = None;
        }

        let partial = state.partial.get_or_insert_with(|| PartialMessage {
            count: header.count(),
            fragments: BTreeMap::new(),
            started: now,
        });

        if partial.count != header.count() {
            tracing::debug!(
                sender,
                expected = partial.count,
                got = header.count(),
                "chunk count mismatch, discarding"
            );
            return FragmentOutcome::Discarded(DiscardReason::CountMismatch);
        }

        tracing::trace!(
            sender,
            index = header.index(),
            count = header.count(),
            "chunk received"
        );
        partial
            .fragments
            .entry(header.index())
            .or_insert_with(|| chunk.clone());
        state.last_completed = None;

        if !header.is_last() {
            return FragmentOutcome::Pending;
        }

        match state.partial.take() {
            Some(done) => {
                let received = done.fragments.len();
                if received < done.count as usize {
                    tracing::warn!(
                        sender,
                        received,
                        count = done.count,
                        "message completed with missing chunks"
                    );
                }
                let frames: Vec<ChunkFrame> = done.fragments.into_values().collect();
                state.last_completed = Some(Completed { chunk, at: now });
                FragmentOutcome::Complete(wire::join(&frames))
            }
            None => FragmentOutcome::Pending,
        }
    }

    /// Senders with an unfinished message.
    pub fn pending_senders(&self) -> usize {
        self.senders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|s| s.partial.is_some())
            .count()
    }

    /// Drop partial messages whose first fragment is older than `timeout`.
    pub fn evict_stale(&self, timeout: Duration) -> usize {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        let mut evicted = 0;
        for state in senders.values_mut() {
            if state
                .partial
                .as_ref()
                .is_some_and(|p| p.started.elapsed() >= timeout)
            {
                state.partial = None;
                evicted += 1;
            }
        }
        evicted
    }
}

/// Evict stale partial messages every `interval` until shutdown.
pub async fn sweep_loop(
    reassembler: Arc<Reassembler>,
    timeout: Duration,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = shutdown.recv() => return,

            _ = interval.tick() => {
                let evicted = reassembler.evict_stale(timeout);
                if evicted > 0 {
                    tracing::debug!(evicted, "evicted stale partial messages");
                }
            }
        }
    }
}
