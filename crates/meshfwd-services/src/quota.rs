//! Transmit quota: the radio rejects frames beyond a fixed count per window.
//!
//! Every radio request costs one slot. The limiter keeps the send times of
//! the current window; a caller that finds all slots taken sleeps until the
//! oldest send ages out. Block, never drop: a rejected frame is lost at the
//! hardware, a delayed one is not.
//!
//! Check-and-record happens under one lock, so concurrent senders and the
//! periodic refresh cannot push the count past the limit.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

pub struct QuotaLimiter {
    limit: u32,
    window: Duration,
    sends: Mutex<VecDeque<Instant>>,
}

impl QuotaLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            window,
            sends: Mutex::new(VecDeque::with_capacity(limit as usize)),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Account one transmission, waiting first if the window is full.
    pub async fn record_send(&self) {
        loop {
            let retry_at = {
                let mut sends = self.sends.lock().unwrap_or_else(|e| e.into_inner());
                let now = Instant::now();
                self.expire(&mut sends, now);
                if (sends.len() as u32) < self.limit {
                    sends.push_back(now);
                    return;
                }
                match sends.front() {
                    Some(oldest) => *oldest + self.window,
                    None => continue,
                }
            };

            tracing::info!(
                limit = self.limit,
                wait_ms = retry_at
                    .saturating_duration_since(Instant::now())
                    .as_millis() as u64,
                "transmit quota reached, pausing"
            );
            tokio::time::sleep_until(retry_at).await;
        }
    }

    /// Account one transmission if a slot is free right now.
    pub fn try_record_send(&self) -> bool {
        let mut sends = self.sends.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        self.expire(&mut sends, now);
        if (sends.len() as u32) < self.limit {
            sends.push_back(now);
            true
        } else {
            false
        }
    }

    /// Sends counted against the current window.
    pub fn used(&self) -> u32 {
        let mut sends = self.sends.lock().unwrap_or_else(|e| e.into_inner());
        self.expire(&mut sends, Instant::now());
        sends.len() as u32
    }

    /// Drop sends older than one window. Returns the remaining count.
    pub fn refresh(&self) -> u32 {
        self.used()
    }

    fn expire(&self, sends: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = sends.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                sends.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Refresh the quota once per window until shutdown.
pub async fn refresh_loop(limiter: Arc<QuotaLimiter>, mut shutdown: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(limiter.window());

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("quota refresh loop shutting down");
                return;
            }

            _ = interval.tick() => {
                let used = limiter.refresh();
                tracing::trace!(used, limit = limiter.limit(), "quota window refreshed");
            }
        }
    }
}
