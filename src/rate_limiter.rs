//! Shared RPC rate limiter with exponential backoff.
//!
//! One instance is shared by every hydration batch: it enforces a minimum
//! spacing between calls and owns the consecutive rate-limit counter that
//! drives backoff. `delay = min(max, base * 2^min(max_exponent, hits))`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
    pub max_exponent: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 250,
            max_ms: 60_000,
            max_exponent: 10,
        }
    }
}

impl BackoffPolicy {
    pub fn delay_ms(&self, consecutive_hits: u32) -> u64 {
        let exponent = consecutive_hits.min(self.max_exponent).min(63);
        self.base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_ms)
    }
}

pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Instant>,
    consecutive_hits: AtomicU32,
    policy: BackoffPolicy,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, policy: BackoffPolicy) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(Instant::now()),
            consecutive_hits: AtomicU32::new(0),
            policy,
        }
    }

    /// Wait for this caller's turn. Callers are spaced `min_interval` apart.
    pub async fn wait(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = if *next > now { *next } else { now };
            *next = slot + self.min_interval;
            slot
        };
        sleep_until(slot).await;
    }

    /// Record a rate-limit response; returns the backoff to sleep.
    pub fn on_rate_limited(&self) -> Duration {
        let hits = self
            .consecutive_hits
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1);
        let delay_ms = self.policy.delay_ms(hits);
        warn!(hits, delay_ms, "⚠️  RPC rate limited, backing off");
        Duration::from_millis(delay_ms)
    }

    pub fn on_success(&self) {
        self.consecutive_hits.store(0, Ordering::SeqCst);
    }

    pub fn consecutive_hits(&self) -> u32 {
        self.consecutive_hits.load(Ordering::SeqCst)
    }

    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }
}
