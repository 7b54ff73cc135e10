//! Run-scoped leg simulation counters.
//!
//! One `SimulationMetrics` is created per run and passed to the leg simulator
//! explicitly; nothing here is global.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SimulationMetrics {
    adapter_calls: AtomicU64,
    adapter_successes: AtomicU64,
    fallback_calls: AtomicU64,
    fallback_successes: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub adapter_calls: u64,
    pub adapter_successes: u64,
    pub fallback_calls: u64,
    pub fallback_successes: u64,
    pub failures: u64,
}

impl MetricsSnapshot {
    pub fn adapter_success_rate(&self) -> f64 {
        if self.adapter_calls == 0 {
            return 0.0;
        }
        self.adapter_successes as f64 / self.adapter_calls as f64 * 100.0
    }
}

impl SimulationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_adapter_call(&self) {
        self.adapter_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_adapter_success(&self) {
        self.adapter_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_call(&self) {
        self.fallback_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_success(&self) {
        self.fallback_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            adapter_calls: self.adapter_calls.load(Ordering::Relaxed),
            adapter_successes: self.adapter_successes.load(Ordering::Relaxed),
            fallback_calls: self.fallback_calls.load(Ordering::Relaxed),
            fallback_successes: self.fallback_successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter between runs.
    pub fn reset(&self) {
        for counter in [
            &self.adapter_calls,
            &self.adapter_successes,
            &self.fallback_calls,
            &self.fallback_successes,
            &self.failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
