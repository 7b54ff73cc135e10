/// 🔥 Per-pool quote statistics
///
/// - quote successes / failures per pool address
/// - last failure reason
/// - verified vs approximated quotes
/// - largest price impact seen
/// - summary grouped by variant

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::dex_interface::LegQuote;
use crate::pool::PoolVariant;

/// Statistics for one pool
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub pool_address: Pubkey,
    pub variant: PoolVariant,
    pub first_seen: DateTime<Utc>,
    pub last_quote: DateTime<Utc>,
    pub quote_successes: u64,
    pub quote_failures: u64,
    pub verified_quotes: u64,
    pub approximated_quotes: u64,
    pub max_price_impact_pct: f64,
    pub last_failure_reason: Option<String>,
}

impl PoolStats {
    pub fn new(pool_address: Pubkey, variant: PoolVariant) -> Self {
        let now = Utc::now();
        Self {
            pool_address,
            variant,
            first_seen: now,
            last_quote: now,
            quote_successes: 0,
            quote_failures: 0,
            verified_quotes: 0,
            approximated_quotes: 0,
            max_price_impact_pct: 0.0,
            last_failure_reason: None,
        }
    }

    fn record_success(&mut self, leg: &LegQuote) {
        self.quote_successes += 1;
        self.last_quote = Utc::now();
        if leg.is_verified() {
            self.verified_quotes += 1;
        } else {
            self.approximated_quotes += 1;
        }
        if leg.quote.price_impact_pct > self.max_price_impact_pct {
            self.max_price_impact_pct = leg.quote.price_impact_pct;
        }
    }

    fn record_failure(&mut self, reason: &str) {
        self.quote_failures += 1;
        self.last_quote = Utc::now();
        self.last_failure_reason = Some(reason.to_string());
    }

    /// Success rate in percent (0 when never quoted)
    pub fn success_rate(&self) -> f64 {
        let total = self.quote_successes + self.quote_failures;
        if total == 0 {
            return 0.0;
        }
        self.quote_successes as f64 / total as f64 * 100.0
    }
}

/// Pool stats collector
#[derive(Clone, Default)]
pub struct PoolStatsCollector {
    stats: Arc<DashMap<Pubkey, PoolStats>>,
}

impl PoolStatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, leg: &LegQuote) {
        self.stats
            .entry(leg.pool_address)
            .or_insert_with(|| PoolStats::new(leg.pool_address, leg.variant))
            .record_success(leg);
    }

    pub fn record_failure(&self, pool_address: Pubkey, variant: PoolVariant, reason: &str) {
        self.stats
            .entry(pool_address)
            .or_insert_with(|| PoolStats::new(pool_address, variant))
            .record_failure(reason);
    }

    pub fn get_all_stats(&self) -> Vec<PoolStats> {
        self.stats
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn get_pool_stats(&self, pool_address: &Pubkey) -> Option<PoolStats> {
        self.stats.get(pool_address).map(|entry| entry.value().clone())
    }

    pub fn total_successes(&self) -> u64 {
        self.stats.iter().map(|e| e.value().quote_successes).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.stats.iter().map(|e| e.value().quote_failures).sum()
    }

    /// Summary table, worst pools first, plus per-variant totals.
    pub fn render_summary(&self) -> String {
        let mut all_stats = self.get_all_stats();
        all_stats.sort_by(|a, b| {
            b.quote_failures
                .cmp(&a.quote_failures)
                .then(a.pool_address.cmp(&b.pool_address))
        });

        let mut out = String::new();
        let _ = writeln!(out, "\n📊 Pool quote statistics ({} pools)", all_stats.len());
        let _ = writeln!(
            out,
            "  {:<44} │ {:<9} │ {:>5} │ {:>5} │ {:>7} │ last failure",
            "pool", "variant", "ok", "fail", "impact%"
        );
        for s in &all_stats {
            let _ = writeln!(
                out,
                "  {:<44} │ {:<9} │ {:>5} │ {:>5} │ {:>7.3} │ {}",
                s.pool_address.to_string(),
                s.variant.as_str(),
                s.quote_successes,
                s.quote_failures,
                s.max_price_impact_pct,
                s.last_failure_reason.as_deref().unwrap_or("-")
            );
        }

        let mut by_variant: BTreeMap<&'static str, (u64, u64)> = BTreeMap::new();
        for s in &all_stats {
            let entry = by_variant.entry(s.variant.as_str()).or_default();
            entry.0 += s.quote_successes;
            entry.1 += s.quote_failures;
        }
        for (variant, (ok, fail)) in by_variant {
            let _ = writeln!(out, "  {:<9} ok={} fail={}", variant, ok, fail);
        }
        out
    }

    pub fn print_summary(&self) {
        println!("{}", self.render_summary());
    }
}
