//! Leg Simulator: one swap against one pool.
//!
//! Prefers the variant's quote adapter. The closed-form cpmm fallback over
//! hydrated reserves is off by default and never applies to concentrated
//! variants.

use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::adapters::cpmm::constant_product_quote;
use crate::adapters::AdapterFactory;
use crate::dex_interface::{LegQuote, Provenance, Quote, QuoteMode, SwapDirection};
use crate::error::QuoteFailure;
use crate::metrics::SimulationMetrics;
use crate::pool::PoolRecord;
use crate::pool_stats::PoolStatsCollector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SimulationPolicy {
    /// Try the live adapter first.
    pub prefer_sdk: bool,
    /// Allow approximated cpmm math for cpmm/dlmm when the adapter path is
    /// unavailable or failed.
    pub math_fallback: bool,
    pub slippage_bps: u16,
}

impl Default for SimulationPolicy {
    fn default() -> Self {
        Self {
            prefer_sdk: true,
            math_fallback: false,
            slippage_bps: 50,
        }
    }
}

pub struct LegSimulator {
    factory: AdapterFactory,
    policy: SimulationPolicy,
    metrics: Arc<SimulationMetrics>,
    stats: Option<PoolStatsCollector>,
}

impl LegSimulator {
    pub fn new(factory: AdapterFactory, policy: SimulationPolicy, metrics: Arc<SimulationMetrics>) -> Self {
        Self {
            factory,
            policy,
            metrics,
            stats: None,
        }
    }

    pub fn with_stats(mut self, stats: PoolStatsCollector) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn policy(&self) -> SimulationPolicy {
        self.policy
    }

    pub fn metrics(&self) -> &Arc<SimulationMetrics> {
        &self.metrics
    }

    /// Simulate selling `dx_atomic` of `input_mint` for `output_mint`.
    pub async fn simulate_leg(
        &self,
        pool: &PoolRecord,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        dx_atomic: u64,
        mode: QuoteMode,
    ) -> Result<LegQuote, QuoteFailure> {
        let result = self
            .run(pool, input_mint, output_mint, dx_atomic, mode)
            .await;

        match &result {
            Ok(leg) => {
                debug!(
                    pool = %leg.pool_address,
                    variant = %leg.variant,
                    dx = dx_atomic,
                    dy = leg.quote.out_atomic,
                    provenance = %leg.quote.provenance,
                    "leg quoted"
                );
                if let Some(stats) = &self.stats {
                    stats.record_success(leg);
                }
            }
            Err(failure) => {
                self.metrics.record_failure();
                warn!(pool = %pool.label(), variant = %pool.variant(), reason = failure.reason(), error = %failure, "leg failed");
                if let (Some(stats), Some(address)) = (&self.stats, pool.address) {
                    stats.record_failure(address, pool.variant(), failure.reason());
                }
            }
        }
        result
    }

    async fn run(
        &self,
        pool: &PoolRecord,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        dx_atomic: u64,
        mode: QuoteMode,
    ) -> Result<LegQuote, QuoteFailure> {
        if dx_atomic == 0 {
            return Err(QuoteFailure::InvalidAmount);
        }
        let pool_address = pool.require_address()?;
        let direction = SwapDirection::resolve(pool, input_mint, output_mint)?;
        let variant = pool.variant();
        let fallback_allowed = self.policy.math_fallback && !variant.is_concentrated();

        let leg = |quote: Quote| LegQuote {
            pool_address,
            variant,
            dex: pool.dex.clone(),
            input_mint: *input_mint,
            output_mint: *output_mint,
            quote,
        };

        if self.policy.prefer_sdk {
            match self.factory.adapter_for(pool) {
                Ok(mut adapter) => {
                    self.metrics.record_adapter_call();
                    let quoted = match adapter.init().await {
                        Err(e) => Err(QuoteFailure::from(e)),
                        Ok(()) => match mode {
                            QuoteMode::Fast => {
                                adapter
                                    .quote_fast_exact_in(dx_atomic, direction, self.policy.slippage_bps)
                                    .await
                            }
                            QuoteMode::Exact => {
                                adapter
                                    .quote_exact_in(dx_atomic, direction, self.policy.slippage_bps)
                                    .await
                            }
                        },
                    }
                    .and_then(|quote| {
                        if quote.out_atomic == 0 {
                            Err(QuoteFailure::IncompleteQuote(format!(
                                "{}: zero output",
                                pool.label()
                            )))
                        } else {
                            Ok(quote)
                        }
                    });

                    match quoted {
                        Ok(quote) => {
                            self.metrics.record_adapter_success();
                            return Ok(leg(quote));
                        }
                        Err(failure) if !fallback_allowed => return Err(failure),
                        Err(failure) => {
                            debug!(pool = %pool.label(), reason = failure.reason(), "adapter failed, using math fallback");
                        }
                    }
                }
                Err(unavailable) => {
                    if !fallback_allowed {
                        debug!(pool = %pool.label(), reason = %unavailable, "no adapter");
                        return Err(QuoteFailure::NoSimulationMethod { pool: pool.label() });
                    }
                }
            }
        } else if !fallback_allowed {
            return Err(QuoteFailure::NoSimulationMethod { pool: pool.label() });
        }

        self.metrics.record_fallback_call();
        let quote = constant_product_quote(
            pool,
            pool.reserves,
            direction,
            dx_atomic,
            self.policy.slippage_bps,
            Provenance::Approximated,
        )?;
        if quote.out_atomic == 0 {
            return Err(QuoteFailure::IncompleteQuote(format!("{}: zero output", pool.label())));
        }
        self.metrics.record_fallback_success();
        Ok(leg(quote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::{pool, FixedRatioSdk};
    use crate::adapters::AdapterContext;
    use crate::dex_interface::SdkError;
    use crate::pool::PoolVariant;

    fn simulator(sdk: Option<FixedRatioSdk>, policy: SimulationPolicy) -> LegSimulator {
        let ctx = AdapterContext {
            sdk: sdk.map(|s| Arc::new(s) as Arc<dyn crate::dex_interface::LiquiditySdk>),
            ..AdapterContext::default()
        };
        LegSimulator::new(AdapterFactory::new(ctx), policy, Arc::new(SimulationMetrics::new()))
    }

    #[tokio::test]
    async fn test_cpmm_leg_is_verified() {
        let sim = simulator(None, SimulationPolicy::default());
        let p = pool(PoolVariant::Cpmm);
        let leg = sim
            .simulate_leg(&p, &p.base_mint.unwrap(), &p.quote_mint.unwrap(), 1_000_000_000, QuoteMode::Fast)
            .await
            .unwrap();
        assert_eq!(leg.quote.out_atomic, 498_003_490);
        assert!(leg.is_verified());

        let snap = sim.metrics().snapshot();
        assert_eq!((snap.adapter_calls, snap.adapter_successes), (1, 1));
    }

    #[tokio::test]
    async fn test_zero_amount_and_wrong_mints() {
        let sim = simulator(None, SimulationPolicy::default());
        let p = pool(PoolVariant::Cpmm);
        let err = sim
            .simulate_leg(&p, &p.base_mint.unwrap(), &p.quote_mint.unwrap(), 0, QuoteMode::Fast)
            .await
            .unwrap_err();
        assert_eq!(err, QuoteFailure::InvalidAmount);

        let err = sim
            .simulate_leg(&p, &Pubkey::new_unique(), &p.quote_mint.unwrap(), 10, QuoteMode::Fast)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "mint-mismatch");
        assert_eq!(sim.metrics().snapshot().failures, 2);
    }

    #[tokio::test]
    async fn test_no_adapter_without_fallback() {
        let sim = simulator(None, SimulationPolicy::default());
        let p = pool(PoolVariant::Dlmm);
        let err = sim
            .simulate_leg(&p, &p.base_mint.unwrap(), &p.quote_mint.unwrap(), 1_000, QuoteMode::Fast)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "no-simulation-method");
    }

    #[tokio::test]
    async fn test_dlmm_falls_back_when_enabled() {
        let policy = SimulationPolicy {
            math_fallback: true,
            ..SimulationPolicy::default()
        };
        let sim = simulator(None, policy);
        let p = pool(PoolVariant::Dlmm);
        let leg = sim
            .simulate_leg(&p, &p.base_mint.unwrap(), &p.quote_mint.unwrap(), 1_000_000_000, QuoteMode::Fast)
            .await
            .unwrap();
        assert_eq!(leg.quote.provenance, Provenance::Approximated);
        assert_eq!(leg.quote.out_atomic, 498_003_490);
        let snap = sim.metrics().snapshot();
        assert_eq!((snap.fallback_calls, snap.fallback_successes), (1, 1));
    }

    #[tokio::test]
    async fn test_cpmm_adapter_failure_is_not_masked() {
        let mut p = pool(PoolVariant::Cpmm);
        p.reserves = None;
        let sim = simulator(None, SimulationPolicy::default());
        let err = sim
            .simulate_leg(&p, &p.base_mint.unwrap(), &p.quote_mint.unwrap(), 1_000, QuoteMode::Fast)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "reserves-missing");
    }

    #[tokio::test]
    async fn test_concentrated_never_falls_back() {
        let mut sdk = FixedRatioSdk::new(1.0);
        sdk.fail = Some(SdkError::Failed("tick array missing".into()));
        let policy = SimulationPolicy {
            math_fallback: true,
            ..SimulationPolicy::default()
        };
        let sim = simulator(Some(sdk), policy);
        let p = pool(PoolVariant::Whirlpool);
        let err = sim
            .simulate_leg(&p, &p.base_mint.unwrap(), &p.quote_mint.unwrap(), 1_000, QuoteMode::Fast)
            .await
            .unwrap_err();
        // init goes through the sdk when no chain reader is configured
        assert_eq!(err.reason(), "init-failed");
        assert_eq!(sim.metrics().snapshot().fallback_calls, 0);
    }
}
