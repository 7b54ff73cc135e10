//! Quote adapters, one per pool variant.
//!
//! `AdapterFactory::adapter_for` dispatches on the pool's variant tag. cpmm is
//! always available (closed form over reserves); dlmm, clmm and whirlpool
//! delegate swap walking to an injected `LiquiditySdk` and only normalize its
//! answer here.

pub mod clmm;
pub mod concentrated;
pub mod cpmm;
pub mod dlmm;
pub mod whirlpool;

pub use clmm::ClmmAdapter;
pub use concentrated::ConcentratedAdapter;
pub use cpmm::CpmmAdapter;
pub use dlmm::DlmmAdapter;
pub use whirlpool::WhirlpoolAdapter;

use solana_sdk::pubkey::Pubkey;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::dex_interface::{
    amm_calculator, LiquiditySdk, Provenance, Quote, QuoteAdapter, QuoteMode, SdkError, SdkQuote,
    SwapDirection,
};
use crate::error::QuoteFailure;
use crate::pool::{FeeRate, PoolRecord, PoolVariant};
use crate::rpc::ChainReader;

pub const DEFAULT_QUOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// Collaborators an adapter may need. Missing ones make the adapters that
/// need them unavailable.
#[derive(Clone)]
pub struct AdapterContext {
    pub chain: Option<Arc<dyn ChainReader>>,
    pub sdk: Option<Arc<dyn LiquiditySdk>>,
    pub timeout: Duration,
}

impl Default for AdapterContext {
    fn default() -> Self {
        Self {
            chain: None,
            sdk: None,
            timeout: DEFAULT_QUOTE_TIMEOUT,
        }
    }
}

impl AdapterContext {
    /// Run an SDK call under the quote timeout.
    pub(crate) async fn sdk_call<T, F>(&self, fut: F) -> Result<T, QuoteFailure>
    where
        F: Future<Output = Result<T, SdkError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(QuoteFailure::Sdk(e.to_string())),
            Err(_) => Err(QuoteFailure::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    pub(crate) fn require_sdk(&self, variant: PoolVariant) -> Result<Arc<dyn LiquiditySdk>, QuoteFailure> {
        self.sdk.clone().ok_or_else(|| {
            QuoteFailure::AdapterUnavailable(format!("{} quoting needs a liquidity sdk", variant))
        })
    }
}

#[derive(Clone, Default)]
pub struct AdapterFactory {
    ctx: AdapterContext,
}

impl AdapterFactory {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &AdapterContext {
        &self.ctx
    }

    /// Adapter for `pool`, not yet initialised.
    pub fn adapter_for(&self, pool: &PoolRecord) -> Result<Box<dyn QuoteAdapter>, QuoteFailure> {
        let adapter: Box<dyn QuoteAdapter> = match pool.variant() {
            PoolVariant::Cpmm => Box::new(CpmmAdapter::new(pool.clone(), self.ctx.clone())),
            PoolVariant::Dlmm => {
                self.ctx.require_sdk(PoolVariant::Dlmm)?;
                Box::new(DlmmAdapter::new(pool.clone(), self.ctx.clone()))
            }
            PoolVariant::Clmm => {
                self.ctx.require_sdk(PoolVariant::Clmm)?;
                Box::new(ClmmAdapter::new(pool.clone(), self.ctx.clone()))
            }
            PoolVariant::Whirlpool => {
                self.ctx.require_sdk(PoolVariant::Whirlpool)?;
                Box::new(WhirlpoolAdapter::new(pool.clone(), self.ctx.clone()))
            }
        };
        Ok(adapter)
    }
}

/// Shared request checks for every adapter.
pub(crate) fn validate_request(in_atomic: u64, slippage_bps: u16) -> Result<(), QuoteFailure> {
    if in_atomic == 0 {
        return Err(QuoteFailure::InvalidAmount);
    }
    if slippage_bps > 10_000 {
        return Err(QuoteFailure::InvalidSlippage(slippage_bps));
    }
    Ok(())
}

/// Mid price for a swap direction, given quote-per-base.
pub(crate) fn oriented_mid_price(mid_base_quote: f64, direction: SwapDirection) -> Option<f64> {
    if !mid_base_quote.is_finite() || mid_base_quote <= 0.0 {
        return None;
    }
    Some(match direction {
        SwapDirection::BaseToQuote => mid_base_quote,
        SwapDirection::QuoteToBase => 1.0 / mid_base_quote,
    })
}

/// What the adapter knows about the pool besides the SDK's answer.
pub(crate) struct NormalizeInput<'a> {
    pub pool: &'a PoolRecord,
    pub direction: SwapDirection,
    pub in_atomic: u64,
    pub mode: QuoteMode,
    /// Quote-per-base mid price from pool state, if known.
    pub state_mid_price: Option<f64>,
    pub state_fee: Option<FeeRate>,
}

/// Turn a raw SDK quote into the standard `Quote`. Any missing piece is an
/// `IncompleteQuote`, never a default.
pub(crate) fn normalize_sdk_quote(input: NormalizeInput<'_>, raw: SdkQuote) -> Result<Quote, QuoteFailure> {
    let label = input.pool.label();
    let incomplete = |what: &str| QuoteFailure::IncompleteQuote(format!("{}: {}", label, what));

    let amount_in = raw.amount_in.ok_or_else(|| incomplete("missing amount in"))?;
    let amount_out = raw.amount_out.ok_or_else(|| incomplete("missing amount out"))?;
    let min_out = raw.min_amount_out.ok_or_else(|| incomplete("missing min amount out"))?;

    if amount_in != input.in_atomic {
        return Err(incomplete(&format!(
            "sdk consumed {} of {} input",
            amount_in, input.in_atomic
        )));
    }
    if min_out > amount_out {
        return Err(incomplete("min amount out exceeds amount out"));
    }

    let (base_dec, quote_dec) = input.pool.require_decimals()?;
    let (dec_in, dec_out) = input.direction.orient_decimals(base_dec, quote_dec);

    let execution_price = amm_calculator::to_human(amount_out, dec_out)
        / amm_calculator::to_human(amount_in, dec_in);

    let mid_price = raw
        .spot_price
        .filter(|p| p.is_finite() && *p > 0.0)
        .or_else(|| {
            input
                .state_mid_price
                .and_then(|mid| oriented_mid_price(mid, input.direction))
        })
        .ok_or_else(|| incomplete("no usable mid price"))?;

    let price_impact_pct = amm_calculator::price_impact_pct(mid_price, execution_price)
        .ok_or_else(|| incomplete("price impact is not computable"))?;

    let fee = raw
        .fee
        .or(input.state_fee)
        .or(input.pool.fee)
        .ok_or_else(|| incomplete("fee rate unknown"))?;

    if input.mode == QuoteMode::Exact && raw.routing_accounts.is_empty() {
        return Err(incomplete("no routing accounts for execution"));
    }

    Ok(Quote {
        in_atomic: amount_in,
        out_atomic: amount_out,
        min_out_atomic: min_out,
        execution_price,
        price_impact_pct,
        fee,
        routing_accounts: raw.routing_accounts,
        provenance: Provenance::Verified,
    })
}

pub(crate) fn dedup_accounts(accounts: Vec<Pubkey>) -> Vec<Pubkey> {
    use itertools::Itertools;
    accounts.into_iter().unique().collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_factory_dispatch_by_variant() {
        let factory = AdapterFactory::default();
        assert_eq!(
            factory.adapter_for(&pool(PoolVariant::Cpmm)).unwrap().variant(),
            PoolVariant::Cpmm
        );
        // sdk-backed variants are unavailable without an sdk
        for variant in [PoolVariant::Dlmm, PoolVariant::Clmm, PoolVariant::Whirlpool] {
            let err = factory.adapter_for(&pool(variant)).err().unwrap();
            assert_eq!(err.reason(), "adapter-unavailable");
        }

        let factory = AdapterFactory::new(AdapterContext {
            sdk: Some(Arc::new(FixedRatioSdk::new(1.0))),
            ..AdapterContext::default()
        });
        for variant in [PoolVariant::Dlmm, PoolVariant::Clmm, PoolVariant::Whirlpool] {
            assert_eq!(factory.adapter_for(&pool(variant)).unwrap().variant(), variant);
        }
    }

    #[test]
    fn test_normalize_rejects_incomplete_quotes() {
        let p = pool(PoolVariant::Dlmm);
        let input = || NormalizeInput {
            pool: &p,
            direction: SwapDirection::BaseToQuote,
            in_atomic: 1_000,
            mode: QuoteMode::Fast,
            state_mid_price: Some(0.5),
            state_fee: None,
        };
        let full = SdkQuote {
            amount_in: Some(1_000),
            amount_out: Some(499),
            min_amount_out: Some(496),
            spot_price: None,
            fee: None,
            routing_accounts: vec![],
        };

        let quote = normalize_sdk_quote(input(), full.clone()).unwrap();
        assert_eq!(quote.out_atomic, 499);
        assert_eq!(quote.provenance, Provenance::Verified);
        assert!((quote.price_impact_pct - 0.2).abs() < 1e-9);

        let missing_min = SdkQuote {
            min_amount_out: None,
            ..full.clone()
        };
        assert_eq!(
            normalize_sdk_quote(input(), missing_min).unwrap_err().reason(),
            "incomplete-quote"
        );

        let partial_fill = SdkQuote {
            amount_in: Some(900),
            ..full.clone()
        };
        assert!(normalize_sdk_quote(input(), partial_fill).is_err());

        let exact = NormalizeInput {
            mode: QuoteMode::Exact,
            ..input()
        };
        assert_eq!(
            normalize_sdk_quote(exact, full.clone()).unwrap_err().reason(),
            "incomplete-quote"
        );

        let no_mid = NormalizeInput {
            state_mid_price: None,
            ..input()
        };
        assert!(normalize_sdk_quote(no_mid, full).is_err());
    }

    #[test]
    fn test_request_validation() {
        assert_eq!(validate_request(0, 50), Err(QuoteFailure::InvalidAmount));
        assert_eq!(validate_request(1, 10_001), Err(QuoteFailure::InvalidSlippage(10_001)));
        assert!(validate_request(1, 10_000).is_ok());
    }
}
