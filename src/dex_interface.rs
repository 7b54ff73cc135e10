use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use thiserror::Error;

use crate::error::{InitError, QuoteFailure};
use crate::pool::{DexId, FeeRate, PoolRecord, PoolVariant, Reserves};

/// Which side of the pool is being sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapDirection {
    BaseToQuote,
    QuoteToBase,
}

impl SwapDirection {
    /// Direction for selling `input_mint` into `pool`, checking that
    /// `output_mint` is the other side.
    pub fn resolve(
        pool: &PoolRecord,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
    ) -> Result<Self, QuoteFailure> {
        let (base, quote) = pool.require_mints()?;
        let mismatch = |mint: Pubkey| QuoteFailure::MintMismatch {
            pool: pool.label(),
            mint,
        };
        let direction = if *input_mint == base {
            SwapDirection::BaseToQuote
        } else if *input_mint == quote {
            SwapDirection::QuoteToBase
        } else {
            return Err(mismatch(*input_mint));
        };
        let expected_out = match direction {
            SwapDirection::BaseToQuote => quote,
            SwapDirection::QuoteToBase => base,
        };
        if *output_mint != expected_out {
            return Err(mismatch(*output_mint));
        }
        Ok(direction)
    }

    /// `(reserve_in, reserve_out)` for this direction.
    pub fn orient_reserves(&self, reserves: &Reserves) -> (u64, u64) {
        match self {
            SwapDirection::BaseToQuote => (reserves.base, reserves.quote),
            SwapDirection::QuoteToBase => (reserves.quote, reserves.base),
        }
    }

    /// `(decimals_in, decimals_out)` for this direction.
    pub fn orient_decimals(&self, base: u8, quote: u8) -> (u8, u8) {
        match self {
            SwapDirection::BaseToQuote => (base, quote),
            SwapDirection::QuoteToBase => (quote, base),
        }
    }
}

/// Where a quote's numbers came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Produced by a live adapter.
    Verified,
    /// Produced by the closed-form fallback.
    Approximated,
}

/// Cheap scanning quote vs. execution-grade quote with refreshed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteMode {
    #[default]
    Fast,
    Exact,
}

/// Standardized quote. Atomic amounts are integers, never floats.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub in_atomic: u64,
    pub out_atomic: u64,
    pub min_out_atomic: u64,
    /// Human units, out per in.
    pub execution_price: f64,
    /// Percent deviation of `execution_price` from the pool mid price.
    pub price_impact_pct: f64,
    pub fee: FeeRate,
    /// Bin/tick arrays needed when the swap is executed.
    pub routing_accounts: Vec<Pubkey>,
    pub provenance: Provenance,
}

/// One simulated leg of a route.
#[derive(Debug, Clone, PartialEq)]
pub struct LegQuote {
    pub pool_address: Pubkey,
    pub variant: PoolVariant,
    pub dex: DexId,
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub quote: Quote,
}

impl LegQuote {
    pub fn is_verified(&self) -> bool {
        self.quote.provenance == Provenance::Verified
    }
}

/// Quoting contract implemented once per pool variant.
///
/// `init` must succeed before either quote method is used; quoting an
/// uninitialised adapter is `QuoteFailure::NotInitialized`.
#[async_trait]
pub trait QuoteAdapter: Send + Sync {
    fn variant(&self) -> PoolVariant;

    /// Establish whatever chain-state handle quoting needs.
    async fn init(&mut self) -> Result<(), InitError>;

    /// Low-cost quote for opportunity scanning.
    async fn quote_fast_exact_in(
        &self,
        in_atomic: u64,
        direction: SwapDirection,
        slippage_bps: u16,
    ) -> Result<Quote, QuoteFailure>;

    /// Refresh state, then produce an execution-grade quote including routing
    /// accounts.
    async fn quote_exact_in(
        &mut self,
        in_atomic: u64,
        direction: SwapDirection,
        slippage_bps: u16,
    ) -> Result<Quote, QuoteFailure>;
}

/// Errors reported by the external liquidity SDK.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SdkError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("sdk unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),
}

/// State the SDK can report for a pool without quoting a trade.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SdkPoolState {
    /// Human units, quote per base.
    pub mid_price: Option<f64>,
    pub fee: Option<FeeRate>,
}

/// Raw SDK quote. Any `None` makes the quote incomplete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SdkQuote {
    pub amount_in: Option<u64>,
    pub amount_out: Option<u64>,
    pub min_amount_out: Option<u64>,
    /// Human units, out per in, before the trade moves the price.
    pub spot_price: Option<f64>,
    pub fee: Option<FeeRate>,
    pub routing_accounts: Vec<Pubkey>,
}

/// Seam to the liquidity SDK that walks bins (dlmm) and ticks
/// (clmm/whirlpool). The core only normalizes what it returns.
#[async_trait]
pub trait LiquiditySdk: Send + Sync {
    async fn load_pool(&self, pool: &PoolRecord) -> Result<SdkPoolState, SdkError>;

    async fn quote_exact_in(
        &self,
        pool: &PoolRecord,
        amount_in: u64,
        direction: SwapDirection,
        slippage_bps: u16,
        refresh: bool,
    ) -> Result<SdkQuote, SdkError>;

    /// Current reserves for variants without simple vault reads.
    async fn fetch_reserves(&self, pool: &PoolRecord) -> Result<Reserves, SdkError>;
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Verified => write!(f, "verified"),
            Provenance::Approximated => write!(f, "approximated"),
        }
    }
}

/// Constant product (x * y = k) math on atomic integers.
///
/// `dx_eff = dx * (1 - f)`, `dy = floor(dx_eff * y / (x + dx_eff))`, evaluated
/// exactly as `floor(dx*(1e6-ppm)*y / (x*1e6 + dx*(1e6-ppm)))`.
pub mod amm_calculator {
    use crate::pool::FeeRate;

    /// Exact output amount. `None` when any input is zero.
    ///
    /// # Example
    /// ```
    /// use solana_tri_arb::dex_interface::amm_calculator::calculate_amm_output;
    /// use solana_tri_arb::pool::FeeRate;
    ///
    /// // 1,000 in a 1,000,000 / 500,000 pool (6 decimals each), 0.3% fee
    /// let out = calculate_amm_output(
    ///     1_000_000_000,
    ///     1_000_000_000_000,
    ///     500_000_000_000,
    ///     FeeRate::from_bps(30).unwrap(),
    /// );
    /// assert_eq!(out, Some(498_003_490));
    /// ```
    pub fn calculate_amm_output(
        amount_in: u64,
        reserve_in: u64,
        reserve_out: u64,
        fee: FeeRate,
    ) -> Option<u64> {
        if amount_in == 0 || reserve_in == 0 || reserve_out == 0 {
            return None;
        }

        // both < 2^85
        let amount_in_with_fee = (amount_in as u128) * (fee.keep_ppm() as u128);
        let denominator = (reserve_in as u128)
            .checked_mul(FeeRate::DENOMINATOR as u128)?
            .checked_add(amount_in_with_fee)?;

        // < reserve_out, so it always fits
        u64::try_from(mul_div_u64(amount_in_with_fee, reserve_out, denominator)?).ok()
    }

    /// `floor(a * b / d)` for `a, d < 2^85` without a 256-bit intermediate.
    ///
    /// Splits `b` into 32-bit halves: `a*b = (a*hi << 32) + a*lo`, divides the
    /// high product first and carries its remainder into the low one.
    fn mul_div_u64(a: u128, b: u64, d: u128) -> Option<u128> {
        if d == 0 {
            return None;
        }
        let hi = (b >> 32) as u128;
        let lo = (b & 0xFFFF_FFFF) as u128;

        let high = a.checked_mul(hi)?;
        let (q_high, r_high) = (high / d, high % d);
        let low = (r_high << 32).checked_add(a.checked_mul(lo)?)?;

        (q_high << 32).checked_add(low / d)
    }

    /// `floor(amount * (10000 - slippage_bps) / 10000)`.
    pub fn apply_slippage(amount: u64, slippage_bps: u16) -> Option<u64> {
        if slippage_bps > 10_000 {
            return None;
        }
        let kept = (amount as u128) * ((10_000 - slippage_bps) as u128) / 10_000;
        u64::try_from(kept).ok()
    }

    /// Atomic amount to human units.
    pub fn to_human(amount: u64, decimals: u8) -> f64 {
        amount as f64 / 10f64.powi(decimals as i32)
    }

    /// `|mid - exec| / mid`, in percent.
    pub fn price_impact_pct(mid_price: f64, execution_price: f64) -> Option<f64> {
        if !mid_price.is_finite() || mid_price <= 0.0 || !execution_price.is_finite() {
            return None;
        }
        Some((mid_price - execution_price).abs() / mid_price * 100.0)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn fee_bps(bps: u32) -> FeeRate {
            FeeRate::from_bps(bps).unwrap()
        }

        #[test]
        fn test_amm_output_calculation() {
            // 1 SOL in a 1000 SOL / 185000 USDC pool with 0.25% fee
            let output = calculate_amm_output(
                1_000_000_000,
                1_000_000_000_000,
                185_000_000_000,
                fee_bps(25),
            );
            assert_eq!(output, Some(184_353_607));
        }

        #[test]
        fn test_reference_example_is_exact() {
            let output = calculate_amm_output(
                1_000_000_000,
                1_000_000_000_000,
                500_000_000_000,
                fee_bps(30),
            );
            assert_eq!(output, Some(498_003_490));
        }

        #[test]
        fn test_zero_inputs_have_no_output() {
            assert_eq!(calculate_amm_output(0, 10, 10, fee_bps(30)), None);
            assert_eq!(calculate_amm_output(10, 0, 10, fee_bps(30)), None);
            assert_eq!(calculate_amm_output(10, 10, 0, fee_bps(30)), None);
        }

        #[test]
        fn test_full_range_inputs_do_not_overflow() {
            assert_eq!(
                calculate_amm_output(u64::MAX, u64::MAX, u64::MAX, FeeRate::default()),
                Some(9_223_372_036_854_775_807)
            );
            assert_eq!(
                calculate_amm_output(u64::MAX, u64::MAX, u64::MAX, fee_bps(30)),
                Some(9_209_516_195_036_766_630)
            );
        }

        #[test]
        fn test_mul_div_matches_wide_division() {
            // 997000 * 1e15 * 1e18 exceeds u128
            let a = 1_000_000_000_000_000u128 * 997_000;
            let d = 1_000_000_000_000_000_000u128 * 1_000_000 + a;
            assert_eq!(
                mul_div_u64(a, 1_000_000_000_000_000_000, d),
                Some(996_006_981_039_903)
            );
            assert_eq!(mul_div_u64(7, 3, 2), Some(10));
            assert_eq!(mul_div_u64(1, 1, 0), None);
        }

        #[test]
        fn test_output_stays_below_reserve() {
            let out = calculate_amm_output(u64::MAX / 4, 1_000, 1_000_000, fee_bps(1)).unwrap();
            assert!(out < 1_000_000);
        }

        #[test]
        fn test_slippage() {
            assert_eq!(apply_slippage(498_003_490, 50), Some(495_513_472));
            assert_eq!(apply_slippage(1_000, 0), Some(1_000));
            assert_eq!(apply_slippage(1_000, 10_000), Some(0));
            assert_eq!(apply_slippage(1_000, 10_001), None);
        }

        #[test]
        fn test_price_impact() {
            let impact = price_impact_pct(0.5, 0.498).unwrap();
            assert!((impact - 0.4).abs() < 1e-9);
            assert_eq!(price_impact_pct(0.0, 1.0), None);
        }
    }
}
