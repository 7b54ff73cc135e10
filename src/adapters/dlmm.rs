use async_trait::async_trait;
use tracing::debug;

use super::{normalize_sdk_quote, validate_request, AdapterContext, NormalizeInput};
use crate::dex_interface::{Quote, QuoteAdapter, QuoteMode, SwapDirection};
use crate::error::{InitError, QuoteFailure};
use crate::pool::{PoolRecord, PoolVariant, VariantParams};

/// Meteora DLMM (bin-based) pool.
///
/// `init` only checks the record; bin walking is done by the liquidity SDK.
/// Hydrated reserves, when present, give the mid price if the SDK reports no
/// spot price.
pub struct DlmmAdapter {
    pool: PoolRecord,
    ctx: AdapterContext,
    initialized: bool,
}

impl DlmmAdapter {
    pub fn new(pool: PoolRecord, ctx: AdapterContext) -> Self {
        Self {
            pool,
            ctx,
            initialized: false,
        }
    }

    fn reserve_mid_price(&self) -> Option<f64> {
        let reserves = self.pool.reserves.filter(|r| r.is_valid())?;
        let (base_dec, quote_dec) = (self.pool.base_decimals?, self.pool.quote_decimals?);
        let base = reserves.base as f64 / 10f64.powi(base_dec as i32);
        let quote = reserves.quote as f64 / 10f64.powi(quote_dec as i32);
        Some(quote / base)
    }

    async fn quote(
        &self,
        in_atomic: u64,
        direction: SwapDirection,
        slippage_bps: u16,
        mode: QuoteMode,
    ) -> Result<Quote, QuoteFailure> {
        if !self.initialized {
            return Err(QuoteFailure::NotInitialized);
        }
        validate_request(in_atomic, slippage_bps)?;
        let sdk = self.ctx.require_sdk(PoolVariant::Dlmm)?;

        let refresh = mode == QuoteMode::Exact;
        let raw = self
            .ctx
            .sdk_call(sdk.quote_exact_in(&self.pool, in_atomic, direction, slippage_bps, refresh))
            .await?;
        debug!(pool = %self.pool.label(), ?mode, out = ?raw.amount_out, "dlmm sdk quote");

        normalize_sdk_quote(
            NormalizeInput {
                pool: &self.pool,
                direction,
                in_atomic,
                mode,
                state_mid_price: self.reserve_mid_price(),
                state_fee: None,
            },
            raw,
        )
    }
}

#[async_trait]
impl QuoteAdapter for DlmmAdapter {
    fn variant(&self) -> PoolVariant {
        PoolVariant::Dlmm
    }

    async fn init(&mut self) -> Result<(), InitError> {
        if self.pool.address.is_none() {
            return Err(InitError::MissingField("address"));
        }
        if self.pool.base_mint.is_none() || self.pool.quote_mint.is_none() {
            return Err(InitError::MissingField("mints"));
        }
        if self.pool.base_decimals.is_none() || self.pool.quote_decimals.is_none() {
            return Err(InitError::MissingField("decimals"));
        }
        if let VariantParams::Dlmm { bin_step: Some(0), .. } = self.pool.params {
            return Err(InitError::Decode("bin step must be > 0".into()));
        }
        self.initialized = true;
        Ok(())
    }

    async fn quote_fast_exact_in(
        &self,
        in_atomic: u64,
        direction: SwapDirection,
        slippage_bps: u16,
    ) -> Result<Quote, QuoteFailure> {
        self.quote(in_atomic, direction, slippage_bps, QuoteMode::Fast).await
    }

    async fn quote_exact_in(
        &mut self,
        in_atomic: u64,
        direction: SwapDirection,
        slippage_bps: u16,
    ) -> Result<Quote, QuoteFailure> {
        self.quote(in_atomic, direction, slippage_bps, QuoteMode::Exact).await
    }
}
