use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use super::{validate_request, AdapterContext};
use crate::deserializers::decode_token_amount;
use crate::dex_interface::{amm_calculator, Provenance, Quote, QuoteAdapter, SwapDirection};
use crate::error::{InitError, QuoteFailure};
use crate::pool::{PoolRecord, PoolVariant, Reserves};

/// Closed-form constant-product quote over `reserves`.
///
/// Shared by the cpmm adapter (provenance `Verified`) and the leg simulator's
/// math fallback (`Approximated`).
pub fn constant_product_quote(
    pool: &PoolRecord,
    reserves: Option<Reserves>,
    direction: SwapDirection,
    in_atomic: u64,
    slippage_bps: u16,
    provenance: Provenance,
) -> Result<Quote, QuoteFailure> {
    validate_request(in_atomic, slippage_bps)?;

    let label = pool.label();
    let reserves = reserves.ok_or_else(|| QuoteFailure::ReservesMissing { pool: label.clone() })?;
    if !reserves.is_valid() {
        return Err(QuoteFailure::ReservesZero { pool: label });
    }
    let fee = pool.require_fee()?;
    let (base_dec, quote_dec) = pool.require_decimals()?;

    let (reserve_in, reserve_out) = direction.orient_reserves(&reserves);
    let (dec_in, dec_out) = direction.orient_decimals(base_dec, quote_dec);

    let out_atomic = amm_calculator::calculate_amm_output(in_atomic, reserve_in, reserve_out, fee)
        .ok_or_else(|| QuoteFailure::MathOverflow { pool: label.clone() })?;
    let min_out_atomic = amm_calculator::apply_slippage(out_atomic, slippage_bps)
        .ok_or(QuoteFailure::InvalidSlippage(slippage_bps))?;

    let mid_price = amm_calculator::to_human(reserve_out, dec_out)
        / amm_calculator::to_human(reserve_in, dec_in);
    let execution_price = amm_calculator::to_human(out_atomic, dec_out)
        / amm_calculator::to_human(in_atomic, dec_in);
    let price_impact_pct = amm_calculator::price_impact_pct(mid_price, execution_price)
        .ok_or_else(|| QuoteFailure::MathOverflow { pool: label })?;

    Ok(Quote {
        in_atomic,
        out_atomic,
        min_out_atomic,
        execution_price,
        price_impact_pct,
        fee,
        routing_accounts: Vec::new(),
        provenance,
    })
}

/// Constant-product pool. `init` is purely data-driven; `quote_exact_in`
/// re-reads both vault balances when vaults and a chain reader are known.
pub struct CpmmAdapter {
    pool: PoolRecord,
    ctx: AdapterContext,
    initialized: bool,
}

impl CpmmAdapter {
    pub fn new(pool: PoolRecord, ctx: AdapterContext) -> Self {
        Self {
            pool,
            ctx,
            initialized: false,
        }
    }

    pub fn reserves(&self) -> Option<Reserves> {
        self.pool.reserves
    }

    async fn refresh_reserves(&mut self) -> Result<(), QuoteFailure> {
        let (Some(vaults), Some(chain)) = (self.pool.params.vaults(), self.ctx.chain.clone()) else {
            return Ok(());
        };

        let keys = [vaults.base, vaults.quote];
        let accounts = match tokio::time::timeout(self.ctx.timeout, chain.get_multiple_accounts(&keys)).await {
            Ok(Ok(accounts)) => accounts,
            Ok(Err(e)) => return Err(QuoteFailure::Chain(e.to_string())),
            Err(_) => return Err(QuoteFailure::Timeout(self.ctx.timeout.as_millis() as u64)),
        };

        let read = |idx: usize, key: &Pubkey| -> Result<u64, QuoteFailure> {
            let data = accounts
                .get(idx)
                .and_then(|a| a.as_deref())
                .ok_or_else(|| QuoteFailure::Chain(format!("vault {} not found", key)))?;
            decode_token_amount(data).map_err(|e| QuoteFailure::Chain(format!("vault {}: {}", key, e)))
        };
        let reserves = Reserves::new(read(0, &vaults.base)?, read(1, &vaults.quote)?);

        debug!(pool = %self.pool.label(), base = reserves.base, quote = reserves.quote, "cpmm reserves refreshed");
        self.pool.reserves = Some(reserves);
        Ok(())
    }
}

#[async_trait]
impl QuoteAdapter for CpmmAdapter {
    fn variant(&self) -> PoolVariant {
        PoolVariant::Cpmm
    }

    async fn init(&mut self) -> Result<(), InitError> {
        if self.pool.base_mint.is_none() || self.pool.quote_mint.is_none() {
            return Err(InitError::MissingField("mints"));
        }
        if self.pool.base_decimals.is_none() || self.pool.quote_decimals.is_none() {
            return Err(InitError::MissingField("decimals"));
        }
        if self.pool.fee.is_none() {
            return Err(InitError::MissingField("feeRate"));
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
        if !self.initialized {
            return Err(QuoteFailure::NotInitialized);
        }
        constant_product_quote(
            &self.pool,
            self.pool.reserves,
            direction,
            in_atomic,
            slippage_bps,
            Provenance::Verified,
        )
    }

    async fn quote_exact_in(
        &mut self,
        in_atomic: u64,
        direction: SwapDirection,
        slippage_bps: u16,
    ) -> Result<Quote, QuoteFailure> {
        if !self.initialized {
            return Err(QuoteFailure::NotInitialized);
        }
        validate_request(in_atomic, slippage_bps)?;
        self.refresh_reserves().await?;

        let mut quote = self.quote_fast_exact_in(in_atomic, direction, slippage_bps).await?;
        if let Some(vaults) = self.pool.params.vaults() {
            quote.routing_accounts = vec![vaults.base, vaults.quote];
        }
        Ok(quote)
    }
}
