use async_trait::async_trait;
use std::marker::PhantomData;
use tracing::{debug, warn};

use super::{normalize_sdk_quote, validate_request, AdapterContext, NormalizeInput};
use crate::deserializers::ConcentratedPoolState;
use crate::dex_interface::{Quote, QuoteAdapter, QuoteMode, SwapDirection};
use crate::error::{InitError, QuoteFailure};
use crate::pool::{FeeRate, PoolRecord, PoolVariant};
use crate::rpc::ChainError;

/// Pool state established by `init`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcentratedSnapshot {
    /// Quote per base, human units.
    pub mid_price: f64,
    pub fee: Option<FeeRate>,
}

/// Shared adapter for tick-based pools (Raydium CLMM, Orca Whirlpool).
///
/// `init` reads and decodes the pool account through the chain reader when
/// one is configured, otherwise asks the SDK for pool state. Quotes always
/// come from the SDK; there is no closed-form path.
pub struct ConcentratedAdapter<S: ConcentratedPoolState> {
    variant: PoolVariant,
    pool: PoolRecord,
    ctx: AdapterContext,
    snapshot: Option<ConcentratedSnapshot>,
    _state: PhantomData<fn() -> S>,
}

impl<S: ConcentratedPoolState> ConcentratedAdapter<S> {
    pub(crate) fn with_variant(variant: PoolVariant, pool: PoolRecord, ctx: AdapterContext) -> Self {
        Self {
            variant,
            pool,
            ctx,
            snapshot: None,
            _state: PhantomData,
        }
    }

    pub fn snapshot(&self) -> Option<ConcentratedSnapshot> {
        self.snapshot
    }

    async fn load_snapshot(&self) -> Result<ConcentratedSnapshot, InitError> {
        let address = self.pool.address.ok_or(InitError::MissingField("address"))?;
        let (base, quote) = match (self.pool.base_mint, self.pool.quote_mint) {
            (Some(b), Some(q)) => (b, q),
            _ => return Err(InitError::MissingField("mints")),
        };
        let (base_dec, quote_dec) = match (self.pool.base_decimals, self.pool.quote_decimals) {
            (Some(b), Some(q)) => (b, q),
            _ => return Err(InitError::MissingField("decimals")),
        };

        let snapshot = if let Some(chain) = &self.ctx.chain {
            let data = match tokio::time::timeout(self.ctx.timeout, chain.get_account_data(&address)).await {
                Ok(Ok(data)) => data,
                Ok(Err(ChainError::AccountNotFound(key))) => return Err(InitError::AccountNotFound(key)),
                Ok(Err(e)) => return Err(InitError::Chain(e.to_string())),
                Err(_) => return Err(InitError::Chain("pool account read timed out".into())),
            };
            let state = S::from_account_data(&data).map_err(|e| InitError::Decode(e.to_string()))?;

            if !state.is_active() {
                warn!(pool = %address, dex = state.dex_name(), "pool has no active liquidity");
            }

            // records may list the pair in either order
            let mid_price = match state.mints() {
                (a, b) if a == base && b == quote => state.calculate_price_with_decimals(base_dec, quote_dec),
                (a, b) if a == quote && b == base => {
                    let inverse = state.calculate_price_with_decimals(quote_dec, base_dec);
                    if inverse > 0.0 {
                        1.0 / inverse
                    } else {
                        0.0
                    }
                }
                _ => return Err(InitError::MintMismatch),
            };
            ConcentratedSnapshot {
                mid_price,
                fee: state.fee(),
            }
        } else {
            let sdk = self
                .ctx
                .sdk
                .clone()
                .ok_or_else(|| InitError::Sdk("no chain reader or liquidity sdk".into()))?;
            let state = match tokio::time::timeout(self.ctx.timeout, sdk.load_pool(&self.pool)).await {
                Ok(Ok(state)) => state,
                Ok(Err(e)) => return Err(InitError::Sdk(e.to_string())),
                Err(_) => return Err(InitError::Sdk("load_pool timed out".into())),
            };
            ConcentratedSnapshot {
                mid_price: state
                    .mid_price
                    .ok_or_else(|| InitError::Sdk("sdk reported no mid price".into()))?,
                fee: state.fee,
            }
        };

        if !snapshot.mid_price.is_finite() || snapshot.mid_price <= 0.0 {
            return Err(InitError::Decode(format!(
                "pool {} has no usable price",
                address
            )));
        }
        debug!(pool = %address, variant = %self.variant, mid = snapshot.mid_price, "concentrated pool ready");
        Ok(snapshot)
    }

    async fn quote(
        &self,
        in_atomic: u64,
        direction: SwapDirection,
        slippage_bps: u16,
        mode: QuoteMode,
    ) -> Result<Quote, QuoteFailure> {
        let snapshot = self.snapshot.ok_or(QuoteFailure::NotInitialized)?;
        validate_request(in_atomic, slippage_bps)?;
        let sdk = self.ctx.require_sdk(self.variant)?;

        let raw = self
            .ctx
            .sdk_call(sdk.quote_exact_in(
                &self.pool,
                in_atomic,
                direction,
                slippage_bps,
                mode == QuoteMode::Exact,
            ))
            .await?;

        normalize_sdk_quote(
            NormalizeInput {
                pool: &self.pool,
                direction,
                in_atomic,
                mode,
                state_mid_price: Some(snapshot.mid_price),
                state_fee: snapshot.fee,
            },
            raw,
        )
    }
}

#[async_trait]
impl<S: ConcentratedPoolState + 'static> QuoteAdapter for ConcentratedAdapter<S> {
    fn variant(&self) -> PoolVariant {
        self.variant
    }

    async fn init(&mut self) -> Result<(), InitError> {
        self.snapshot = Some(self.load_snapshot().await?);
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
        if self.snapshot.is_none() {
            return Err(QuoteFailure::NotInitialized);
        }
        validate_request(in_atomic, slippage_bps)?;
        self.snapshot = Some(self.load_snapshot().await?);
        self.quote(in_atomic, direction, slippage_bps, QuoteMode::Exact).await
    }
}
