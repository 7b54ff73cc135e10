//! Triangular Route Simulator.
//!
//! Quotes A -> B -> C -> A through three pools. Legs run strictly in order:
//! each leg's input is the previous leg's quoted output.

use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use tracing::{debug, info, warn};

use crate::broadcaster::{BroadcastOptions, Broadcaster};
use crate::dex_interface::{LegQuote, QuoteMode};
use crate::error::{ExecutionError, InputValidationError, QuoteFailure, RouteError};
use crate::flashloan::{FlashloanLeg, FlashloanPlanner};
use crate::leg_simulator::LegSimulator;
use crate::pool::PoolRecord;
use crate::triangle::{self, Triangle};

/// Routes reporting more than this absolute profit are treated as bad data.
pub const MAX_PLAUSIBLE_PROFIT_PCT: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub pools: Vec<PoolRecord>,
    pub token_a: Option<Pubkey>,
    pub token_b: Option<Pubkey>,
    pub token_c: Option<Pubkey>,
    pub dx_atomic: u64,
    pub max_impact_pct: f64,
    pub execute: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegSummary {
    pub pool: String,
    pub variant: String,
    pub input_mint: String,
    pub output_mint: String,
    pub in_atomic: u64,
    pub out_atomic: u64,
    pub min_out_atomic: u64,
    pub price_impact_pct: f64,
    pub provenance: String,
}

impl From<&LegQuote> for LegSummary {
    fn from(leg: &LegQuote) -> Self {
        Self {
            pool: leg.pool_address.to_string(),
            variant: leg.variant.to_string(),
            input_mint: leg.input_mint.to_string(),
            output_mint: leg.output_mint.to_string(),
            in_atomic: leg.quote.in_atomic,
            out_atomic: leg.quote.out_atomic,
            min_out_atomic: leg.quote.min_out_atomic,
            price_impact_pct: leg.quote.price_impact_pct,
            provenance: leg.quote.provenance.to_string(),
        }
    }
}

/// A fully simulated route.
#[derive(Debug, Clone)]
pub struct RouteResult {
    pub start_mint: Pubkey,
    pub dx_atomic: u64,
    pub legs: Vec<LegQuote>,
    pub profit_atomic: i128,
    pub profit_pct: f64,
    /// At least one leg priced by a live adapter.
    pub is_sdk_verified: bool,
    pub signature: Option<Signature>,
    /// Execution failure; the simulated numbers stay valid.
    pub exec_error: Option<ExecutionError>,
}

impl RouteResult {
    pub fn is_profitable(&self) -> bool {
        self.profit_atomic > 0
    }

    pub fn leg_summaries(&self) -> Vec<LegSummary> {
        self.legs.iter().map(LegSummary::from).collect()
    }
}

/// `(profit_atomic, profit_pct)` of ending with `out_atomic` after starting
/// with `dx_atomic`.
pub fn compute_profit(dx_atomic: u64, out_atomic: u64) -> (i128, f64) {
    let profit = out_atomic as i128 - dx_atomic as i128;
    let pct = if dx_atomic == 0 {
        f64::NAN
    } else {
        (profit * 100) as f64 / dx_atomic as f64
    };
    (profit, pct)
}

/// Profit guard: non-finite or implausibly large percentages are rejected.
pub fn is_plausible_profit(profit_pct: f64) -> bool {
    profit_pct.is_finite() && profit_pct.abs() <= MAX_PLAUSIBLE_PROFIT_PCT
}

/// Everything needed to turn a profitable route into a transaction. The
/// payer is passed per call, never held globally.
pub struct RouteExecutor<'a> {
    pub planner: &'a FlashloanPlanner,
    pub broadcaster: &'a Broadcaster,
    pub payer: &'a Keypair,
    pub options: BroadcastOptions,
}

impl RouteExecutor<'_> {
    pub async fn execute(&self, result: &RouteResult) -> Result<Signature, ExecutionError> {
        let legs: Vec<FlashloanLeg> = result.legs.iter().map(FlashloanLeg::from).collect();
        let planned = self.planner.build_flashloan_tx(
            &self.payer.pubkey(),
            &result.start_mint,
            result.dx_atomic,
            &legs,
        )?;

        if let Some(extra) = planned.signers.iter().find(|k| **k != self.payer.pubkey()) {
            return Err(ExecutionError::Signing(format!("no keypair for required signer {}", extra)));
        }
        self.broadcaster
            .broadcast(planned.transaction, &[self.payer], &self.options)
            .await
    }
}

pub struct RouteSimulator {
    legs: LegSimulator,
}

impl RouteSimulator {
    pub fn new(legs: LegSimulator) -> Self {
        Self { legs }
    }

    pub fn leg_simulator(&self) -> &LegSimulator {
        &self.legs
    }

    pub async fn simulate_triangular_route(
        &self,
        request: &RouteRequest,
        executor: Option<&RouteExecutor<'_>>,
    ) -> Result<RouteResult, RouteError> {
        let (token_a, token_b, token_c) = validate(request)?;
        let pools = [&request.pools[0], &request.pools[1], &request.pools[2]];
        let triangle = orient(pools, token_a, token_b, token_c)?;

        let mode = if request.execute {
            QuoteMode::Exact
        } else {
            QuoteMode::Fast
        };

        let mut legs = Vec::with_capacity(3);
        let mut amount = request.dx_atomic;
        for (i, (pool, (input, output))) in pools.iter().zip(triangle.legs()).enumerate() {
            let n = i + 1;
            let leg = self
                .legs
                .simulate_leg(pool, &input, &output, amount, mode)
                .await
                .map_err(|failure| RouteError::LegFailed { leg: n, failure })?;

            if leg.quote.price_impact_pct > request.max_impact_pct {
                return Err(RouteError::LegFailed {
                    leg: n,
                    failure: QuoteFailure::PriceImpactExceeded {
                        impact_pct: leg.quote.price_impact_pct,
                        max_pct: request.max_impact_pct,
                    },
                });
            }
            debug!(leg = n, pool = %leg.pool_address, dx = amount, dy = leg.quote.out_atomic, "leg ok");
            amount = leg.quote.out_atomic;
            legs.push(leg);
        }

        let (profit_atomic, profit_pct) = compute_profit(request.dx_atomic, amount);
        if !is_plausible_profit(profit_pct) {
            warn!(profit_pct, start = %token_a, "unrealistic profit, route rejected");
            return Err(RouteError::UnrealisticProfit { profit_pct, legs });
        }

        let mut result = RouteResult {
            start_mint: token_a,
            dx_atomic: request.dx_atomic,
            is_sdk_verified: legs.iter().any(LegQuote::is_verified),
            legs,
            profit_atomic,
            profit_pct,
            signature: None,
            exec_error: None,
        };
        info!(
            start = %token_a,
            dx = request.dx_atomic,
            profit = %result.profit_atomic,
            profit_pct = result.profit_pct,
            verified = result.is_sdk_verified,
            "route simulated"
        );

        if request.execute && result.is_profitable() {
            match executor {
                None => result.exec_error = Some(ExecutionError::NotConfigured),
                Some(executor) => match executor.execute(&result).await {
                    Ok(signature) => result.signature = Some(signature),
                    Err(e) => {
                        warn!(reason = e.reason(), error = %e, "route execution failed");
                        result.exec_error = Some(e);
                    }
                },
            }
        }
        Ok(result)
    }
}

fn validate(request: &RouteRequest) -> Result<(Pubkey, Pubkey, Pubkey), InputValidationError> {
    if request.pools.len() != 3 {
        return Err(InputValidationError::PoolCount(request.pools.len()));
    }
    let token_a = request.token_a.ok_or(InputValidationError::MissingToken("tokenA"))?;
    let token_b = request.token_b.ok_or(InputValidationError::MissingToken("tokenB"))?;
    let token_c = request.token_c.ok_or(InputValidationError::MissingToken("tokenC"))?;
    if request.dx_atomic == 0 {
        return Err(InputValidationError::NonPositiveAmount);
    }
    if !request.max_impact_pct.is_finite() {
        return Err(InputValidationError::InvalidMaxImpact(request.max_impact_pct));
    }
    Ok((token_a, token_b, token_c))
}

/// Resolve the cycle and require it to read A -> B -> C -> A.
fn orient(
    pools: [&PoolRecord; 3],
    token_a: Pubkey,
    token_b: Pubkey,
    token_c: Pubkey,
) -> Result<Triangle, RouteError> {
    let solved = triangle::solve(pools[0], pools[1], pools[2]).ok_or(RouteError::InvalidTriangle)?;
    let triangle = if solved.start_mint == token_a {
        solved
    } else {
        triangle::solve_from(token_a, pools).ok_or(RouteError::InvalidTriangle)?
    };
    if triangle.in_mints != [token_a, token_b, token_c] {
        return Err(RouteError::InvalidTriangle);
    }
    Ok(triangle)
}
