/*!
 * Triangular route simulation tests
 *
 * Three dlmm pools quoted by an in-memory liquidity SDK with exact integer
 * ratios, so every leg output (and the route profit) is known in advance.
 */

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use solana_tri_arb::adapters::{AdapterContext, AdapterFactory};
use solana_tri_arb::broadcaster::{BroadcastOptions, Broadcaster};
use solana_tri_arb::dex_interface::{LiquiditySdk, SdkError, SdkPoolState, SdkQuote, SwapDirection};
use solana_tri_arb::error::{ExecutionError, RouteError};
use solana_tri_arb::flashloan::{FlashloanPlanner, LendingAccounts, TokenLendingFlashloanProvider};
use solana_tri_arb::leg_simulator::{LegSimulator, SimulationPolicy};
use solana_tri_arb::metrics::SimulationMetrics;
use solana_tri_arb::pool::{DexId, FeeRate, PoolRecord, ReserveSource, Reserves, VariantParams};
use solana_tri_arb::route_simulator::{RouteExecutor, RouteRequest, RouteSimulator};
use solana_tri_arb::rpc::{ChainError, SignatureState, TransactionSender};

const DX: u64 = 10_000_000_000;

/// out = in * num / den for each pool.
#[derive(Default)]
struct RatioSdk {
    ratios: HashMap<Pubkey, (u64, u64)>,
    /// Spot price reported instead of the ratio.
    spot_overrides: HashMap<Pubkey, f64>,
    failing: Option<Pubkey>,
    calls: Mutex<Vec<(Pubkey, u64, bool)>>,
}

impl RatioSdk {
    fn calls(&self) -> Vec<(Pubkey, u64, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LiquiditySdk for RatioSdk {
    async fn load_pool(&self, _pool: &PoolRecord) -> Result<SdkPoolState, SdkError> {
        Ok(SdkPoolState::default())
    }

    async fn quote_exact_in(
        &self,
        pool: &PoolRecord,
        amount_in: u64,
        _direction: SwapDirection,
        slippage_bps: u16,
        refresh: bool,
    ) -> Result<SdkQuote, SdkError> {
        let address = pool.address.unwrap();
        self.calls.lock().unwrap().push((address, amount_in, refresh));
        if self.failing == Some(address) {
            return Err(SdkError::Failed("bin arrays unavailable".into()));
        }
        let (num, den) = self.ratios[&address];
        let out = (amount_in as u128 * num as u128 / den as u128) as u64;
        let spot = self
            .spot_overrides
            .get(&address)
            .copied()
            .unwrap_or(num as f64 / den as f64);
        Ok(SdkQuote {
            amount_in: Some(amount_in),
            amount_out: Some(out),
            min_amount_out: Some(out - out * slippage_bps as u64 / 10_000),
            spot_price: Some(spot),
            fee: FeeRate::from_bps(30),
            routing_accounts: vec![Pubkey::new_unique(), Pubkey::new_unique()],
        })
    }

    async fn fetch_reserves(&self, _pool: &PoolRecord) -> Result<Reserves, SdkError> {
        Err(SdkError::Unavailable("not used".into()))
    }
}

fn dlmm(base: Pubkey, quote: Pubkey) -> PoolRecord {
    PoolRecord {
        name: None,
        dex: DexId::Meteora,
        address: Some(Pubkey::new_unique()),
        base_mint: Some(base),
        quote_mint: Some(quote),
        base_decimals: Some(6),
        quote_decimals: Some(6),
        fee: FeeRate::from_bps(30),
        reserves: Some(Reserves::new(1_000_000_000_000, 1_000_000_000_000)),
        params: VariantParams::Dlmm {
            bin_step: Some(25),
            vaults: None,
        },
        reserve_source: ReserveSource::Fresh,
        math_ready: true,
    }
}

struct Fixture {
    mints: [Pubkey; 3],
    pools: Vec<PoolRecord>,
}

impl Fixture {
    fn new() -> Self {
        let mints = [Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique()];
        let pools = vec![
            dlmm(mints[0], mints[1]),
            dlmm(mints[1], mints[2]),
            dlmm(mints[2], mints[0]),
        ];
        Self { mints, pools }
    }

    fn address(&self, i: usize) -> Pubkey {
        self.pools[i].address.unwrap()
    }

    fn sdk(&self, leg3: (u64, u64)) -> RatioSdk {
        RatioSdk {
            ratios: HashMap::from([
                (self.address(0), (2, 1)),
                (self.address(1), (3, 2)),
                (self.address(2), leg3),
            ]),
            ..RatioSdk::default()
        }
    }

    fn request(&self) -> RouteRequest {
        RouteRequest {
            pools: self.pools.clone(),
            token_a: Some(self.mints[0]),
            token_b: Some(self.mints[1]),
            token_c: Some(self.mints[2]),
            dx_atomic: DX,
            max_impact_pct: 5.0,
            execute: false,
        }
    }
}

fn simulator(sdk: Arc<RatioSdk>) -> (RouteSimulator, Arc<SimulationMetrics>) {
    let ctx = AdapterContext {
        sdk: Some(sdk),
        ..AdapterContext::default()
    };
    let metrics = Arc::new(SimulationMetrics::new());
    let legs = LegSimulator::new(AdapterFactory::new(ctx), SimulationPolicy::default(), metrics.clone());
    (RouteSimulator::new(legs), metrics)
}

#[tokio::test]
async fn test_half_percent_profit_is_exact() {
    let fx = Fixture::new();
    // 10_000 -> 20_000 -> 30_000 -> 10_050
    let sdk = Arc::new(fx.sdk((335, 1_000)));
    let (sim, metrics) = simulator(sdk.clone());

    let route = sim.simulate_triangular_route(&fx.request(), None).await.unwrap();

    assert_eq!(route.legs.len(), 3);
    assert_eq!(route.legs[2].quote.out_atomic, 10_050_000_000);
    assert_eq!(route.profit_atomic, 50_000_000);
    assert_eq!(route.profit_pct, 0.5);
    assert!(route.is_sdk_verified);
    assert!(route.exec_error.is_none());
    assert_eq!(metrics.snapshot().adapter_successes, 3);

    // each leg is fed the previous leg's output
    let amounts: Vec<u64> = sdk.calls().iter().map(|(_, amount, _)| *amount).collect();
    assert_eq!(amounts, vec![DX, 20_000_000_000, 30_000_000_000]);
    assert!(sdk.calls().iter().all(|(_, _, refresh)| !refresh));
}

#[tokio::test]
async fn test_unrealistic_profit_keeps_legs() {
    let fx = Fixture::new();
    // 30_000 * 175 / 300 = 17_500, a 75% gain
    let (sim, _) = simulator(Arc::new(fx.sdk((175, 300))));

    let err = sim.simulate_triangular_route(&fx.request(), None).await.unwrap_err();
    assert_eq!(err.reason(), "unrealistic-profit");
    assert_eq!(err.legs().len(), 3);
    match err {
        RouteError::UnrealisticProfit { profit_pct, .. } => assert_eq!(profit_pct, 75.0),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_losing_route_is_reported() {
    let fx = Fixture::new();
    let (sim, _) = simulator(Arc::new(fx.sdk((33, 100))));

    let route = sim.simulate_triangular_route(&fx.request(), None).await.unwrap();
    assert_eq!(route.profit_atomic, -100_000_000);
    assert_eq!(route.profit_pct, -1.0);
    assert!(!route.is_profitable());
}

#[tokio::test]
async fn test_leg_failure_aborts_route() {
    let fx = Fixture::new();
    let mut sdk = fx.sdk((335, 1_000));
    sdk.failing = Some(fx.address(1));
    let sdk = Arc::new(sdk);
    let (sim, _) = simulator(sdk.clone());

    let err = sim.simulate_triangular_route(&fx.request(), None).await.unwrap_err();
    match &err {
        RouteError::LegFailed { leg, failure } => {
            assert_eq!(*leg, 2);
            assert_eq!(failure.reason(), "sdk-error");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    // leg 3 never quoted
    assert_eq!(sdk.calls().len(), 2);
}

#[tokio::test]
async fn test_price_impact_bound() {
    let fx = Fixture::new();
    let mut sdk = fx.sdk((335, 1_000));
    // execution 2.0 against a 2.2 spot: ~9.1% impact
    sdk.spot_overrides.insert(fx.address(0), 2.2);
    let (sim, _) = simulator(Arc::new(sdk));

    let err = sim.simulate_triangular_route(&fx.request(), None).await.unwrap_err();
    assert_eq!(err.reason(), "price-impact-exceeded");
}

#[tokio::test]
async fn test_input_validation() {
    let fx = Fixture::new();
    let (sim, _) = simulator(Arc::new(fx.sdk((335, 1_000))));

    let mut two_pools = fx.request();
    two_pools.pools.pop();
    let mut no_token = fx.request();
    no_token.token_c = None;
    let mut zero_dx = fx.request();
    zero_dx.dx_atomic = 0;
    let mut nan_impact = fx.request();
    nan_impact.max_impact_pct = f64::NAN;

    for (request, reason) in [
        (two_pools, "invalid-pool-count"),
        (no_token, "missing-token"),
        (zero_dx, "invalid-amount"),
        (nan_impact, "invalid-max-impact"),
    ] {
        let err = sim.simulate_triangular_route(&request, None).await.unwrap_err();
        assert_eq!(err.reason(), reason);
    }
}

#[tokio::test]
async fn test_token_order_must_match_cycle() {
    let fx = Fixture::new();
    let (sim, _) = simulator(Arc::new(fx.sdk((335, 1_000))));

    let mut swapped = fx.request();
    swapped.token_b = Some(fx.mints[2]);
    swapped.token_c = Some(fx.mints[1]);
    let err = sim.simulate_triangular_route(&swapped, None).await.unwrap_err();
    assert_eq!(err, RouteError::InvalidTriangle);

    let mut open = fx.request();
    open.pools[2] = dlmm(fx.mints[2], Pubkey::new_unique());
    let err = sim.simulate_triangular_route(&open, None).await.unwrap_err();
    assert_eq!(err.reason(), "invalid-triangle");
}

#[tokio::test]
async fn test_token_a_on_quote_side_of_pool1() {
    let fx = Fixture::new();
    let mut request = fx.request();
    // pool1 lists (B, A); the walk must start from its quote mint
    let mut flipped = dlmm(fx.mints[1], fx.mints[0]);
    flipped.address = fx.pools[0].address;
    request.pools[0] = flipped;
    let (sim, _) = simulator(Arc::new(fx.sdk((335, 1_000))));

    let route = sim.simulate_triangular_route(&request, None).await.unwrap();
    assert_eq!(route.start_mint, fx.mints[0]);
    assert_eq!(route.legs[0].input_mint, fx.mints[0]);
    assert_eq!(route.legs[0].output_mint, fx.mints[1]);
}

#[tokio::test]
async fn test_execute_without_executor_keeps_numbers() {
    let fx = Fixture::new();
    let sdk = Arc::new(fx.sdk((335, 1_000)));
    let (sim, _) = simulator(sdk.clone());
    let mut request = fx.request();
    request.execute = true;

    let route = sim.simulate_triangular_route(&request, None).await.unwrap();
    assert_eq!(route.profit_atomic, 50_000_000);
    assert_eq!(route.exec_error, Some(ExecutionError::NotConfigured));
    // execution needs exact quotes
    assert!(sdk.calls().iter().all(|(_, _, refresh)| *refresh));
    assert!(route.legs.iter().all(|l| !l.quote.routing_accounts.is_empty()));
}

struct ConfirmingSender {
    sent: Mutex<Vec<Transaction>>,
}

#[async_trait]
impl TransactionSender for ConfirmingSender {
    async fn latest_blockhash(&self) -> Result<Hash, ChainError> {
        Ok(Hash::new_unique())
    }

    async fn send_transaction(
        &self,
        transaction: &Transaction,
        _skip_preflight: bool,
        _max_retries: usize,
    ) -> Result<Signature, ChainError> {
        self.sent.lock().unwrap().push(transaction.clone());
        Ok(transaction.signatures[0])
    }

    async fn signature_state(&self, _signature: &Signature) -> Result<SignatureState, ChainError> {
        Ok(SignatureState::Confirmed)
    }

    async fn is_blockhash_valid(&self, _blockhash: &Hash) -> Result<bool, ChainError> {
        Ok(true)
    }
}

#[tokio::test]
async fn test_profitable_route_is_executed() {
    let fx = Fixture::new();
    let (sim, _) = simulator(Arc::new(fx.sdk((335, 1_000))));

    let provider = TokenLendingFlashloanProvider::new(LendingAccounts {
        program_id: Pubkey::new_unique(),
        lending_market: Pubkey::new_unique(),
        reserve: Pubkey::new_unique(),
        liquidity_mint: fx.mints[0],
        liquidity_supply: Pubkey::new_unique(),
        fee_receiver: Pubkey::new_unique(),
        host_fee_receiver: None,
        borrow_tag: 19,
        repay_tag: 20,
    });
    let planner = FlashloanPlanner::new(Arc::new(provider));
    let sender = Arc::new(ConfirmingSender {
        sent: Mutex::new(vec![]),
    });
    let broadcaster = Broadcaster::new(sender.clone());
    let payer = Keypair::new();
    let executor = RouteExecutor {
        planner: &planner,
        broadcaster: &broadcaster,
        payer: &payer,
        options: BroadcastOptions::default(),
    };

    let mut request = fx.request();
    request.execute = true;
    let route = sim
        .simulate_triangular_route(&request, Some(&executor))
        .await
        .unwrap();

    assert!(route.exec_error.is_none(), "{:?}", route.exec_error);
    assert!(route.signature.is_some());
    let sent = sender.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    // borrow, 3 swaps, repay
    assert_eq!(sent[0].message.instructions.len(), 5);
    assert_eq!(sent[0].message.account_keys[0], payer.pubkey());
}
