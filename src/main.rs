use anyhow::{anyhow, Context, Result};
use futures_util::future::join_all;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair};
use solana_sdk::signer::Signer;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use solana_tri_arb::adapters::{AdapterContext, AdapterFactory};
use solana_tri_arb::broadcaster::Broadcaster;
use solana_tri_arb::config::{Config, RouteConfig};
use solana_tri_arb::flashloan::{FlashloanPlanner, TokenLendingFlashloanProvider};
use solana_tri_arb::hydration::{validate_pools, ReserveHydrator};
use solana_tri_arb::leg_simulator::LegSimulator;
use solana_tri_arb::logging::init_logging;
use solana_tri_arb::metrics::SimulationMetrics;
use solana_tri_arb::mint_decimals_cache::MintDecimalsCache;
use solana_tri_arb::pool::PoolRecord;
use solana_tri_arb::pool_factory::PoolFactory;
use solana_tri_arb::pool_stats::PoolStatsCollector;
use solana_tri_arb::rate_limiter::RateLimiter;
use solana_tri_arb::route_simulator::{RouteExecutor, RouteRequest, RouteSimulator};
use solana_tri_arb::rpc::{build_rpc_client, ChainReader, TransactionSender};

/// Execution collaborators, built only when `[execution] enabled = true`.
struct ExecutionSetup {
    planner: FlashloanPlanner,
    broadcaster: Broadcaster,
    payer: Keypair,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load_from_file(&config_path)
        .with_context(|| format!("loading {}", config_path))?;

    let _log_guard = init_logging(&config.logging)?;
    print_banner();
    info!("Configuration loaded from: {}", config_path);
    info!("RPC: {} ({})", config.rpc.url, config.rpc.commitment);
    info!("Pools configured: {}, routes: {}", config.pools.len(), config.routes.len());

    let rpc = Arc::new(build_rpc_client(
        &config.rpc.url,
        config.rpc.timeout(),
        &config.rpc.commitment,
    ));
    let chain: Arc<dyn ChainReader> = rpc.clone();

    // 1. classify
    let pools = PoolFactory::build_all(&config.pools);
    info!("📋 {} pool records classified", pools.len());

    // 2. hydrate to completion before any simulation reads the records
    let limiter = Arc::new(RateLimiter::new(
        config.rpc.min_request_interval(),
        config.hydration.backoff_policy(),
    ));
    let hydrator = ReserveHydrator::new(chain.clone(), limiter)
        .with_decimals_cache(Arc::new(MintDecimalsCache::new()))
        .with_timeout(config.rpc.timeout());

    let started = Instant::now();
    let outcome = hydrator
        .hydrate(&pools, &config.hydration.options(), |p| {
            info!(
                "   hydration {}/{} (ok: {}, failed: {})",
                p.current, p.total, p.hydrated, p.failed
            );
        })
        .await;
    info!(
        "💧 Hydration done in {:?}: {} fresh, {} cached, {} failed",
        started.elapsed(),
        outcome.hydrated,
        outcome.from_cache,
        outcome.failures.len()
    );
    for failure in &outcome.failures {
        warn!("   ⚠️  {}: {}", failure.pool, failure.reason);
    }

    // 3. validate
    let report = validate_pools(outcome.pools);
    for dropped in &report.dropped {
        warn!("   ❌ dropped {}: {}", dropped.pool, dropped.reason);
    }
    info!("✅ {} pools usable for simulation", report.valid.len());

    let by_address: HashMap<Pubkey, PoolRecord> = report
        .valid
        .into_iter()
        .filter_map(|p| p.address.map(|a| (a, p)))
        .collect();

    // 4. simulate
    let ctx = AdapterContext {
        chain: Some(chain.clone()),
        sdk: None,
        timeout: config.simulation.quote_timeout(),
    };
    warn!("No liquidity SDK attached: dlmm/clmm/whirlpool legs need math_fallback or will fail");

    let metrics = Arc::new(SimulationMetrics::new());
    let stats = PoolStatsCollector::new();
    let simulator = RouteSimulator::new(
        LegSimulator::new(AdapterFactory::new(ctx), config.simulation.policy(), metrics.clone())
            .with_stats(stats.clone()),
    );

    let execution = if config.execution.enabled {
        Some(build_execution(&config, rpc.clone())?)
    } else {
        None
    };
    let executor = execution.as_ref().map(|e| RouteExecutor {
        planner: &e.planner,
        broadcaster: &e.broadcaster,
        payer: &e.payer,
        options: config.execution.broadcast_options(),
    });

    let requests: Vec<(String, RouteRequest)> = config
        .routes
        .iter()
        .enumerate()
        .filter_map(|(i, route)| {
            let label = route.label(i);
            match route_request(route, &by_address, config.simulation.max_impact_pct) {
                Ok(request) => Some((label, request)),
                Err(e) => {
                    error!("❌ {}: {}", label, e);
                    None
                }
            }
        })
        .collect();

    let results = join_all(requests.iter().map(|(label, request)| {
        let simulator = &simulator;
        let executor = executor.as_ref();
        async move { (label, simulator.simulate_triangular_route(request, executor).await) }
    }))
    .await;

    for (label, result) in results {
        match result {
            Ok(route) => {
                info!(
                    "🔺 {}: profit {} atomic ({:.4}%), verified: {}",
                    label, route.profit_atomic, route.profit_pct, route.is_sdk_verified
                );
                for leg in route.leg_summaries() {
                    info!(
                        "   {} {} -> {}: {} -> {} (impact {:.4}%, {})",
                        leg.variant,
                        leg.input_mint,
                        leg.output_mint,
                        leg.in_atomic,
                        leg.out_atomic,
                        leg.price_impact_pct,
                        leg.provenance
                    );
                }
                if let Some(signature) = route.signature {
                    info!("   ✅ executed: {}", signature);
                }
                if let Some(e) = route.exec_error {
                    error!("   ❌ execution failed ({}): {}", e.reason(), e);
                }
            }
            Err(e) => {
                warn!("⚠️  {}: {} ({})", label, e, e.reason());
                for leg in e.legs() {
                    warn!(
                        "   {} -> {}: {} -> {}",
                        leg.input_mint, leg.output_mint, leg.quote.in_atomic, leg.quote.out_atomic
                    );
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    info!(
        "📊 Leg metrics: {}",
        serde_json::to_string(&snapshot).unwrap_or_default()
    );
    stats.print_summary();
    Ok(())
}

fn build_execution(config: &Config, rpc: Arc<RpcClient>) -> Result<ExecutionSetup> {
    let path = config
        .execution
        .resolve_keypair_path()
        .ok_or_else(|| anyhow!("execution enabled without a keypair path"))?;
    let payer = read_keypair_file(&path)
        .map_err(|e| anyhow!("failed to read keypair {}: {}", path, e))?;
    info!("🔑 Payer: {}", payer.pubkey());

    let provider = match &config.flashloan {
        Some(flashloan) => TokenLendingFlashloanProvider::new(flashloan.lending_accounts()?),
        None => TokenLendingFlashloanProvider::unconfigured(),
    };
    let planner = FlashloanPlanner::new(Arc::new(provider)).with_compute_budget(
        config.execution.compute_unit_limit,
        config.execution.compute_unit_price,
    );
    let sender: Arc<dyn TransactionSender> = rpc;

    Ok(ExecutionSetup {
        planner,
        broadcaster: Broadcaster::new(sender),
        payer,
    })
}

fn route_request(
    route: &RouteConfig,
    pools: &HashMap<Pubkey, PoolRecord>,
    default_max_impact: f64,
) -> Result<RouteRequest> {
    let pools = route
        .pool_addresses()?
        .iter()
        .map(|address| {
            pools
                .get(address)
                .cloned()
                .ok_or_else(|| anyhow!("pool {} is not in the validated set", address))
        })
        .collect::<Result<Vec<_>>>()?;
    let [token_a, token_b, token_c] = route.tokens()?;

    Ok(RouteRequest {
        pools,
        token_a,
        token_b,
        token_c,
        dx_atomic: route.amount_atomic,
        max_impact_pct: route.max_impact_pct.unwrap_or(default_max_impact),
        execute: route.execute,
    })
}

fn print_banner() {
    println!("\n╔═══════════════════════════════════════════════════════════╗");
    println!("║                                                           ║");
    println!("║   Solana Triangular Arbitrage Simulator                   ║");
    println!("║   cpmm · dlmm · clmm · whirlpool                          ║");
    println!("║                                                           ║");
    println!("╚═══════════════════════════════════════════════════════════╝\n");
}
