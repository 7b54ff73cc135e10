use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};

use solana_tri_arb::config::Config;
use solana_tri_arb::hydration::{drop_reason, validate_pools, ReserveHydrator};
use solana_tri_arb::mint_decimals_cache::MintDecimalsCache;
use solana_tri_arb::pool_factory::PoolFactory;
use solana_tri_arb::rate_limiter::RateLimiter;
use solana_tri_arb::rpc::{build_rpc_client, ChainReader};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. config path (default ./config.toml)
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    println!("🔍 Loading config from: {}", config_path);
    let config = Config::load_from_file(&config_path)
        .with_context(|| format!("loading {}", config_path))?;
    println!("🔌 Using RPC URL: {}", config.rpc.url);

    let chain: Arc<dyn ChainReader> = Arc::new(build_rpc_client(
        &config.rpc.url,
        config.rpc.timeout(),
        &config.rpc.commitment,
    ));

    // 2. classify
    let pools = PoolFactory::build_all(&config.pools);
    println!(
        "\n📋 {} of {} pool records classified\n",
        pools.len(),
        config.pools.len()
    );

    // 3. hydrate
    let limiter = Arc::new(RateLimiter::new(
        config.rpc.min_request_interval(),
        config.hydration.backoff_policy(),
    ));
    let hydrator = ReserveHydrator::new(chain, limiter)
        .with_decimals_cache(Arc::new(MintDecimalsCache::new()))
        .with_timeout(config.rpc.timeout());
    let mut options = config.hydration.options();
    options.force_refresh = true;
    let outcome = hydrator
        .hydrate(&pools, &options, |p| {
            println!("   ⏳ {}/{} (ok {}, failed {})", p.current, p.total, p.hydrated, p.failed);
        })
        .await;

    // 4. per-pool report
    let vault_reader = hydrator.vault_reader();
    for pool in &outcome.pools {
        println!("────────────────────────────────────────────────────────");
        println!("Pool:      {}", pool.name.as_deref().unwrap_or("-"));
        println!("Address:   {}", pool.label());
        println!("Variant:   {} ({})", pool.variant(), pool.dex.name());
        match pool.reserves {
            Some(r) => println!("Reserves:  {} / {} ({:?})", r.base, r.quote, pool.reserve_source),
            None => println!("Reserves:  - ({:?})", pool.reserve_source),
        }
        if let Some(vaults) = pool.address.and_then(|a| vault_reader.get_pool_vault_addresses(&a)) {
            println!("Vaults:    {} / {}", vaults.base, vaults.quote);
            match pool.address.and_then(|a| vault_reader.get_pool_reserves(&a)) {
                Some(cached) => println!("Cached:    {} / {}", cached.base, cached.quote),
                None => println!("Cached:    -"),
            }
        }
        match drop_reason(pool) {
            None => println!("✅ usable (math ready: {})", pool.math_ready),
            Some(reason) => println!("❌ dropped: {}", reason),
        }
    }
    for failure in &outcome.failures {
        eprintln!("⚠️  hydration failed for {}: {}", failure.pool, failure.reason);
    }

    let vaults = vault_reader.get_stats();
    println!(
        "\n🏦 Vaults: {} pools registered, {} vaults read ({} non-empty)",
        vaults.total_pools, vaults.total_vaults, vaults.vaults_with_data
    );

    let report = validate_pools(outcome.pools);
    println!(
        "\n✅ Done. {} usable, {} dropped.",
        report.valid.len(),
        report.dropped.len()
    );
    for (reason, count) in report.count_by_reason() {
        println!("   {}: {}", reason, count);
    }
    Ok(())
}
