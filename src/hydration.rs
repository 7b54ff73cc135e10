//! Reserve Hydration Subsystem.
//!
//! Fills in pool reserves before simulation. Pools with token vaults are read
//! in deduplicated, fixed-size multi-account batches; every batch goes
//! through the one shared `RateLimiter`. Pools whose reserves need SDK-side
//! computation go through `LiquiditySdk::fetch_reserves`. Missing mint
//! decimals are read first, in the same batches and through the same limiter.
//!
//! Input records are never mutated: `hydrate` returns a new record set, so
//! simulation only ever sees fully hydrated snapshots.

use futures_util::stream::{self, StreamExt};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::dex_interface::{LiquiditySdk, SdkError};
use crate::mint_decimals_cache::MintDecimalsCache;
use crate::pool::{PoolRecord, PoolVariant, ReserveSource, Reserves, VaultPair};
use crate::rate_limiter::RateLimiter;
use crate::rpc::{ChainError, ChainReader};
use crate::vault_reader::VaultReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HydrationOptions {
    pub batch_size: usize,
    /// Re-read reserves even when the record or the vault cache has them.
    pub force_refresh: bool,
    pub max_concurrent_batches: usize,
    /// Rate-limited attempts per batch before its pools are marked failed.
    pub max_rate_limit_retries: u32,
    /// Fill missing decimals from mint accounts first.
    pub resolve_decimals: bool,
}

impl Default for HydrationOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            force_refresh: false,
            max_concurrent_batches: 4,
            max_rate_limit_retries: 5,
            resolve_decimals: true,
        }
    }
}

/// Progress report. `current`/`total` count work units (vault batches plus
/// SDK-hydrated pools). During the vault phase `hydrated`/`failed` count
/// vault accounts, afterwards pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HydrationProgress {
    pub current: usize,
    pub total: usize,
    pub hydrated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydrationFailure {
    pub pool: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct HydrationOutcome {
    pub pools: Vec<PoolRecord>,
    pub hydrated: usize,
    pub from_cache: usize,
    pub failures: Vec<HydrationFailure>,
}

/// How a pool gets its reserves.
enum Plan {
    Keep,
    Vaults(VaultPair),
    Sdk,
    Fail(&'static str),
}

pub struct ReserveHydrator {
    chain: Arc<dyn ChainReader>,
    sdk: Option<Arc<dyn LiquiditySdk>>,
    limiter: Arc<RateLimiter>,
    vaults: Arc<VaultReader>,
    decimals: Option<Arc<MintDecimalsCache>>,
    timeout: Duration,
}

impl ReserveHydrator {
    pub fn new(chain: Arc<dyn ChainReader>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            chain,
            sdk: None,
            limiter,
            vaults: Arc::new(VaultReader::new()),
            decimals: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_sdk(mut self, sdk: Arc<dyn LiquiditySdk>) -> Self {
        self.sdk = Some(sdk);
        self
    }

    pub fn with_vault_reader(mut self, vaults: Arc<VaultReader>) -> Self {
        self.vaults = vaults;
        self
    }

    pub fn with_decimals_cache(mut self, decimals: Arc<MintDecimalsCache>) -> Self {
        self.decimals = Some(decimals);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn vault_reader(&self) -> &Arc<VaultReader> {
        &self.vaults
    }

    pub async fn hydrate<F>(
        &self,
        pools: &[PoolRecord],
        options: &HydrationOptions,
        progress: F,
    ) -> HydrationOutcome
    where
        F: Fn(HydrationProgress) + Send + Sync,
    {
        let mut out: Vec<PoolRecord> = pools.to_vec();
        if options.resolve_decimals {
            self.resolve_decimals(&mut out, options).await;
        }

        let mut failures = Vec::new();
        let mut from_cache = 0usize;
        let mut vault_pools: Vec<(usize, VaultPair)> = Vec::new();
        let mut sdk_pools: Vec<usize> = Vec::new();

        for (i, pool) in out.iter_mut().enumerate() {
            match self.plan(pool, options.force_refresh) {
                Plan::Keep => {
                    pool.reserve_source = ReserveSource::Cache;
                    from_cache += 1;
                }
                Plan::Vaults(vaults) => {
                    if let Some(address) = pool.address {
                        self.vaults.register_pool_vaults(address, vaults);
                    }
                    match (!options.force_refresh)
                        .then(|| self.vaults.reserves_for(&vaults))
                        .flatten()
                    {
                        Some(reserves) => {
                            pool.reserves = Some(reserves);
                            pool.reserve_source = ReserveSource::Cache;
                            from_cache += 1;
                        }
                        None => vault_pools.push((i, vaults)),
                    }
                }
                Plan::Sdk => sdk_pools.push(i),
                Plan::Fail(reason) => {
                    pool.reserve_source = ReserveSource::None;
                    failures.push(HydrationFailure {
                        pool: pool.label(),
                        reason: reason.to_string(),
                    });
                }
            }
        }

        let keys: Vec<Pubkey> = vault_pools
            .iter()
            .flat_map(|(_, v)| [v.base, v.quote])
            .unique()
            .collect();
        let batch_size = options.batch_size.max(1);
        let batches: Vec<Vec<Pubkey>> = keys.chunks(batch_size).map(|c| c.to_vec()).collect();
        let total = batches.len() + sdk_pools.len();
        let mut done = 0usize;

        info!(
            pools = pools.len(),
            vault_pools = vault_pools.len(),
            vault_accounts = keys.len(),
            batches = batches.len(),
            sdk_pools = sdk_pools.len(),
            cached = from_cache,
            "hydrating reserves"
        );

        // vault -> why it could not be read
        let mut vault_errors: HashMap<Pubkey, String> = HashMap::new();
        let mut fresh: HashSet<Pubkey> = HashSet::new();
        let mut hydrated = 0usize;

        let mut results = stream::iter(batches)
            .map(|batch| async move {
                let result = self.fetch_batch(&batch, options.max_rate_limit_retries).await;
                (batch, result)
            })
            .buffer_unordered(options.max_concurrent_batches.max(1));

        while let Some((batch, result)) = results.next().await {
            match result {
                Ok(accounts) => {
                    for (key, data) in batch.iter().zip(accounts) {
                        match data {
                            Some(data) => match self.vaults.update_vault(key, &data) {
                                Ok(_) => {
                                    fresh.insert(*key);
                                }
                                Err(e) => {
                                    // update_vault already evicted the stale balance
                                    vault_errors.insert(*key, e.reason().to_string());
                                }
                            },
                            None => {
                                self.vaults.evict(key);
                                vault_errors.insert(*key, "vault-not-found".to_string());
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(batch = batch.len(), reason = e.reason(), error = %e, "vault batch failed");
                    for key in &batch {
                        vault_errors.insert(*key, e.reason().to_string());
                    }
                }
            }
            done += 1;
            progress(HydrationProgress {
                current: done,
                total,
                hydrated: fresh.len(),
                failed: vault_errors.len(),
            });
        }
        drop(results);

        for (i, vaults) in vault_pools {
            let pool = &mut out[i];
            let base_err = vault_errors.get(&vaults.base);
            let quote_err = vault_errors.get(&vaults.quote);
            match (base_err.or(quote_err), self.vaults.reserves_for(&vaults)) {
                (None, Some(reserves)) => {
                    pool.reserves = Some(reserves);
                    pool.reserve_source = ReserveSource::Fresh;
                    hydrated += 1;
                }
                (Some(_), Some(reserves)) if base_err.is_some() && quote_err.is_some() => {
                    pool.reserves = Some(reserves);
                    pool.reserve_source = ReserveSource::Cache;
                    from_cache += 1;
                }
                (Some(_), Some(reserves)) => {
                    // one side fresh, the other from an earlier read
                    pool.reserves = Some(reserves);
                    pool.reserve_source = ReserveSource::Partial;
                    hydrated += 1;
                }
                (error, None) => {
                    pool.reserve_source = ReserveSource::None;
                    failures.push(HydrationFailure {
                        pool: pool.label(),
                        reason: error.cloned().unwrap_or_else(|| "vault-unread".to_string()),
                    });
                }
            }
        }

        if let Some(sdk) = &self.sdk {
            for i in sdk_pools {
                let pool = &mut out[i];
                match self
                    .fetch_sdk_reserves(&**sdk, pool, options.max_rate_limit_retries)
                    .await
                {
                    Ok(reserves) => {
                        pool.reserves = Some(reserves);
                        pool.reserve_source = ReserveSource::Fresh;
                        hydrated += 1;
                    }
                    Err(reason) => {
                        pool.reserve_source = ReserveSource::None;
                        failures.push(HydrationFailure {
                            pool: pool.label(),
                            reason: reason.to_string(),
                        });
                    }
                }
                done += 1;
                progress(HydrationProgress {
                    current: done,
                    total,
                    hydrated,
                    failed: failures.len(),
                });
            }
        } else {
            for i in sdk_pools {
                let pool = &mut out[i];
                pool.reserve_source = ReserveSource::None;
                if pool.variant().needs_reserves() {
                    failures.push(HydrationFailure {
                        pool: pool.label(),
                        reason: "no-sdk".to_string(),
                    });
                }
            }
        }

        for pool in out.iter_mut() {
            pool.math_ready = !pool.variant().needs_reserves() || pool.has_valid_reserves();
        }

        info!(
            hydrated,
            cached = from_cache,
            failed = failures.len(),
            "✅ hydration finished"
        );

        HydrationOutcome {
            pools: out,
            hydrated,
            from_cache,
            failures,
        }
    }

    fn plan(&self, pool: &PoolRecord, force_refresh: bool) -> Plan {
        let variant = pool.variant();
        let vaults = pool.params.vaults();

        if !force_refresh && pool.has_valid_reserves() {
            return Plan::Keep;
        }
        match (variant, vaults) {
            (PoolVariant::Cpmm | PoolVariant::Dlmm, Some(vaults)) => Plan::Vaults(vaults),
            (PoolVariant::Cpmm, None) => Plan::Fail("no-vaults"),
            (PoolVariant::Dlmm | PoolVariant::Clmm | PoolVariant::Whirlpool, _) => Plan::Sdk,
        }
    }

    /// One multi-account read, retried with backoff while rate limited.
    async fn fetch_batch(
        &self,
        keys: &[Pubkey],
        max_rate_limit_retries: u32,
    ) -> Result<Vec<Option<Vec<u8>>>, ChainError> {
        let mut rate_limited = 0u32;
        loop {
            self.limiter.wait().await;
            let result = tokio::time::timeout(self.timeout, self.chain.get_multiple_accounts(keys))
                .await
                .unwrap_or(Err(ChainError::Timeout(self.timeout.as_millis() as u64)));

            match result {
                Ok(accounts) => {
                    self.limiter.on_success();
                    return Ok(accounts);
                }
                Err(e) if e.is_rate_limited() && rate_limited < max_rate_limit_retries => {
                    rate_limited += 1;
                    let delay = self.limiter.on_rate_limited();
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// SDK reserve read, retried with backoff while rate limited. Errors map
    /// to the failure reason reported for the pool.
    async fn fetch_sdk_reserves(
        &self,
        sdk: &dyn LiquiditySdk,
        pool: &PoolRecord,
        max_rate_limit_retries: u32,
    ) -> Result<Reserves, &'static str> {
        let mut rate_limited = 0u32;
        loop {
            self.limiter.wait().await;
            match tokio::time::timeout(self.timeout, sdk.fetch_reserves(pool)).await {
                Ok(Ok(reserves)) => {
                    self.limiter.on_success();
                    return Ok(reserves);
                }
                Ok(Err(SdkError::RateLimited(msg))) => {
                    if rate_limited >= max_rate_limit_retries {
                        warn!(pool = %pool.label(), error = %msg, "sdk still rate limited, giving up");
                        return Err("rate-limited");
                    }
                    rate_limited += 1;
                    let delay = self.limiter.on_rate_limited();
                    debug!(pool = %pool.label(), attempt = rate_limited, ?delay, "sdk rate limited");
                    tokio::time::sleep(delay).await;
                }
                Ok(Err(e)) => {
                    debug!(pool = %pool.label(), error = %e, "sdk reserve fetch failed");
                    return Err("sdk-error");
                }
                Err(_) => return Err("timeout"),
            }
        }
    }

    /// Fill missing decimals from mint accounts, read in `batch_size` chunks
    /// through the same retry loop as vault batches.
    async fn resolve_decimals(&self, pools: &mut [PoolRecord], options: &HydrationOptions) {
        let Some(cache) = &self.decimals else {
            return;
        };
        let missing: Vec<Pubkey> = pools
            .iter()
            .flat_map(|p| {
                [
                    p.base_decimals.is_none().then_some(p.base_mint).flatten(),
                    p.quote_decimals.is_none().then_some(p.quote_mint).flatten(),
                ]
            })
            .flatten()
            .unique()
            .collect();
        if missing.is_empty() {
            return;
        }

        let to_read = cache.uncached(&missing).await;
        for chunk in to_read.chunks(options.batch_size.max(1)) {
            match self.fetch_batch(chunk, options.max_rate_limit_retries).await {
                Ok(accounts) => {
                    cache.ingest(chunk, accounts).await;
                }
                Err(e) => warn!(
                    mints = chunk.len(),
                    reason = e.reason(),
                    error = %e,
                    "mint decimals lookup failed"
                ),
            }
        }

        let resolved = cache.lookup(&missing).await;
        debug!(requested = missing.len(), resolved = resolved.len(), "mint decimals resolved");
        for pool in pools.iter_mut() {
            if pool.base_decimals.is_none() {
                pool.base_decimals = pool.base_mint.and_then(|m| resolved.get(&m).copied());
            }
            if pool.quote_decimals.is_none() {
                pool.quote_decimals = pool.quote_mint.and_then(|m| resolved.get(&m).copied());
            }
        }
    }
}

/// Why a pool was dropped from the simulation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DropReason {
    #[serde(rename = "noAddress")]
    NoAddress,
    #[serde(rename = "noMints")]
    NoMints,
    #[serde(rename = "identicalMints")]
    IdenticalMints,
    #[serde(rename = "noDecimals")]
    NoDecimals,
    #[serde(rename = "noReserves")]
    NoReserves,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::NoAddress => "noAddress",
            DropReason::NoMints => "noMints",
            DropReason::IdenticalMints => "identicalMints",
            DropReason::NoDecimals => "noDecimals",
            DropReason::NoReserves => "noReserves",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedPool {
    pub pool: String,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub valid: Vec<PoolRecord>,
    pub dropped: Vec<DroppedPool>,
}

impl ValidationReport {
    pub fn count_by_reason(&self) -> HashMap<DropReason, usize> {
        self.dropped.iter().map(|d| d.reason).counts()
    }
}

pub fn drop_reason(pool: &PoolRecord) -> Option<DropReason> {
    if pool.address.is_none() {
        return Some(DropReason::NoAddress);
    }
    let (base, quote) = match (pool.base_mint, pool.quote_mint) {
        (Some(b), Some(q)) => (b, q),
        _ => return Some(DropReason::NoMints),
    };
    if base == quote {
        return Some(DropReason::IdenticalMints);
    }
    if pool.base_decimals.is_none() || pool.quote_decimals.is_none() {
        return Some(DropReason::NoDecimals);
    }
    if pool.variant().needs_reserves() && !pool.has_valid_reserves() {
        return Some(DropReason::NoReserves);
    }
    None
}

/// Keep only pools the simulator can use.
pub fn validate_pools(pools: Vec<PoolRecord>) -> ValidationReport {
    let mut report = ValidationReport::default();
    for pool in pools {
        match drop_reason(&pool) {
            None => report.valid.push(pool),
            Some(reason) => {
                debug!(pool = %pool.label(), reason = %reason, "pool dropped");
                report.dropped.push(DroppedPool {
                    pool: pool.label(),
                    reason,
                });
            }
        }
    }
    if !report.dropped.is_empty() {
        warn!(
            valid = report.valid.len(),
            dropped = report.dropped.len(),
            "pools dropped by validation"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{DexId, FeeRate, Reserves, VariantParams};

    fn record(params: VariantParams) -> PoolRecord {
        PoolRecord {
            name: None,
            dex: DexId::Raydium,
            address: Some(Pubkey::new_unique()),
            base_mint: Some(Pubkey::new_unique()),
            quote_mint: Some(Pubkey::new_unique()),
            base_decimals: Some(9),
            quote_decimals: Some(6),
            fee: FeeRate::from_bps(25),
            reserves: Some(Reserves::new(10, 10)),
            params,
            reserve_source: ReserveSource::None,
            math_ready: false,
        }
    }

    #[test]
    fn test_drop_reasons() {
        let mut p = record(VariantParams::Cpmm { vaults: None });
        assert_eq!(drop_reason(&p), None);

        p.base_decimals = None;
        assert_eq!(drop_reason(&p), Some(DropReason::NoDecimals));

        let mut p = record(VariantParams::Cpmm { vaults: None });
        p.reserves = Some(Reserves::new(0, 10));
        assert_eq!(drop_reason(&p), Some(DropReason::NoReserves));

        let mut p = record(VariantParams::Cpmm { vaults: None });
        p.quote_mint = p.base_mint;
        assert_eq!(drop_reason(&p), Some(DropReason::IdenticalMints));

        let mut p = record(VariantParams::Whirlpool {
            tick_spacing: Some(64),
            vaults: None,
        });
        p.reserves = None;
        assert_eq!(drop_reason(&p), None);
        p.address = None;
        assert_eq!(drop_reason(&p), Some(DropReason::NoAddress));
    }

    #[test]
    fn test_validate_pools_counts() {
        let good = record(VariantParams::Cpmm { vaults: None });
        let mut no_mint = record(VariantParams::Cpmm { vaults: None });
        no_mint.base_mint = None;
        let report = validate_pools(vec![good.clone(), no_mint]);
        assert_eq!(report.valid, vec![good]);
        assert_eq!(report.count_by_reason().get(&DropReason::NoMints), Some(&1));
        assert_eq!(report.dropped[0].reason.to_string(), "noMints");
    }
}
