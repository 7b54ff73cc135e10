use std::collections::HashMap;

use itertools::Itertools;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::RwLock;
use tracing::debug;

use crate::deserializers::decode_mint_decimals;

/// Mint decimals resolved from mint accounts, shared across hydration runs.
///
/// The cache does no I/O of its own: hydration reads the mint accounts
/// through its batched, rate-limited path and hands the payloads to `ingest`.
#[derive(Default)]
pub struct MintDecimalsCache {
    cache: RwLock<HashMap<Pubkey, u8>>,
}

impl MintDecimalsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cached(&self, mint: &Pubkey) -> Option<u8> {
        self.cache.read().await.get(mint).copied()
    }

    /// Mints with no cached decimals, deduplicated, in input order.
    pub async fn uncached(&self, mints: &[Pubkey]) -> Vec<Pubkey> {
        let cache = self.cache.read().await;
        mints
            .iter()
            .filter(|m| !cache.contains_key(m))
            .copied()
            .unique()
            .collect()
    }

    /// Decode mint accounts read for `mints` (same order) and cache the ones
    /// that decode. Returns what was newly resolved.
    pub async fn ingest(
        &self,
        mints: &[Pubkey],
        accounts: Vec<Option<Vec<u8>>>,
    ) -> HashMap<Pubkey, u8> {
        let mut resolved = HashMap::new();
        let mut cache = self.cache.write().await;
        for (mint, data) in mints.iter().zip(accounts) {
            match data.map(|d| decode_mint_decimals(&d)) {
                Some(Ok(decimals)) => {
                    cache.insert(*mint, decimals);
                    resolved.insert(*mint, decimals);
                }
                Some(Err(e)) => debug!(mint = %mint, reason = e.reason(), "not a mint account"),
                None => debug!(mint = %mint, "mint account not found"),
            }
        }
        resolved
    }

    /// Cached decimals for each of `mints` that has them.
    pub async fn lookup(&self, mints: &[Pubkey]) -> HashMap<Pubkey, u8> {
        let cache = self.cache.read().await;
        mints
            .iter()
            .filter_map(|m| cache.get(m).map(|d| (*m, *d)))
            .collect()
    }
}
