/*!
 * Vault Reader Module
 *
 * Cache of vault token balances for pools whose reserves live in external
 * token accounts (cpmm, and dlmm when its vaults are known).
 *
 * Hydration writes every decoded balance here; a later non-forced hydration
 * can serve a pool entirely from this cache. A vault whose account is gone or
 * no longer decodes is evicted, so it is never served stale.
 */

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::deserializers::{decode_token_amount, DexError};
use crate::pool::{Reserves, VaultPair};

/// Vault info
#[derive(Debug, Clone)]
pub struct VaultInfo {
    pub address: Pubkey,
    /// Token balance (atomic)
    pub amount: u64,
    pub last_updated: DateTime<Utc>,
}

/// VaultReader - tracks vault balances and which pool owns which vaults
#[derive(Default)]
pub struct VaultReader {
    vaults: DashMap<Pubkey, VaultInfo>,
    pool_to_vaults: DashMap<Pubkey, VaultPair>,
}

impl VaultReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_pool_vaults(&self, pool_address: Pubkey, vaults: VaultPair) {
        self.pool_to_vaults.insert(pool_address, vaults);
    }

    /// Decode a token account payload and store its balance.
    ///
    /// # Returns
    /// * `Ok(amount)` - balance stored
    /// * `Err(error)` - payload was not a token account; any earlier balance is evicted
    pub fn update_vault(&self, vault_address: &Pubkey, data: &[u8]) -> Result<u64, DexError> {
        match decode_token_amount(data) {
            Ok(amount) => {
                self.set_vault_amount(vault_address, amount);
                Ok(amount)
            }
            Err(e) => {
                self.evict(vault_address);
                Err(e)
            }
        }
    }

    /// Forget a vault's balance, e.g. once its account no longer exists.
    pub fn evict(&self, vault_address: &Pubkey) -> Option<u64> {
        let (_, info) = self.vaults.remove(vault_address)?;
        debug!(vault = %vault_address, amount = info.amount, "vault balance evicted");
        Some(info.amount)
    }

    pub fn set_vault_amount(&self, vault_address: &Pubkey, amount: u64) {
        debug!(vault = %vault_address, amount, "vault balance updated");
        self.vaults.insert(
            *vault_address,
            VaultInfo {
                address: *vault_address,
                amount,
                last_updated: Utc::now(),
            },
        );
    }

    pub fn get_vault_amount(&self, vault_address: &Pubkey) -> Option<u64> {
        self.vaults.get(vault_address).map(|v| v.amount)
    }

    /// Reserves for a pair of vaults, if both balances are cached.
    pub fn reserves_for(&self, vaults: &VaultPair) -> Option<Reserves> {
        let base = self.get_vault_amount(&vaults.base)?;
        let quote = self.get_vault_amount(&vaults.quote)?;
        Some(Reserves::new(base, quote))
    }

    /// Reserves of a registered pool.
    pub fn get_pool_reserves(&self, pool_address: &Pubkey) -> Option<Reserves> {
        let vaults = *self.pool_to_vaults.get(pool_address)?;
        self.reserves_for(&vaults)
    }

    pub fn get_pool_vault_addresses(&self, pool_address: &Pubkey) -> Option<VaultPair> {
        self.pool_to_vaults.get(pool_address).map(|v| *v)
    }

    pub fn get_stats(&self) -> VaultReaderStats {
        VaultReaderStats {
            total_pools: self.pool_to_vaults.len(),
            total_vaults: self.vaults.len(),
            vaults_with_data: self.vaults.iter().filter(|v| v.amount > 0).count(),
        }
    }
}

/// VaultReader stats
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultReaderStats {
    pub total_pools: usize,
    pub total_vaults: usize,
    pub vaults_with_data: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_account(amount: u64) -> Vec<u8> {
        let mut data = vec![0u8; 165];
        data[64..72].copy_from_slice(&amount.to_le_bytes());
        data
    }

    #[test]
    fn test_get_pool_reserves() {
        let reader = VaultReader::new();
        let pool = Pubkey::new_unique();
        let vaults = VaultPair {
            base: Pubkey::new_unique(),
            quote: Pubkey::new_unique(),
        };
        reader.register_pool_vaults(pool, vaults);

        // nothing cached yet
        assert_eq!(reader.get_pool_reserves(&pool), None);

        assert_eq!(reader.update_vault(&vaults.base, &token_account(1_000)), Ok(1_000));
        assert_eq!(reader.get_pool_reserves(&pool), None);

        reader.update_vault(&vaults.quote, &token_account(2_000)).unwrap();
        assert_eq!(reader.get_pool_reserves(&pool), Some(Reserves::new(1_000, 2_000)));

        let stats = reader.get_stats();
        assert_eq!(stats.total_pools, 1);
        assert_eq!(stats.vaults_with_data, 2);
    }

    #[test]
    fn test_bad_payload_is_not_cached() {
        let reader = VaultReader::new();
        let vault = Pubkey::new_unique();
        assert!(reader.update_vault(&vault, &[0u8; 82]).is_err());
        assert_eq!(reader.get_vault_amount(&vault), None);
    }

    #[test]
    fn test_bad_payload_evicts_stale_balance() {
        let reader = VaultReader::new();
        let pool = Pubkey::new_unique();
        let vaults = VaultPair {
            base: Pubkey::new_unique(),
            quote: Pubkey::new_unique(),
        };
        reader.register_pool_vaults(pool, vaults);
        reader.update_vault(&vaults.base, &token_account(10)).unwrap();
        reader.update_vault(&vaults.quote, &token_account(20)).unwrap();
        assert_eq!(reader.get_pool_reserves(&pool), Some(Reserves::new(10, 20)));

        assert!(reader.update_vault(&vaults.base, &[0u8; 82]).is_err());
        assert_eq!(reader.get_vault_amount(&vaults.base), None);
        assert_eq!(reader.get_pool_reserves(&pool), None);

        assert_eq!(reader.evict(&vaults.quote), Some(20));
        assert_eq!(reader.evict(&vaults.quote), None);
        assert_eq!(reader.get_pool_vault_addresses(&pool), Some(vaults));
    }
}
