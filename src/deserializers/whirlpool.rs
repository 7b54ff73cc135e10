use solana_sdk::pubkey::Pubkey;

use super::{ConcentratedPoolState, DexError};
use crate::pool::FeeRate;

/// Orca Whirlpool pool state (decoded with the official Orca client type)
///
/// Whirlpool is Orca's concentrated liquidity market maker (CLMM)
///
/// Program ID: whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc
/// Data size: 653 bytes (Borsh)
///
/// Only the fields quoting needs are kept, converted to this crate's
/// `Pubkey` type.
#[derive(Debug, Clone, PartialEq)]
pub struct WhirlpoolState {
    pub tick_spacing: u16,
    /// Hundredths of a basis point, i.e. parts per million.
    pub fee_rate: u16,
    pub liquidity: u128,
    pub sqrt_price: u128,
    pub tick_current_index: i32,
    pub token_mint_a: Pubkey,
    pub token_vault_a: Pubkey,
    pub token_mint_b: Pubkey,
    pub token_vault_b: Pubkey,
}

impl WhirlpoolState {
    pub const LEN: usize = 653;
}

fn to_pubkey(bytes: [u8; 32]) -> Pubkey {
    Pubkey::new_from_array(bytes)
}

impl ConcentratedPoolState for WhirlpoolState {
    fn dex_name(&self) -> &'static str {
        "Whirlpool (Orca)"
    }

    fn from_account_data(data: &[u8]) -> Result<Self, DexError> {
        // Orca Whirlpool accounts are exactly 653 bytes
        if data.len() != Self::LEN {
            return Err(DexError::DataLengthMismatch {
                expected: Self::LEN,
                actual: data.len(),
            });
        }

        let whirlpool = orca_whirlpools_client::Whirlpool::from_bytes(data).map_err(|e| {
            DexError::DeserializationFailed(format!("Whirlpool deserialization failed: {}", e))
        })?;

        Ok(WhirlpoolState {
            tick_spacing: whirlpool.tick_spacing,
            fee_rate: whirlpool.fee_rate,
            liquidity: whirlpool.liquidity,
            sqrt_price: whirlpool.sqrt_price,
            tick_current_index: whirlpool.tick_current_index,
            token_mint_a: to_pubkey(whirlpool.token_mint_a.to_bytes()),
            token_vault_a: to_pubkey(whirlpool.token_vault_a.to_bytes()),
            token_mint_b: to_pubkey(whirlpool.token_mint_b.to_bytes()),
            token_vault_b: to_pubkey(whirlpool.token_vault_b.to_bytes()),
        })
    }

    fn mints(&self) -> (Pubkey, Pubkey) {
        (self.token_mint_a, self.token_mint_b)
    }

    fn vaults(&self) -> (Pubkey, Pubkey) {
        (self.token_vault_a, self.token_vault_b)
    }

    fn sqrt_price_x64(&self) -> u128 {
        self.sqrt_price
    }

    fn fee(&self) -> Option<FeeRate> {
        FeeRate::from_ppm(self.fee_rate as u32)
    }

    fn is_active(&self) -> bool {
        self.liquidity > 0
    }
}
