use solana_sdk::pubkey::Pubkey;

use super::{read_array, read_pubkey, ConcentratedPoolState, DexError};
use crate::pool::FeeRate;

/// Raydium CLMM (Concentrated Liquidity Market Maker) Pool State
///
/// Data length: 1544 bytes (1536 bytes + 8 bytes Anchor discriminator)
/// Uses Anchor zero_copy layout, NOT Borsh, so fields are read at fixed
/// offsets.
///
/// Field offsets (after 8-byte discriminator):
/// - 0: bump (1 byte)
/// - 1-33: amm_config (Pubkey)
/// - 33-65: owner (Pubkey)
/// - 65-97: token_mint_0 (Pubkey)
/// - 97-129: token_mint_1 (Pubkey)
/// - 129-161: token_vault_0 (Pubkey)
/// - 161-193: token_vault_1 (Pubkey)
/// - 193-225: observation_key (Pubkey)
/// - 225: mint_decimals_0 (u8)
/// - 226: mint_decimals_1 (u8)
/// - 227-229: tick_spacing (u16)
/// - 229-245: liquidity (u128)
/// - 245-261: sqrt_price_x64 (u128)
/// - 261-265: tick_current (i32)
///
/// The trade fee lives on the `amm_config` account, not here.
#[derive(Debug, Clone, PartialEq)]
pub struct RaydiumClmmPoolState {
    pub amm_config: Pubkey,
    pub token_mint_0: Pubkey,
    pub token_mint_1: Pubkey,
    pub token_vault_0: Pubkey,
    pub token_vault_1: Pubkey,
    pub mint_decimals_0: u8,
    pub mint_decimals_1: u8,
    pub tick_spacing: u16,
    pub liquidity: u128,
    /// Current price as sqrt(token_1/token_0) in Q64.64 format
    pub sqrt_price_x64: u128,
    pub tick_current: i32,
}

impl RaydiumClmmPoolState {
    pub const LEN: usize = 1544;
    const DISCRIMINATOR_LEN: usize = 8;
}

impl ConcentratedPoolState for RaydiumClmmPoolState {
    fn dex_name(&self) -> &'static str {
        "Raydium CLMM"
    }

    fn from_account_data(data: &[u8]) -> Result<Self, DexError> {
        if data.len() != Self::LEN {
            return Err(DexError::DataLengthMismatch {
                expected: Self::LEN,
                actual: data.len(),
            });
        }

        let data = &data[Self::DISCRIMINATOR_LEN..];

        Ok(RaydiumClmmPoolState {
            amm_config: read_pubkey(data, 1)?,
            token_mint_0: read_pubkey(data, 65)?,
            token_mint_1: read_pubkey(data, 97)?,
            token_vault_0: read_pubkey(data, 129)?,
            token_vault_1: read_pubkey(data, 161)?,
            mint_decimals_0: data[225],
            mint_decimals_1: data[226],
            tick_spacing: u16::from_le_bytes(read_array(data, 227)?),
            liquidity: u128::from_le_bytes(read_array(data, 229)?),
            sqrt_price_x64: u128::from_le_bytes(read_array(data, 245)?),
            tick_current: i32::from_le_bytes(read_array(data, 261)?),
        })
    }

    fn mints(&self) -> (Pubkey, Pubkey) {
        (self.token_mint_0, self.token_mint_1)
    }

    fn vaults(&self) -> (Pubkey, Pubkey) {
        (self.token_vault_0, self.token_vault_1)
    }

    fn sqrt_price_x64(&self) -> u128 {
        self.sqrt_price_x64
    }

    fn fee(&self) -> Option<FeeRate> {
        None
    }

    fn is_active(&self) -> bool {
        self.liquidity > 0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn encode(mint_0: Pubkey, mint_1: Pubkey, sqrt_price_x64: u128) -> Vec<u8> {
        let mut data = vec![0u8; RaydiumClmmPoolState::LEN];
        let body = 8;
        data[body + 65..body + 97].copy_from_slice(mint_0.as_ref());
        data[body + 97..body + 129].copy_from_slice(mint_1.as_ref());
        data[body + 225] = 9;
        data[body + 226] = 6;
        data[body + 227..body + 229].copy_from_slice(&10u16.to_le_bytes());
        data[body + 229..body + 245].copy_from_slice(&1_000_000u128.to_le_bytes());
        data[body + 245..body + 261].copy_from_slice(&sqrt_price_x64.to_le_bytes());
        data[body + 261..body + 265].copy_from_slice(&(-120i32).to_le_bytes());
        data
    }

    #[test]
    fn test_manual_parsing() {
        let mint_0 = Pubkey::new_unique();
        let mint_1 = Pubkey::new_unique();
        let pool =
            RaydiumClmmPoolState::from_account_data(&encode(mint_0, mint_1, 1u128 << 63)).unwrap();

        assert_eq!(pool.mints(), (mint_0, mint_1));
        assert_eq!((pool.mint_decimals_0, pool.mint_decimals_1), (9, 6));
        assert_eq!(pool.tick_spacing, 10);
        assert_eq!(pool.tick_current, -120);
        assert!(pool.is_active());
        assert_eq!(pool.fee(), None);

        // (0.5)^2 * 1000
        let price = pool.calculate_price_with_decimals(9, 6);
        assert!((price - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_wrong_size_rejected() {
        assert!(matches!(
            RaydiumClmmPoolState::from_account_data(&[0u8; 1543]),
            Err(DexError::DataLengthMismatch { expected: 1544, actual: 1543 })
        ));
    }
}
