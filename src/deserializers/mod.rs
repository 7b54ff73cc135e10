pub mod raydium_clmm;
pub mod token_account;
pub mod whirlpool;

pub use raydium_clmm::RaydiumClmmPoolState;
pub use token_account::{decode_mint_decimals, decode_token_amount};
pub use whirlpool::WhirlpoolState;

use solana_sdk::pubkey::Pubkey;
use std::fmt;

use crate::pool::FeeRate;

/// Decoded concentrated-liquidity pool state (Raydium CLMM, Orca Whirlpool).
pub trait ConcentratedPoolState: Sized + Send + Sync {
    fn dex_name(&self) -> &'static str;

    fn from_account_data(data: &[u8]) -> Result<Self, DexError>;

    /// (mint_a, mint_b) in on-chain order.
    fn mints(&self) -> (Pubkey, Pubkey);

    fn vaults(&self) -> (Pubkey, Pubkey);

    /// sqrt(price) as Q64.64.
    fn sqrt_price_x64(&self) -> u128;

    /// Fee stored on the pool account, if the program keeps it there.
    fn fee(&self) -> Option<FeeRate>;

    fn is_active(&self) -> bool;

    /// Mid price in human units, mint_b per mint_a.
    ///
    /// price = (sqrt_price / 2^64)^2 * 10^(decimals_a - decimals_b)
    fn calculate_price_with_decimals(&self, decimals_a: u8, decimals_b: u8) -> f64 {
        sqrt_price_to_price(self.sqrt_price_x64(), decimals_a, decimals_b)
    }
}

pub fn sqrt_price_to_price(sqrt_price_x64: u128, decimals_a: u8, decimals_b: u8) -> f64 {
    if sqrt_price_x64 == 0 {
        return 0.0;
    }
    const Q64: f64 = (1u128 << 64) as f64;
    let sqrt_price = sqrt_price_x64 as f64 / Q64;
    let decimal_diff = decimals_a as i32 - decimals_b as i32;
    sqrt_price * sqrt_price * 10f64.powi(decimal_diff)
}

/// Errors that can occur while decoding account data
#[derive(Debug, Clone, PartialEq)]
pub enum DexError {
    /// Failed to deserialize account data
    DeserializationFailed(String),

    /// Invalid or corrupted data
    InvalidData(String),

    /// Data length mismatch
    DataLengthMismatch { expected: usize, actual: usize },
}

impl DexError {
    pub fn reason(&self) -> &'static str {
        match self {
            DexError::DeserializationFailed(_) => "deserialization-failed",
            DexError::InvalidData(_) => "invalid-data",
            DexError::DataLengthMismatch { .. } => "data-length-mismatch",
        }
    }
}

impl fmt::Display for DexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DexError::DeserializationFailed(msg) => {
                write!(f, "Deserialization failed: {}", msg)
            }
            DexError::InvalidData(msg) => {
                write!(f, "Invalid data: {}", msg)
            }
            DexError::DataLengthMismatch { expected, actual } => {
                write!(f, "Data length mismatch: expected {}, got {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for DexError {}

/// Read a pubkey at `offset`, failing instead of panicking on short data.
pub(crate) fn read_pubkey(data: &[u8], offset: usize) -> Result<Pubkey, DexError> {
    let bytes: [u8; 32] = data
        .get(offset..offset + 32)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| DexError::InvalidData(format!("no pubkey at offset {}", offset)))?;
    Ok(Pubkey::new_from_array(bytes))
}

pub(crate) fn read_array<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], DexError> {
    data.get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| DexError::InvalidData(format!("no {} bytes at offset {}", N, offset)))
}
