//! SPL token account and mint decoding at fixed offsets.
//!
//! Token-2022 accounts append extensions after the base layout, so only the
//! base prefix is read.

use solana_program::program_pack::Pack;
use spl_token::state::{Account as SplTokenAccount, Mint as SplMint};

use super::DexError;

const AMOUNT_OFFSET: usize = 64;
const DECIMALS_OFFSET: usize = 44;

/// Balance field of a token account (vault).
pub fn decode_token_amount(data: &[u8]) -> Result<u64, DexError> {
    if data.len() < SplTokenAccount::LEN {
        return Err(DexError::DataLengthMismatch {
            expected: SplTokenAccount::LEN,
            actual: data.len(),
        });
    }
    let bytes = super::read_array::<8>(data, AMOUNT_OFFSET)?;
    Ok(u64::from_le_bytes(bytes))
}

/// Decimals field of a mint account.
pub fn decode_mint_decimals(data: &[u8]) -> Result<u8, DexError> {
    if data.len() < SplMint::LEN {
        return Err(DexError::DataLengthMismatch {
            expected: SplMint::LEN,
            actual: data.len(),
        });
    }
    Ok(data[DECIMALS_OFFSET])
}
