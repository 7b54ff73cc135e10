//! Pool records.
//!
//! `RawPoolRecord` is the loosely-typed shape pool lists arrive in (config
//! files, DEX list APIs). `PoolRecord` is the typed form everything downstream
//! works with; its variant lives in `VariantParams` and is produced only by
//! `pool_factory`.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;

use crate::error::QuoteFailure;

/// Pool mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolVariant {
    Cpmm,
    Dlmm,
    Clmm,
    Whirlpool,
}

impl PoolVariant {
    /// Concentrated-liquidity variants have no safe closed-form fallback.
    pub fn is_concentrated(&self) -> bool {
        matches!(self, PoolVariant::Clmm | PoolVariant::Whirlpool)
    }

    /// Variants whose math needs actual reserves.
    pub fn needs_reserves(&self) -> bool {
        matches!(self, PoolVariant::Cpmm | PoolVariant::Dlmm)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolVariant::Cpmm => "cpmm",
            PoolVariant::Dlmm => "dlmm",
            PoolVariant::Clmm => "clmm",
            PoolVariant::Whirlpool => "whirlpool",
        }
    }
}

impl fmt::Display for PoolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical DEX identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DexId {
    Raydium,
    Orca,
    Meteora,
    Other(String),
}

impl DexId {
    pub fn from_name(name: &str) -> Self {
        let lower = name.trim().to_lowercase();
        if lower.contains("raydium") {
            DexId::Raydium
        } else if lower.contains("orca") || lower.contains("whirlpool") {
            DexId::Orca
        } else if lower.contains("meteora") {
            DexId::Meteora
        } else {
            DexId::Other(lower)
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DexId::Raydium => "raydium",
            DexId::Orca => "orca",
            DexId::Meteora => "meteora",
            DexId::Other(name) => name,
        }
    }
}

/// Fee as an exact rational in parts-per-million.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeRate {
    ppm: u32,
}

impl FeeRate {
    pub const DENOMINATOR: u64 = 1_000_000;

    /// `None` unless `ppm < 1_000_000` (fee must be in [0, 1)).
    pub fn from_ppm(ppm: u32) -> Option<Self> {
        ((ppm as u64) < Self::DENOMINATOR).then_some(Self { ppm })
    }

    pub fn from_bps(bps: u32) -> Option<Self> {
        Self::from_ppm(bps.checked_mul(100)?)
    }

    /// Rounds a fractional fee (e.g. `0.003`) to ppm once, at ingest.
    pub fn from_fraction(fraction: f64) -> Option<Self> {
        if !fraction.is_finite() || !(0.0..1.0).contains(&fraction) {
            return None;
        }
        Self::from_ppm((fraction * Self::DENOMINATOR as f64).round() as u32)
    }

    pub fn ppm(&self) -> u32 {
        self.ppm
    }

    /// `1e6 - ppm`, the multiplier applied to the input amount.
    pub fn keep_ppm(&self) -> u64 {
        Self::DENOMINATOR - self.ppm as u64
    }

    pub fn as_fraction(&self) -> f64 {
        self.ppm as f64 / Self::DENOMINATOR as f64
    }
}

/// Pool reserves in atomic units, base side first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reserves {
    pub base: u64,
    pub quote: u64,
}

impl Reserves {
    pub fn new(base: u64, quote: u64) -> Self {
        Self { base, quote }
    }

    pub fn is_valid(&self) -> bool {
        self.base > 0 && self.quote > 0
    }
}

/// Where a pool's reserves came from after hydration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReserveSource {
    Fresh,
    Cache,
    Partial,
    #[default]
    None,
}

/// Token vault pair (base vault, quote vault).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultPair {
    pub base: Pubkey,
    pub quote: Pubkey,
}

/// Variant-specific fields. The variant tag is derived from this, never stored
/// separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantParams {
    Cpmm {
        vaults: Option<VaultPair>,
    },
    Dlmm {
        bin_step: Option<u16>,
        vaults: Option<VaultPair>,
    },
    Clmm {
        tick_spacing: Option<u16>,
        vaults: Option<VaultPair>,
    },
    Whirlpool {
        tick_spacing: Option<u16>,
        vaults: Option<VaultPair>,
    },
}

impl VariantParams {
    pub fn variant(&self) -> PoolVariant {
        match self {
            VariantParams::Cpmm { .. } => PoolVariant::Cpmm,
            VariantParams::Dlmm { .. } => PoolVariant::Dlmm,
            VariantParams::Clmm { .. } => PoolVariant::Clmm,
            VariantParams::Whirlpool { .. } => PoolVariant::Whirlpool,
        }
    }

    pub fn vaults(&self) -> Option<VaultPair> {
        match self {
            VariantParams::Cpmm { vaults }
            | VariantParams::Dlmm { vaults, .. }
            | VariantParams::Clmm { vaults, .. }
            | VariantParams::Whirlpool { vaults, .. } => *vaults,
        }
    }
}

/// Typed pool record.
///
/// Identity fields stay optional: incomplete records are representable so the
/// hydration validation pass can report why they were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolRecord {
    pub name: Option<String>,
    pub dex: DexId,
    pub address: Option<Pubkey>,
    pub base_mint: Option<Pubkey>,
    pub quote_mint: Option<Pubkey>,
    pub base_decimals: Option<u8>,
    pub quote_decimals: Option<u8>,
    pub fee: Option<FeeRate>,
    pub reserves: Option<Reserves>,
    pub params: VariantParams,
    pub reserve_source: ReserveSource,
    pub math_ready: bool,
}

impl PoolRecord {
    pub fn variant(&self) -> PoolVariant {
        self.params.variant()
    }

    /// Address for logs and error messages.
    pub fn label(&self) -> String {
        match (&self.address, &self.name) {
            (Some(addr), _) => addr.to_string(),
            (None, Some(name)) => name.clone(),
            (None, None) => "<unknown>".to_string(),
        }
    }

    pub fn require_address(&self) -> Result<Pubkey, QuoteFailure> {
        self.address.ok_or_else(|| self.incomplete("address"))
    }

    pub fn require_mints(&self) -> Result<(Pubkey, Pubkey), QuoteFailure> {
        let base = self.base_mint.ok_or_else(|| self.incomplete("baseMint"))?;
        let quote = self.quote_mint.ok_or_else(|| self.incomplete("quoteMint"))?;
        Ok((base, quote))
    }

    pub fn require_decimals(&self) -> Result<(u8, u8), QuoteFailure> {
        let base = self.base_decimals.ok_or_else(|| self.incomplete("baseDecimals"))?;
        let quote = self.quote_decimals.ok_or_else(|| self.incomplete("quoteDecimals"))?;
        Ok((base, quote))
    }

    pub fn require_fee(&self) -> Result<FeeRate, QuoteFailure> {
        self.fee.ok_or_else(|| self.incomplete("feeRate"))
    }

    /// Whether either side of this pool is `mint`.
    pub fn has_mint(&self, mint: &Pubkey) -> bool {
        self.base_mint.as_ref() == Some(mint) || self.quote_mint.as_ref() == Some(mint)
    }

    /// The opposite side of `mint` in this pool.
    pub fn other_mint(&self, mint: &Pubkey) -> Option<Pubkey> {
        match (self.base_mint, self.quote_mint) {
            (Some(base), Some(quote)) if base == *mint => Some(quote),
            (Some(base), Some(quote)) if quote == *mint => Some(base),
            _ => None,
        }
    }

    pub fn has_valid_reserves(&self) -> bool {
        self.reserves.map(|r| r.is_valid()).unwrap_or(false)
    }

    fn incomplete(&self, field: &'static str) -> QuoteFailure {
        QuoteFailure::PoolIncomplete {
            pool: self.label(),
            field,
        }
    }
}

/// Loosely-typed pool record as found in pool lists.
///
/// Field names accept both snake_case and the camelCase spellings DEX list
/// APIs use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPoolRecord {
    pub name: Option<String>,
    #[serde(rename = "type", alias = "pool_type_tag")]
    pub type_tag: Option<String>,
    #[serde(alias = "poolType")]
    pub pool_type: Option<String>,
    #[serde(alias = "dexName", alias = "dex_name")]
    pub dex: Option<String>,
    #[serde(alias = "poolAddress", alias = "id")]
    pub address: Option<String>,
    #[serde(alias = "baseMint", alias = "mintA")]
    pub base_mint: Option<String>,
    #[serde(alias = "quoteMint", alias = "mintB")]
    pub quote_mint: Option<String>,
    #[serde(alias = "baseDecimals")]
    pub base_decimals: Option<u8>,
    #[serde(alias = "quoteDecimals")]
    pub quote_decimals: Option<u8>,
    /// Fractional fee, e.g. `0.0025`.
    #[serde(alias = "feeRate")]
    pub fee_rate: Option<f64>,
    #[serde(alias = "feeBps")]
    pub fee_bps: Option<u32>,
    #[serde(alias = "xReserve", alias = "baseReserve")]
    pub x_reserve: Option<u64>,
    #[serde(alias = "yReserve", alias = "quoteReserve")]
    pub y_reserve: Option<u64>,
    #[serde(alias = "binStep")]
    pub bin_step: Option<u16>,
    #[serde(alias = "tickSpacing")]
    pub tick_spacing: Option<u16>,
    #[serde(alias = "baseVault", alias = "vaultA")]
    pub base_vault: Option<String>,
    #[serde(alias = "quoteVault", alias = "vaultB")]
    pub quote_vault: Option<String>,
}
