/// Pool factory
///
/// Turns loosely-typed `RawPoolRecord`s into typed `PoolRecord`s. The variant
/// classifier here is the single authority producing a pool's variant tag:
/// nothing downstream sniffs fields to decide how to quote a pool.

use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::pool::{
    DexId, FeeRate, PoolRecord, PoolVariant, RawPoolRecord, ReserveSource, Reserves,
    VariantParams, VaultPair,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PoolRecordError {
    #[error("{field} is not a valid pubkey: '{value}'")]
    InvalidPubkey { field: &'static str, value: String },

    #[error("fee {0} is outside [0, 1)")]
    InvalidFee(String),
}

/// Maps an explicit type tag to a variant. Unknown tags return `None` so the
/// classifier falls through to the next heuristic.
fn parse_variant_tag(tag: &str) -> Option<PoolVariant> {
    let tag = tag.trim().to_lowercase().replace(|c: char| c == '-' || c == ' ', "_");
    match tag.as_str() {
        "cpmm" | "amm" | "cpamm" | "constant_product" | "amm_v4" | "raydium_cpmm"
        | "raydium_amm" => Some(PoolVariant::Cpmm),
        "dlmm" | "meteora_dlmm" | "lb_pair" => Some(PoolVariant::Dlmm),
        "clmm" | "raydium_clmm" | "concentrated" => Some(PoolVariant::Clmm),
        "whirlpool" | "orca_whirlpool" | "whirlpools" => Some(PoolVariant::Whirlpool),
        _ => None,
    }
}

fn variant_from_dex_name(dex: &str) -> Option<PoolVariant> {
    let dex = dex.to_lowercase();
    if dex.contains("meteora") {
        Some(PoolVariant::Dlmm)
    } else if dex.contains("orca") || dex.contains("whirlpool") {
        Some(PoolVariant::Whirlpool)
    } else if dex.contains("clmm") {
        Some(PoolVariant::Clmm)
    } else {
        None
    }
}

/// Classify a raw pool record.
///
/// Order: explicit `type`/`poolType` -> DEX name -> structure (`binStep` means
/// dlmm, `tickSpacing` means whirlpool) -> `cpmm`. Total: unknown input
/// degrades to cpmm.
pub fn classify(raw: &RawPoolRecord) -> PoolVariant {
    let explicit = raw
        .type_tag
        .as_deref()
        .into_iter()
        .chain(raw.pool_type.as_deref())
        .find_map(parse_variant_tag);
    if let Some(variant) = explicit {
        return variant;
    }

    if let Some(variant) = raw.dex.as_deref().and_then(variant_from_dex_name) {
        return variant;
    }

    if raw.bin_step.is_some() {
        return PoolVariant::Dlmm;
    }
    if raw.tick_spacing.is_some() {
        return PoolVariant::Whirlpool;
    }

    PoolVariant::Cpmm
}

/// Canonical DEX identity for a raw record; falls back to the variant's home
/// DEX when no name is given.
pub fn classify_dex(raw: &RawPoolRecord, variant: PoolVariant) -> DexId {
    match raw.dex.as_deref() {
        Some(name) if !name.trim().is_empty() => DexId::from_name(name),
        _ => match variant {
            PoolVariant::Dlmm => DexId::Meteora,
            PoolVariant::Whirlpool => DexId::Orca,
            PoolVariant::Cpmm | PoolVariant::Clmm => DexId::Raydium,
        },
    }
}

fn parse_pubkey(field: &'static str, value: Option<&str>) -> Result<Option<Pubkey>, PoolRecordError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Pubkey::from_str(s)
            .map(Some)
            .map_err(|_| PoolRecordError::InvalidPubkey {
                field,
                value: s.to_string(),
            }),
    }
}

pub struct PoolFactory;

impl PoolFactory {
    /// Build a typed record. Missing fields stay `None`; malformed ones are
    /// errors.
    pub fn build(raw: &RawPoolRecord) -> Result<PoolRecord, PoolRecordError> {
        let variant = classify(raw);
        let dex = classify_dex(raw, variant);

        let address = parse_pubkey("address", raw.address.as_deref())?;
        let base_mint = parse_pubkey("baseMint", raw.base_mint.as_deref())?;
        let quote_mint = parse_pubkey("quoteMint", raw.quote_mint.as_deref())?;
        let base_vault = parse_pubkey("baseVault", raw.base_vault.as_deref())?;
        let quote_vault = parse_pubkey("quoteVault", raw.quote_vault.as_deref())?;

        let fee = match (raw.fee_bps, raw.fee_rate) {
            (Some(bps), _) => Some(
                FeeRate::from_bps(bps)
                    .ok_or_else(|| PoolRecordError::InvalidFee(format!("{} bps", bps)))?,
            ),
            (None, Some(fraction)) => Some(
                FeeRate::from_fraction(fraction)
                    .ok_or_else(|| PoolRecordError::InvalidFee(fraction.to_string()))?,
            ),
            (None, None) => None,
        };

        let vaults = match (base_vault, quote_vault) {
            (Some(base), Some(quote)) => Some(VaultPair { base, quote }),
            _ => None,
        };

        let params = match variant {
            PoolVariant::Cpmm => VariantParams::Cpmm { vaults },
            PoolVariant::Dlmm => VariantParams::Dlmm {
                bin_step: raw.bin_step,
                vaults,
            },
            PoolVariant::Clmm => VariantParams::Clmm {
                tick_spacing: raw.tick_spacing,
                vaults,
            },
            PoolVariant::Whirlpool => VariantParams::Whirlpool {
                tick_spacing: raw.tick_spacing,
                vaults,
            },
        };

        let reserves = match (raw.x_reserve, raw.y_reserve) {
            (Some(x), Some(y)) => Some(Reserves::new(x, y)),
            _ => None,
        };

        let record = PoolRecord {
            name: raw.name.clone(),
            dex,
            address,
            base_mint,
            quote_mint,
            base_decimals: raw.base_decimals,
            quote_decimals: raw.quote_decimals,
            fee,
            reserves,
            params,
            reserve_source: ReserveSource::None,
            math_ready: false,
        };

        debug!(pool = %record.label(), variant = %variant, dex = record.dex.name(), "pool classified");
        Ok(record)
    }

    /// Build every record, skipping malformed ones with a warning.
    pub fn build_all(raws: &[RawPoolRecord]) -> Vec<PoolRecord> {
        raws.iter()
            .filter_map(|raw| match Self::build(raw) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    tracing::warn!(
                        pool = raw.address.as_deref().unwrap_or("<none>"),
                        error = %e,
                        "skipping malformed pool record"
                    );
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawPoolRecord {
        RawPoolRecord::default()
    }

    #[test]
    fn explicit_type_wins() {
        let r = RawPoolRecord {
            type_tag: Some("clmm".into()),
            dex: Some("Meteora".into()),
            bin_step: Some(10),
            ..raw()
        };
        assert_eq!(classify(&r), PoolVariant::Clmm);

        let r = RawPoolRecord {
            pool_type: Some("Whirlpool".into()),
            ..raw()
        };
        assert_eq!(classify(&r), PoolVariant::Whirlpool);
    }

    #[test]
    fn unknown_type_falls_through_to_dex_name() {
        let r = RawPoolRecord {
            type_tag: Some("mystery".into()),
            dex: Some("meteora".into()),
            ..raw()
        };
        assert_eq!(classify(&r), PoolVariant::Dlmm);

        let r = RawPoolRecord {
            dex: Some("Orca".into()),
            ..raw()
        };
        assert_eq!(classify(&r), PoolVariant::Whirlpool);
    }

    #[test]
    fn structural_heuristics() {
        let r = RawPoolRecord {
            bin_step: Some(25),
            ..raw()
        };
        assert_eq!(classify(&r), PoolVariant::Dlmm);

        let r = RawPoolRecord {
            tick_spacing: Some(64),
            ..raw()
        };
        assert_eq!(classify(&r), PoolVariant::Whirlpool);
    }

    #[test]
    fn defaults_to_cpmm() {
        assert_eq!(classify(&raw()), PoolVariant::Cpmm);
        let r = RawPoolRecord {
            dex: Some("raydium".into()),
            type_tag: Some("???".into()),
            ..raw()
        };
        assert_eq!(classify(&r), PoolVariant::Cpmm);
    }

    #[test]
    fn build_keeps_missing_fields_and_rejects_bad_keys() {
        let r = RawPoolRecord {
            address: Some(Pubkey::new_unique().to_string()),
            fee_rate: Some(0.003),
            x_reserve: Some(10),
            y_reserve: Some(20),
            ..raw()
        };
        let pool = PoolFactory::build(&r).unwrap();
        assert_eq!(pool.variant(), PoolVariant::Cpmm);
        assert_eq!(pool.base_mint, None);
        assert_eq!(pool.fee.unwrap().ppm(), 3_000);
        assert_eq!(pool.reserves, Some(Reserves::new(10, 20)));

        let bad = RawPoolRecord {
            base_mint: Some("not-a-key".into()),
            ..raw()
        };
        assert!(matches!(
            PoolFactory::build(&bad),
            Err(PoolRecordError::InvalidPubkey { field: "baseMint", .. })
        ));
    }
}
