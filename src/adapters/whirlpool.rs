use super::{AdapterContext, ConcentratedAdapter};
use crate::deserializers::WhirlpoolState;
use crate::pool::{PoolRecord, PoolVariant};

/// Orca Whirlpool adapter. The fee is read from the pool account.
pub type WhirlpoolAdapter = ConcentratedAdapter<WhirlpoolState>;

impl ConcentratedAdapter<WhirlpoolState> {
    pub fn new(pool: PoolRecord, ctx: AdapterContext) -> Self {
        Self::with_variant(PoolVariant::Whirlpool, pool, ctx)
    }
}
