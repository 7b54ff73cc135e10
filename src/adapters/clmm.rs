use super::{AdapterContext, ConcentratedAdapter};
use crate::deserializers::RaydiumClmmPoolState;
use crate::pool::{PoolRecord, PoolVariant};

/// Raydium CLMM adapter. The pool account carries no fee, so the fee comes
/// from the SDK quote or the pool record.
pub type ClmmAdapter = ConcentratedAdapter<RaydiumClmmPoolState>;

impl ConcentratedAdapter<RaydiumClmmPoolState> {
    pub fn new(pool: PoolRecord, ctx: AdapterContext) -> Self {
        Self::with_variant(PoolVariant::Clmm, pool, ctx)
    }
}
