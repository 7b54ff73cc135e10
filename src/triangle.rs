//! Triangle Orientation Solver.
//!
//! Pure combinatorics over pool mints: no I/O, deterministic.

use solana_sdk::pubkey::Pubkey;

use crate::pool::PoolRecord;

/// A closed 3-cycle through pool1, pool2, pool3 in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triangle {
    pub start_mint: Pubkey,
    /// Input mint of each leg; leg i outputs `in_mints[(i + 1) % 3]`.
    pub in_mints: [Pubkey; 3],
}

impl Triangle {
    pub fn out_mint(&self, leg: usize) -> Pubkey {
        self.in_mints[(leg + 1) % 3]
    }

    /// (input, output) for each leg.
    pub fn legs(&self) -> [(Pubkey, Pubkey); 3] {
        [
            (self.in_mints[0], self.in_mints[1]),
            (self.in_mints[1], self.in_mints[2]),
            (self.in_mints[2], self.in_mints[0]),
        ]
    }
}

/// Walk pool1 -> pool2 -> pool3 starting from `start`; `Some` only if the
/// walk returns to `start` after exactly three hops.
pub fn solve_from(start: Pubkey, pools: [&PoolRecord; 3]) -> Option<Triangle> {
    let mut in_mints = [Pubkey::default(); 3];
    let mut current = start;
    for (i, pool) in pools.iter().enumerate() {
        if !pool.has_mint(&current) {
            return None;
        }
        in_mints[i] = current;
        current = pool.other_mint(&current)?;
    }
    (current == start).then_some(Triangle {
        start_mint: start,
        in_mints,
    })
}

/// Orientation of three pools, trying pool1's base mint before its quote
/// mint. Only pool1's mints are tried as the start.
pub fn solve(pool1: &PoolRecord, pool2: &PoolRecord, pool3: &PoolRecord) -> Option<Triangle> {
    [pool1.base_mint, pool1.quote_mint]
        .into_iter()
        .flatten()
        .find_map(|start| solve_from(start, [pool1, pool2, pool3]))
}
