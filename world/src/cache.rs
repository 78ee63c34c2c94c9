//! Mutable per-cell cache records.

use geocoin_core::{CacheSnapshot, CellAddress, TransferError};

/// Coin-holding cache attached to a single cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cache {
    cell: CellAddress,
    coin_count: u32,
}

impl Cache {
    /// Creates a cache at `cell` holding `coin_count` coins.
    #[must_use]
    pub const fn new(cell: CellAddress, coin_count: u32) -> Self {
        Self { cell, coin_count }
    }

    /// Rebuilds a cache from a stored snapshot.
    #[must_use]
    pub const fn restore(snapshot: &CacheSnapshot) -> Self {
        Self::new(snapshot.cell(), snapshot.coin_count())
    }

    /// Address of the cell hosting the cache.
    #[must_use]
    pub const fn cell(&self) -> CellAddress {
        self.cell
    }

    /// Coins currently resident in the cache.
    #[must_use]
    pub const fn coin_count(&self) -> u32 {
        self.coin_count
    }

    /// Captures the cache's full state.
    #[must_use]
    pub const fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot::new(self.cell, self.coin_count)
    }

    /// Applies `delta` to the coin count and returns the new count.
    ///
    /// Refuses, without mutating, any adjustment that would leave the count
    /// negative or overflow it.
    pub fn adjust_coin_count(&mut self, delta: i64) -> Result<u32, TransferError> {
        let adjusted = i64::from(self.coin_count)
            .checked_add(delta)
            .and_then(|value| u32::try_from(value).ok())
            .ok_or(TransferError::InsufficientCoins {
                cell: self.cell,
                delta,
                available: self.coin_count,
            })?;
        self.coin_count = adjusted;
        Ok(adjusted)
    }
}
