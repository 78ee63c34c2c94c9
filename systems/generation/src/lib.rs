#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic cache generation derived purely from cell coordinates.
//!
//! Every value produced here is a hash of the world seed and a textual key,
//! so the same cell yields the same decision on every run and after every
//! restart. Only caches the player has touched ever need to be persisted;
//! everything else can be regenerated on demand.

use geocoin_core::{CellAddress, WorldConfig, INITIAL_VALUE_TAG};
use sha2::{Digest, Sha256};

/// Pure generator deciding where caches spawn and how many coins they start with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Generator {
    spawn_probability: f64,
    max_initial_coins: u32,
    world_seed: u64,
}

impl Generator {
    /// Creates a generator using the tuning carried by the world configuration.
    #[must_use]
    pub fn new(config: &WorldConfig) -> Self {
        Self {
            spawn_probability: config.spawn_probability,
            max_initial_coins: config.max_initial_coins,
            world_seed: config.world_seed,
        }
    }

    /// Hashes `key` into a reproducible value in `[0, 1)`.
    #[must_use]
    pub fn luck(&self, key: &str) -> f64 {
        luck(self.world_seed, key)
    }

    /// Reports whether the cell hosts a cache.
    #[must_use]
    pub fn spawn_decision(&self, cell: CellAddress) -> bool {
        self.luck(&cell_key(cell, None)) < self.spawn_probability
    }

    /// Number of coins minted into the cell's cache when it first spawns.
    #[must_use]
    pub fn initial_coin_count(&self, cell: CellAddress) -> u32 {
        let roll = self.luck(&cell_key(cell, Some(INITIAL_VALUE_TAG)));
        let scaled = (roll * f64::from(self.max_initial_coins)).floor();
        (scaled as u32).min(self.max_initial_coins.saturating_sub(1))
    }
}

/// Builds the generator key for a cell, optionally tagged: `"i,j"` or `"i,j,tag"`.
#[must_use]
pub fn cell_key(cell: CellAddress, tag: Option<&str>) -> String {
    match tag {
        Some(tag) => format!("{},{},{tag}", cell.i(), cell.j()),
        None => format!("{},{}", cell.i(), cell.j()),
    }
}

/// Stateless hash from `(seed, key)` to a value in `[0, 1)`.
#[must_use]
pub fn luck(seed: u64, key: &str) -> f64 {
    const SCALE: f64 = 1.0 / ((1u64 << 53) as f64);

    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let bytes: [u8; 8] = digest[0..8].try_into().expect("sha256 digest slice length");
    let value = u64::from_le_bytes(bytes) >> 11;
    (value as f64) * SCALE
}
