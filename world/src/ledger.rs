//! Ownership ledger tracking where every coin rests.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use geocoin_core::{CellAddress, Coin, CoinId, CoinLocation, SnapshotError, TransferError};
use serde::{Deserialize, Serialize};

/// Every coin in the session, partitioned between cache residents and the player.
///
/// Coins are minted once per cache and afterwards only ever move; the ledger
/// has no operation that destroys or duplicates a coin.
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    residents: BTreeMap<CellAddress, VecDeque<CoinId>>,
    inventory: VecDeque<CoinId>,
    materialized: BTreeSet<CellAddress>,
    next_serial: BTreeMap<CellAddress, u32>,
}

impl Ledger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints `count` coins into the cache at `cell` the first time it spawns.
    ///
    /// Returns `false`, minting nothing, when the cell was already materialized.
    pub fn materialize(&mut self, cell: CellAddress, count: u32) -> bool {
        if self.materialized.contains(&cell) {
            return false;
        }
        self.mint(cell, count);
        true
    }

    /// Mints `count` replacement coins for a cache whose coins are unknown to
    /// the ledger, continuing the origin's serial sequence.
    pub fn adopt(&mut self, cell: CellAddress, count: u32) {
        self.mint(cell, count);
    }

    fn mint(&mut self, cell: CellAddress, count: u32) {
        let _ = self.materialized.insert(cell);
        let next = self.next_serial.entry(cell).or_insert(0);
        let residents = self.residents.entry(cell).or_default();
        for _ in 0..count {
            residents.push_back(CoinId::new(cell, *next));
            *next = next.saturating_add(1);
        }
    }

    /// Reports whether coins were ever minted for the cache at `cell`.
    #[must_use]
    pub fn is_materialized(&self, cell: CellAddress) -> bool {
        self.materialized.contains(&cell)
    }

    /// Reports whether the ledger can account for a cache at `cell`.
    #[must_use]
    pub fn knows_cache(&self, cell: CellAddress) -> bool {
        self.is_materialized(cell) || self.resident_count(cell) > 0
    }

    /// Moves the first resident coin of `cell` to the back of the inventory.
    pub fn collect(&mut self, cell: CellAddress) -> Result<Coin, TransferError> {
        let coin = self
            .residents
            .get_mut(&cell)
            .and_then(VecDeque::pop_front)
            .ok_or(TransferError::EmptyCache { cell })?;
        self.inventory.push_back(coin);
        Ok(Coin::new(coin, CoinLocation::Player))
    }

    /// Moves the oldest held coin into the cache at `cell`.
    pub fn deposit(&mut self, cell: CellAddress) -> Result<Coin, TransferError> {
        let coin = self
            .inventory
            .pop_front()
            .ok_or(TransferError::NoCoinsHeld)?;
        self.residents.entry(cell).or_default().push_back(coin);
        Ok(Coin::new(coin, CoinLocation::Cache(cell)))
    }

    /// Puts a just-collected coin back at the front of its cache.
    pub(crate) fn undo_collect(&mut self, cell: CellAddress) {
        if let Some(coin) = self.inventory.pop_back() {
            self.residents.entry(cell).or_default().push_front(coin);
        }
    }

    /// Puts a just-deposited coin back at the front of the inventory.
    pub(crate) fn undo_deposit(&mut self, cell: CellAddress) {
        if let Some(coin) = self.residents.get_mut(&cell).and_then(VecDeque::pop_back) {
            self.inventory.push_front(coin);
        }
    }

    /// Number of coins resident at `cell`.
    #[must_use]
    pub fn resident_count(&self, cell: CellAddress) -> usize {
        self.residents.get(&cell).map_or(0, VecDeque::len)
    }

    /// Coins resident at `cell`, in collection order.
    pub fn residents(&self, cell: CellAddress) -> impl Iterator<Item = CoinId> + '_ {
        self.residents.get(&cell).into_iter().flatten().copied()
    }

    /// Coins held by the player, oldest first.
    pub fn inventory(&self) -> impl Iterator<Item = CoinId> + '_ {
        self.inventory.iter().copied()
    }

    /// Number of coins held by the player.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.inventory.len()
    }

    /// Number of coins resident in any cache.
    #[must_use]
    pub fn resident_total(&self) -> usize {
        self.residents.values().map(VecDeque::len).sum()
    }

    /// Number of coins ever minted in this session.
    #[must_use]
    pub fn total(&self) -> usize {
        self.resident_total() + self.held_count()
    }

    /// Every coin record: cache residents grouped by cell, then the inventory.
    #[must_use]
    pub fn coins(&self) -> Vec<Coin> {
        let mut coins = Vec::with_capacity(self.total());
        for (cell, residents) in &self.residents {
            coins.extend(
                residents
                    .iter()
                    .map(|coin| Coin::new(*coin, CoinLocation::Cache(*cell))),
            );
        }
        coins.extend(
            self.inventory
                .iter()
                .map(|coin| Coin::new(*coin, CoinLocation::Player)),
        );
        coins
    }

    /// Forgets every coin.
    pub fn clear(&mut self) {
        self.residents.clear();
        self.inventory.clear();
        self.materialized.clear();
        self.next_serial.clear();
    }

    /// Serializable form of the full ledger.
    #[must_use]
    pub(crate) fn to_record(&self) -> LedgerRecord {
        LedgerRecord {
            coins: self.coins(),
            serials: self
                .next_serial
                .iter()
                .map(|(cell, next)| SerialRecord {
                    cell: *cell,
                    next: *next,
                })
                .collect(),
            materialized: self.materialized.iter().copied().collect(),
        }
    }

    /// Rebuilds a ledger from its persisted record.
    pub(crate) fn from_record(record: LedgerRecord) -> Result<Self, SnapshotError> {
        let mut ledger = Self::new();
        let mut seen = HashSet::with_capacity(record.coins.len());

        for coin in record.coins {
            ledger.register(&mut seen, coin)?;
        }
        for serial in record.serials {
            let next = ledger.next_serial.entry(serial.cell).or_insert(0);
            *next = (*next).max(serial.next);
        }
        ledger.materialized.extend(record.materialized);

        Ok(ledger)
    }

    /// Rebuilds a ledger from the inventory alone, used when the full ledger
    /// record is unreadable.
    pub(crate) fn from_inventory(order: &[CoinId]) -> Result<Self, SnapshotError> {
        let mut ledger = Self::new();
        let mut seen = HashSet::with_capacity(order.len());
        for coin in order {
            ledger.register(&mut seen, Coin::new(*coin, CoinLocation::Player))?;
        }
        Ok(ledger)
    }

    /// Replaces the inventory order with `order`, which must name exactly the
    /// coins currently held.
    pub(crate) fn reorder_inventory(&mut self, order: &[CoinId]) -> Result<(), SnapshotError> {
        let held: HashSet<CoinId> = self.inventory.iter().copied().collect();
        let requested: HashSet<CoinId> = order.iter().copied().collect();
        if requested.len() != order.len() {
            return Err(SnapshotError::malformed("inventory lists a coin twice"));
        }
        if held != requested {
            return Err(SnapshotError::malformed(format!(
                "inventory names {} coins but the ledger holds {}",
                order.len(),
                held.len()
            )));
        }

        self.inventory = order.iter().copied().collect();
        Ok(())
    }

    fn register(&mut self, seen: &mut HashSet<CoinId>, coin: Coin) -> Result<(), SnapshotError> {
        let id = coin.id();
        if !seen.insert(id) {
            return Err(SnapshotError::malformed(format!("coin {id} appears twice")));
        }

        let next = self.next_serial.entry(id.origin()).or_insert(0);
        *next = (*next).max(id.serial().saturating_add(1));

        match coin.location() {
            CoinLocation::Cache(cell) => self.residents.entry(cell).or_default().push_back(id),
            CoinLocation::Player => self.inventory.push_back(id),
        }
        Ok(())
    }
}

/// Persisted form of the [`Ledger`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct LedgerRecord {
    coins: Vec<Coin>,
    serials: Vec<SerialRecord>,
    materialized: Vec<CellAddress>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
struct SerialRecord {
    cell: CellAddress,
    next: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(coins: impl Iterator<Item = CoinId>) -> Vec<(i32, i32, u32)> {
        coins
            .map(|coin| (coin.origin().i(), coin.origin().j(), coin.serial()))
            .collect()
    }

    #[test]
    fn materialize_mints_sequential_serials() {
        let mut ledger = Ledger::new();
        let cell = CellAddress::new(2, 3);
        assert!(ledger.materialize(cell, 3));
        assert_eq!(ids(ledger.residents(cell)), vec![(2, 3, 0), (2, 3, 1), (2, 3, 2)]);
        assert_eq!(ledger.total(), 3);
    }

    #[test]
    fn materialize_is_idempotent_per_cell() {
        let mut ledger = Ledger::new();
        let cell = CellAddress::new(2, 3);
        assert!(ledger.materialize(cell, 3));
        assert!(!ledger.materialize(cell, 3));
        assert_eq!(ledger.resident_count(cell), 3);
    }

    #[test]
    fn zero_coin_caches_still_count_as_materialized() {
        let mut ledger = Ledger::new();
        let cell = CellAddress::new(0, 0);
        assert!(ledger.materialize(cell, 0));
        assert!(ledger.is_materialized(cell));
        assert!(ledger.knows_cache(cell));
        assert_eq!(ledger.total(), 0);
    }

    #[test]
    fn collect_takes_residents_in_storage_order() {
        let mut ledger = Ledger::new();
        let cell = CellAddress::new(2, 3);
        let _ = ledger.materialize(cell, 5);

        let first = ledger.collect(cell).expect("coin available");
        let second = ledger.collect(cell).expect("coin available");

        assert_eq!(first.id(), CoinId::new(cell, 0));
        assert_eq!(second.id(), CoinId::new(cell, 1));
        assert_eq!(first.location(), CoinLocation::Player);
        assert_eq!(ledger.resident_count(cell), 3);
        assert_eq!(ids(ledger.inventory()), vec![(2, 3, 0), (2, 3, 1)]);
    }

    #[test]
    fn collect_from_empty_cell_fails_without_mutation() {
        let mut ledger = Ledger::new();
        let cell = CellAddress::new(1, 1);
        let _ = ledger.materialize(cell, 0);
        assert_eq!(ledger.collect(cell), Err(TransferError::EmptyCache { cell }));
        assert_eq!(ledger.held_count(), 0);
    }

    #[test]
    fn deposit_moves_the_oldest_held_coin() {
        let mut ledger = Ledger::new();
        let source = CellAddress::new(0, 0);
        let target = CellAddress::new(0, 1);
        let _ = ledger.materialize(source, 2);
        let _ = ledger.materialize(target, 0);
        let _ = ledger.collect(source).expect("coin");
        let _ = ledger.collect(source).expect("coin");

        let deposited = ledger.deposit(target).expect("held coin");

        assert_eq!(deposited.id(), CoinId::new(source, 0));
        assert_eq!(deposited.location(), CoinLocation::Cache(target));
        assert_eq!(ids(ledger.inventory()), vec![(0, 0, 1)]);
        assert_eq!(ids(ledger.residents(target)), vec![(0, 0, 0)]);
    }

    #[test]
    fn deposit_without_held_coins_fails() {
        let mut ledger = Ledger::new();
        let cell = CellAddress::new(0, 0);
        let _ = ledger.materialize(cell, 1);
        assert_eq!(ledger.deposit(cell), Err(TransferError::NoCoinsHeld));
        assert_eq!(ledger.resident_count(cell), 1);
    }

    #[test]
    fn undo_reverses_the_last_transfer() {
        let mut ledger = Ledger::new();
        let cell = CellAddress::new(5, 5);
        let _ = ledger.materialize(cell, 2);

        let _ = ledger.collect(cell).expect("coin");
        ledger.undo_collect(cell);
        assert_eq!(ids(ledger.residents(cell)), vec![(5, 5, 0), (5, 5, 1)]);
        assert_eq!(ledger.held_count(), 0);

        let _ = ledger.collect(cell).expect("coin");
        let _ = ledger.deposit(cell).expect("coin");
        ledger.undo_deposit(cell);
        assert_eq!(ids(ledger.inventory()), vec![(5, 5, 0)]);
        assert_eq!(ids(ledger.residents(cell)), vec![(5, 5, 1)]);
    }

    #[test]
    fn adopt_continues_serials_after_known_coins() {
        let cell = CellAddress::new(4, 4);
        let mut ledger =
            Ledger::from_inventory(&[CoinId::new(cell, 0), CoinId::new(cell, 6)]).expect("valid");
        assert!(!ledger.is_materialized(cell));

        ledger.adopt(cell, 2);

        assert_eq!(ids(ledger.residents(cell)), vec![(4, 4, 7), (4, 4, 8)]);
        assert!(ledger.is_materialized(cell));
    }

    #[test]
    fn record_round_trip_preserves_partition_and_order() {
        let mut ledger = Ledger::new();
        let first = CellAddress::new(0, 0);
        let second = CellAddress::new(-1, 2);
        let _ = ledger.materialize(first, 3);
        let _ = ledger.materialize(second, 2);
        let _ = ledger.collect(second).expect("coin");
        let _ = ledger.collect(first).expect("coin");
        let _ = ledger.deposit(second).expect("coin");

        let restored = Ledger::from_record(ledger.to_record()).expect("valid record");

        assert_eq!(restored.coins(), ledger.coins());
        assert_eq!(ids(restored.inventory()), ids(ledger.inventory()));
        assert!(restored.is_materialized(first));
        assert!(!restored.clone().materialize(second, 9));
    }

    #[test]
    fn record_with_duplicate_coin_is_rejected() {
        let cell = CellAddress::new(0, 0);
        let coin = Coin::new(CoinId::new(cell, 0), CoinLocation::Cache(cell));
        let record = LedgerRecord {
            coins: vec![coin, Coin::new(coin.id(), CoinLocation::Player)],
            serials: Vec::new(),
            materialized: vec![cell],
        };
        assert!(Ledger::from_record(record).is_err());
    }

    #[test]
    fn reorder_requires_the_same_held_set() {
        let cell = CellAddress::new(0, 0);
        let mut ledger = Ledger::new();
        let _ = ledger.materialize(cell, 3);
        let _ = ledger.collect(cell).expect("coin");
        let _ = ledger.collect(cell).expect("coin");

        let reversed = [CoinId::new(cell, 1), CoinId::new(cell, 0)];
        ledger.reorder_inventory(&reversed).expect("same set");
        assert_eq!(ids(ledger.inventory()), vec![(0, 0, 1), (0, 0, 0)]);

        assert!(ledger.reorder_inventory(&[CoinId::new(cell, 2)]).is_err());
        assert!(ledger
            .reorder_inventory(&[CoinId::new(cell, 1), CoinId::new(cell, 1)])
            .is_err());
    }
}
