#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state management for Geocoin.
//!
//! The [`World`] owns the cell registry, the active caches, the coin ledger
//! and the durable store. Adapters drive it through [`apply`] (or the
//! equivalent methods on [`World`]) and observe it through [`query`]. Every
//! operation runs to completion synchronously, so a coin move and the
//! matching cache adjustment, or a snapshot write and the cache release,
//! are never split by another command.

mod board;
mod cache;
mod ledger;
mod records;
mod store;

pub use board::{Board, CellKey, MAX_CELL_INDEX};
pub use cache::Cache;
pub use ledger::Ledger;
pub use store::{MemoryStore, Store};

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use geocoin_core::{
    CacheSnapshot, CellAddress, Coin, CoinId, Command, Direction, Event, Position, RecordKind,
    SnapshotError, TransferError, WorldConfig, WELCOME_BANNER,
};
use geocoin_system_generation::Generator;
use ledger::LedgerRecord;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

/// Lifecycle state of a cell as observed through [`query::cell_state`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellState {
    /// The cell has not been inside the visibility window this session.
    Unknown,
    /// The cell is visible and hosts no cache.
    ActiveNoCache,
    /// The cell is visible and its cache is resident in memory.
    ActiveWithCache,
    /// The cell left the visibility window; any cache lives on as a snapshot.
    Dormant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CellPhase {
    ActiveNoCache,
    ActiveWithCache,
    Dormant { had_cache: bool },
}

#[derive(Debug)]
struct Player {
    position: Position,
    path: Vec<Position>,
}

impl Player {
    fn at(position: Position) -> Self {
        Self {
            position,
            path: vec![position],
        }
    }
}

/// Represents the authoritative Geocoin world state.
#[derive(Debug)]
pub struct World {
    banner: &'static str,
    config: WorldConfig,
    board: Board,
    generator: Generator,
    ledger: Ledger,
    caches: HashMap<CellKey, Cache>,
    phases: HashMap<CellKey, CellPhase>,
    visible: Vec<CellKey>,
    snapshots: BTreeMap<CellAddress, CacheSnapshot>,
    player: Player,
    store: Box<dyn Store>,
    dirty: BTreeSet<RecordKind>,
}

impl World {
    /// Opens a session backed by `store`, restoring whatever it holds.
    ///
    /// Each persisted record loads independently; an unreadable record is
    /// reported as [`Event::RecordRejected`] and the others still load. The
    /// visibility window is then populated around the restored position.
    pub fn open(config: WorldConfig, store: Box<dyn Store>, out_events: &mut Vec<Event>) -> Self {
        let mut world = Self {
            banner: WELCOME_BANNER,
            board: Board::new(config.tile_width, config.visibility_radius),
            generator: Generator::new(&config),
            ledger: Ledger::new(),
            caches: HashMap::new(),
            phases: HashMap::new(),
            visible: Vec::new(),
            snapshots: BTreeMap::new(),
            player: Player::at(config.spawn_position),
            store,
            dirty: BTreeSet::new(),
            config,
        };

        world.load(out_events);
        let position = world.player.position;
        world.refresh(position, out_events);
        world.flush();
        world
    }

    /// Moves the player one tile in `direction`.
    pub fn on_player_move(&mut self, direction: Direction, out_events: &mut Vec<Event>) {
        let destination = self
            .player
            .position
            .stepped(direction, self.config.tile_width);
        self.move_player(destination, out_events);
    }

    /// Places the player at an externally reported position.
    pub fn on_location_found(&mut self, position: Position, out_events: &mut Vec<Event>) {
        self.move_player(position, out_events);
    }

    /// Recomputes the visibility window around `position`.
    ///
    /// Cells leaving the window go dormant, snapshotting their caches; cells
    /// entering it are restored or generated. Calling it again with the same
    /// position does nothing.
    pub fn refresh_visibility(&mut self, position: Position, out_events: &mut Vec<Event>) {
        self.refresh(position, out_events);
        self.flush();
    }

    /// Moves one coin from the visible cache at `cell` into the inventory.
    pub fn collect_from_cache(&mut self, cell: CellAddress) -> Result<Coin, TransferError> {
        let Some(cache) = self
            .board
            .lookup(cell)
            .and_then(|key| self.caches.get_mut(&key))
        else {
            debug!(cell = %cell, "collect_rejected_no_cache");
            return Err(TransferError::NoActiveCache { cell });
        };

        if cache.coin_count() == 0 {
            debug!(cell = %cell, "collect_rejected_empty");
            return Err(TransferError::EmptyCache { cell });
        }
        let coin = match self.ledger.collect(cell) {
            Ok(coin) => coin,
            Err(error) => {
                warn!(cell = %cell, error = %error, "ledger_out_of_step_with_cache");
                return Err(error);
            }
        };
        let remaining = match cache.adjust_coin_count(-1) {
            Ok(remaining) => remaining,
            Err(error) => {
                self.ledger.undo_collect(cell);
                return Err(error);
            }
        };

        info!(cell = %cell, coin = %coin.id(), remaining, "coin_collected");
        self.mark(RecordKind::CoinLedger);
        self.mark(RecordKind::PlayerInventory);
        self.flush();
        Ok(coin)
    }

    /// Moves the oldest held coin into the visible cache at `cell`.
    pub fn deposit_to_cache(&mut self, cell: CellAddress) -> Result<Coin, TransferError> {
        let Some(cache) = self
            .board
            .lookup(cell)
            .and_then(|key| self.caches.get_mut(&key))
        else {
            debug!(cell = %cell, "deposit_rejected_no_cache");
            return Err(TransferError::NoActiveCache { cell });
        };

        let coin = match self.ledger.deposit(cell) {
            Ok(coin) => coin,
            Err(error) => {
                debug!(cell = %cell, error = %error, "deposit_rejected");
                return Err(error);
            }
        };
        let total = match cache.adjust_coin_count(1) {
            Ok(total) => total,
            Err(error) => {
                self.ledger.undo_deposit(cell);
                return Err(error);
            }
        };

        info!(cell = %cell, coin = %coin.id(), total, "coin_deposited");
        self.mark(RecordKind::CoinLedger);
        self.mark(RecordKind::PlayerInventory);
        self.flush();
        Ok(coin)
    }

    /// Writes every record, snapshotting visible caches without releasing them.
    pub fn save(&mut self) {
        for cache in self.caches.values() {
            let snapshot = cache.snapshot();
            let _ = self.snapshots.insert(snapshot.cell(), snapshot);
        }
        self.dirty.extend(RecordKind::ALL);
        self.flush();
        debug!(
            snapshots = self.snapshots.len(),
            coins = self.ledger.total(),
            "session_saved"
        );
    }

    /// Discards all persisted and in-memory state and starts over at the
    /// configured spawn position.
    pub fn reset_all(&mut self, out_events: &mut Vec<Event>) {
        self.store.clear();
        self.ledger.clear();
        self.caches.clear();
        self.phases.clear();
        self.visible.clear();
        self.snapshots.clear();
        self.dirty.clear();

        let spawn = self.config.spawn_position;
        self.player = Player::at(spawn);
        info!(position = %spawn, "session_reset");
        out_events.push(Event::SessionReset);

        self.refresh(spawn, out_events);
        self.mark(RecordKind::PlayerPosition);
        self.mark(RecordKind::PlayerPath);
        self.flush();
    }

    fn move_player(&mut self, destination: Position, out_events: &mut Vec<Event>) {
        let from = self.player.position;
        self.player.position = destination;
        self.player.path.push(destination);
        self.mark(RecordKind::PlayerPosition);
        self.mark(RecordKind::PlayerPath);
        debug!(from = %from, to = %destination, "player_moved");
        out_events.push(Event::PlayerMoved {
            from,
            to: destination,
        });

        self.refresh(destination, out_events);
        self.flush();
    }

    fn refresh(&mut self, position: Position, out_events: &mut Vec<Event>) {
        let next = self.board.visible_cells(position);
        let next_set: HashSet<CellKey> = next.iter().copied().collect();
        let current: HashSet<CellKey> = self.visible.iter().copied().collect();

        let leaving: Vec<CellKey> = self
            .visible
            .iter()
            .copied()
            .filter(|key| !next_set.contains(key))
            .collect();
        for key in leaving {
            self.retire(key, out_events);
        }

        for key in &next {
            if !current.contains(key) {
                self.activate(*key, out_events);
            }
        }

        self.visible = next;
    }

    fn activate(&mut self, key: CellKey, out_events: &mut Vec<Event>) {
        let cell = self.board.address(key);
        let phase = self.phases.get(&key).copied();

        if phase == Some(CellPhase::Dormant { had_cache: false }) {
            let _ = self.phases.insert(key, CellPhase::ActiveNoCache);
            return;
        }

        if let Some(snapshot) = self.snapshots.get(&cell).copied() {
            self.restore_cache(key, snapshot, out_events);
        } else if self.generator.spawn_decision(cell) {
            self.spawn_cache(key, cell, out_events);
        } else {
            let _ = self.phases.insert(key, CellPhase::ActiveNoCache);
        }
    }

    fn restore_cache(&mut self, key: CellKey, snapshot: CacheSnapshot, out_events: &mut Vec<Event>) {
        let cell = snapshot.cell();
        let mut cache = Cache::restore(&snapshot);

        if self.ledger.knows_cache(cell) {
            let resident = resident_count(&self.ledger, cell);
            if resident != cache.coin_count() {
                warn!(
                    cell = %cell,
                    snapshot = cache.coin_count(),
                    ledger = resident,
                    "snapshot_reconciled_with_ledger"
                );
                cache = Cache::new(cell, resident);
            }
        } else {
            warn!(cell = %cell, coins = cache.coin_count(), "snapshot_coins_adopted");
            self.ledger.adopt(cell, cache.coin_count());
            self.mark(RecordKind::CoinLedger);
        }

        debug!(cell = %cell, coins = cache.coin_count(), "cache_restored");
        out_events.push(Event::CacheRestored {
            cell,
            coins: cache.coin_count(),
        });
        let _ = self.caches.insert(key, cache);
        let _ = self.phases.insert(key, CellPhase::ActiveWithCache);
    }

    fn spawn_cache(&mut self, key: CellKey, cell: CellAddress, out_events: &mut Vec<Event>) {
        if self.ledger.knows_cache(cell) {
            let coins = resident_count(&self.ledger, cell);
            warn!(cell = %cell, coins, "cache_rebuilt_from_ledger");
            out_events.push(Event::CacheRestored { cell, coins });
            let _ = self.caches.insert(key, Cache::new(cell, coins));
        } else {
            let coins = self.generator.initial_coin_count(cell);
            let _ = self.ledger.materialize(cell, coins);
            self.mark(RecordKind::CoinLedger);
            debug!(cell = %cell, coins, "cache_spawned");
            out_events.push(Event::CacheSpawned { cell, coins });
            let _ = self.caches.insert(key, Cache::new(cell, coins));
        }
        let _ = self.phases.insert(key, CellPhase::ActiveWithCache);
    }

    fn retire(&mut self, key: CellKey, out_events: &mut Vec<Event>) {
        match self.phases.get(&key).copied() {
            Some(CellPhase::ActiveWithCache) => {
                if let Some(cache) = self.caches.remove(&key) {
                    let snapshot = cache.snapshot();
                    let _ = self.snapshots.insert(snapshot.cell(), snapshot);
                    self.mark(RecordKind::CacheSnapshots);
                    debug!(cell = %cache.cell(), coins = cache.coin_count(), "cache_retired");
                    out_events.push(Event::CacheRetired {
                        cell: cache.cell(),
                        coins: cache.coin_count(),
                    });
                }
                let _ = self
                    .phases
                    .insert(key, CellPhase::Dormant { had_cache: true });
            }
            Some(CellPhase::ActiveNoCache) => {
                let _ = self
                    .phases
                    .insert(key, CellPhase::Dormant { had_cache: false });
            }
            Some(CellPhase::Dormant { .. }) | None => {}
        }
    }

    fn load(&mut self, out_events: &mut Vec<Event>) {
        let ledger_record = self.read::<LedgerRecord>(RecordKind::CoinLedger, out_events);
        let inventory = self.read::<Vec<CoinId>>(RecordKind::PlayerInventory, out_events);

        let ledger = match ledger_record.map(Ledger::from_record) {
            Some(Ok(ledger)) => Some(ledger),
            Some(Err(error)) => {
                reject(RecordKind::CoinLedger, error, out_events);
                None
            }
            None => None,
        };

        self.ledger = match (ledger, inventory) {
            (Some(mut ledger), Some(order)) => {
                if let Err(error) = ledger.reorder_inventory(&order) {
                    reject(RecordKind::PlayerInventory, error, out_events);
                    self.mark(RecordKind::PlayerInventory);
                }
                ledger
            }
            (Some(ledger), None) => ledger,
            (None, Some(order)) => match Ledger::from_inventory(&order) {
                Ok(ledger) => {
                    self.mark(RecordKind::CoinLedger);
                    ledger
                }
                Err(error) => {
                    reject(RecordKind::PlayerInventory, error, out_events);
                    Ledger::new()
                }
            },
            (None, None) => Ledger::new(),
        };

        if let Some(raw) = self.store.get(RecordKind::CacheSnapshots.key()) {
            match records::decode_snapshots(&raw) {
                Ok((snapshots, rejected)) => {
                    for snapshot in snapshots {
                        let _ = self.snapshots.insert(snapshot.cell(), snapshot);
                    }
                    for error in rejected {
                        reject(RecordKind::CacheSnapshots, error, out_events);
                    }
                }
                Err(error) => reject(RecordKind::CacheSnapshots, error, out_events),
            }
        }

        if let Some(position) = self.read::<Position>(RecordKind::PlayerPosition, out_events) {
            self.player.position = position;
        }
        self.player.path = match self.read::<Vec<Position>>(RecordKind::PlayerPath, out_events) {
            Some(path) if !path.is_empty() => path,
            _ => vec![self.player.position],
        };

        info!(
            coins = self.ledger.total(),
            held = self.ledger.held_count(),
            snapshots = self.snapshots.len(),
            position = %self.player.position,
            "session_loaded"
        );
    }

    fn read<T: DeserializeOwned>(
        &self,
        record: RecordKind,
        out_events: &mut Vec<Event>,
    ) -> Option<T> {
        let raw = self.store.get(record.key())?;
        match records::decode(record, &raw) {
            Ok(value) => Some(value),
            Err(error) => {
                reject(record, error, out_events);
                None
            }
        }
    }

    fn mark(&mut self, record: RecordKind) {
        let _ = self.dirty.insert(record);
    }

    fn flush(&mut self) {
        for record in std::mem::take(&mut self.dirty) {
            let encoded = match record {
                RecordKind::CoinLedger => records::encode(record, &self.ledger.to_record()),
                RecordKind::PlayerInventory => {
                    let held: Vec<CoinId> = self.ledger.inventory().collect();
                    records::encode(record, &held)
                }
                RecordKind::CacheSnapshots => records::encode_snapshots(&self.snapshots),
                RecordKind::PlayerPosition => records::encode(record, &self.player.position),
                RecordKind::PlayerPath => records::encode(record, &self.player.path),
            };

            match encoded {
                Ok(value) => self.store.set(record.key(), value),
                Err(error) => warn!(record = %record, error = %error, "record_encode_failed"),
            }
        }
    }
}

fn reject(record: RecordKind, reason: SnapshotError, out_events: &mut Vec<Event>) {
    warn!(record = %record, error = %reason, "record_rejected");
    out_events.push(Event::RecordRejected { record, reason });
}

fn resident_count(ledger: &Ledger, cell: CellAddress) -> u32 {
    u32::try_from(ledger.resident_count(cell)).unwrap_or(u32::MAX)
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::StepPlayer { direction } => world.on_player_move(direction, out_events),
        Command::RelocatePlayer { position } => world.on_location_found(position, out_events),
        Command::CollectCoin { cell } => match world.collect_from_cache(cell) {
            Ok(coin) => out_events.push(Event::CoinCollected {
                coin: coin.id(),
                cell,
            }),
            Err(reason) => out_events.push(Event::CollectRejected { cell, reason }),
        },
        Command::DepositCoin { cell } => match world.deposit_to_cache(cell) {
            Ok(coin) => out_events.push(Event::CoinDeposited {
                coin: coin.id(),
                cell,
            }),
            Err(reason) => out_events.push(Event::DepositRejected { cell, reason }),
        },
        Command::Save => {
            world.save();
            out_events.push(Event::SessionSaved);
        }
        Command::ResetAll => world.reset_all(out_events),
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use super::{Board, CellPhase, CellState, World};
    use geocoin_core::{CacheSnapshot, CellAddress, CellBounds, CoinId, Position, WorldConfig};

    /// Retrieves the welcome banner that adapters may display to players.
    #[must_use]
    pub fn welcome_banner(world: &World) -> &'static str {
        world.banner
    }

    /// Configuration the world was opened with.
    #[must_use]
    pub fn config(world: &World) -> &WorldConfig {
        &world.config
    }

    /// Provides read-only access to the cell registry.
    #[must_use]
    pub fn board(world: &World) -> &Board {
        &world.board
    }

    /// Current player position.
    #[must_use]
    pub fn player_position(world: &World) -> Position {
        world.player.position
    }

    /// Address of the cell the player stands in.
    #[must_use]
    pub fn player_cell(world: &World) -> CellAddress {
        world.board.address_for(world.player.position)
    }

    /// Every position the player has occupied, oldest first.
    #[must_use]
    pub fn player_path(world: &World) -> &[Position] {
        &world.player.path
    }

    /// Coins held by the player, oldest first.
    #[must_use]
    pub fn inventory(world: &World) -> Vec<CoinId> {
        world.ledger.inventory().collect()
    }

    /// Coins resident in the cache at `cell`, in collection order.
    #[must_use]
    pub fn resident_coins(world: &World, cell: CellAddress) -> Vec<CoinId> {
        world.ledger.residents(cell).collect()
    }

    /// Lifecycle state of `cell`.
    #[must_use]
    pub fn cell_state(world: &World, cell: CellAddress) -> CellState {
        let phase = world
            .board
            .lookup(cell)
            .and_then(|key| world.phases.get(&key));
        match phase {
            None => CellState::Unknown,
            Some(CellPhase::ActiveNoCache) => CellState::ActiveNoCache,
            Some(CellPhase::ActiveWithCache) => CellState::ActiveWithCache,
            Some(CellPhase::Dormant { .. }) => CellState::Dormant,
        }
    }

    /// Coin count of the visible cache at `cell`, if one is active.
    #[must_use]
    pub fn cache_coins(world: &World, cell: CellAddress) -> Option<u32> {
        world
            .board
            .lookup(cell)
            .and_then(|key| world.caches.get(&key))
            .map(super::Cache::coin_count)
    }

    /// Last snapshot stored for `cell`.
    #[must_use]
    pub fn stored_snapshot(world: &World, cell: CellAddress) -> Option<CacheSnapshot> {
        world.snapshots.get(&cell).copied()
    }

    /// Captures the visibility window in row-major order.
    #[must_use]
    pub fn visible_cells(world: &World) -> Vec<VisibleCell> {
        world
            .visible
            .iter()
            .map(|key| {
                let address = world.board.address(*key);
                VisibleCell {
                    address,
                    bounds: world.board.bounds_for(address),
                    coins: world.caches.get(key).map(super::Cache::coin_count),
                }
            })
            .collect()
    }

    /// Tallies the ledger against the cache records.
    #[must_use]
    pub fn ledger_totals(world: &World) -> LedgerTotals {
        let active: u64 = world
            .caches
            .values()
            .map(|cache| u64::from(cache.coin_count()))
            .sum();
        let dormant: u64 = world
            .snapshots
            .iter()
            .filter(|(cell, _)| {
                world
                    .board
                    .lookup(**cell)
                    .map_or(true, |key| !world.caches.contains_key(&key))
            })
            .map(|(_, snapshot)| u64::from(snapshot.coin_count()))
            .sum();

        LedgerTotals {
            minted: world.ledger.total(),
            resident: world.ledger.resident_total(),
            held: world.ledger.held_count(),
            cached: active + dormant,
        }
    }

    /// Immutable description of one cell inside the visibility window.
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct VisibleCell {
        /// Address of the cell.
        pub address: CellAddress,
        /// World-space rectangle covered by the cell.
        pub bounds: CellBounds,
        /// Coins in the cell's cache, or `None` when it hosts no cache.
        pub coins: Option<u32>,
    }

    /// Coin counts across the ledger partition and the cache records.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct LedgerTotals {
        /// Coins ever minted this session.
        pub minted: usize,
        /// Coins resident in any cache according to the ledger.
        pub resident: usize,
        /// Coins held by the player.
        pub held: usize,
        /// Sum of coin counts over active caches and stored snapshots.
        pub cached: u64,
    }
}
