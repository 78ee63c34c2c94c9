#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Geocoin engine.
//!
//! This crate defines the message surface that connects adapters and the
//! authoritative world. Adapters submit [`Command`] values describing player
//! intents, the world executes those commands via its `apply` entry point,
//! and then reports [`Event`] values describing every state change. Grid
//! addresses, coin identities and the cache snapshot codec live here so that
//! every crate agrees on their exact shape.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical banner emitted when the experience boots.
pub const WELCOME_BANNER: &str = "Welcome to Geocoin.";

/// Generator tag mixed into the key that decides a cache's starting coins.
pub const INITIAL_VALUE_TAG: &str = "initialValue";

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Moves the player one tile in the provided direction.
    StepPlayer {
        /// Direction of travel for the step.
        direction: Direction,
    },
    /// Places the player at an externally supplied position.
    RelocatePlayer {
        /// Position reported by the platform, e.g. a location fix.
        position: Position,
    },
    /// Moves one coin from the cache at `cell` into the player's inventory.
    CollectCoin {
        /// Address of the cache to collect from.
        cell: CellAddress,
    },
    /// Moves the oldest held coin from the inventory into the cache at `cell`.
    DepositCoin {
        /// Address of the cache receiving the coin.
        cell: CellAddress,
    },
    /// Writes every persisted record, snapshotting visible caches in place.
    Save,
    /// Clears all persisted records and in-memory state.
    ResetAll,
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Confirms that the player changed position.
    PlayerMoved {
        /// Position held before the move.
        from: Position,
        /// Position held after the move.
        to: Position,
    },
    /// A cell spawned a brand new cache and its coins were minted.
    CacheSpawned {
        /// Address of the spawning cell.
        cell: CellAddress,
        /// Number of coins minted into the cache.
        coins: u32,
    },
    /// A cache re-entered visibility and was rebuilt from its snapshot.
    CacheRestored {
        /// Address of the restored cache.
        cell: CellAddress,
        /// Coin count carried by the restored cache.
        coins: u32,
    },
    /// A cache left visibility; its snapshot was stored and memory released.
    CacheRetired {
        /// Address of the retired cache.
        cell: CellAddress,
        /// Coin count captured in the stored snapshot.
        coins: u32,
    },
    /// A coin moved from a cache into the player's inventory.
    CoinCollected {
        /// Identity of the moved coin.
        coin: CoinId,
        /// Cache the coin left.
        cell: CellAddress,
    },
    /// A coin moved from the player's inventory into a cache.
    CoinDeposited {
        /// Identity of the moved coin.
        coin: CoinId,
        /// Cache that received the coin.
        cell: CellAddress,
    },
    /// A collect request was refused; no state changed.
    CollectRejected {
        /// Address named by the request.
        cell: CellAddress,
        /// Reason the request failed.
        reason: TransferError,
    },
    /// A deposit request was refused; no state changed.
    DepositRejected {
        /// Address named by the request.
        cell: CellAddress,
        /// Reason the request failed.
        reason: TransferError,
    },
    /// A persisted record could not be decoded and was ignored.
    RecordRejected {
        /// Record that failed to load.
        record: RecordKind,
        /// Decoding failure.
        reason: SnapshotError,
    },
    /// Every persisted record was written.
    SessionSaved,
    /// All persisted and in-memory state was discarded.
    SessionReset,
}

/// Cardinal movement directions available to the player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Movement toward increasing latitude.
    North,
    /// Movement toward increasing longitude.
    East,
    /// Movement toward decreasing latitude.
    South,
    /// Movement toward decreasing longitude.
    West,
}

impl Direction {
    /// Unit offset of the direction expressed as `(lat, lng)` tile steps.
    #[must_use]
    pub const fn unit_offset(self) -> (i32, i32) {
        match self {
            Self::North => (1, 0),
            Self::East => (0, 1),
            Self::South => (-1, 0),
            Self::West => (0, -1),
        }
    }
}

/// Continuous world coordinate measured in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    lat: f64,
    lng: f64,
}

impl Position {
    /// Creates a position from latitude and longitude.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Latitude of the position; drives the `i` grid axis.
    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude of the position; drives the `j` grid axis.
    #[must_use]
    pub const fn lng(&self) -> f64 {
        self.lng
    }

    /// Returns the position shifted by whole tiles in the given direction.
    #[must_use]
    pub fn stepped(self, direction: Direction, tile_width: f64) -> Self {
        let (d_lat, d_lng) = direction.unit_offset();
        Self {
            lat: self.lat + f64::from(d_lat) * tile_width,
            lng: self.lng + f64::from(d_lng) * tile_width,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lng)
    }
}

/// Address of a single grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellAddress {
    i: i32,
    j: i32,
}

impl CellAddress {
    /// Creates a new cell address.
    #[must_use]
    pub const fn new(i: i32, j: i32) -> Self {
        Self { i, j }
    }

    /// Index along the latitude axis.
    #[must_use]
    pub const fn i(&self) -> i32 {
        self.i
    }

    /// Index along the longitude axis.
    #[must_use]
    pub const fn j(&self) -> i32 {
        self.j
    }

    /// Computes the Chebyshev distance between two addresses.
    #[must_use]
    pub fn chebyshev_distance(self, other: CellAddress) -> u32 {
        self.i.abs_diff(other.i).max(self.j.abs_diff(other.j))
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.i, self.j)
    }
}

/// Axis-aligned rectangle covered by a cell, in world coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellBounds {
    min: Position,
    max: Position,
}

impl CellBounds {
    /// Creates bounds from the south-west and north-east corners.
    #[must_use]
    pub const fn new(min: Position, max: Position) -> Self {
        Self { min, max }
    }

    /// South-west corner.
    #[must_use]
    pub const fn min(&self) -> Position {
        self.min
    }

    /// North-east corner.
    #[must_use]
    pub const fn max(&self) -> Position {
        self.max
    }

    /// Reports whether the position lies inside the half-open rectangle.
    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        position.lat() >= self.min.lat()
            && position.lat() < self.max.lat()
            && position.lng() >= self.min.lng()
            && position.lng() < self.max.lng()
    }
}

/// Lifetime identity of a coin: the cell that minted it plus a serial.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CoinId {
    origin: CellAddress,
    serial: u32,
}

impl CoinId {
    /// Creates a coin identity.
    #[must_use]
    pub const fn new(origin: CellAddress, serial: u32) -> Self {
        Self { origin, serial }
    }

    /// Cell where the coin was first generated.
    #[must_use]
    pub const fn origin(&self) -> CellAddress {
        self.origin
    }

    /// Serial disambiguating coins minted in the same cell.
    #[must_use]
    pub const fn serial(&self) -> u32 {
        self.serial
    }
}

impl fmt::Display for CoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.origin.i, self.origin.j, self.serial)
    }
}

/// Where a coin currently rests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoinLocation {
    /// Resident inside the cache at the given address.
    Cache(CellAddress),
    /// Held in the player's inventory.
    Player,
}

/// A single collectible coin and its current location.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    id: CoinId,
    location: CoinLocation,
}

impl Coin {
    /// Creates a coin record.
    #[must_use]
    pub const fn new(id: CoinId, location: CoinLocation) -> Self {
        Self { id, location }
    }

    /// Lifetime identity of the coin.
    #[must_use]
    pub const fn id(&self) -> CoinId {
        self.id
    }

    /// Current location of the coin.
    #[must_use]
    pub const fn location(&self) -> CoinLocation {
        self.location
    }
}

/// Immutable capture of a cache's full state used for persistence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheSnapshot {
    i: i32,
    j: i32,
    #[serde(rename = "numCoins")]
    coin_count: u32,
}

impl CacheSnapshot {
    /// Creates a snapshot for the cache at `cell` holding `coin_count` coins.
    #[must_use]
    pub const fn new(cell: CellAddress, coin_count: u32) -> Self {
        Self {
            i: cell.i(),
            j: cell.j(),
            coin_count,
        }
    }

    /// Address of the captured cache.
    #[must_use]
    pub const fn cell(&self) -> CellAddress {
        CellAddress::new(self.i, self.j)
    }

    /// Coin count captured in the snapshot.
    #[must_use]
    pub const fn coin_count(&self) -> u32 {
        self.coin_count
    }

    /// Encodes the snapshot as a compact JSON object.
    #[must_use]
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("cache snapshot serialization never fails")
    }

    /// Decodes a snapshot previously produced by [`CacheSnapshot::encode`].
    ///
    /// Each field may be a JSON integer or a string holding an integer.
    pub fn decode(value: &str) -> Result<Self, SnapshotError> {
        let wire: SnapshotWire = serde_json::from_str(value.trim())
            .map_err(|error| SnapshotError::malformed(format!("cache snapshot: {error}")))?;

        let i = wire.i.resolve("i")?;
        let j = wire.j.resolve("j")?;
        let coins = wire.num_coins.resolve("numCoins")?;

        let i = i32::try_from(i)
            .map_err(|_| SnapshotError::malformed(format!("cache snapshot: i={i} out of range")))?;
        let j = i32::try_from(j)
            .map_err(|_| SnapshotError::malformed(format!("cache snapshot: j={j} out of range")))?;
        let coin_count = u32::try_from(coins).map_err(|_| {
            SnapshotError::malformed(format!("cache snapshot: numCoins={coins} out of range"))
        })?;

        Ok(Self { i, j, coin_count })
    }
}

#[derive(Deserialize)]
struct SnapshotWire {
    i: WireInteger,
    j: WireInteger,
    #[serde(rename = "numCoins")]
    num_coins: WireInteger,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireInteger {
    Number(i64),
    Float(f64),
    Text(String),
}

impl WireInteger {
    fn resolve(self, field: &str) -> Result<i64, SnapshotError> {
        match self {
            Self::Number(value) => Ok(value),
            Self::Float(value) if value.fract() == 0.0 && value.abs() < 2f64.powi(63) => {
                Ok(value as i64)
            }
            Self::Float(value) => Err(SnapshotError::malformed(format!(
                "cache snapshot: {field}={value} is not an integer"
            ))),
            Self::Text(text) => text.trim().parse::<i64>().map_err(|_| {
                SnapshotError::malformed(format!("cache snapshot: {field}={text:?} is not an integer"))
            }),
        }
    }
}

/// Tunable parameters that shape the generated world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Edge length of a square cell, in degrees.
    pub tile_width: f64,
    /// Chebyshev radius, in cells, of the player's visibility window.
    pub visibility_radius: u32,
    /// Probability that a cell hosts a cache.
    pub spawn_probability: f64,
    /// Exclusive upper bound on a cache's starting coin count.
    pub max_initial_coins: u32,
    /// Seed mixed into every generator key; `0` reproduces the default world.
    pub world_seed: u64,
    /// Where a fresh or reset session places the player.
    pub spawn_position: Position,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tile_width: 1e-4,
            visibility_radius: 8,
            spawn_probability: 0.1,
            max_initial_coins: 100,
            world_seed: 0,
            spawn_position: Position::new(36.989_493_795_784_01, -122.062_771_285_485_04),
        }
    }
}

/// Independently loadable records kept in the durable store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    /// Ordered identities of the coins held by the player.
    PlayerInventory,
    /// One encoded snapshot per cache ever spawned.
    CacheSnapshots,
    /// Every coin record, resident and held.
    CoinLedger,
    /// Last known player position.
    PlayerPosition,
    /// Ordered positions visited by the player.
    PlayerPath,
}

impl RecordKind {
    /// Every record, in load order.
    pub const ALL: [RecordKind; 5] = [
        Self::CoinLedger,
        Self::PlayerInventory,
        Self::CacheSnapshots,
        Self::PlayerPosition,
        Self::PlayerPath,
    ];

    /// Key under which the record lives in the durable store.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::PlayerInventory => "player_inventory",
            Self::CacheSnapshots => "cache_snapshots",
            Self::CoinLedger => "coin_ledger",
            Self::PlayerPosition => "player_position",
            Self::PlayerPath => "player_path",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Reasons a coin transfer may be refused. A refused transfer never mutates state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
pub enum TransferError {
    /// The cache holds no coins.
    #[error("cache {cell} has no coins left to collect")]
    EmptyCache {
        /// Address of the empty cache.
        cell: CellAddress,
    },
    /// The player holds no coins.
    #[error("no coins held to deposit")]
    NoCoinsHeld,
    /// The address does not name a visible cache.
    #[error("no visible cache at {cell}")]
    NoActiveCache {
        /// Address named by the request.
        cell: CellAddress,
    },
    /// Applying the adjustment would drive the coin count negative.
    #[error("cache {cell} holds {available} coins; cannot apply {delta}")]
    InsufficientCoins {
        /// Address of the cache.
        cell: CellAddress,
        /// Requested adjustment.
        delta: i64,
        /// Coins available before the adjustment.
        available: u32,
    },
}

/// Persisted data could not be decoded.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// The payload does not have the expected shape.
    #[error("malformed snapshot: {reason}")]
    Malformed {
        /// Human-readable description of the defect.
        reason: String,
    },
}

impl SnapshotError {
    /// Convenience constructor for [`SnapshotError::Malformed`].
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CacheSnapshot, CellAddress, CellBounds, CoinId, CoinLocation, Direction, Position,
        SnapshotError, WorldConfig,
    };
    use serde::{de::DeserializeOwned, Serialize};

    fn assert_round_trip<T>(value: &T)
    where
        T: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        let bytes = bincode::serialize(value).expect("serialize");
        let restored: T = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(&restored, value);
    }

    #[test]
    fn chebyshev_distance_matches_expectation() {
        let origin = CellAddress::new(1, 1);
        let destination = CellAddress::new(4, -1);
        assert_eq!(origin.chebyshev_distance(destination), 3);
        assert_eq!(destination.chebyshev_distance(origin), 3);
    }

    #[test]
    fn coin_identity_distinguishes_origin_cells() {
        let first = CoinId::new(CellAddress::new(0, 0), 0);
        let second = CoinId::new(CellAddress::new(0, 1), 0);
        assert_ne!(first, second);
        assert_eq!(first.to_string(), "0:0#0");
        assert_eq!(second.to_string(), "0:1#0");
    }

    #[test]
    fn coin_id_round_trips_through_bincode() {
        assert_round_trip(&CoinId::new(CellAddress::new(-3, 7), 12));
    }

    #[test]
    fn coin_location_round_trips_through_bincode() {
        assert_round_trip(&CoinLocation::Cache(CellAddress::new(2, 3)));
        assert_round_trip(&CoinLocation::Player);
    }

    #[test]
    fn world_config_round_trips_through_bincode() {
        assert_round_trip(&WorldConfig::default());
    }

    #[test]
    fn stepping_moves_one_tile_per_direction() {
        let start = Position::new(1.0, 2.0);
        assert_eq!(start.stepped(Direction::North, 0.5), Position::new(1.5, 2.0));
        assert_eq!(start.stepped(Direction::South, 0.5), Position::new(0.5, 2.0));
        assert_eq!(start.stepped(Direction::East, 0.5), Position::new(1.0, 2.5));
        assert_eq!(start.stepped(Direction::West, 0.5), Position::new(1.0, 1.5));
    }

    #[test]
    fn bounds_are_half_open() {
        let bounds = CellBounds::new(Position::new(0.0, 0.0), Position::new(1.0, 1.0));
        assert!(bounds.contains(Position::new(0.0, 0.0)));
        assert!(bounds.contains(Position::new(0.999, 0.5)));
        assert!(!bounds.contains(Position::new(1.0, 0.5)));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let snapshot = CacheSnapshot::new(CellAddress::new(-4, 9), 37);
        let encoded = snapshot.encode();
        assert_eq!(encoded, r#"{"i":-4,"j":9,"numCoins":37}"#);
        assert_eq!(CacheSnapshot::decode(&encoded), Ok(snapshot));
    }

    #[test]
    fn snapshot_accepts_integer_strings() {
        let decoded = CacheSnapshot::decode(r#"{"i":"2","j":" 3 ","numCoins":"5"}"#)
            .expect("numeric strings decode");
        assert_eq!(decoded.cell(), CellAddress::new(2, 3));
        assert_eq!(decoded.coin_count(), 5);
    }

    #[test]
    fn snapshot_accepts_integral_floats() {
        let decoded = CacheSnapshot::decode(r#"{"i":2.0,"j":-3.0,"numCoins":"4"}"#)
            .expect("integral floats decode");
        assert_eq!(decoded.cell(), CellAddress::new(2, -3));
        assert_eq!(decoded.coin_count(), 4);

        for fractional in [
            r#"{"i":2.5,"j":3,"numCoins":1}"#,
            r#"{"i":2,"j":3,"numCoins":0.5}"#,
            r#"{"i":1e300,"j":3,"numCoins":1}"#,
        ] {
            let error = CacheSnapshot::decode(fractional).expect_err("not an integer");
            assert!(matches!(error, SnapshotError::Malformed { .. }));
        }
    }

    #[test]
    fn snapshot_rejects_missing_fields() {
        let error = CacheSnapshot::decode(r#"{"i":2,"j":3}"#).expect_err("missing numCoins");
        assert!(matches!(error, SnapshotError::Malformed { .. }));
    }

    #[test]
    fn snapshot_rejects_non_numeric_fields() {
        assert!(CacheSnapshot::decode(r#"{"i":"two","j":3,"numCoins":1}"#).is_err());
        assert!(CacheSnapshot::decode(r#"{"i":2,"j":3,"numCoins":true}"#).is_err());
        assert!(CacheSnapshot::decode("not json").is_err());
    }

    #[test]
    fn snapshot_rejects_negative_coin_count() {
        assert!(CacheSnapshot::decode(r#"{"i":2,"j":3,"numCoins":-1}"#).is_err());
    }
}
