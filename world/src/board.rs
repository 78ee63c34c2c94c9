//! Flyweight registry mapping continuous positions onto canonical grid cells.

use std::collections::HashMap;

use geocoin_core::{CellAddress, CellBounds, Position};

/// Largest cell index a position maps to on either axis. Positions beyond it
/// land on the edge cell, which leaves room for any window offset without
/// leaving `i32`.
pub const MAX_CELL_INDEX: i32 = i32::MAX / 2;

/// Canonical handle for a cell address interned by a [`Board`].
///
/// Two handles from the same board are equal exactly when their addresses
/// are equal, so handles can stand in for addresses in identity-keyed maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey(u32);

impl CellKey {
    /// Retrieves the arena slot backing the handle.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Grid of fixed-size square cells with a memoizing identity registry.
#[derive(Debug)]
pub struct Board {
    tile_width: f64,
    visibility_radius: u32,
    known_cells: HashMap<CellAddress, CellKey>,
    addresses: Vec<CellAddress>,
}

impl Board {
    /// Creates an empty board with the provided cell size and visibility radius.
    #[must_use]
    pub fn new(tile_width: f64, visibility_radius: u32) -> Self {
        Self {
            tile_width,
            visibility_radius,
            known_cells: HashMap::new(),
            addresses: Vec::new(),
        }
    }

    /// Edge length of a cell in world units.
    #[must_use]
    pub const fn tile_width(&self) -> f64 {
        self.tile_width
    }

    /// Chebyshev radius used by [`Board::visible_cells`].
    #[must_use]
    pub const fn visibility_radius(&self) -> u32 {
        self.visibility_radius
    }

    /// Number of distinct addresses interned so far.
    #[must_use]
    pub fn known_cells(&self) -> usize {
        self.addresses.len()
    }

    /// Returns the canonical key for `address`, registering it on first sight.
    pub fn intern(&mut self, address: CellAddress) -> CellKey {
        if let Some(key) = self.known_cells.get(&address) {
            return *key;
        }

        let key = CellKey(self.addresses.len() as u32);
        self.addresses.push(address);
        let _ = self.known_cells.insert(address, key);
        key
    }

    /// Returns the canonical key for `address` if it was interned before.
    #[must_use]
    pub fn lookup(&self, address: CellAddress) -> Option<CellKey> {
        self.known_cells.get(&address).copied()
    }

    /// Resolves a key produced by this board back into its address.
    ///
    /// # Panics
    ///
    /// Panics when `key` was minted by a different board.
    #[must_use]
    pub fn address(&self, key: CellKey) -> CellAddress {
        self.addresses[key.0 as usize]
    }

    /// Address of the cell containing `position`, without interning it.
    ///
    /// Each axis index is clamped to `-MAX_CELL_INDEX..=MAX_CELL_INDEX`; a
    /// non-finite coordinate maps to the nearest edge, or to `0` for NaN.
    #[must_use]
    pub fn address_for(&self, position: Position) -> CellAddress {
        CellAddress::new(
            self.axis_index(position.lat()),
            self.axis_index(position.lng()),
        )
    }

    fn axis_index(&self, coordinate: f64) -> i32 {
        let index = (coordinate / self.tile_width).floor();
        if index.is_nan() {
            return 0;
        }
        index.clamp(-f64::from(MAX_CELL_INDEX), f64::from(MAX_CELL_INDEX)) as i32
    }

    /// Canonical key of the cell containing `position`.
    pub fn cell_for(&mut self, position: Position) -> CellKey {
        let address = self.address_for(position);
        self.intern(address)
    }

    /// World-space rectangle covered by `address`.
    #[must_use]
    pub fn bounds_for(&self, address: CellAddress) -> CellBounds {
        let width = self.tile_width;
        CellBounds::new(
            Position::new(f64::from(address.i()) * width, f64::from(address.j()) * width),
            Position::new(
                (f64::from(address.i()) + 1.0) * width,
                (f64::from(address.j()) + 1.0) * width,
            ),
        )
    }

    /// Every cell within Chebyshev distance `radius` of the cell containing
    /// `position`, in row-major order. Always `(2 * radius + 1)^2` distinct
    /// keys; `radius` is capped at [`MAX_CELL_INDEX`].
    pub fn cells_near(&mut self, position: Position, radius: u32) -> Vec<CellKey> {
        let origin = self.address_for(position);
        let reach = i32::try_from(radius).map_or(MAX_CELL_INDEX, |reach| reach.min(MAX_CELL_INDEX));
        let side = 2 * reach as usize + 1;
        let mut cells = Vec::with_capacity(side * side);

        for di in -reach..=reach {
            for dj in -reach..=reach {
                let address = CellAddress::new(origin.i() + di, origin.j() + dj);
                cells.push(self.intern(address));
            }
        }

        cells
    }

    /// The player's visibility window around `position`.
    pub fn visible_cells(&mut self, position: Position) -> Vec<CellKey> {
        self.cells_near(position, self.visibility_radius)
    }
}
