//! Text rendering of the player's visibility window.

use std::{collections::BTreeMap, fmt::Write as _};

use geocoin_world::{query, World};

const CELL_WIDTH: usize = 4;

/// Draws the visibility window with north at the top.
///
/// The player's cell shows `@`, caches show their coin count and empty cells
/// show `.`.
pub(crate) fn render(world: &World) -> String {
    let player = query::player_cell(world);
    let mut rows: BTreeMap<i32, Vec<String>> = BTreeMap::new();

    for cell in query::visible_cells(world) {
        let glyph = if cell.address == player {
            "@".to_owned()
        } else {
            cell.coins.map_or_else(|| ".".to_owned(), |coins| coins.to_string())
        };
        rows.entry(cell.address.i()).or_default().push(glyph);
    }

    let mut out = String::new();
    for (i, glyphs) in rows.iter().rev() {
        let _ = write!(out, "{i:>7} ");
        for glyph in glyphs {
            let _ = write!(out, "{glyph:>CELL_WIDTH$}");
        }
        out.push('\n');
    }
    out
}
