//! Text board notation
//!
//! Rows are lines, cells are separated by `|`, an occupied cell is a side
//! marker (`▲` or `▼`) followed by a proton count. Lines without `|` are
//! ignored, so layouts can be embedded in indented string literals.

use super::error::{Result, SimError};
use super::state::{Orb, Placement, Position, Side, valid_count};

/// Densely packed 5x5 opening
pub const HEAVY: &str = "
▲3|▲3|▲3|▲3|▲3
▲3|▲3|▲3|▲3|▲3
▲3|▲3|▲3|▼3|▲3
▼3|▼3|▼3|▼3|▼3
▼3|▼3|▼3|▼3|
";

/// Sparse 5x5 opening
pub const THING: &str = "
▲3|  |  |  |
  |  |  |▲3|
  |  |  |▼3|
  |  |  |  |
  |  |▼3|  |
";

/// Parse a layout into placements, row by row
pub fn parse_layout(text: &str) -> Result<Vec<Placement>> {
    let mut placements = Vec::new();
    for (row, line) in text.lines().filter(|l| l.contains('|')).enumerate() {
        for (col, cell) in line.split('|').enumerate() {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            placements.push(parse_cell(cell, Position::new(row, col))?);
        }
    }
    Ok(placements)
}

fn parse_cell(cell: &str, pos: Position) -> Result<Placement> {
    let mut chars = cell.chars();
    let (Some(marker), Some(digit), None) = (chars.next(), chars.next(), chars.next()) else {
        return Err(SimError::InvalidLayout(format!(
            "malformed cell {cell:?} at {pos}"
        )));
    };
    let side = Side::from_marker(marker).ok_or_else(|| {
        SimError::InvalidLayout(format!("unknown side marker {marker:?} at {pos}"))
    })?;
    let count = digit
        .to_digit(10)
        .and_then(|d| u8::try_from(d).ok())
        .filter(|&c| valid_count(c))
        .ok_or_else(|| SimError::InvalidLayout(format!("bad count {digit:?} at {pos}")))?;
    Ok(Placement::new(pos, count, side))
}

/// Render orbs as a layout. Cells holding several orbs (mid-cascade) show
/// the first one followed by `+`.
pub fn render_board<'a>(orbs: impl IntoIterator<Item = &'a Orb>, board_size: usize) -> String {
    let mut grid: Vec<Vec<Vec<&Orb>>> = vec![vec![Vec::new(); board_size]; board_size];
    let mut stray = Vec::new();
    for orb in orbs {
        match grid.get_mut(orb.pos.row).and_then(|r| r.get_mut(orb.pos.col)) {
            Some(cell) => cell.push(orb),
            None => stray.push(orb),
        }
    }

    let mut out = String::new();
    for row in &grid {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| match cell.as_slice() {
                [] => "  ".to_string(),
                [orb] => format!("{}{}", orb.side.marker(), orb.count),
                [orb, ..] => format!("{}{}+", orb.side.marker(), orb.count),
            })
            .collect();
        out.push_str(&cells.join("|"));
        out.push('\n');
    }
    for orb in stray {
        out.push_str(&format!("off-board {} at {}\n", orb.id, orb.pos));
    }
    out
}
