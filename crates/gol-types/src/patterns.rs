//! Seed patterns for building an initial live-cell set.
//!
//! Offsets wrap around the grid, so a pattern placed near an edge is split
//! across it exactly as the toroidal rule would see it.

use std::str::FromStr;

use crate::error::{GolError, Result};
use crate::grid::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Glider,
    Blinker,
    Block,
    RPentomino,
}

impl Pattern {
    /// Cell offsets relative to the pattern's top-left corner.
    pub fn offsets(&self) -> &'static [(usize, usize)] {
        match self {
            Self::Glider     => &[(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)],
            Self::Blinker    => &[(0, 1), (1, 1), (2, 1)],
            Self::Block      => &[(0, 0), (1, 0), (0, 1), (1, 1)],
            Self::RPentomino => &[(1, 0), (2, 0), (0, 1), (1, 1), (1, 2)],
        }
    }

    /// Live cells of the pattern placed at `(x, y)` on a `width × height`
    /// torus. Cells that wrap onto each other on tiny grids are deduplicated.
    pub fn place(&self, x: usize, y: usize, width: usize, height: usize) -> Result<Vec<Cell>> {
        if width == 0 || height == 0 {
            return Err(GolError::InvalidDimensions { width, height });
        }
        let mut cells: Vec<Cell> = self
            .offsets()
            .iter()
            .map(|&(dx, dy)| Cell::new((x % width + dx) % width, (y % height + dy) % height))
            .collect();
        cells.sort();
        cells.dedup();
        Ok(cells)
    }
}

impl FromStr for Pattern {
    type Err = GolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "glider"                     => Ok(Self::Glider),
            "blinker"                    => Ok(Self::Blinker),
            "block"                      => Ok(Self::Block),
            "r-pentomino" | "rpentomino" => Ok(Self::RPentomino),
            other => Err(GolError::UnknownPattern(other.to_string())),
        }
    }
}
