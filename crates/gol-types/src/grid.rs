// Dense toroidal grid plus the sparse cell encoding used at the controller
// boundary.

use serde::{Deserialize, Serialize};

use crate::band::RowRange;
use crate::error::{GolError, Result};

/// Byte value of a live cell. Matches the PGM encoding of the I/O layer.
pub const ALIVE: u8 = 255;
/// Byte value of a dead cell.
pub const DEAD: u8 = 0;

// ── Cell ─────────────────────────────────────────────────────────────────────

/// Coordinate of a live cell. Only used to move initial and final state
/// across the controller ↔ broker boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
}

impl Cell {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

// ── Grid ─────────────────────────────────────────────────────────────────────

/// Row-major `height × width` array of [`ALIVE`] / [`DEAD`] bytes.
///
/// Dimensions are fixed at construction and are always non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl Grid {
    /// An all-dead grid.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        let len = cell_count(width, height)?;
        Ok(Self {
            width,
            height,
            cells: vec![DEAD; len],
        })
    }

    /// Build a grid from the sparse live-cell encoding.
    ///
    /// Duplicate cells are harmless; any cell outside the grid is rejected.
    pub fn from_alive_cells(width: usize, height: usize, alive: &[Cell]) -> Result<Self> {
        let mut grid = Self::new(width, height)?;
        for cell in alive {
            if cell.x >= width || cell.y >= height {
                return Err(GolError::CellOutOfBounds {
                    x: cell.x,
                    y: cell.y,
                    width,
                    height,
                });
            }
            grid.set(cell.x, cell.y, true);
        }
        Ok(grid)
    }

    /// Wrap an existing dense buffer. The buffer length must be
    /// `width * height`.
    pub fn from_cells(width: usize, height: usize, cells: Vec<u8>) -> Result<Self> {
        let expected = cell_count(width, height)?;
        if cells.len() != expected {
            return Err(GolError::GridShape {
                expected,
                actual: cells.len(),
            });
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<u8> {
        self.cells
    }

    /// One row. Panics if `y >= height`.
    pub fn row(&self, y: usize) -> &[u8] {
        &self.cells[y * self.width..(y + 1) * self.width]
    }

    /// Contiguous rows `[range.top, range.bottom)`.
    pub fn rows(&self, range: RowRange) -> &[u8] {
        &self.cells[range.top * self.width..range.bottom * self.width]
    }

    pub fn is_alive(&self, x: usize, y: usize) -> bool {
        self.cells[y * self.width + x] == ALIVE
    }

    pub fn set(&mut self, x: usize, y: usize, alive: bool) {
        self.cells[y * self.width + x] = if alive { ALIVE } else { DEAD };
    }

    /// Live cells in row-major order.
    pub fn alive_cells(&self) -> Vec<Cell> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == ALIVE)
            .map(|(i, _)| Cell::new(i % self.width, i / self.width))
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == ALIVE).count()
    }

    // ── I/O naming ───────────────────────────────────────────────────────

    /// Key the image collaborator loads the initial world under.
    pub fn world_key(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Key for an intermediate or final save taken at `turn`.
    pub fn snapshot_key(&self, turn: u64) -> String {
        format!("{}x{}x{}", self.width, self.height, turn)
    }
}

/// `width * height`, or an error if either side is zero or the product
/// overflows.
pub fn cell_count(width: usize, height: usize) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(GolError::InvalidDimensions { width, height });
    }
    width
        .checked_mul(height)
        .ok_or(GolError::GridTooLarge { width, height })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
