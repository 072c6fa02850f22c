//! Row ranges and the context-augmented band exchanged with workers.
//!
//! ```text
//! context row 0      ← halo: row above the band (wrapped at grid row 0)
//! context rows 1..=n ← the band itself, grid rows [first_row, first_row + n)
//! context row n + 1  ← halo: row below the band (wrapped at the last row)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{GolError, Result};

// ── Row Range ─────────────────────────────────────────────────────────────────

/// Half-open row range `[top, bottom)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowRange {
    pub top: usize,
    pub bottom: usize,
}

impl RowRange {
    pub fn new(top: usize, bottom: usize) -> Self {
        Self { top, bottom }
    }

    pub fn len(&self) -> usize {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.bottom <= self.top
    }
}

/// Split `[0, total)` into contiguous ranges.
///
/// `parts` is clamped to `[1, total]`. Every range holds `total / parts`
/// rows except the last, which also absorbs the remainder. Returns an empty
/// vector when `total == 0`.
pub fn split_rows(total: usize, parts: usize) -> Vec<RowRange> {
    if total == 0 {
        return Vec::new();
    }
    let parts = parts.clamp(1, total);
    let step = total / parts;

    let mut ranges = Vec::with_capacity(parts);
    let mut top = 0;
    for i in 0..parts {
        let bottom = if i == parts - 1 { total } else { top + step };
        ranges.push(RowRange::new(top, bottom));
        top = bottom;
    }
    ranges
}

// ── Band Request ──────────────────────────────────────────────────────────────

/// One band of rows plus a single halo row above and below.
///
/// Self-contained: the worker needs nothing else to compute every row of
/// the band, and keeps nothing once it has answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandRequest {
    /// Absolute grid row of the first band row (context row 1).
    pub first_row: usize,
    /// Height of the whole grid.
    pub grid_height: usize,
    /// Row width in cells.
    pub width: usize,
    /// `(band_height + 2) × width` cells, row-major.
    pub context: Vec<u8>,
}

impl BandRequest {
    /// Number of rows in the context window, halo included.
    pub fn context_height(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.context.len() / self.width
        }
    }

    /// Number of rows the worker must return.
    pub fn band_height(&self) -> usize {
        self.context_height().saturating_sub(2)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 {
            return Err(GolError::BandShape("zero width".into()));
        }
        if self.context.len() % self.width != 0 {
            return Err(GolError::BandShape(format!(
                "{} cells is not a whole number of {}-wide rows",
                self.context.len(),
                self.width
            )));
        }
        if self.context_height() < 3 {
            return Err(GolError::BandShape(format!(
                "context window has {} rows, need at least 3",
                self.context_height()
            )));
        }
        Ok(())
    }
}

// ── Band Result ───────────────────────────────────────────────────────────────

/// Next-state rows for a band. Never includes the halo rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandResult {
    pub width: usize,
    pub rows: Vec<u8>,
}

impl BandResult {
    pub fn height(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.rows.len() / self.width
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
