//! Row-count partitioning of the grid across the registered workers.
//!
//! Algorithm:
//! 1. Cap the band count at the grid height (each band needs ≥ 1 row).
//! 2. Give every band `⌊H / W⌋` rows; the last band absorbs the remainder.
//! 3. Attach one halo row above and below each band, chosen modulo `H`, so
//!    the top band sees the last row and the bottom band sees row 0.
//!
//! Bands are recomputed from scratch every turn. Adjacent bands copy their
//! shared boundary rows into their own windows, so no band depends on
//! another band's worker.

use gol_types::{split_rows, BandRequest, Grid, RowRange};

/// Contiguous, non-overlapping bands covering `[0, height)`, one per worker
/// in registry order. Returns fewer than `workers` bands when
/// `workers > height`.
pub fn plan_bands(height: usize, workers: usize) -> Vec<RowRange> {
    if workers == 0 {
        return Vec::new();
    }
    split_rows(height, workers)
}

/// Copy `range` plus its two halo rows out of `grid`.
pub fn context_window(grid: &Grid, range: RowRange) -> BandRequest {
    let height = grid.height();
    let above = (range.top + height - 1) % height;
    let below = range.bottom % height;

    let mut context = Vec::with_capacity((range.len() + 2) * grid.width());
    context.extend_from_slice(grid.row(above));
    context.extend_from_slice(grid.rows(range));
    context.extend_from_slice(grid.row(below));

    BandRequest {
        first_row: range.top,
        grid_height: height,
        width: grid.width(),
        context,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
