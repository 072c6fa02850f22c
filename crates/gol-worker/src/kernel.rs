//! Neighbour-count rule over a context window.
//!
//! Vertical neighbours always come from the window: the broker has already
//! wrapped the halo rows at the grid's top and bottom, so a band row never
//! indexes outside `context`. Horizontal neighbours wrap only in columns
//! `0` and `width - 1`; every other column indexes its row directly.

use gol_types::{BandRequest, BandResult, Grid, Result, RowRange, ALIVE, DEAD};

#[inline]
fn live(cell: u8) -> u8 {
    (cell == ALIVE) as u8
}

/// Conway's rule: survive on 2 or 3, birth on exactly 3.
#[inline]
pub fn next_cell(current: u8, neighbours: u8) -> u8 {
    match (current == ALIVE, neighbours) {
        (true, 2 | 3) | (false, 3) => ALIVE,
        _ => DEAD,
    }
}

#[inline]
fn count_inner(above: &[u8], here: &[u8], below: &[u8], x: usize) -> u8 {
    live(above[x - 1]) + live(above[x]) + live(above[x + 1])
        + live(here[x - 1]) + live(here[x + 1])
        + live(below[x - 1]) + live(below[x]) + live(below[x + 1])
}

#[inline]
fn count_wrapped(above: &[u8], here: &[u8], below: &[u8], x: usize) -> u8 {
    let width = here.len();
    let left = (x + width - 1) % width;
    let right = (x + 1) % width;
    live(above[left]) + live(above[x]) + live(above[right])
        + live(here[left]) + live(here[right])
        + live(below[left]) + live(below[x]) + live(below[right])
}

fn step_row(above: &[u8], here: &[u8], below: &[u8], out: &mut [u8]) {
    let width = here.len();
    for x in 0..width {
        let neighbours = if x == 0 || x == width - 1 {
            count_wrapped(above, here, below, x)
        } else {
            count_inner(above, here, below, x)
        };
        out[x] = next_cell(here[x], neighbours);
    }
}

/// Compute band rows `rows` (band-relative, so band row 0 is context row 1)
/// into `out`, which must hold exactly `rows.len() * width` cells.
pub fn step_rows(context: &[u8], width: usize, rows: RowRange, out: &mut [u8]) {
    debug_assert_eq!(out.len(), rows.len() * width);
    for (i, r) in (rows.top..rows.bottom).enumerate() {
        let above = &context[r * width..(r + 1) * width];
        let here = &context[(r + 1) * width..(r + 2) * width];
        let below = &context[(r + 2) * width..(r + 3) * width];
        step_row(above, here, below, &mut out[i * width..(i + 1) * width]);
    }
}

/// Single-threaded band computation.
pub fn step_band(band: &BandRequest) -> Result<BandResult> {
    band.validate()?;
    let height = band.band_height();
    let mut rows = vec![DEAD; height * band.width];
    step_rows(&band.context, band.width, RowRange::new(0, height), &mut rows);
    Ok(BandResult {
        width: band.width,
        rows,
    })
}

/// Sequential whole-grid reference: every neighbour index taken modulo the
/// grid dimensions. Results from any band / strip split must equal this.
pub fn step_grid(grid: &Grid) -> Grid {
    let (width, height) = (grid.width(), grid.height());
    let cells = grid.cells();
    let mut next = vec![DEAD; cells.len()];

    for y in 0..height {
        for x in 0..width {
            let mut neighbours = 0u8;
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let ny = (y as isize + dy).rem_euclid(height as isize) as usize;
                    let nx = (x as isize + dx).rem_euclid(width as isize) as usize;
                    neighbours += live(cells[ny * width + nx]);
                }
            }
            next[y * width + x] = next_cell(cells[y * width + x], neighbours);
        }
    }

    Grid::from_cells(width, height, next).unwrap_or_else(|_| grid.clone())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
