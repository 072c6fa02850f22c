//! `gol-types` — shared data model for the distributed Game of Life engine.
//!
//! Consumed by `gol-net`, `gol-worker`, `gol-engine` and `gol-node`. Nothing
//! in here performs I/O; the one async item is the [`ComputeNode`] seam that
//! the broker dispatches bands through.

pub mod band;
pub mod config;
pub mod error;
pub mod grid;
pub mod node;
pub mod patterns;
pub mod run;

// ── Public re-exports ────────────────────────────────────────────────────────

pub use band::{split_rows, BandRequest, BandResult, RowRange};
pub use error::{GolError, Result};
pub use grid::{cell_count, Cell, Grid, ALIVE, DEAD};
pub use node::{ComputeNode, WorkerId};
pub use run::{Progress, RunParams, StartStatus};
