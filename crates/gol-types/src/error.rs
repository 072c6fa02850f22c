// Global error type shared by every crate that handles grids or bands.

#[derive(Debug, thiserror::Error)]
pub enum GolError {
    // ── Data model ────────────────────────────────────────────────────────

    #[error("invalid grid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("grid of {width}x{height} cells is too large")]
    GridTooLarge { width: usize, height: usize },

    #[error("cell ({x}, {y}) lies outside a {width}x{height} grid")]
    CellOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },

    #[error("grid buffer holds {actual} cells, expected {expected}")]
    GridShape { expected: usize, actual: usize },

    #[error("malformed band: {0}")]
    BandShape(String),

    #[error("unknown pattern: {0}")]
    UnknownPattern(String),

    // ── Remote calls ──────────────────────────────────────────────────────

    #[error("network error: {0}")]
    Network(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GolError>;
