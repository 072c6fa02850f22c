use gol_types::GolError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid state transition: {from} → {to}")]
    InvalidTransition { from: String, to: String },

    #[error("broker is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Grid(#[from] GolError),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, EngineError>;
