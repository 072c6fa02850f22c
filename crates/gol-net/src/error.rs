use std::io;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, NetError>;

impl From<NetError> for gol_types::GolError {
    fn from(e: NetError) -> Self {
        match e {
            NetError::Remote(message) => Self::Remote(message),
            other => Self::Network(other.to_string()),
        }
    }
}
