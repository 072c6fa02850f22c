// Run parameters and the status values returned across the controller
// boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Parameters of a single run. `width × height` is fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
    pub turns: u64,
    pub width: usize,
    pub height: usize,
}

/// Pull-based progress snapshot: completed turns and the live-cell count of
/// the grid those turns produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub turn: u64,
    pub alive: usize,
}

/// Outcome of a `StartRun` request. Never an error: a duplicate or invalid
/// request is reported and leaves the broker untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartStatus {
    Started,
    AlreadyRunning,
    Rejected { reason: String },
}

impl fmt::Display for StartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started            => write!(f, "started"),
            Self::AlreadyRunning     => write!(f, "already running"),
            Self::Rejected { reason } => write!(f, "rejected: {reason}"),
        }
    }
}
