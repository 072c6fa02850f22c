//! Request/response enums for the two RPC channels.
//!
//! ```text
//! controller ──BrokerRequest──▶ broker ──WorkerRequest──▶ worker
//! worker     ──Subscribe──────▶ broker      (broker dials back)
//! ```
//!
//! Every response enum carries an `Error` variant so a failed call still
//! gets a reply on the connection instead of a dropped socket.

use serde::{Deserialize, Serialize};

use gol_types::{BandRequest, BandResult, Cell, Grid, Progress, RunParams, StartStatus};

// ── Broker channel ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BrokerRequest {
    StartRun {
        params: RunParams,
        alive: Vec<Cell>,
    },
    GetWorld,
    GetProgress,
    IsFinished,
    Pause,
    Resume,
    IsPaused,
    Shutdown,
    /// Sent by a worker; the broker dials `callback_addr` to obtain the
    /// handle it will dispatch bands through.
    Subscribe {
        callback_addr: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BrokerResponse {
    Start(StartStatus),
    /// `grid` is `None` until the first run has started.
    World {
        grid: Option<Grid>,
        turn: u64,
    },
    Progress(Progress),
    Finished(bool),
    Paused {
        turn: u64,
    },
    Resumed,
    IsPaused(bool),
    ShuttingDown,
    Subscribed {
        worker_id: u64,
    },
    Error {
        message: String,
    },
}

impl BrokerRequest {
    /// Short operation name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartRun { .. }  => "StartRun",
            Self::GetWorld         => "GetWorld",
            Self::GetProgress      => "GetProgress",
            Self::IsFinished       => "IsFinished",
            Self::Pause            => "Pause",
            Self::Resume           => "Resume",
            Self::IsPaused         => "IsPaused",
            Self::Shutdown         => "Shutdown",
            Self::Subscribe { .. } => "Subscribe",
        }
    }
}

// ── Worker channel ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerRequest {
    NextState(BandRequest),
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerResponse {
    NextState(BandResult),
    ShuttingDown,
    Error { message: String },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
