// The seam the broker dispatches bands through. Implemented by the remote
// `WorkerClient` (gol-net) and the in-process `LocalNode` (gol-worker).

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::band::{BandRequest, BandResult};
use crate::error::Result;

/// Registry identity of one worker connection. Assigned on registration and
/// never reused within a broker's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

#[async_trait]
pub trait ComputeNode: Send + Sync {
    /// Address or name used in log lines.
    fn label(&self) -> String;

    /// Compute the next state of every band row. Must not retain anything
    /// from `band` once it returns.
    async fn next_state(&self, band: BandRequest) -> Result<BandResult>;

    /// Ask the node's hosting process to exit.
    async fn shutdown(&self) -> Result<()>;
}
