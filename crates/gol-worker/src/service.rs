// Worker-side RPC handler.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gol_net::{RequestHandler, WorkerRequest, WorkerResponse};
use gol_types::ComputeNode;

use crate::node::LocalNode;

/// Serves the broker. Holds no grid state between calls.
pub struct WorkerService {
    node: LocalNode,
    shutdown: CancellationToken,
}

impl WorkerService {
    /// `shutdown` is cancelled when the broker asks this worker to exit.
    pub fn new(node: LocalNode, shutdown: CancellationToken) -> Self {
        Self { node, shutdown }
    }
}

#[async_trait]
impl RequestHandler for WorkerService {
    type Request = WorkerRequest;
    type Response = WorkerResponse;

    async fn handle(&self, request: WorkerRequest) -> WorkerResponse {
        match request {
            WorkerRequest::NextState(band) => {
                let first_row = band.first_row;
                let rows = band.band_height();
                match self.node.next_state(band).await {
                    Ok(result) => {
                        debug!(first_row, rows, "band computed");
                        WorkerResponse::NextState(result)
                    }
                    Err(e) => {
                        warn!(first_row, %e, "band rejected");
                        WorkerResponse::Error {
                            message: e.to_string(),
                        }
                    }
                }
            }
            WorkerRequest::Shutdown => {
                // The server writes this reply before the connection sees
                // the cancellation, and waits for other in-flight bands.
                info!("shutdown requested by broker");
                self.shutdown.cancel();
                WorkerResponse::ShuttingDown
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
