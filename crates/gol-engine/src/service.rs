// Broker-side RPC handler: maps controller and worker requests onto Broker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use gol_net::{BrokerRequest, BrokerResponse, RequestHandler, WorkerClient};

use crate::broker::Broker;

pub struct BrokerService {
    broker: Broker,
    dial_timeout: Duration,
}

impl BrokerService {
    pub fn new(broker: Broker) -> Self {
        let dial_timeout = broker.config().dial_timeout;
        Self {
            broker,
            dial_timeout,
        }
    }

    /// Dial a subscribing worker back and register the connection.
    async fn subscribe(&self, callback_addr: String) -> BrokerResponse {
        match WorkerClient::connect(&callback_addr, self.dial_timeout).await {
            Ok(client) => {
                let id = self.broker.register(Arc::new(client)).await;
                BrokerResponse::Subscribed { worker_id: id.0 }
            }
            Err(e) => {
                warn!(%callback_addr, error = %e, "could not dial subscribing worker");
                BrokerResponse::Error {
                    message: format!("could not dial {callback_addr}: {e}"),
                }
            }
        }
    }
}

#[async_trait]
impl RequestHandler for BrokerService {
    type Request = BrokerRequest;
    type Response = BrokerResponse;

    async fn handle(&self, request: BrokerRequest) -> BrokerResponse {
        debug!(op = request.name(), "broker request");
        match request {
            BrokerRequest::StartRun { params, alive } => {
                let status = self.broker.start_run(params, &alive).await;
                info!(%status, turns = params.turns, width = params.width, height = params.height, "start run");
                BrokerResponse::Start(status)
            }
            BrokerRequest::GetWorld => match self.broker.world() {
                Some(snapshot) => BrokerResponse::World {
                    grid: Some(snapshot.grid.clone()),
                    turn: snapshot.turn,
                },
                None => BrokerResponse::World {
                    grid: None,
                    turn: 0,
                },
            },
            BrokerRequest::GetProgress => BrokerResponse::Progress(self.broker.progress()),
            BrokerRequest::IsFinished => BrokerResponse::Finished(self.broker.is_finished().await),
            BrokerRequest::Pause => match self.broker.pause().await {
                Ok(turn) => BrokerResponse::Paused { turn },
                Err(e) => BrokerResponse::Error {
                    message: e.to_string(),
                },
            },
            BrokerRequest::Resume => {
                self.broker.resume().await;
                BrokerResponse::Resumed
            }
            BrokerRequest::IsPaused => BrokerResponse::IsPaused(self.broker.is_paused()),
            BrokerRequest::Shutdown => {
                info!("shutdown requested by controller");
                self.broker.shutdown().await;
                BrokerResponse::ShuttingDown
            }
            BrokerRequest::Subscribe { callback_addr } => self.subscribe(callback_addr).await,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
