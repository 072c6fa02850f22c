// gol-net::client — typed RPC clients for the broker and worker channels.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use gol_types::{
    BandRequest, BandResult, Cell, ComputeNode, Grid, Progress, RunParams, StartStatus, WorkerId,
};

use crate::codec;
use crate::error::{NetError, Result};
use crate::protocol::{BrokerRequest, BrokerResponse, WorkerRequest, WorkerResponse};

// ── RpcClient ─────────────────────────────────────────────────────────────────

/// One TCP connection carrying `Req → Resp` calls, one at a time.
pub struct RpcClient<Req, Resp> {
    addr: String,
    stream: Mutex<TcpStream>,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> RpcClient<Req, Resp>
where
    Req: Serialize + Sync,
    Resp: DeserializeOwned,
{
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| NetError::Timeout(timeout))?
            .map_err(|source| NetError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        Ok(Self {
            addr: addr.to_string(),
            stream: Mutex::new(stream),
            _marker: PhantomData,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send `request` and wait for its response.
    pub async fn call(&self, request: &Req) -> Result<Resp> {
        let mut stream = self.stream.lock().await;
        codec::write_message(&mut *stream, request).await?;
        codec::read_message(&mut *stream).await
    }
}

// ── BrokerClient ──────────────────────────────────────────────────────────────

/// Controller- and worker-side handle to a broker.
pub struct BrokerClient {
    rpc: RpcClient<BrokerRequest, BrokerResponse>,
}

impl BrokerClient {
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            rpc: RpcClient::connect(addr, timeout).await?,
        })
    }

    pub fn addr(&self) -> &str {
        self.rpc.addr()
    }

    async fn call(&self, request: BrokerRequest) -> Result<BrokerResponse> {
        match self.rpc.call(&request).await? {
            BrokerResponse::Error { message } => Err(NetError::Remote(message)),
            other => Ok(other),
        }
    }

    pub async fn start_run(&self, params: RunParams, alive: Vec<Cell>) -> Result<StartStatus> {
        match self.call(BrokerRequest::StartRun { params, alive }).await? {
            BrokerResponse::Start(status) => Ok(status),
            other => Err(unexpected("StartRun", &other)),
        }
    }

    pub async fn world(&self) -> Result<(Option<Grid>, u64)> {
        match self.call(BrokerRequest::GetWorld).await? {
            BrokerResponse::World { grid, turn } => Ok((grid, turn)),
            other => Err(unexpected("GetWorld", &other)),
        }
    }

    pub async fn progress(&self) -> Result<Progress> {
        match self.call(BrokerRequest::GetProgress).await? {
            BrokerResponse::Progress(progress) => Ok(progress),
            other => Err(unexpected("GetProgress", &other)),
        }
    }

    pub async fn is_finished(&self) -> Result<bool> {
        match self.call(BrokerRequest::IsFinished).await? {
            BrokerResponse::Finished(done) => Ok(done),
            other => Err(unexpected("IsFinished", &other)),
        }
    }

    /// Returns the turn the broker's loop is parked at.
    pub async fn pause(&self) -> Result<u64> {
        match self.call(BrokerRequest::Pause).await? {
            BrokerResponse::Paused { turn } => Ok(turn),
            other => Err(unexpected("Pause", &other)),
        }
    }

    pub async fn resume(&self) -> Result<()> {
        match self.call(BrokerRequest::Resume).await? {
            BrokerResponse::Resumed => Ok(()),
            other => Err(unexpected("Resume", &other)),
        }
    }

    pub async fn is_paused(&self) -> Result<bool> {
        match self.call(BrokerRequest::IsPaused).await? {
            BrokerResponse::IsPaused(paused) => Ok(paused),
            other => Err(unexpected("IsPaused", &other)),
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        match self.call(BrokerRequest::Shutdown).await? {
            BrokerResponse::ShuttingDown => Ok(()),
            other => Err(unexpected("Shutdown", &other)),
        }
    }

    /// Register `callback_addr` as a worker. The broker dials it back
    /// before answering.
    pub async fn subscribe(&self, callback_addr: &str) -> Result<WorkerId> {
        let request = BrokerRequest::Subscribe {
            callback_addr: callback_addr.to_string(),
        };
        match self.call(request).await? {
            BrokerResponse::Subscribed { worker_id } => Ok(WorkerId(worker_id)),
            other => Err(unexpected("Subscribe", &other)),
        }
    }
}

// ── WorkerClient ──────────────────────────────────────────────────────────────

/// Broker-side handle to one worker, obtained by dialling the address the
/// worker subscribed with.
pub struct WorkerClient {
    rpc: RpcClient<WorkerRequest, WorkerResponse>,
}

impl WorkerClient {
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            rpc: RpcClient::connect(addr, timeout).await?,
        })
    }

    async fn call(&self, request: WorkerRequest) -> Result<WorkerResponse> {
        match self.rpc.call(&request).await? {
            WorkerResponse::Error { message } => Err(NetError::Remote(message)),
            other => Ok(other),
        }
    }
}

#[async_trait]
impl ComputeNode for WorkerClient {
    fn label(&self) -> String {
        self.rpc.addr().to_string()
    }

    async fn next_state(&self, band: BandRequest) -> gol_types::Result<BandResult> {
        match self.call(WorkerRequest::NextState(band)).await? {
            WorkerResponse::NextState(result) => Ok(result),
            other => Err(unexpected("NextState", &other).into()),
        }
    }

    async fn shutdown(&self) -> gol_types::Result<()> {
        match self.call(WorkerRequest::Shutdown).await? {
            WorkerResponse::ShuttingDown => Ok(()),
            other => Err(unexpected("Shutdown", &other).into()),
        }
    }
}

fn unexpected(op: &str, response: &impl std::fmt::Debug) -> NetError {
    NetError::UnexpectedResponse(format!("{op} answered with {response:?}"))
}
