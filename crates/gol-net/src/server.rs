// gol-net::server — accept loop shared by the broker and worker processes.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::codec::{self, MAX_FRAME_BYTES};
use crate::error::{NetError, Result};

// ── RequestHandler ────────────────────────────────────────────────────────────

/// Application side of an RPC channel. One call per decoded request; the
/// returned response is written back on the same connection.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    type Request: DeserializeOwned + Send;
    type Response: Serialize + Send + Sync;

    async fn handle(&self, request: Self::Request) -> Self::Response;
}

// ── RpcServer ─────────────────────────────────────────────────────────────────

pub struct RpcServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl RpcServer {
    /// Bind the listen address. Failure here is a configuration error and
    /// the caller is expected to exit.
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|source| NetError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until `shutdown` is cancelled.
    ///
    /// Once cancelled, no new connections are accepted and each connection
    /// stops after the request it is currently handling has been answered.
    /// Returns when every connection task has finished.
    pub async fn serve<H: RequestHandler>(self, handler: Arc<H>, shutdown: CancellationToken) {
        let tracker = TaskTracker::new();
        info!(addr = %self.local_addr, "rpc server listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "connection accepted");
                        tracker.spawn(serve_connection(
                            stream,
                            peer,
                            handler.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => warn!(%e, "accept failed"),
                },
            }
        }

        tracker.close();
        tracker.wait().await;
        info!(addr = %self.local_addr, "rpc server stopped");
    }
}

async fn serve_connection<H: RequestHandler>(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
    shutdown: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, %e, "could not disable nagle");
    }
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = codec::read_frame(&mut reader, MAX_FRAME_BYTES) => frame,
        };

        let bytes = match frame {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!(%peer, "peer closed connection");
                break;
            }
            Err(e) => {
                warn!(%peer, %e, "failed to read request frame");
                break;
            }
        };

        let request = match codec::decode::<H::Request>(&bytes) {
            Ok(request) => request,
            Err(e) => {
                warn!(%peer, %e, "dropping connection after undecodable request");
                break;
            }
        };

        let response = handler.handle(request).await;
        if let Err(e) = codec::write_message(&mut writer, &response).await {
            warn!(%peer, %e, "failed to write response");
            break;
        }
    }
}
