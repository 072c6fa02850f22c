//! `gol-net` — the remote-call channel between controller, broker and
//! workers.
//!
//! Plain TCP with one length-prefixed bincode frame per request and per
//! response; see [`codec`] for the wire format. Each process plays both
//! roles: the broker serves controllers and workers and is a client of
//! every worker, and a worker serves the broker and is a client of it for
//! the one `Subscribe` call.

pub mod client;
pub mod codec;
pub mod error;
pub mod protocol;
pub mod server;

// ── Public re-exports ─────────────────────────────────────────────────────────

pub use client::{BrokerClient, RpcClient, WorkerClient};
pub use error::{NetError, Result};
pub use protocol::{BrokerRequest, BrokerResponse, WorkerRequest, WorkerResponse};
pub use server::{RequestHandler, RpcServer};
