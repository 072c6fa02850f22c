//! `gol-engine` — the broker of the distributed Game of Life.
//!
//! The broker holds the only authoritative copy of the grid. Each turn it
//! cuts the grid into row bands, one per live worker, sends every band with
//! one halo row above and below, and stitches the results in band order.
//! Workers are stateless, so a failed turn is simply recomputed by the
//! survivors.
//!
//! # Architecture
//!
//! ```text
//!                       ┌──────────────┐
//!   controller ────────▶│    Broker    │◀──────── Subscribe(callback)
//!   (start/pause/poll)  │  turn loop   │
//!                       └──────┬───────┘
//!            NextState(band 0) │ NextState(band 1) … NextState(band n-1)
//!                 ┌────────────┼────────────┐
//!                 ▼            ▼            ▼
//!             worker 0     worker 1  …  worker n-1
//! ```

pub mod broker;
pub mod error;
pub mod planner;
pub mod registry;
pub mod service;
pub mod session;

// ── Public re-exports ────────────────────────────────────────────────────────

pub use broker::{Broker, LoopPhase, WorldSnapshot};
pub use error::{EngineError, Result};
pub use planner::{context_window, plan_bands};
pub use registry::{RegisteredWorker, WorkerRegistry};
pub use service::BrokerService;
pub use session::{RunControl, RunState};
