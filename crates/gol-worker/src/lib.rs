//! `gol-worker` — the compute side of the engine.
//!
//! A worker takes one context-augmented band per call, splits it into
//! sub-strips across a fixed pool of OS threads, and returns the band's
//! next-state rows. It keeps no state between calls, which is what lets the
//! broker discard and retry a whole turn after evicting a peer.

pub mod kernel;
pub mod node;
pub mod pool;
pub mod service;

// ── Public re-exports ─────────────────────────────────────────────────────────

pub use kernel::{step_band, step_grid};
pub use node::LocalNode;
pub use pool::StripPool;
pub use service::WorkerService;
