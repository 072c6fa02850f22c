//! The broker: owns the authoritative grid and drives the turn loop.
//!
//! ```text
//!   controller ──StartRun──▶ Broker ──spawn──▶ turn loop
//!                              │                  │
//!                              │   gate: paused? no workers? cancelled?
//!                              │                  │
//!                              │   snapshot registry → plan_bands → context_window
//!                              │                  │
//!                              │   join_all(NextState, per-call timeout)
//!                              │                  │
//!                              │   any failure → evict, retry same turn
//!                              │   all ok      → stitch, publish (grid, turn)
//!                              ▼
//!              GetWorld / GetProgress read the latest published snapshot
//! ```
//!
//! The loop is the only writer of the world. It publishes each completed
//! turn as one immutable [`WorldSnapshot`], so readers see either the
//! previous turn or the next one, never a mix.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use gol_net::codec::MAX_FRAME_BYTES;
use gol_types::config::BrokerConfig;
use gol_types::{
    cell_count, BandResult, Cell, ComputeNode, Grid, GolError, Progress, RowRange, RunParams,
    StartStatus, WorkerId,
};

use crate::error::{EngineError, Result};
use crate::planner;
use crate::registry::{RegisteredWorker, WorkerRegistry};
use crate::session::{RunControl, RunState};

// ── Snapshots & Phases ───────────────────────────────────────────────────────

/// A completed turn. `alive` is counted once when the snapshot is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldSnapshot {
    pub grid: Grid,
    pub turn: u64,
    pub alive: usize,
}

impl WorldSnapshot {
    fn new(grid: Grid, turn: u64) -> Self {
        let alive = grid.alive_count();
        Self { grid, turn, alive }
    }
}

/// What the turn loop is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// No run has ever been started.
    Idle,
    /// A run was accepted and its loop has not reached the gate yet.
    Starting,
    /// No live workers; waiting for a subscription.
    Stalled { turn: u64 },
    /// Blocked at the top of `turn` by a pause request.
    Parked { turn: u64 },
    /// Bands for `turn` are in flight.
    Computing { turn: u64 },
    /// The run reached its target.
    Finished { turn: u64 },
}

impl LoopPhase {
    pub fn turn(&self) -> u64 {
        match self {
            Self::Idle | Self::Starting => 0,
            Self::Stalled { turn }
            | Self::Parked { turn }
            | Self::Computing { turn }
            | Self::Finished { turn } => *turn,
        }
    }
}

// ── Broker ───────────────────────────────────────────────────────────────────

/// Cheap to clone; every clone drives the same state.
#[derive(Clone)]
pub struct Broker {
    shared: Arc<Shared>,
}

struct Shared {
    config: BrokerConfig,
    control: Mutex<RunControl>,
    registry: Mutex<WorkerRegistry>,
    world: watch::Sender<Option<Arc<WorldSnapshot>>>,
    paused: watch::Sender<bool>,
    workers: watch::Sender<usize>,
    phase: watch::Sender<LoopPhase>,
    shutdown: CancellationToken,
}

impl Broker {
    /// Cancelling `shutdown` stops the turn loop at its next gate.
    pub fn new(config: BrokerConfig, shutdown: CancellationToken) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                control: Mutex::new(RunControl::new()),
                registry: Mutex::new(WorkerRegistry::new()),
                world: watch::Sender::new(None),
                paused: watch::Sender::new(false),
                workers: watch::Sender::new(0),
                phase: watch::Sender::new(LoopPhase::Idle),
                shutdown,
            }),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.shared.config
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shared.shutdown.clone()
    }

    // ── Run lifecycle ────────────────────────────────────────────────────

    /// Accept a new run and spawn its turn loop.
    ///
    /// A request that arrives while a run is Running or Paused is refused
    /// with [`StartStatus::AlreadyRunning`]. An invalid request is refused
    /// with [`StartStatus::Rejected`]. Neither touches the current run.
    pub async fn start_run(&self, params: RunParams, alive: &[Cell]) -> StartStatus {
        let mut control = self.shared.control.lock().await;
        if control.is_active() {
            info!(state = %control.state, "start refused: a run is already active");
            return StartStatus::AlreadyRunning;
        }
        if self.shared.shutdown.is_cancelled() {
            return StartStatus::Rejected {
                reason: "broker is shutting down".into(),
            };
        }

        let grid = match check_frame_budget(&params)
            .and_then(|()| Grid::from_alive_cells(params.width, params.height, alive))
        {
            Ok(grid) => grid,
            Err(e) => {
                warn!(error = %e, "start rejected");
                return StartStatus::Rejected {
                    reason: e.to_string(),
                };
            }
        };

        let run_id = match control.start(params) {
            Ok(id) => id,
            Err(e) => {
                return StartStatus::Rejected {
                    reason: e.to_string(),
                }
            }
        };

        self.shared.paused.send_replace(false);
        self.shared.phase.send_replace(LoopPhase::Starting);
        self.shared
            .world
            .send_replace(Some(Arc::new(WorldSnapshot::new(grid, 0))));
        drop(control);

        let shared = Arc::clone(&self.shared);
        let span = tracing::info_span!("run", %run_id);
        tokio::spawn(async move { shared.run_loop(run_id, params).await }.instrument(span));

        StartStatus::Started
    }

    /// Latest published snapshot. `None` until the first run is accepted.
    pub fn world(&self) -> Option<Arc<WorldSnapshot>> {
        self.shared.world.borrow().clone()
    }

    /// `(turn, alive)` of the latest snapshot, read as one pair.
    pub fn progress(&self) -> Progress {
        match self.world() {
            Some(snapshot) => Progress {
                turn: snapshot.turn,
                alive: snapshot.alive,
            },
            None => Progress::default(),
        }
    }

    pub async fn state(&self) -> RunState {
        self.shared.control.lock().await.state
    }

    pub async fn is_finished(&self) -> bool {
        self.state().await == RunState::Finished
    }

    pub fn phase(&self) -> LoopPhase {
        *self.shared.phase.borrow()
    }

    // ── Pause / resume ───────────────────────────────────────────────────

    /// Request a pause and wait until the loop has parked.
    ///
    /// Returns the turn the loop is parked at. If the run finishes first,
    /// returns the final turn. Without an active run this is a no-op that
    /// returns the current turn.
    pub async fn pause(&self) -> Result<u64> {
        {
            let mut control = self.shared.control.lock().await;
            match control.state {
                RunState::Running => {
                    control.pause()?;
                    self.shared.paused.send_replace(true);
                    info!("pause requested");
                }
                RunState::Paused => {}
                RunState::Idle | RunState::Finished => return Ok(self.progress().turn),
            }
        }

        // A Parked phase is only published by the loop while holding the
        // run lock and seeing Paused, so any Parked value seen here blocks
        // the loop at that turn.
        let mut phase = self.shared.phase.subscribe();
        let mut paused = self.shared.paused.subscribe();
        tokio::select! {
            biased;
            parked = phase.wait_for(|p| {
                matches!(p, LoopPhase::Parked { .. } | LoopPhase::Finished { .. })
            }) => match parked {
                Ok(p) => Ok(p.turn()),
                Err(_) => Err(EngineError::ShuttingDown),
            },
            // Another caller resumed before the loop reached its gate.
            cleared = paused.wait_for(|p| !*p) => match cleared {
                Ok(_) => Ok(self.progress().turn),
                Err(_) => Err(EngineError::ShuttingDown),
            },
            _ = self.shared.shutdown.cancelled() => Err(EngineError::ShuttingDown),
        }
    }

    /// Clear a pause. No-op unless the run is Paused.
    pub async fn resume(&self) {
        let mut control = self.shared.control.lock().await;
        if control.resume().is_ok() {
            self.shared.paused.send_replace(false);
            info!("resume requested");
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.shared.paused.borrow()
    }

    // ── Workers ──────────────────────────────────────────────────────────

    /// Append a worker. It receives a band from the next turn on.
    pub async fn register(&self, node: Arc<dyn ComputeNode>) -> WorkerId {
        let label = node.label();
        let mut registry = self.shared.registry.lock().await;
        let id = registry.register(node);
        let count = registry.len();
        self.shared.workers.send_replace(count);
        info!(worker = %id, %label, workers = count, "worker registered");
        id
    }

    pub async fn worker_ids(&self) -> Vec<WorkerId> {
        self.shared.registry.lock().await.ids()
    }

    pub async fn worker_count(&self) -> usize {
        self.shared.registry.lock().await.len()
    }

    // ── Shutdown ─────────────────────────────────────────────────────────

    /// Tell every registered worker to stop, then cancel the broker.
    ///
    /// Worker errors and timeouts are ignored; a worker that stays up
    /// simply outlives the broker.
    pub async fn shutdown(&self) {
        let workers = {
            let mut registry = self.shared.registry.lock().await;
            let drained = registry.drain();
            self.shared.workers.send_replace(0);
            drained
        };
        info!(workers = workers.len(), "shutting down; notifying workers");

        let timeout = self.shared.config.call_timeout;
        let calls = workers.iter().map(|w| async move {
            match tokio::time::timeout(timeout, w.node.shutdown()).await {
                Ok(Ok(())) => debug!(worker = %w.id, "worker acknowledged shutdown"),
                Ok(Err(e)) => debug!(worker = %w.id, error = %e, "worker shutdown failed (ignored)"),
                Err(_) => debug!(worker = %w.id, "worker shutdown timed out (ignored)"),
            }
        });
        join_all(calls).await;

        self.shared.shutdown.cancel();
    }
}

// ── Turn loop ────────────────────────────────────────────────────────────────

impl Shared {
    async fn run_loop(self: Arc<Self>, run_id: Uuid, params: RunParams) {
        info!(turns = params.turns, width = params.width, height = params.height, "run started");

        let Some(mut current) = self.world.borrow().clone() else {
            warn!("run started without an initial world");
            return;
        };

        while current.turn < params.turns {
            if !self.wait_until_dispatchable(current.turn).await {
                info!(turn = current.turn, %run_id, "turn loop cancelled");
                return;
            }

            // Workers that subscribe from here on wait for the next turn.
            let workers = self.registry.lock().await.snapshot();
            if workers.is_empty() {
                continue;
            }

            match self.dispatch_turn(&current.grid, &workers).await {
                Ok(next) => {
                    let snapshot = Arc::new(WorldSnapshot::new(next, current.turn + 1));
                    self.world.send_replace(Some(Arc::clone(&snapshot)));
                    debug!(turn = snapshot.turn, alive = snapshot.alive, "turn complete");
                    current = snapshot;
                }
                Err(failed) => {
                    let remaining = {
                        let mut registry = self.registry.lock().await;
                        registry.evict(&failed);
                        let remaining = registry.len();
                        self.workers.send_replace(remaining);
                        remaining
                    };
                    warn!(
                        turn = current.turn,
                        evicted = ?failed,
                        remaining,
                        "turn discarded; retrying with surviving workers"
                    );
                }
            }
        }

        let mut control = self.control.lock().await;
        if let Err(e) = control.finish() {
            warn!(error = %e, "could not mark run finished");
        }
        self.paused.send_replace(false);
        self.phase.send_replace(LoopPhase::Finished { turn: current.turn });
        info!(turn = current.turn, alive = current.alive, "run finished");
    }

    /// Block until the loop may dispatch `turn`. Returns `false` on
    /// cancellation.
    ///
    /// Each decision is taken under the run lock and publishes its phase
    /// before the lock is released, so `pause()` never sees a Parked phase
    /// the loop has already left.
    async fn wait_until_dispatchable(&self, turn: u64) -> bool {
        let mut paused = self.paused.subscribe();
        let mut workers = self.workers.subscribe();

        loop {
            if self.shutdown.is_cancelled() {
                return false;
            }

            let gate = {
                let control = self.control.lock().await;
                paused.mark_unchanged();
                let gate = if control.state == RunState::Paused {
                    LoopPhase::Parked { turn }
                } else if *workers.borrow_and_update() == 0 {
                    LoopPhase::Stalled { turn }
                } else {
                    LoopPhase::Computing { turn }
                };
                self.phase.send_replace(gate);
                gate
            };

            match gate {
                LoopPhase::Parked { .. } => {
                    info!(turn, "paused");
                    tokio::select! {
                        _ = paused.changed() => {}
                        _ = self.shutdown.cancelled() => return false,
                    }
                    if !*paused.borrow() {
                        info!(turn, "resumed");
                    }
                }
                LoopPhase::Stalled { .. } => {
                    info!(turn, "no live workers; waiting for a subscription");
                    tokio::select! {
                        _ = workers.changed() => {}
                        _ = paused.changed() => {}
                        _ = self.shutdown.cancelled() => return false,
                    }
                }
                _ => return true,
            }
        }
    }

    /// Run one turn across `workers`. On any failure returns the ids of
    /// every worker that failed; nothing from the turn is kept.
    async fn dispatch_turn(
        &self,
        grid: &Grid,
        workers: &[RegisteredWorker],
    ) -> std::result::Result<Grid, Vec<WorkerId>> {
        let bands = planner::plan_bands(grid.height(), workers.len());
        let timeout = self.config.call_timeout;

        // Surplus workers beyond the row count receive no band this turn.
        let calls = bands.iter().zip(workers).map(|(&range, worker)| {
            let request = planner::context_window(grid, range);
            async move {
                let reply = tokio::time::timeout(timeout, worker.node.next_state(request)).await;
                let outcome = match reply {
                    Ok(Ok(result)) => check_shape(result, grid.width(), range),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("no reply within {timeout:?}")),
                };
                (worker, range, outcome)
            }
        });
        let outcomes = join_all(calls).await;

        let mut cells = Vec::with_capacity(grid.cells().len());
        let mut failed = Vec::new();
        for (worker, range, outcome) in outcomes {
            match outcome {
                Ok(result) => cells.extend_from_slice(&result.rows),
                Err(reason) => {
                    warn!(
                        worker = %worker.id,
                        label = %worker.node.label(),
                        top = range.top,
                        bottom = range.bottom,
                        %reason,
                        "band failed"
                    );
                    failed.push(worker.id);
                }
            }
        }
        if !failed.is_empty() {
            return Err(failed);
        }

        Grid::from_cells(grid.width(), grid.height(), cells).map_err(|e| {
            warn!(error = %e, "stitched grid has the wrong shape");
            workers.iter().take(bands.len()).map(|w| w.id).collect()
        })
    }
}

/// Headroom for enum tags and length prefixes around the cell buffer.
const FRAME_OVERHEAD: usize = 64;

/// Refuse grids whose `GetWorld` reply or single-worker band could not be
/// carried in one frame.
fn check_frame_budget(params: &RunParams) -> gol_types::Result<()> {
    let cells = cell_count(params.width, params.height)?;
    let band = params
        .width
        .checked_mul(2)
        .and_then(|halo| cells.checked_add(halo))
        .and_then(|band| band.checked_add(FRAME_OVERHEAD));
    match band {
        Some(bytes) if bytes <= MAX_FRAME_BYTES => Ok(()),
        _ => Err(GolError::GridTooLarge {
            width: params.width,
            height: params.height,
        }),
    }
}

/// A reply counts only if it holds exactly the band's rows at the grid width.
fn check_shape(
    result: BandResult,
    width: usize,
    range: RowRange,
) -> std::result::Result<BandResult, String> {
    if result.width != width || result.rows.len() != range.len() * width {
        return Err(format!(
            "expected {} rows of width {width}, got {} cells of width {}",
            range.len(),
            result.rows.len(),
            result.width
        ));
    }
    Ok(result)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use gol_types::BandRequest;
    use gol_worker::{step_grid, LocalNode};

    // ── Test nodes ───────────────────────────────────────────────────────

    /// Fails every call.
    struct FailingNode;

    #[async_trait]
    impl ComputeNode for FailingNode {
        fn label(&self) -> String {
            "failing".into()
        }

        async fn next_state(&self, _band: BandRequest) -> gol_types::Result<BandResult> {
            Err(GolError::Network("connection reset".into()))
        }

        async fn shutdown(&self) -> gol_types::Result<()> {
            Err(GolError::Network("connection reset".into()))
        }
    }

    /// Answers correctly `healthy_calls` times, then fails.
    struct FlakyNode {
        inner: LocalNode,
        healthy_calls: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ComputeNode for FlakyNode {
        fn label(&self) -> String {
            "flaky".into()
        }

        async fn next_state(&self, band: BandRequest) -> gol_types::Result<BandResult> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.healthy_calls {
                return Err(GolError::Network("broken pipe".into()));
            }
            self.inner.next_state(band).await
        }

        async fn shutdown(&self) -> gol_types::Result<()> {
            Ok(())
        }
    }

    /// Sleeps before every answer and counts shutdown calls.
    struct SlowNode {
        inner: LocalNode,
        delay: Duration,
        shutdowns: Arc<AtomicUsize>,
    }

    impl SlowNode {
        fn new(delay: Duration) -> Self {
            Self {
                inner: local("slow"),
                delay,
                shutdowns: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ComputeNode for SlowNode {
        fn label(&self) -> String {
            "slow".into()
        }

        async fn next_state(&self, band: BandRequest) -> gol_types::Result<BandResult> {
            tokio::time::sleep(self.delay).await;
            self.inner.next_state(band).await
        }

        async fn shutdown(&self) -> gol_types::Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Returns one row too few.
    struct ShortNode;

    #[async_trait]
    impl ComputeNode for ShortNode {
        fn label(&self) -> String {
            "short".into()
        }

        async fn next_state(&self, band: BandRequest) -> gol_types::Result<BandResult> {
            let rows = vec![0; (band.band_height() - 1) * band.width];
            Ok(BandResult {
                width: band.width,
                rows,
            })
        }

        async fn shutdown(&self) -> gol_types::Result<()> {
            Ok(())
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn local(name: &str) -> LocalNode {
        LocalNode::new(name, 2).unwrap()
    }

    fn broker() -> Broker {
        Broker::new(BrokerConfig::default(), CancellationToken::new())
    }

    fn params(turns: u64, width: usize, height: usize) -> RunParams {
        RunParams {
            turns,
            width,
            height,
        }
    }

    fn glider() -> Vec<Cell> {
        vec![
            Cell::new(1, 0),
            Cell::new(2, 1),
            Cell::new(0, 2),
            Cell::new(1, 2),
            Cell::new(2, 2),
        ]
    }

    /// Deterministic pseudo-random live cells.
    fn scatter(width: usize, height: usize, seed: u64) -> Vec<Cell> {
        let mut state = seed.max(1);
        let mut cells = Vec::new();
        for y in 0..height {
            for x in 0..width {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                if state % 3 == 0 {
                    cells.push(Cell::new(x, y));
                }
            }
        }
        cells
    }

    fn reference(width: usize, height: usize, alive: &[Cell], turns: u64) -> Grid {
        let mut grid = Grid::from_alive_cells(width, height, alive).unwrap();
        for _ in 0..turns {
            grid = step_grid(&grid);
        }
        grid
    }

    async fn wait_finished(broker: &Broker) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !broker.is_finished().await {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("run did not finish");
    }

    async fn run_with(nodes: Vec<Arc<dyn ComputeNode>>, p: RunParams, alive: &[Cell]) -> (Broker, Arc<WorldSnapshot>) {
        let broker = broker();
        for node in nodes {
            broker.register(node).await;
        }
        assert_eq!(broker.start_run(p, alive).await, StartStatus::Started);
        wait_finished(&broker).await;
        let world = broker.world().unwrap();
        (broker, world)
    }

    // ── Results ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn glider_is_identical_for_any_worker_count() {
        let expected = reference(4, 4, &glider(), 4);
        for n in [1, 2, 4] {
            let nodes: Vec<Arc<dyn ComputeNode>> =
                (0..n).map(|i| Arc::new(local(&format!("w{i}"))) as Arc<dyn ComputeNode>).collect();
            let (_, world) = run_with(nodes, params(4, 4, 4), &glider()).await;
            assert_eq!(world.turn, 4);
            assert_eq!(world.grid, expected, "workers={n}");
        }
    }

    #[tokio::test]
    async fn uneven_split_matches_reference() {
        let alive = scatter(17, 13, 5);
        let expected = reference(17, 13, &alive, 12);
        let nodes: Vec<Arc<dyn ComputeNode>> =
            (0..5).map(|i| Arc::new(local(&format!("w{i}"))) as Arc<dyn ComputeNode>).collect();
        let (_, world) = run_with(nodes, params(12, 17, 13), &alive).await;
        assert_eq!(world.grid, expected);
        assert_eq!(world.alive, expected.alive_count());
    }

    #[tokio::test]
    async fn more_workers_than_rows() {
        let alive = vec![Cell::new(0, 0), Cell::new(1, 0), Cell::new(2, 0), Cell::new(1, 1)];
        let expected = reference(6, 3, &alive, 5);
        let nodes: Vec<Arc<dyn ComputeNode>> =
            (0..7).map(|i| Arc::new(local(&format!("w{i}"))) as Arc<dyn ComputeNode>).collect();
        let (broker, world) = run_with(nodes, params(5, 6, 3), &alive).await;
        assert_eq!(world.grid, expected);
        assert_eq!(broker.worker_count().await, 7);
    }

    #[tokio::test]
    async fn zero_turns_finishes_at_initial_state() {
        let (_, world) = run_with(vec![Arc::new(local("w"))], params(0, 4, 4), &glider()).await;
        assert_eq!(world.turn, 0);
        assert_eq!(world.grid.alive_cells(), {
            let mut cells = glider();
            cells.sort_by_key(|c| (c.y, c.x));
            cells
        });
    }

    // ── Start ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn invalid_start_is_rejected() {
        let broker = broker();
        let status = broker.start_run(params(5, 0, 4), &[]).await;
        assert!(matches!(status, StartStatus::Rejected { .. }));

        let status = broker.start_run(params(5, 4, 4), &[Cell::new(9, 9)]).await;
        assert!(matches!(status, StartStatus::Rejected { .. }));

        assert!(broker.world().is_none());
        assert_eq!(broker.state().await, RunState::Idle);
        assert!(!broker.is_finished().await);
    }

    #[tokio::test]
    async fn oversized_grids_are_rejected() {
        let broker = broker();
        // The first overflows `usize`; the second would not fit in one frame.
        for (width, height) in [(usize::MAX, 2), (1 << 16, 1 << 13)] {
            let status = broker.start_run(params(1, width, height), &[]).await;
            assert!(
                matches!(status, StartStatus::Rejected { .. }),
                "{width}x{height}: {status}"
            );
        }
        assert!(broker.world().is_none());
        assert_eq!(broker.state().await, RunState::Idle);
    }

    #[test]
    fn frame_budget() {
        assert!(check_frame_budget(&params(1, 1024, 1024)).is_ok());
        assert!(check_frame_budget(&params(1, MAX_FRAME_BYTES, 1)).is_err());
        assert!(matches!(
            check_frame_budget(&params(1, 0, 4)),
            Err(GolError::InvalidDimensions { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_start_leaves_run_untouched() {
        let broker = broker();
        // No workers: the run stays Running at turn 0.
        assert_eq!(broker.start_run(params(10, 4, 4), &glider()).await, StartStatus::Started);
        let before = broker.world().unwrap();

        let status = broker.start_run(params(3, 8, 8), &[]).await;
        assert_eq!(status, StartStatus::AlreadyRunning);

        let after = broker.world().unwrap();
        assert_eq!(after.grid, before.grid);
        assert_eq!(after.turn, 0);
        assert_eq!(broker.worker_count().await, 0);
        assert_eq!(broker.state().await, RunState::Running);
    }

    #[tokio::test]
    async fn restart_after_finish_replaces_world() {
        let broker = broker();
        broker.register(Arc::new(local("w"))).await;
        broker.start_run(params(3, 4, 4), &glider()).await;
        wait_finished(&broker).await;

        let alive = scatter(9, 6, 3);
        assert_eq!(broker.start_run(params(2, 9, 6), &alive).await, StartStatus::Started);
        wait_finished(&broker).await;
        let world = broker.world().unwrap();
        assert_eq!(world.turn, 2);
        assert_eq!(world.grid, reference(9, 6, &alive, 2));
    }

    // ── Stall ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn stalls_without_workers_then_continues() {
        let broker = broker();
        broker.start_run(params(3, 8, 8), &glider()).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while broker.phase() != (LoopPhase::Stalled { turn: 0 }) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(broker.progress(), Progress { turn: 0, alive: 5 });
        assert!(!broker.is_finished().await);

        broker.register(Arc::new(local("late"))).await;
        wait_finished(&broker).await;
        assert_eq!(broker.world().unwrap().grid, reference(8, 8, &glider(), 3));
    }

    // ── Failure handling ─────────────────────────────────────────────────

    #[tokio::test]
    async fn failed_worker_is_evicted_and_turn_retried() {
        let alive = scatter(12, 9, 11);
        let broker = broker();
        let a = broker.register(Arc::new(local("a"))).await;
        let bad = broker.register(Arc::new(FailingNode)).await;
        let c = broker.register(Arc::new(local("c"))).await;

        broker.start_run(params(6, 12, 9), &alive).await;
        wait_finished(&broker).await;

        assert_eq!(broker.worker_ids().await, vec![a, c]);
        assert!(!broker.worker_ids().await.contains(&bad));
        assert_eq!(broker.world().unwrap().grid, reference(12, 9, &alive, 6));
    }

    #[tokio::test]
    async fn mid_run_failure_matches_survivor_only_run() {
        let alive = scatter(10, 10, 23);
        let flaky = FlakyNode {
            inner: local("flaky"),
            healthy_calls: 3,
            calls: AtomicUsize::new(0),
        };
        let nodes: Vec<Arc<dyn ComputeNode>> =
            vec![Arc::new(local("a")), Arc::new(flaky), Arc::new(local("b"))];
        let (broker, with_failure) = run_with(nodes, params(8, 10, 10), &alive).await;
        assert_eq!(broker.worker_count().await, 2);

        let survivors: Vec<Arc<dyn ComputeNode>> = vec![Arc::new(local("a")), Arc::new(local("b"))];
        let (_, survivors_only) = run_with(survivors, params(8, 10, 10), &alive).await;
        assert_eq!(with_failure.grid, survivors_only.grid);
    }

    #[tokio::test]
    async fn slow_worker_is_treated_as_failed() {
        let config = BrokerConfig {
            call_timeout: Duration::from_millis(50),
            ..BrokerConfig::default()
        };
        let broker = Broker::new(config, CancellationToken::new());
        let fast = broker.register(Arc::new(local("fast"))).await;
        broker.register(Arc::new(SlowNode::new(Duration::from_secs(5)))).await;

        broker.start_run(params(3, 6, 6), &glider()).await;
        wait_finished(&broker).await;
        assert_eq!(broker.worker_ids().await, vec![fast]);
        assert_eq!(broker.world().unwrap().grid, reference(6, 6, &glider(), 3));
    }

    #[tokio::test]
    async fn malformed_reply_is_treated_as_failed() {
        let broker = broker();
        let good = broker.register(Arc::new(local("good"))).await;
        broker.register(Arc::new(ShortNode)).await;

        broker.start_run(params(2, 5, 8), &glider()).await;
        wait_finished(&broker).await;
        assert_eq!(broker.worker_ids().await, vec![good]);
        assert_eq!(broker.world().unwrap().grid, reference(5, 8, &glider(), 2));
    }

    #[tokio::test]
    async fn losing_every_worker_stalls_the_run() {
        let broker = broker();
        broker.register(Arc::new(FailingNode)).await;
        broker.start_run(params(4, 4, 4), &glider()).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while broker.phase() != (LoopPhase::Stalled { turn: 0 }) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(broker.worker_count().await, 0);

        broker.register(Arc::new(local("rescue"))).await;
        wait_finished(&broker).await;
        assert_eq!(broker.progress().turn, 4);
    }

    // ── Snapshot consistency ─────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_only_see_whole_turns() {
        let turns = 40;
        let alive = scatter(16, 12, 77);
        let mut expected = vec![Grid::from_alive_cells(16, 12, &alive).unwrap()];
        for t in 0..turns as usize {
            let next = step_grid(&expected[t]);
            expected.push(next);
        }

        let broker = broker();
        for i in 0..3 {
            broker.register(Arc::new(local(&format!("w{i}")))).await;
        }
        broker.start_run(params(turns, 16, 12), &alive).await;

        let reader = {
            let broker = broker.clone();
            tokio::spawn(async move {
                let mut seen = 0;
                loop {
                    let done = broker.is_finished().await;
                    if let Some(snapshot) = broker.world() {
                        assert_eq!(snapshot.grid, expected[snapshot.turn as usize]);
                        assert_eq!(snapshot.alive, snapshot.grid.alive_count());
                        seen += 1;
                    }
                    if done {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
                seen
            })
        };
        wait_finished(&broker).await;
        assert!(reader.await.unwrap() > 0);
    }

    // ── Pause / resume ───────────────────────────────────────────────────

    #[tokio::test]
    async fn pause_holds_turn_until_resume() {
        let broker = broker();
        broker
            .register(Arc::new(SlowNode::new(Duration::from_millis(2))))
            .await;
        broker.start_run(params(1_000_000, 8, 8), &glider()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let parked_at = broker.pause().await.unwrap();
        assert!(broker.is_paused());
        assert_eq!(broker.phase(), LoopPhase::Parked { turn: parked_at });
        assert_eq!(broker.state().await, RunState::Paused);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(broker.progress().turn, parked_at);
        assert!(!broker.is_finished().await);

        // A second pause while parked reports the same turn.
        assert_eq!(broker.pause().await.unwrap(), parked_at);

        broker.resume().await;
        assert!(!broker.is_paused());
        tokio::time::timeout(Duration::from_secs(5), async {
            while broker.progress().turn <= parked_at {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        broker.shutdown().await;
    }

    #[tokio::test]
    async fn pause_without_active_run_is_noop() {
        let broker = broker();
        assert_eq!(broker.pause().await.unwrap(), 0);
        assert!(!broker.is_paused());
        broker.resume().await;
        assert_eq!(broker.state().await, RunState::Idle);
    }

    #[tokio::test]
    async fn pause_while_stalled_parks() {
        let broker = broker();
        broker.start_run(params(5, 4, 4), &glider()).await;
        assert_eq!(broker.pause().await.unwrap(), 0);
        assert_eq!(broker.phase(), LoopPhase::Parked { turn: 0 });

        // A worker arriving while paused does nothing until resume.
        broker.register(Arc::new(local("w"))).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(broker.progress().turn, 0);

        broker.resume().await;
        wait_finished(&broker).await;
        assert_eq!(broker.progress().turn, 5);
    }

    #[tokio::test]
    async fn pause_right_after_resume_reports_the_turn_it_blocks_at() {
        let broker = broker();
        broker
            .register(Arc::new(SlowNode::new(Duration::from_millis(2))))
            .await;
        broker.start_run(params(1_000_000, 8, 8), &glider()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let first = broker.pause().await.unwrap();

        // Holding the registry stops the resumed loop between its gate and
        // the dispatch of turn `first`.
        let registry = broker.shared.registry.lock().await;
        broker.resume().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = tokio::spawn({
            let broker = broker.clone();
            async move { broker.pause().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(registry);

        let second = tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second, first + 1);
        assert_eq!(broker.phase(), LoopPhase::Parked { turn: second });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(broker.progress().turn, second);

        broker.shutdown().await;
    }

    #[tokio::test]
    async fn resume_from_another_caller_releases_a_waiting_pause() {
        let broker = broker();
        broker
            .register(Arc::new(SlowNode::new(Duration::from_millis(2))))
            .await;
        broker.start_run(params(1_000_000, 8, 8), &glider()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The loop cannot reach its next gate while the registry is held.
        let registry = broker.shared.registry.lock().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let pending = tokio::spawn({
            let broker = broker.clone();
            async move { broker.pause().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        broker.resume().await;

        let turn = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(turn, broker.progress().turn);
        assert!(!broker.is_paused());
        assert_eq!(broker.state().await, RunState::Running);

        drop(registry);
        tokio::time::timeout(Duration::from_secs(5), async {
            while broker.progress().turn <= turn {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
        broker.shutdown().await;
    }

    #[tokio::test]
    async fn pause_during_final_turn_leaves_run_unpaused() {
        let broker = broker();
        broker
            .register(Arc::new(SlowNode::new(Duration::from_millis(50))))
            .await;
        broker.start_run(params(1, 6, 6), &glider()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(broker.pause().await.unwrap(), 1);
        assert!(broker.is_finished().await);
        assert!(!broker.is_paused());
        assert_eq!(broker.phase(), LoopPhase::Finished { turn: 1 });
    }

    // ── Shutdown ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn shutdown_notifies_every_worker() {
        let broker = broker();
        let a = SlowNode::new(Duration::ZERO);
        let b = SlowNode::new(Duration::ZERO);
        let (a_count, b_count) = (Arc::clone(&a.shutdowns), Arc::clone(&b.shutdowns));
        broker.register(Arc::new(a)).await;
        broker.register(Arc::new(b)).await;
        broker.register(Arc::new(FailingNode)).await;

        broker.shutdown().await;
        assert_eq!(a_count.load(Ordering::SeqCst), 1);
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
        assert_eq!(broker.worker_count().await, 0);
        assert!(broker.shutdown_token().is_cancelled());

        let status = broker.start_run(params(1, 4, 4), &glider()).await;
        assert!(matches!(status, StartStatus::Rejected { .. }));
    }

    #[tokio::test]
    async fn shutdown_stops_a_stalled_loop() {
        let broker = broker();
        broker.start_run(params(5, 4, 4), &glider()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        broker.shutdown().await;
        let paused = broker.pause().await;
        // The run never finished; pause reports shutdown instead of hanging.
        assert!(matches!(paused, Err(EngineError::ShuttingDown)));
    }
}
