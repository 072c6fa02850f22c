//! gol-node binary: broker, worker and controller processes.
//!
//! ```bash
//! # One broker
//! RUST_LOG=info cargo run --bin gol-node -- broker --listen 0.0.0.0:8030
//!
//! # Any number of workers, each on its own port
//! cargo run --bin gol-node -- worker --listen 127.0.0.1:8050 --broker 127.0.0.1:8030
//!
//! # Drive a run from the controller
//! SERVER=127.0.0.1:8030 cargo run --bin gol-node -- controller run --turns 100 --width 64 --height 64
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gol_engine::{Broker, BrokerService};
use gol_net::{BrokerClient, RpcServer};
use gol_types::config::{BrokerConfig, ControllerConfig, WorkerConfig, BROKER_ADDR_ENV};
use gol_types::patterns::Pattern;
use gol_types::{Cell, Grid, RunParams, StartStatus};
use gol_worker::{LocalNode, WorkerService};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "gol-node",
    version = env!("CARGO_PKG_VERSION"),
    about   = "Distributed Game of Life: broker, worker and controller"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Own the grid and drive the turn loop.
    Broker {
        #[arg(long, default_value = "0.0.0.0:8030")]
        listen: String,

        /// Per-call NextState deadline; a late reply counts as a failure.
        #[arg(long, default_value_t = 30_000)]
        call_timeout_ms: u64,

        /// Deadline for dialling a subscribing worker.
        #[arg(long, default_value_t = 5_000)]
        dial_timeout_ms: u64,
    },

    /// Serve NextState bands on a local thread pool.
    Worker {
        #[arg(long, default_value = "127.0.0.1:8050")]
        listen: String,

        #[arg(long, env = BROKER_ADDR_ENV, default_value = "127.0.0.1:8030")]
        broker: String,

        /// Address the broker dials back. Defaults to the bound address.
        #[arg(long)]
        advertise: Option<String>,

        #[arg(long, default_value_t = 4)]
        threads: usize,
    },

    /// Talk to a running broker.
    Controller {
        #[arg(long, env = BROKER_ADDR_ENV, default_value = "127.0.0.1:8030")]
        broker: String,

        #[command(subcommand)]
        action: ControllerAction,
    },
}

#[derive(Subcommand)]
enum ControllerAction {
    /// Start a run (or attach to the active one) and follow it to the end.
    Run {
        #[arg(long)]
        turns: u64,

        #[arg(long)]
        width: usize,

        #[arg(long)]
        height: usize,

        /// Seed pattern: glider, blinker, block or r-pentomino.
        #[arg(long, default_value = "glider")]
        pattern: Pattern,

        /// Seed position as `x,y`; wraps at the grid edges.
        #[arg(long, default_value = "0,0", value_parser = parse_position)]
        at: Cell,

        /// Seconds between progress reports.
        #[arg(long, default_value_t = 2)]
        progress_secs: u64,
    },

    /// Print turn, live-cell count and run flags.
    Status,

    /// Fetch the world at its current turn and report the key it is saved
    /// under.
    Save,

    /// Pause if running, resume if paused.
    Pause,

    Resume,

    /// Stop the broker and every registered worker.
    Shutdown,
}

fn parse_position(s: &str) -> std::result::Result<Cell, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y, got {s:?}"))?;
    let x = x.trim().parse().map_err(|e| format!("bad x in {s:?}: {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("bad y in {s:?}: {e}"))?;
    Ok(Cell::new(x, y))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Default log level: INFO. Override with RUST_LOG=gol_engine=debug etc.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Broker { listen, call_timeout_ms, dial_timeout_ms } => {
            let config = BrokerConfig {
                listen_addr: listen,
                call_timeout: Duration::from_millis(call_timeout_ms),
                dial_timeout: Duration::from_millis(dial_timeout_ms),
            };
            run_broker(config).await
        }
        Command::Worker { listen, broker, advertise, threads } => {
            let config = WorkerConfig {
                listen_addr: listen,
                broker_addr: broker,
                advertise_addr: advertise,
                threads,
                ..WorkerConfig::default()
            };
            run_worker(config).await
        }
        Command::Controller { broker, action } => {
            let config = ControllerConfig {
                broker_addr: broker,
                ..ControllerConfig::default()
            };
            run_controller(config, action).await
        }
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!(error = %e, "could not listen for Ctrl-C");
                    return;
                }
                info!("Ctrl-C — shutting down");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
}

// ── Broker mode ───────────────────────────────────────────────────────────────

async fn run_broker(config: BrokerConfig) -> Result<()> {
    let token = CancellationToken::new();
    let server = RpcServer::bind(&config.listen_addr)
        .await
        .context("broker could not bind")?;
    info!(addr = %server.local_addr(), "broker listening — press Ctrl-C to stop");

    let broker = Broker::new(config, token.clone());
    cancel_on_ctrl_c(token.clone());
    server.serve(Arc::new(BrokerService::new(broker)), token).await;

    info!("broker stopped");
    Ok(())
}

// ── Worker mode ───────────────────────────────────────────────────────────────

async fn run_worker(config: WorkerConfig) -> Result<()> {
    let token = CancellationToken::new();
    let node = LocalNode::new(format!("worker@{}", config.listen_addr), config.threads)?;
    let threads = node.threads();

    let server = RpcServer::bind(&config.listen_addr)
        .await
        .context("worker could not bind")?;
    let local = server.local_addr();
    let advertise = config.advertise_addr.clone().unwrap_or_else(|| local.to_string());

    let service = Arc::new(WorkerService::new(node, token.clone()));
    let serving = tokio::spawn(server.serve(service, token.clone()));
    info!(addr = %local, threads, "worker listening");

    // Subscribe only once the listener is up, since the broker dials back.
    let subscribed = async {
        let broker = BrokerClient::connect(&config.broker_addr, config.connect_timeout).await?;
        broker.subscribe(&advertise).await
    };
    match subscribed.await {
        Ok(id) => info!(worker = %id, broker = %config.broker_addr, %advertise, "subscribed"),
        Err(e) => {
            token.cancel();
            let _ = serving.await;
            return Err(e).context(format!("could not subscribe to {}", config.broker_addr));
        }
    }

    cancel_on_ctrl_c(token.clone());
    serving.await.context("worker server task failed")?;
    info!("worker stopped");
    Ok(())
}

// ── Controller mode ───────────────────────────────────────────────────────────

async fn run_controller(config: ControllerConfig, action: ControllerAction) -> Result<()> {
    let client = BrokerClient::connect(&config.broker_addr, config.connect_timeout)
        .await
        .with_context(|| format!("could not reach broker at {}", config.broker_addr))?;

    match action {
        ControllerAction::Run { turns, width, height, pattern, at, progress_secs } => {
            let config = ControllerConfig {
                progress_interval: Duration::from_secs(progress_secs.max(1)),
                ..config
            };
            let alive = pattern.place(at.x, at.y, width, height)?;
            let initial = Grid::from_alive_cells(width, height, &alive)?;
            info!(key = %initial.world_key(), alive = initial.alive_count(), "initial world");
            follow_run(&client, &config, RunParams { turns, width, height }, alive).await
        }
        ControllerAction::Status => {
            let progress = client.progress().await?;
            let finished = client.is_finished().await?;
            let paused = client.is_paused().await?;
            info!(turn = progress.turn, alive = progress.alive, finished, paused, "status");
            Ok(())
        }
        ControllerAction::Save => {
            let (grid, turn) = client.world().await?;
            let (key, alive) = saved_world(grid, turn)?;
            info!(%key, turn, alive, "world saved");
            Ok(())
        }
        ControllerAction::Pause => {
            if client.is_paused().await? {
                client.resume().await?;
                info!("continuing");
            } else {
                let turn = client.pause().await?;
                info!(turn, "paused");
            }
            Ok(())
        }
        ControllerAction::Resume => {
            client.resume().await?;
            info!("continuing");
            Ok(())
        }
        ControllerAction::Shutdown => {
            client.shutdown().await?;
            info!("broker shutting down");
            Ok(())
        }
    }
}

/// Start (or attach to) a run, report progress, then report the final world.
async fn follow_run(
    client: &BrokerClient,
    config: &ControllerConfig,
    params: RunParams,
    alive: Vec<Cell>,
) -> Result<()> {
    if client.is_paused().await? {
        info!("broker is paused; resuming the active run");
        client.resume().await?;
    }

    match client.start_run(params, alive).await? {
        StartStatus::Started => info!(turns = params.turns, width = params.width, height = params.height, "run started"),
        StartStatus::AlreadyRunning => info!("already running; following the active run"),
        StartStatus::Rejected { reason } => bail!("broker rejected the run: {reason}"),
    }

    let mut progress = tokio::time::interval(config.progress_interval);
    progress.tick().await;
    let mut finished = tokio::time::interval(config.finish_poll_interval);

    loop {
        tokio::select! {
            _ = progress.tick() => {
                let p = client.progress().await?;
                info!(turn = p.turn, alive = p.alive, "progress");
            }
            _ = finished.tick() => {
                if client.is_finished().await? {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C — detaching; the run continues on the broker");
                return Ok(());
            }
        }
    }

    let (grid, turn) = client.world().await?;
    let (key, alive) = saved_world(grid, turn)?;
    info!(%key, turn, alive, "final world");
    Ok(())
}

/// Key and live-cell count of a world fetched at `turn`.
fn saved_world(grid: Option<Grid>, turn: u64) -> Result<(String, usize)> {
    let grid = grid.context("broker has no world yet; start a run first")?;
    Ok((grid.snapshot_key(turn), grid.alive_count()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
