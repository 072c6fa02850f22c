//! Fixed-size strip thread pool.
//!
//! ```text
//!                 compute(band)
//!                      │  split_rows(band_height, min(threads, band_height))
//!        ┌─────────────┼─────────────┐
//!        ▼             ▼             ▼
//!   [strip 0]     [strip 1]  …  [strip n-1]     ← shared work queue
//!        │             │             │
//!   strip-worker-0  strip-worker-1 …            ← threads spawned once
//!        └─────────────┼─────────────┘
//!                      ▼
//!          wait for n results, place each at its row offset
//! ```
//!
//! The threads live as long as the pool. Dropping the pool closes the work
//! queue and every thread exits after its current strip.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, trace};

use gol_types::{split_rows, BandRequest, BandResult, GolError, Result, RowRange, DEAD};

use crate::kernel;

/// One sub-strip of a band.
struct StripJob {
    band: Arc<BandRequest>,
    rows: RowRange,
    done: Sender<StripOutput>,
}

struct StripOutput {
    rows: RowRange,
    cells: Vec<u8>,
}

pub struct StripPool {
    jobs: Sender<StripJob>,
    threads: usize,
}

impl StripPool {
    /// Spawn `threads` compute threads (at least one).
    pub fn new(threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        let (jobs, queue) = mpsc::channel::<StripJob>();
        let queue = Arc::new(Mutex::new(queue));

        for i in 0..threads {
            let queue = Arc::clone(&queue);
            thread::Builder::new()
                .name(format!("strip-worker-{i}"))
                .spawn(move || Self::worker_loop(queue))
                .map_err(|e| GolError::Internal(format!("failed to spawn strip worker {i}: {e}")))?;
        }

        debug!(threads, "strip pool started");
        Ok(Self { jobs, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    fn worker_loop(queue: Arc<Mutex<Receiver<StripJob>>>) {
        loop {
            // The lock is only held while waiting for the next job, never
            // while computing.
            let job = match queue.lock() {
                Ok(receiver) => receiver.recv(),
                Err(_) => return,
            };
            let Ok(job) = job else {
                // Queue closed: the pool was dropped.
                return;
            };

            let width = job.band.width;
            let mut cells = vec![DEAD; job.rows.len() * width];
            kernel::step_rows(&job.band.context, width, job.rows, &mut cells);
            trace!(top = job.rows.top, bottom = job.rows.bottom, "strip computed");

            // The caller only stops listening if it has already failed.
            let _ = job.done.send(StripOutput {
                rows: job.rows,
                cells,
            });
        }
    }

    /// Compute every row of `band` across the pool. Blocks until all strips
    /// have reported back.
    pub fn compute(&self, band: BandRequest) -> Result<BandResult> {
        band.validate()?;
        let width = band.width;
        let height = band.band_height();
        let strips = split_rows(height, self.threads.min(height));

        let band = Arc::new(band);
        let (done_tx, done_rx) = mpsc::channel();
        for rows in &strips {
            self.jobs
                .send(StripJob {
                    band: Arc::clone(&band),
                    rows: *rows,
                    done: done_tx.clone(),
                })
                .map_err(|_| GolError::Internal("strip pool has stopped".into()))?;
        }
        drop(done_tx);

        let mut out = vec![DEAD; height * width];
        for _ in 0..strips.len() {
            let strip = done_rx
                .recv()
                .map_err(|_| GolError::Internal("strip worker exited mid-band".into()))?;
            out[strip.rows.top * width..strip.rows.bottom * width].copy_from_slice(&strip.cells);
        }

        Ok(BandResult { width, rows: out })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
